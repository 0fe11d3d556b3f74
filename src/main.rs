#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use anyhow::Result;
use clap::Parser;

mod branch;
mod bump;
mod chain;
mod cli;
mod config;
mod constants;
mod ctx;
mod diff;
mod dispatch;
mod errors;
mod events;
mod forge;
mod promotion;
mod retry;
mod server;
mod status;
mod subcommands;
mod sync;

#[tokio::main]
async fn main() -> Result<()> {
    cli::Cli::parse().run().await
}
