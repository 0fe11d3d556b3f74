//! Error types for the `promoter` application.

use crate::forge::ForgeError;
use nu_ansi_term::Color;
use thiserror::Error;

/// An error that can occur while handling an event or running a subcommand.
#[derive(Error, Debug)]
pub enum PromoterError {
    /// A call against the hosted git API failed.
    #[error("forge error: {}", .0)]
    Forge(#[from] ForgeError),
    /// A comment could not be shrunk below the size ceiling, even in concise form.
    #[error(
        "Comment for component `{}` is {} bytes, exceeding the {} byte ceiling even in concise form.",
        Color::Blue.paint(.component),
        .size,
        .max
    )]
    CommentTooLarge {
        /// The component whose comment overflowed.
        component: String,
        /// The size of the concise rendering.
        size: usize,
        /// The size ceiling.
        max: usize,
    },
    /// The in-repo or per-component configuration could not be parsed.
    #[error("Failed to parse configuration `{}`: {}", Color::Blue.paint(.path), .source)]
    Config {
        /// The path of the configuration file.
        path: String,
        /// The underlying parse error.
        source: toml::de::Error,
    },
    /// An inbound event payload could not be parsed.
    #[error("Failed to parse `{}` event payload: {}", .event_type, .source)]
    Payload {
        /// The event type header that accompanied the payload.
        event_type: String,
        /// The underlying parse error.
        source: serde_json::Error,
    },
    /// The payload signature did not match the configured secret.
    #[error("Webhook signature verification failed.")]
    InvalidSignature,
    /// A configured regular expression failed to compile.
    #[error("Invalid regular expression `{}`: {}", .pattern, .source)]
    InvalidRegex {
        /// The offending pattern.
        pattern: String,
        /// The underlying compile error.
        source: regex::Error,
    },
    /// An API client could not be constructed for an account.
    #[error("Failed to build API client for `{}`: {}", .owner, .reason)]
    ClientInit {
        /// The account the client was requested for.
        owner: String,
        /// Why the client could not be built.
        reason: String,
    },
    /// The delivery controller failed to compute a diff or update an application.
    #[error("delivery controller error: {}", .0)]
    Delivery(String),
    /// The per-event deadline elapsed mid-workflow.
    #[error("Deadline of {}s elapsed while {}.", .secs, .during)]
    DeadlineExceeded {
        /// The deadline, in seconds.
        secs: u64,
        /// What was in flight when the deadline elapsed.
        during: &'static str,
    },
    /// A panic was caught at the per-event task boundary.
    #[error("Event handler panicked: {}", .0)]
    Panicked(String),
    /// An I/O error occurred.
    #[error("I/O error: {}", .0)]
    Io(#[from] std::io::Error),
    /// A rendering into a [String] failed.
    #[error("formatting error: {}", .0)]
    Format(#[from] std::fmt::Error),
    /// A command line argument was malformed.
    #[error("Invalid argument `{}`: {}", Color::Blue.paint(.name.to_string()), .reason)]
    InvalidArgument {
        /// The argument name.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },
    /// Structured data could not be (de)serialized.
    #[error("serialization error: {}", .0)]
    Serde(#[from] serde_json::Error),
}

impl PromoterError {
    /// Converts the payload of a caught panic into [PromoterError::Panicked].
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked(message)
    }
}

/// A [Result] type alias where the error is [PromoterError].
pub type PromoterResult<T> = Result<T, PromoterError>;
