//! Planning the tree mutations that replicate one directory onto another.
//!
//! The forge's tree API merges a new tree over its base: replacing a directory by the identity of another adds
//! the new entries but keeps files the new directory does not have. Stale files therefore get explicit deletion
//! entries.

use crate::forge::{EntryKind, Forge, ForgeResult};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info};

/// A single mutation of a git tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeMutation {
    /// Point `path` at the existing directory object `sha`.
    ReplaceDir {
        /// The target path.
        path: String,
        /// The identity of the directory object to reuse.
        sha: String,
    },
    /// Remove the file at `path`.
    DeleteFile {
        /// The path of the file to remove.
        path: String,
    },
    /// Write `content` to the file at `path`.
    WriteFile {
        /// The path of the file to write.
        path: String,
        /// The new file content.
        content: String,
    },
}

/// An ordered sequence of [TreeMutation]s, applied together in one tree.
pub type TreeMutationSet = Vec<TreeMutation>;

/// Computes the mutations that make `target` hold exactly the content of `source` at `git_ref`.
///
/// A source directory that cannot be found in its parent's listing is taken to mean that the target should
/// be deleted. Empty directories do not exist in git, so an emptied source looks the same.
///
/// ## Takes
/// - `forge` - The repository to read from.
/// - `source` - The directory to copy from.
/// - `target` - The directory to copy onto.
/// - `git_ref` - The commit or branch both directories are read at.
///
/// ## Returns
/// - The mutation set. Any lookup failure other than "not found" is returned as an error.
pub async fn plan_directory_sync(
    forge: &dyn Forge,
    source: &str,
    target: &str,
    git_ref: &str,
) -> ForgeResult<TreeMutationSet> {
    let source = source.trim_end_matches('/');
    let target = target.trim_end_matches('/');
    let mut mutations = TreeMutationSet::new();

    let Some(source_sha) = directory_sha(forge, source, git_ref).await? else {
        info!(source, target, "Source directory wasn't found, assuming a deletion PR");
        collect_deletions(forge, target, git_ref, &mut mutations).await?;
        return Ok(mutations);
    };

    mutations.push(TreeMutation::ReplaceDir {
        path: target.to_string(),
        sha: source_sha,
    });

    // Delete every file the target has and the source lacks.
    let source_files = flatten_tree(forge, source, git_ref).await?;
    let target_files = flatten_tree(forge, target, git_ref).await?;
    for relative in target_files.keys().filter(|f| !source_files.contains_key(*f)) {
        debug!(file = %relative, source, "File was not found in source, marking as a deletion");
        mutations.push(TreeMutation::DeleteFile {
            path: format!("{target}/{relative}"),
        });
    }

    Ok(mutations)
}

/// Resolves the identity of the directory at `dir` by scanning its parent's listing.
async fn directory_sha(forge: &dyn Forge, dir: &str, git_ref: &str) -> ForgeResult<Option<String>> {
    let parent = dir.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("");

    // A missing parent behaves like a missing entry.
    let Some(entries) = forge.list_dir(parent, git_ref).await? else {
        return Ok(None);
    };

    Ok(entries
        .into_iter()
        .find(|e| e.path == dir && e.kind == EntryKind::Dir)
        .map(|e| e.sha))
}

/// Appends one deletion per file found under `root`.
async fn collect_deletions(
    forge: &dyn Forge,
    root: &str,
    git_ref: &str,
    mutations: &mut TreeMutationSet,
) -> ForgeResult<()> {
    let mut pending = VecDeque::from([root.to_string()]);

    while let Some(dir) = pending.pop_front() {
        let Some(entries) = forge.list_dir(&dir, git_ref).await? else {
            info!(path = %dir, "Skipping deletion of non-existing directory");
            continue;
        };

        for entry in entries {
            match entry.kind {
                EntryKind::File => mutations.push(TreeMutation::DeleteFile { path: entry.path }),
                EntryKind::Dir => pending.push_back(entry.path),
                EntryKind::Other => info!(path = %entry.path, "Ignoring non-file entry"),
            }
        }
    }

    Ok(())
}

/// Maps the path of every file under `root`, relative to `root`, to its identity.
async fn flatten_tree(
    forge: &dyn Forge,
    root: &str,
    git_ref: &str,
) -> ForgeResult<BTreeMap<String, String>> {
    let mut files = BTreeMap::new();
    let mut pending = VecDeque::from([root.to_string()]);

    while let Some(dir) = pending.pop_front() {
        let Some(entries) = forge.list_dir(&dir, git_ref).await? else {
            continue;
        };

        for entry in entries {
            match entry.kind {
                EntryKind::File => {
                    let relative = entry
                        .path
                        .strip_prefix(root)
                        .unwrap_or(&entry.path)
                        .trim_start_matches('/')
                        .to_string();
                    files.insert(relative, entry.sha);
                }
                EntryKind::Dir => pending.push_back(entry.path),
                EntryKind::Other => {}
            }
        }
    }

    Ok(files)
}
