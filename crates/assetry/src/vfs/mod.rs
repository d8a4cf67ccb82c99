//! virtual files and folders
//!
//! Every backend exposes the same capabilities:
//! - [FileOrFolder]: `name` and `full_name`
//! - [File]: lazily downloaded content
//! - [Folder]: lazily listed children
//! - [ModifiableFile] / [ModifiableFolder]: write access, only where the backend supports it
//!
//! Consumers ask for write access with [File::as_modifiable] / [Folder::as_modifiable].
//! Read-only backends simply answer `None`.
pub mod http;
pub mod local;
pub mod packed;
pub mod remote;
pub mod rpc;
mod transfer;

pub use transfer::{Busy, BusyToken, Transfer, TransferOutcome};

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Common capabilities of files and folders
pub trait FileOrFolder: Send + Sync + std::fmt::Debug {
    /// Leaf name, e.g. `unit.hcl`
    fn name(&self) -> &str;

    /// Full path in the backend's own convention (os path, url, archive path, ...)
    fn full_name(&self) -> &str;

    /// Transfer currently in flight on this node
    fn transfer(&self) -> Transfer {
        Transfer::Idle
    }
}

#[async_trait]
pub trait File: FileOrFolder {
    /// Content if it was downloaded before
    fn cached_bytes(&self) -> Option<Bytes>;

    /// Fetches the content into the cache
    ///
    /// Transport failures are logged and leave the content absent.
    async fn download(&self) -> TransferOutcome;

    /// Content, downloading it on first access
    async fn bytes(&self) -> Option<Bytes> {
        if let Some(bytes) = self.cached_bytes() {
            return Some(bytes);
        }
        self.download().await;
        self.cached_bytes()
    }

    /// Content decoded as utf-8 (invalid sequences are replaced)
    async fn text(&self) -> Option<String> {
        self.bytes()
            .await
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    fn as_modifiable(&self) -> Option<&dyn ModifiableFile> {
        None
    }
}

#[async_trait]
pub trait Folder: FileOrFolder {
    /// Files in listing order
    async fn files(&self) -> Vec<Arc<dyn File>>;

    /// Sub folders in listing order
    async fn folders(&self) -> Vec<Arc<dyn Folder>>;

    /// Whether the listing has been fetched at least once
    fn is_listed(&self) -> bool;

    fn as_modifiable(&self) -> Option<&dyn ModifiableFolder> {
        None
    }
}

#[async_trait]
pub trait ModifiableFile: File {
    /// Replaces the content (write-through to the backend)
    async fn set_bytes(&self, bytes: Bytes) -> TransferOutcome;

    async fn set_text(&self, text: &str) -> TransferOutcome {
        self.set_bytes(Bytes::copy_from_slice(text.as_bytes()))
            .await
    }
}

#[async_trait]
pub trait ModifiableFolder: Folder {
    /// Returns the file `name`, creating it if missing
    async fn add_file(&self, name: &str) -> Option<Arc<dyn File>>;

    /// Returns the folder `name`, creating it if missing
    async fn add_folder(&self, name: &str) -> Option<Arc<dyn Folder>>;
}

/// Writes `text` if the file supports it
///
/// Returns `false` (and logs) when the backend is read-only or the upload did not complete.
pub async fn write_text(file: &dyn File, text: &str) -> bool {
    let Some(modifiable) = file.as_modifiable() else {
        tracing::warn!(file = file.full_name(), "file is read-only, write ignored");
        return false;
    };
    modifiable.set_text(text).await == TransferOutcome::Completed
}

/// Children names of one folder, as sent by http and rpc backends
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Listing {
    pub files: Vec<String>,
    pub folders: Vec<String>,
}

impl Listing {
    /// Parses a delimited listing
    ///
    /// The text is trimmed and split on the first delimiter found among `\n`, `\r` and `;` (in that
    /// order). Names containing a `.` are files, all others are folders. Entries that are not a
    /// single path segment ([is_child_name]) are dropped.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let delimiter = ['\n', '\r', ';']
            .into_iter()
            .find(|delimiter| text.contains(*delimiter))
            .unwrap_or(';');

        let mut listing = Listing::default();
        for entry in text.split(delimiter).map(str::trim).filter(|e| !e.is_empty()) {
            if !is_child_name(entry) {
                tracing::warn!(entry, "listing entry is not a child name, skipped");
                continue;
            }
            if entry.contains('.') {
                listing.files.push(entry.to_string());
            } else {
                listing.folders.push(entry.to_string());
            }
        }
        listing
    }

    /// `\n` separated names, folders first
    pub fn render(&self) -> String {
        self.folders
            .iter()
            .chain(&self.files)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Whether `name` names a direct child: not empty, not `.` or `..`, without separators
pub fn is_child_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(|c| matches!(c, '/' | '\\'))
}

/// Normalizes a path for comparison
///
/// `\` becomes `/`, repeated separators collapse, leading `./` and trailing `/` are removed.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let absolute = unified.starts_with('/');
    let mut segments = unified.split('/').filter(|s| !s.is_empty()).peekable();
    while segments.peek() == Some(&".") {
        segments.next();
    }
    let joined = segments.collect::<Vec<_>>().join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Joins two '/' paths, ignoring empty sides
pub(crate) fn join_path(parent: &str, name: &str) -> String {
    match (parent.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (_, true) => parent.to_string(),
        _ => format!("{}/{name}", parent.trim_end_matches('/')),
    }
}
