//! folders streamed from a peer through a [Messenger]
//!
//! Requests are keyed strings:
//! - `assets:` the whole tree as a packed archive
//! - `assets_folder:<path>` the [Listing](super::Listing) of one folder
//! - `assets_file:<path>` the content of one file
//!
//! Paths are relative to the served root, the root itself is the empty path. RPC trees are
//! read-only.
use super::remote::{RemoteFolder, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

pub const ARCHIVE_KEY: &str = "assets:";
pub const FOLDER_PREFIX: &str = "assets_folder:";
pub const FILE_PREFIX: &str = "assets_file:";

/// Called with the fraction (0.0-1.0) of a response received so far
pub type Progress = Arc<dyn Fn(f32) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum MessengerError {
    #[error("peer {0:?} is not connected")]
    NotConnected(String),
    #[error("peer has nothing for {0:?}")]
    NotFound(String),
    #[error("request {key:?} failed: {reason}")]
    Failed { key: String, reason: String },
}

/// Request/response channel to another peer
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_request(
        &self,
        destination: &str,
        key: &str,
        on_progress: Progress,
    ) -> Result<Bytes, MessengerError>;
}

/// A parsed request key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKey<'a> {
    Archive,
    Folder(&'a str),
    File(&'a str),
}

impl<'a> RequestKey<'a> {
    pub fn parse(key: &'a str) -> Option<Self> {
        if key == ARCHIVE_KEY {
            Some(RequestKey::Archive)
        } else if let Some(path) = key.strip_prefix(FOLDER_PREFIX) {
            Some(RequestKey::Folder(path))
        } else {
            key.strip_prefix(FILE_PREFIX).map(RequestKey::File)
        }
    }
}

pub fn folder_key(path: &str) -> String {
    format!("{FOLDER_PREFIX}{path}")
}

pub fn file_key(path: &str) -> String {
    format!("{FILE_PREFIX}{path}")
}

pub type RpcFolder = RemoteFolder<RpcTransport>;

pub struct RpcTransport {
    messenger: Arc<dyn Messenger>,
    destination: String,
    on_progress: Option<Progress>,
    root_name: String,
}

impl std::fmt::Debug for RpcTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcTransport")
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

impl RpcTransport {
    pub fn new(messenger: Arc<dyn Messenger>, destination: impl Into<String>) -> Self {
        let destination = destination.into();
        Self {
            messenger,
            root_name: format!("netcode://{destination}"),
            destination,
            on_progress: None,
        }
    }

    /// Forwards response progress to `on_progress`
    pub fn with_progress(mut self, on_progress: Option<Progress>) -> Self {
        self.on_progress = on_progress;
        self
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Sends one request, logging failures
    pub async fn request(&self, key: &str) -> Option<Bytes> {
        let observer = self.on_progress.clone();
        let traced_key = key.to_string();
        let progress: Progress = Arc::new(move |fraction| {
            tracing::trace!(key = %traced_key, fraction, "progress");
            if let Some(observer) = &observer {
                observer(fraction);
            }
        });

        match self
            .messenger
            .send_request(&self.destination, key, progress)
            .await
        {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                tracing::error!(destination = %self.destination, key, %err, "request failed");
                None
            }
        }
    }
}

#[async_trait]
impl Transport for RpcTransport {
    fn root_name(&self) -> &str {
        &self.root_name
    }

    async fn fetch_listing(&self, path: &str) -> Option<Bytes> {
        self.request(&folder_key(path)).await
    }

    async fn fetch_file(&self, path: &str) -> Option<Bytes> {
        self.request(&file_key(path)).await
    }

    async fn upload(&self, path: &str, _bytes: Bytes) -> bool {
        tracing::warn!(path, "rpc assets are read-only, upload ignored");
        false
    }

    fn writable(&self) -> bool {
        false
    }
}
