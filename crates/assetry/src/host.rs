//! serving a folder tree to other peers
//!
//! An [AssetHost] answers both wire protocols the loaders speak:
//! - rpc request keys, by implementing [Messenger] as a loopback
//! - http, through [router]
//!
//! In [HostMode::Packed] the http root answers with the whole tree as one archive instead of a
//! listing. The archive is packed on first request and kept.
use crate::loader::search;
use crate::vfs::packed::{self, PackError};
use crate::vfs::rpc::{Messenger, MessengerError, Progress, RequestKey};
use crate::vfs::{is_child_name, normalize_path, FileOrFolder, Folder, Listing, TransferOutcome};
use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::OnceCell;

const TEXT: &str = "text/plain; charset=utf-8";
const BINARY: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostMode {
    /// `GET /` answers with the root listing
    #[default]
    Listing,
    /// `GET /` answers with a packed archive
    Packed,
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Nothing at {0:?}")]
    NotFound(String),
    #[error("{0:?} leaves the served tree")]
    InvalidPath(String),
    #[error("{0:?} is read-only")]
    ReadOnly(String),
    #[error("Unable to write {0:?}")]
    WriteFailed(String),
    #[error("Unable to read {0:?}")]
    Unreadable(String),
    #[error("Unable to pack the served tree")]
    Pack(#[from] PackError),
}

impl IntoResponse for HostError {
    fn into_response(self) -> Response {
        let status = match &self {
            HostError::NotFound(_) => StatusCode::NOT_FOUND,
            HostError::InvalidPath(_) => StatusCode::BAD_REQUEST,
            HostError::ReadOnly(_) => StatusCode::METHOD_NOT_ALLOWED,
            HostError::WriteFailed(_) | HostError::Unreadable(_) | HostError::Pack(_) => {
                tracing::error!(err = %self, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

#[derive(Debug)]
pub struct AssetHost {
    root: Arc<dyn Folder>,
    mode: HostMode,
    archive: OnceCell<Bytes>,
}

impl AssetHost {
    pub fn new(root: Arc<dyn Folder>, mode: HostMode) -> Self {
        Self {
            root,
            mode,
            archive: OnceCell::new(),
        }
    }

    pub fn root(&self) -> &Arc<dyn Folder> {
        &self.root
    }

    pub fn mode(&self) -> HostMode {
        self.mode
    }

    /// The served tree as a packed archive
    pub async fn archive(&self) -> Result<Bytes, HostError> {
        let archive = self
            .archive
            .get_or_try_init(|| async { packed::pack(self.root.as_ref()).await.map(Bytes::from) })
            .await?;
        Ok(archive.clone())
    }

    /// Names of the children of the folder at `path`
    pub async fn listing(&self, path: &str) -> Result<Listing, HostError> {
        let folder = search::absolute_folder(&self.root, path)
            .await
            .ok_or_else(|| HostError::NotFound(path.to_string()))?;
        Ok(Listing {
            files: names(&folder.files().await),
            folders: names(&folder.folders().await),
        })
    }

    /// Content of the file at `path`
    pub async fn file(&self, path: &str) -> Result<Bytes, HostError> {
        let file = search::absolute_file(&self.root, path)
            .await
            .ok_or_else(|| HostError::NotFound(path.to_string()))?;
        file.bytes()
            .await
            .ok_or_else(|| HostError::Unreadable(path.to_string()))
    }

    /// Replaces (or creates) the file at `path`, creating missing folders
    ///
    /// Every segment of `path` must be a child name, `..` and `.` are rejected.
    pub async fn write(&self, path: &str, bytes: Bytes) -> Result<(), HostError> {
        let path = normalize_path(path);
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((name, parents)) = segments.split_last() else {
            return Err(HostError::NotFound(path.clone()));
        };
        if !segments.iter().all(|segment| is_child_name(segment)) {
            tracing::warn!(path = %path, "write outside the served tree rejected");
            return Err(HostError::InvalidPath(path.clone()));
        }

        let mut folder = self.root.clone();
        for segment in parents {
            folder = child_folder(&folder, segment, &path).await?;
        }
        let file = match folder.files().await.into_iter().find(|f| f.name() == *name) {
            Some(file) => file,
            None => folder
                .as_modifiable()
                .ok_or_else(|| HostError::ReadOnly(path.clone()))?
                .add_file(name)
                .await
                .ok_or_else(|| HostError::WriteFailed(path.clone()))?,
        };

        let outcome = file
            .as_modifiable()
            .ok_or_else(|| HostError::ReadOnly(path.clone()))?
            .set_bytes(bytes)
            .await;
        match outcome {
            TransferOutcome::Completed => {
                tracing::info!(file = %path, "written");
                Ok(())
            }
            _ => Err(HostError::WriteFailed(path)),
        }
    }

    /// Answers one rpc request key
    pub async fn respond(&self, key: &str) -> Result<Bytes, MessengerError> {
        let result = match RequestKey::parse(key) {
            Some(RequestKey::Archive) => self.archive().await,
            Some(RequestKey::Folder(path)) => self
                .listing(path)
                .await
                .map(|listing| Bytes::from(listing.render())),
            Some(RequestKey::File(path)) => self.file(path).await,
            None => return Err(MessengerError::NotFound(key.to_string())),
        };
        result.map_err(|err| match err {
            HostError::NotFound(_) => MessengerError::NotFound(key.to_string()),
            err => MessengerError::Failed {
                key: key.to_string(),
                reason: err.to_string(),
            },
        })
    }
}

/// Requests are answered locally, whatever the destination
#[async_trait]
impl Messenger for AssetHost {
    async fn send_request(
        &self,
        destination: &str,
        key: &str,
        on_progress: Progress,
    ) -> Result<Bytes, MessengerError> {
        tracing::debug!(destination, key, "request");
        on_progress(0.0);
        let bytes = self.respond(key).await?;
        on_progress(1.0);
        Ok(bytes)
    }
}

async fn child_folder(
    folder: &Arc<dyn Folder>,
    name: &str,
    path: &str,
) -> Result<Arc<dyn Folder>, HostError> {
    if let Some(existing) = folder.folders().await.into_iter().find(|f| f.name() == name) {
        return Ok(existing);
    }
    folder
        .as_modifiable()
        .ok_or_else(|| HostError::ReadOnly(path.to_string()))?
        .add_folder(name)
        .await
        .ok_or_else(|| HostError::WriteFailed(path.to_string()))
}

fn names<T: FileOrFolder + ?Sized>(nodes: &[Arc<T>]) -> Vec<String> {
    nodes.iter().map(|node| node.name().to_string()).collect()
}

/// http routes of `host`
///
/// | request              | response                                        |
/// |----------------------|-------------------------------------------------|
/// | `GET /`              | root listing, or the archive in packed mode     |
/// | `GET /<folder>/`     | listing as `text/plain`                         |
/// | `GET /<file>`        | content as `application/octet-stream`           |
/// | `PUT /<file>`        | replaces the content if the tree is modifiable  |
pub fn router(host: Arc<AssetHost>) -> Router {
    Router::new()
        .route("/", get(get_root))
        .route("/*path", get(get_path).put(put_path))
        .with_state(host)
}

/// Serves `host` until the listener fails
pub async fn serve(host: Arc<AssetHost>, listener: tokio::net::TcpListener) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, root = host.root.full_name(), mode = ?host.mode, "serving");
    }
    axum::serve(listener, router(host)).await
}

async fn get_root(State(host): State<Arc<AssetHost>>) -> Result<Response, HostError> {
    match host.mode {
        HostMode::Packed => Ok(binary(host.archive().await?)),
        HostMode::Listing => Ok(text(host.listing("").await?)),
    }
}

async fn get_path(
    State(host): State<Arc<AssetHost>>,
    Path(path): Path<String>,
) -> Result<Response, HostError> {
    tracing::trace!(path = %path, "GET");
    if !path.ends_with('/') {
        match host.file(&path).await {
            Err(HostError::NotFound(_)) => {}
            content => return content.map(binary),
        }
    }
    Ok(text(host.listing(&path).await?))
}

async fn put_path(
    State(host): State<Arc<AssetHost>>,
    Path(path): Path<String>,
    body: Bytes,
) -> Result<StatusCode, HostError> {
    tracing::trace!(path = %path, len = body.len(), "PUT");
    host.write(&path, body).await?;
    Ok(StatusCode::OK)
}

fn text(listing: Listing) -> Response {
    ([(header::CONTENT_TYPE, TEXT)], listing.render()).into_response()
}

fn binary(bytes: Bytes) -> Response {
    ([(header::CONTENT_TYPE, BINARY)], bytes).into_response()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vfs::local::LocalFolder;
    use pretty_assertions::assert_eq;

    fn host(mode: HostMode) -> (tempfile::TempDir, AssetHost) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.hcl"), "a = 1").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("b.hcl"), "b = 2").unwrap();
        let root: Arc<dyn Folder> = Arc::new(LocalFolder::new(dir.path()));
        (dir, AssetHost::new(root, mode))
    }

    #[tokio::test]
    async fn answers_request_keys() {
        let (_dir, host) = host(HostMode::Listing);

        let listing = host.respond("assets_folder:").await.unwrap();
        assert_eq!(listing, Bytes::from("sub\na.hcl"));

        let content = host.respond("assets_file:sub/b.hcl").await.unwrap();
        assert_eq!(content, Bytes::from("b = 2"));

        let archive = host.respond("assets:").await.unwrap();
        let unpacked = packed::unpack(&archive).unwrap();
        assert_eq!(search::files(&(unpacked as Arc<dyn Folder>)).await.len(), 2);

        assert!(matches!(
            host.respond("assets_file:nothing.hcl").await,
            Err(MessengerError::NotFound(_))
        ));
        assert!(matches!(
            host.respond("chat:hi").await,
            Err(MessengerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn writes_create_folders() {
        let (dir, host) = host(HostMode::Listing);
        host.write("new/deeper/c.hcl", Bytes::from("c = 3"))
            .await
            .unwrap();
        let written = std::fs::read_to_string(dir.path().join("new/deeper/c.hcl")).unwrap();
        assert_eq!(written, "c = 3");

        host.write("a.hcl", Bytes::from("a = 10")).await.unwrap();
        assert_eq!(host.file("a.hcl").await.unwrap(), Bytes::from("a = 10"));
    }

    #[tokio::test]
    async fn writes_stay_inside_the_tree() {
        let outer = tempfile::tempdir().unwrap();
        let served = outer.path().join("served");
        std::fs::create_dir(&served).unwrap();
        let root: Arc<dyn Folder> = Arc::new(LocalFolder::new(&served));
        let host = AssetHost::new(root, HostMode::Listing);

        for path in ["../escape.hcl", "sub/../../escape.hcl", "./../escape.hcl", "a/./b.hcl"] {
            assert!(
                matches!(
                    host.write(path, Bytes::from("pwned = 1")).await,
                    Err(HostError::InvalidPath(_))
                ),
                "{path}"
            );
        }
        assert!(!outer.path().join("escape.hcl").exists());
        assert!(!served.join("a").exists());

        let response = HostError::InvalidPath("..".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn read_only_trees_reject_writes() {
        let (_dir, host) = host(HostMode::Packed);
        let archive = host.archive().await.unwrap();
        let unpacked: Arc<dyn Folder> = packed::unpack(&archive).unwrap();
        let read_only = AssetHost::new(unpacked, HostMode::Listing);

        assert!(matches!(
            read_only.write("a.hcl", Bytes::from("x")).await,
            Err(HostError::ReadOnly(_))
        ));
        assert!(matches!(
            read_only.write("sub/new.hcl", Bytes::from("x")).await,
            Err(HostError::ReadOnly(_))
        ));
    }
}
