//! open a location, find documents, resolve them
//!
//! A [Loader] is bound to one location for its lifetime. The location decides the backend, checked
//! in this order:
//!
//! | location                      | backend                                                  |
//! |-------------------------------|----------------------------------------------------------|
//! | `netcode`                     | whole tree requested from the peer as a packed archive   |
//! | `netcode://` / `netcode://p`  | rpc folders (peer `p` or the context default), lazy      |
//! | `http://...` / `https://...`  | http folders, or a packed archive if the root is binary  |
//! | `*.bin`                       | packed archive on disk                                   |
//! | existing directory            | local folders                                            |
//!
//! Every operation exists twice: async on [Loader] and blocking on [BlockingLoader].
pub mod search;

use crate::blocking::Blocking;
use crate::context::AssetContext;
use crate::document::{self, DocumentError};
use crate::inherit::{self, DocumentSource, Inherited};
use crate::populate::{self, Asset, PopulateIssue};
use crate::vfs::http::{self, HttpRoot};
use crate::vfs::local::LocalFolder;
use crate::vfs::packed::{self, PackError};
use crate::vfs::rpc::{self, RpcFolder, RpcTransport};
use crate::vfs::{normalize_path, File, Folder, TransferOutcome};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;

pub const NETCODE: &str = "netcode";
pub const NETCODE_PREFIX: &str = "netcode://";

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Location is blank")]
    BlankLocation,
    #[error("No backend for location {0:?}")]
    UnsupportedLocation(String),
    #[error("{0} is not supported in this environment")]
    NotSupported(String),
    #[error("Root of {0:?} is not loaded yet")]
    NotLoaded(String),
    #[error("{0:?} needs a messenger, none is configured")]
    NoMessenger(String),
    #[error("Invalid url {location:?}: {reason}")]
    InvalidUrl { location: String, reason: String },
    #[error("{0:?} could not be reached")]
    Unreachable(String),
    #[error("Unable to unpack {location:?}")]
    Pack {
        location: String,
        #[source]
        source: PackError,
    },
    #[error("Invalid search pattern")]
    Pattern(#[from] glob::PatternError),
    #[error("Document {0:?} not found")]
    DocumentNotFound(String),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("Gave up waiting for {0:?}")]
    TimedOut(String),
}

/// Loads assets from one location
#[derive(Clone)]
pub struct Loader {
    inner: Arc<Inner>,
}

struct Inner {
    location: String,
    context: AssetContext,
    root: OnceCell<Arc<dyn Folder>>,
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("location", &self.inner.location)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl Loader {
    /// A loader for `location`, nothing fetched yet
    pub fn new(context: AssetContext, location: impl Into<String>) -> Result<Self, LoadError> {
        let location = location.into().trim().to_string();
        if location.is_empty() {
            return Err(LoadError::BlankLocation);
        }
        Ok(Self {
            inner: Arc::new(Inner {
                location,
                context,
                root: OnceCell::new(),
            }),
        })
    }

    /// Creates a loader and loads its root
    pub async fn open(
        context: AssetContext,
        location: impl Into<String>,
    ) -> Result<Self, LoadError> {
        let loader = Self::new(context, location)?;
        loader.load_async().await?;
        Ok(loader)
    }

    pub fn location(&self) -> &str {
        &self.inner.location
    }

    pub fn context(&self) -> &AssetContext {
        &self.inner.context
    }

    /// Whether the root listing (or archive) has been fetched
    pub fn is_loaded(&self) -> bool {
        self.inner.root.initialized()
    }

    /// The root folder, fetching it on the first call
    pub async fn load_async(&self) -> Result<Arc<dyn Folder>, LoadError> {
        self.inner
            .root
            .get_or_try_init(|| dispatch(&self.inner.context, &self.inner.location))
            .await
            .cloned()
    }

    /// The root folder, blocking until fetched
    ///
    /// http locations are rejected on sandboxed targets, use [Loader::load_async] there. So are
    /// calls from inside a current-thread runtime that also runs the context.
    pub fn load(&self) -> Result<Arc<dyn Folder>, LoadError> {
        if is_http(&self.inner.location) && self.inner.context.options().sandboxed {
            return Err(LoadError::NotSupported(format!(
                "blocking http ({})",
                self.inner.location
            )));
        }
        let blocking = self.inner.context.blocking();
        check_can_block(&blocking, &self.inner.location)?;
        let loader = self.clone();
        blocking
            .wait(async move { loader.load_async().await })
            .unwrap_or_else(|| Err(LoadError::TimedOut(self.inner.location.clone())))
    }

    /// The root folder, if loaded
    pub fn root(&self) -> Result<Arc<dyn Folder>, LoadError> {
        self.inner
            .root
            .get()
            .cloned()
            .ok_or_else(|| LoadError::NotLoaded(self.inner.location.clone()))
    }

    pub fn blocking(&self) -> BlockingLoader {
        BlockingLoader {
            loader: self.clone(),
            blocking: self.inner.context.blocking(),
        }
    }

    pub async fn files(&self) -> Result<Vec<Arc<dyn File>>, LoadError> {
        Ok(search::files(&self.root()?).await)
    }

    pub async fn folders(&self) -> Result<Vec<Arc<dyn Folder>>, LoadError> {
        Ok(search::folders(&self.root()?).await)
    }

    /// Files whose name matches the glob `pattern`
    pub async fn find_files(&self, pattern: &str) -> Result<Vec<Arc<dyn File>>, LoadError> {
        let pattern = glob::Pattern::new(pattern)?;
        Ok(search::find_files(&self.root()?, &pattern).await)
    }

    pub async fn find_file(&self, name: &str) -> Result<Option<Arc<dyn File>>, LoadError> {
        Ok(search::find_file(&self.root()?, name).await)
    }

    /// Lazy depth-first walk over all files
    pub fn walk_files(&self) -> Result<BoxStream<'static, Arc<dyn File>>, LoadError> {
        Ok(search::walk_files(self.root()?))
    }

    pub async fn absolute_file(&self, path: &str) -> Result<Option<Arc<dyn File>>, LoadError> {
        Ok(search::absolute_file(&self.root()?, path).await)
    }

    pub async fn absolute_folder(&self, path: &str) -> Result<Option<Arc<dyn Folder>>, LoadError> {
        Ok(search::absolute_folder(&self.root()?, path).await)
    }

    /// Parses `file` and resolves its inheritance chain
    pub async fn load_document(&self, file: Arc<dyn File>) -> Result<Inherited, LoadError> {
        let text = file
            .text()
            .await
            .ok_or_else(|| DocumentError::Unavailable(file.full_name().to_string()))?;
        let parsed = document::parse_with_source(&text, Some(file.full_name()))?;
        let options = self.inner.context.options().inheritance();
        Ok(inherit::resolve_inheritance(parsed, file, self, &options).await)
    }

    /// Finds a document by path or by name and resolves it
    ///
    /// The extension may be left out.
    pub async fn resolve(&self, name: &str) -> Result<Inherited, LoadError> {
        let file = self.find_document_file(name).await?;
        self.load_document(file).await
    }

    /// Resolves a document and populates a `T` from it
    pub async fn load_asset<T: Asset>(
        &self,
        name: &str,
    ) -> Result<(T, Vec<PopulateIssue>), LoadError> {
        let resolved = self.resolve(name).await?;
        Ok(populate::load(
            &resolved.document,
            self.inner.context.registry(),
        ))
    }

    async fn find_document_file(&self, name: &str) -> Result<Arc<dyn File>, LoadError> {
        let extension = &self.inner.context.options().document_extension;
        let file_name = inherit::base_file_name(name, extension);
        if let Some(file) = self.absolute_file(&file_name).await? {
            return Ok(file);
        }
        let leaf = normalize_path(&file_name)
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        self.find_file(&leaf)
            .await?
            .ok_or(LoadError::DocumentNotFound(file_name))
    }
}

/// Siblings first, then anywhere in the tree
#[async_trait]
impl DocumentSource for Loader {
    async fn find_document(&self, name: &str, next_to: &dyn File) -> Option<Arc<dyn File>> {
        let root = self.root().ok()?;
        let source = normalize_path(next_to.full_name());
        let parent = source.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("");
        if let Some(folder) = search::absolute_folder(&root, parent).await {
            if let Some(sibling) = folder.files().await.into_iter().find(|f| f.name() == name) {
                return Some(sibling);
            }
        }
        tracing::debug!(name, next_to = next_to.full_name(), "no sibling, searching the tree");
        search::find_file(&root, name).await
    }
}

fn is_http(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

async fn dispatch(cx: &AssetContext, location: &str) -> Result<Arc<dyn Folder>, LoadError> {
    tracing::info!(location, "loading root");

    if location == NETCODE {
        let transport = rpc_transport(cx, location, "")?;
        let archive = transport
            .request(rpc::ARCHIVE_KEY)
            .await
            .ok_or_else(|| LoadError::Unreachable(location.to_string()))?;
        return unpack(location, &archive);
    }

    if let Some(destination) = location.strip_prefix(NETCODE_PREFIX) {
        let transport = rpc_transport(cx, location, destination.trim_matches('/'))?;
        let folder = RpcFolder::root(Arc::new(transport));
        return match folder.fetch().await {
            TransferOutcome::Completed => Ok(Arc::new(folder)),
            _ => Err(LoadError::Unreachable(location.to_string())),
        };
    }

    if is_http(location) {
        let url = reqwest::Url::parse(location).map_err(|err| LoadError::InvalidUrl {
            location: location.to_string(),
            reason: err.to_string(),
        })?;
        return match http::open_root(cx.client().clone(), url).await {
            Some(HttpRoot::Listed(folder)) => Ok(Arc::new(folder)),
            Some(HttpRoot::Packed(archive)) => unpack(location, &archive),
            None => Err(LoadError::Unreachable(location.to_string())),
        };
    }

    let path = Path::new(location);
    if path
        .extension()
        .is_some_and(|extension| extension == packed::EXTENSION)
    {
        let root = packed::read(path).map_err(|source| LoadError::Pack {
            location: location.to_string(),
            source,
        })?;
        return Ok(root);
    }

    if path.is_dir() {
        return Ok(Arc::new(LocalFolder::new(path)));
    }

    Err(LoadError::UnsupportedLocation(location.to_string()))
}

fn rpc_transport(
    cx: &AssetContext,
    location: &str,
    destination: &str,
) -> Result<RpcTransport, LoadError> {
    let messenger = cx
        .messenger()
        .ok_or_else(|| LoadError::NoMessenger(location.to_string()))?;
    let destination = match destination {
        "" => cx.options().destination.as_str(),
        destination => destination,
    };
    Ok(RpcTransport::new(messenger.clone(), destination).with_progress(cx.on_progress()))
}

fn check_can_block(blocking: &Blocking, location: &str) -> Result<(), LoadError> {
    if blocking.can_block() {
        Ok(())
    } else {
        Err(LoadError::NotSupported(format!(
            "blocking calls on a current-thread runtime ({location})"
        )))
    }
}

fn unpack(location: &str, archive: &[u8]) -> Result<Arc<dyn Folder>, LoadError> {
    let root = packed::unpack(archive).map_err(|source| LoadError::Pack {
        location: location.to_string(),
        source,
    })?;
    Ok(root)
}

/// Blocking twin of [Loader]
///
/// Every call waits at most the context's blocking timeout. A timed out call returns
/// [LoadError::TimedOut] while the work continues in the background, so retrying later may find
/// the content cached.
#[derive(Debug, Clone)]
pub struct BlockingLoader {
    loader: Loader,
    blocking: Blocking,
}

impl BlockingLoader {
    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    pub fn load(&self) -> Result<Arc<dyn Folder>, LoadError> {
        self.loader.load()
    }

    fn wait<T, F>(&self, f: impl FnOnce(Loader) -> F) -> Result<T, LoadError>
    where
        F: std::future::Future<Output = Result<T, LoadError>> + Send + 'static,
        T: Send + 'static,
    {
        check_can_block(&self.blocking, self.loader.location())?;
        self.blocking
            .wait(f(self.loader.clone()))
            .unwrap_or_else(|| Err(LoadError::TimedOut(self.loader.location().to_string())))
    }

    pub fn files(&self) -> Result<Vec<Arc<dyn File>>, LoadError> {
        self.wait(|loader| async move { loader.files().await })
    }

    pub fn folders(&self) -> Result<Vec<Arc<dyn Folder>>, LoadError> {
        self.wait(|loader| async move { loader.folders().await })
    }

    pub fn find_files(&self, pattern: &str) -> Result<Vec<Arc<dyn File>>, LoadError> {
        let pattern = pattern.to_string();
        self.wait(|loader| async move { loader.find_files(&pattern).await })
    }

    pub fn find_file(&self, name: &str) -> Result<Option<Arc<dyn File>>, LoadError> {
        let name = name.to_string();
        self.wait(|loader| async move { loader.find_file(&name).await })
    }

    pub fn absolute_file(&self, path: &str) -> Result<Option<Arc<dyn File>>, LoadError> {
        let path = path.to_string();
        self.wait(|loader| async move { loader.absolute_file(&path).await })
    }

    pub fn absolute_folder(&self, path: &str) -> Result<Option<Arc<dyn Folder>>, LoadError> {
        let path = path.to_string();
        self.wait(|loader| async move { loader.absolute_folder(&path).await })
    }

    pub fn resolve(&self, name: &str) -> Result<Inherited, LoadError> {
        let name = name.to_string();
        self.wait(|loader| async move { loader.resolve(&name).await })
    }

    pub fn load_asset<T: Asset>(&self, name: &str) -> Result<(T, Vec<PopulateIssue>), LoadError> {
        let name = name.to_string();
        self.wait(|loader| async move { loader.load_asset::<T>(&name).await })
    }

    /// Content of `file`, `None` if it could not be fetched in time
    pub fn bytes(&self, file: Arc<dyn File>) -> Option<bytes::Bytes> {
        self.blocking
            .wait(async move { file.bytes().await })
            .flatten()
    }

    /// Lazy walk, each step waits for the listings it needs
    pub fn walk_files(&self) -> Result<WalkFiles, LoadError> {
        let root = self.loader.root()?;
        Ok(WalkFiles {
            blocking: self.blocking.clone(),
            stream: Arc::new(tokio::sync::Mutex::new(search::walk_files(root))),
        })
    }
}

/// Iterator over [BlockingLoader::walk_files]
pub struct WalkFiles {
    blocking: Blocking,
    stream: Arc<tokio::sync::Mutex<BoxStream<'static, Arc<dyn File>>>>,
}

impl Iterator for WalkFiles {
    type Item = Arc<dyn File>;

    fn next(&mut self) -> Option<Self::Item> {
        let stream = self.stream.clone();
        self.blocking
            .wait(async move { stream.lock().await.next().await })
            .flatten()
    }
}
