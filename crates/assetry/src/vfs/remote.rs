//! lazily listed folders and lazily downloaded files behind a [Transport]
//!
//! The http and rpc backends only differ in how bytes travel. Both share the node logic here:
//! - a folder fetches its [Listing] on first access and keeps it for its lifetime
//! - a file fetches its content on first access and keeps it for its lifetime
//! - each node runs at most one transfer at a time ([Busy])
use super::{
    is_child_name, join_path, Busy, File, FileOrFolder, Folder, Listing, ModifiableFile,
    ModifiableFolder, Transfer, TransferOutcome,
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;

/// How bytes of a remote tree are fetched and stored
///
/// Paths are relative to the root of the tree, `/` separated, the root itself is `""`.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug + 'static {
    /// Prefix for full names, e.g. the root url
    fn root_name(&self) -> &str;

    async fn fetch_listing(&self, path: &str) -> Option<Bytes>;

    async fn fetch_file(&self, path: &str) -> Option<Bytes>;

    /// Stores content, `false` on failure
    async fn upload(&self, path: &str, bytes: Bytes) -> bool;

    fn writable(&self) -> bool;
}

#[derive(Debug)]
struct Children<T: Transport> {
    files: Vec<Arc<RemoteFile<T>>>,
    folders: Vec<Arc<RemoteFolder<T>>>,
}

#[derive(Debug)]
pub struct RemoteFolder<T: Transport> {
    transport: Arc<T>,
    path: String,
    name: String,
    full_name: String,
    children: Mutex<Option<Children<T>>>,
    busy: Busy,
}

impl<T: Transport> RemoteFolder<T> {
    /// Root folder of a transport, nothing fetched yet
    pub fn root(transport: Arc<T>) -> Self {
        Self::new(transport, String::new())
    }

    fn new(transport: Arc<T>, path: String) -> Self {
        let full_name = join_path(transport.root_name(), &path);
        let name = full_name
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            transport,
            path,
            name,
            full_name,
            children: Mutex::new(None),
            busy: Busy::default(),
        }
    }

    /// Root folder with an already known listing
    pub fn with_listing(transport: Arc<T>, listing: Listing) -> Self {
        let folder = Self::root(transport);
        folder.apply_listing(listing);
        folder
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Fetches the listing unless it is known already
    pub async fn fetch(&self) -> TransferOutcome {
        if self.is_listed() {
            return TransferOutcome::Completed;
        }
        let Some(_token) = self.busy.begin(Transfer::Downloading, &self.full_name) else {
            return TransferOutcome::Rejected;
        };
        let Some(bytes) = self.transport.fetch_listing(&self.path).await else {
            return TransferOutcome::Failed;
        };
        let listing = Listing::parse(&String::from_utf8_lossy(&bytes));
        tracing::debug!(
            folder = %self.full_name,
            files = listing.files.len(),
            folders = listing.folders.len(),
            "listing fetched"
        );
        self.apply_listing(listing);
        TransferOutcome::Completed
    }

    fn apply_listing(&self, listing: Listing) {
        let children = Children {
            files: listing
                .files
                .iter()
                .map(|name| Arc::new(self.child_file(name)))
                .collect(),
            folders: listing
                .folders
                .iter()
                .map(|name| Arc::new(self.child_folder(name)))
                .collect(),
        };
        *self.children.lock() = Some(children);
    }

    fn child_file(&self, name: &str) -> RemoteFile<T> {
        RemoteFile::new(self.transport.clone(), join_path(&self.path, name))
    }

    fn child_folder(&self, name: &str) -> RemoteFolder<T> {
        RemoteFolder::new(self.transport.clone(), join_path(&self.path, name))
    }
}

impl<T: Transport> FileOrFolder for RemoteFolder<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn full_name(&self) -> &str {
        &self.full_name
    }

    fn transfer(&self) -> Transfer {
        self.busy.current()
    }
}

#[async_trait]
impl<T: Transport> Folder for RemoteFolder<T> {
    async fn files(&self) -> Vec<Arc<dyn File>> {
        self.fetch().await;
        self.children
            .lock()
            .as_ref()
            .map(|children| {
                children
                    .files
                    .iter()
                    .map(|file| file.clone() as Arc<dyn File>)
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn folders(&self) -> Vec<Arc<dyn Folder>> {
        self.fetch().await;
        self.children
            .lock()
            .as_ref()
            .map(|children| {
                children
                    .folders
                    .iter()
                    .map(|folder| folder.clone() as Arc<dyn Folder>)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn is_listed(&self) -> bool {
        self.children.lock().is_some()
    }

    fn as_modifiable(&self) -> Option<&dyn ModifiableFolder> {
        self.transport.writable().then_some(self as &dyn ModifiableFolder)
    }
}

/// Adds nodes to the in-memory listing; content reaches the server on the first upload
#[async_trait]
impl<T: Transport> ModifiableFolder for RemoteFolder<T> {
    async fn add_file(&self, name: &str) -> Option<Arc<dyn File>> {
        if !is_child_name(name) {
            tracing::error!(folder = self.full_name(), name, "not a file name");
            return None;
        }
        self.fetch().await;
        let mut guard = self.children.lock();
        let children = guard.get_or_insert_with(|| Children {
            files: vec![],
            folders: vec![],
        });
        if let Some(existing) = children.files.iter().find(|file| file.name() == name) {
            return Some(existing.clone());
        }
        let file = Arc::new(self.child_file(name));
        children.files.push(file.clone());
        Some(file)
    }

    async fn add_folder(&self, name: &str) -> Option<Arc<dyn Folder>> {
        if !is_child_name(name) {
            tracing::error!(folder = self.full_name(), name, "not a folder name");
            return None;
        }
        self.fetch().await;
        let mut guard = self.children.lock();
        let children = guard.get_or_insert_with(|| Children {
            files: vec![],
            folders: vec![],
        });
        if let Some(existing) = children.folders.iter().find(|folder| folder.name() == name) {
            return Some(existing.clone());
        }
        let folder = Arc::new(self.child_folder(name));
        children.folders.push(folder.clone());
        Some(folder)
    }
}

#[derive(Debug)]
pub struct RemoteFile<T: Transport> {
    transport: Arc<T>,
    path: String,
    name: String,
    full_name: String,
    content: Mutex<Option<Bytes>>,
    busy: Busy,
}

impl<T: Transport> RemoteFile<T> {
    fn new(transport: Arc<T>, path: String) -> Self {
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        let full_name = join_path(transport.root_name(), &path);
        Self {
            transport,
            path,
            name,
            full_name,
            content: Mutex::new(None),
            busy: Busy::default(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl<T: Transport> FileOrFolder for RemoteFile<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn full_name(&self) -> &str {
        &self.full_name
    }

    fn transfer(&self) -> Transfer {
        self.busy.current()
    }
}

#[async_trait]
impl<T: Transport> File for RemoteFile<T> {
    fn cached_bytes(&self) -> Option<Bytes> {
        self.content.lock().clone()
    }

    async fn download(&self) -> TransferOutcome {
        let Some(_token) = self.busy.begin(Transfer::Downloading, &self.full_name) else {
            return TransferOutcome::Rejected;
        };
        if self.content.lock().is_some() {
            return TransferOutcome::Completed;
        }
        match self.transport.fetch_file(&self.path).await {
            Some(bytes) => {
                tracing::trace!(file = %self.full_name, len = bytes.len(), "content fetched");
                *self.content.lock() = Some(bytes);
                TransferOutcome::Completed
            }
            None => TransferOutcome::Failed,
        }
    }

    fn as_modifiable(&self) -> Option<&dyn ModifiableFile> {
        self.transport.writable().then_some(self as &dyn ModifiableFile)
    }
}

#[async_trait]
impl<T: Transport> ModifiableFile for RemoteFile<T> {
    async fn set_bytes(&self, bytes: Bytes) -> TransferOutcome {
        let Some(_token) = self.busy.begin(Transfer::Uploading, &self.full_name) else {
            return TransferOutcome::Rejected;
        };
        if !self.transport.upload(&self.path, bytes.clone()).await {
            return TransferOutcome::Failed;
        }
        *self.content.lock() = Some(bytes);
        TransferOutcome::Completed
    }
}
