//! folders and files on disk
//!
//! Nothing is cached: every listing and every read goes to the filesystem. Entries are listed in
//! name order so that two callers always walk the same order.
use super::{
    is_child_name, File, FileOrFolder, Folder, ModifiableFile, ModifiableFolder, TransferOutcome,
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug)]
pub struct LocalFolder {
    path: PathBuf,
    name: String,
    full_name: String,
}

impl LocalFolder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: leaf_name(&path),
            full_name: path.to_string_lossy().into_owned(),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn entries(&self) -> Vec<(PathBuf, bool)> {
        let read_dir = match std::fs::read_dir(&self.path) {
            Ok(read_dir) => read_dir,
            Err(err) => {
                tracing::error!(path = %self.path.display(), %err, "unable to list folder");
                return vec![];
            }
        };

        let mut entries: Vec<_> = read_dir
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::warn!(path = %self.path.display(), %err, "unreadable folder entry");
                    None
                }
            })
            .filter_map(|entry| {
                let file_type = entry.file_type().ok()?;
                Some((entry.path(), file_type.is_dir()))
            })
            .collect();
        entries.sort_by(|(a, _), (b, _)| a.file_name().cmp(&b.file_name()));
        entries
    }
}

impl FileOrFolder for LocalFolder {
    fn name(&self) -> &str {
        &self.name
    }

    fn full_name(&self) -> &str {
        &self.full_name
    }
}

#[async_trait]
impl Folder for LocalFolder {
    async fn files(&self) -> Vec<Arc<dyn File>> {
        self.entries()
            .into_iter()
            .filter(|(_, is_dir)| !is_dir)
            .map(|(path, _)| Arc::new(LocalFile::new(path)) as Arc<dyn File>)
            .collect()
    }

    async fn folders(&self) -> Vec<Arc<dyn Folder>> {
        self.entries()
            .into_iter()
            .filter(|(_, is_dir)| *is_dir)
            .map(|(path, _)| Arc::new(LocalFolder::new(path)) as Arc<dyn Folder>)
            .collect()
    }

    fn is_listed(&self) -> bool {
        self.path.is_dir()
    }

    fn as_modifiable(&self) -> Option<&dyn ModifiableFolder> {
        Some(self)
    }
}

#[async_trait]
impl ModifiableFolder for LocalFolder {
    async fn add_file(&self, name: &str) -> Option<Arc<dyn File>> {
        if !is_child_name(name) {
            tracing::error!(folder = %self.path.display(), name, "not a file name");
            return None;
        }
        let path = self.path.join(name);
        if !path.is_file() {
            if let Err(err) = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)
            {
                tracing::error!(path = %path.display(), %err, "unable to create file");
                return None;
            }
            tracing::debug!(path = %path.display(), "file created");
        }
        Some(Arc::new(LocalFile::new(path)))
    }

    async fn add_folder(&self, name: &str) -> Option<Arc<dyn Folder>> {
        if !is_child_name(name) {
            tracing::error!(folder = %self.path.display(), name, "not a folder name");
            return None;
        }
        let path = self.path.join(name);
        if let Err(err) = std::fs::create_dir_all(&path) {
            tracing::error!(path = %path.display(), %err, "unable to create folder");
            return None;
        }
        Some(Arc::new(LocalFolder::new(path)))
    }
}

#[derive(Debug)]
pub struct LocalFile {
    path: PathBuf,
    name: String,
    full_name: String,
    last_read: Mutex<Option<Bytes>>,
}

impl LocalFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: leaf_name(&path),
            full_name: path.to_string_lossy().into_owned(),
            path,
            last_read: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Option<Bytes> {
        match std::fs::read(&self.path) {
            Ok(content) => {
                let bytes = Bytes::from(content);
                *self.last_read.lock() = Some(bytes.clone());
                Some(bytes)
            }
            Err(err) => {
                tracing::error!(path = %self.path.display(), %err, "unable to read file");
                None
            }
        }
    }
}

impl FileOrFolder for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn full_name(&self) -> &str {
        &self.full_name
    }
}

#[async_trait]
impl File for LocalFile {
    fn cached_bytes(&self) -> Option<Bytes> {
        self.last_read.lock().clone()
    }

    async fn download(&self) -> TransferOutcome {
        match self.read() {
            Some(_) => TransferOutcome::Completed,
            None => TransferOutcome::Failed,
        }
    }

    /// Always reads from disk
    async fn bytes(&self) -> Option<Bytes> {
        self.read()
    }

    fn as_modifiable(&self) -> Option<&dyn ModifiableFile> {
        Some(self)
    }
}

#[async_trait]
impl ModifiableFile for LocalFile {
    async fn set_bytes(&self, bytes: Bytes) -> TransferOutcome {
        match std::fs::write(&self.path, &bytes) {
            Ok(()) => {
                *self.last_read.lock() = Some(bytes);
                TransferOutcome::Completed
            }
            Err(err) => {
                tracing::error!(path = %self.path.display(), %err, "unable to write file");
                TransferOutcome::Failed
            }
        }
    }
}

fn leaf_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
