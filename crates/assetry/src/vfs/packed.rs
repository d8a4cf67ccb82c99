//! packed archives: a whole tree in one buffer
//!
//! Layout: the 4 byte magic `ASPK`, one version byte, then the tree encoded with bincode
//! (standard config, serde mode). Unpacking happens in one pass into a read-only
//! [MemoryFolder]. Full names inside an archive are paths relative to its root.
use super::{join_path, File, FileOrFolder, Folder, TransferOutcome};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub const MAGIC: &[u8; 4] = b"ASPK";
pub const VERSION: u8 = 1;
/// File extension of archives on disk
pub const EXTENSION: &str = "bin";

#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("not a packed archive")]
    BadMagic,
    #[error("unsupported archive version {0}")]
    UnsupportedVersion(u8),
    #[error("corrupt archive")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("unable to encode archive")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("unable to read {0}")]
    Unreadable(String),
    #[error("unable to access {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct PackedFolder {
    name: String,
    files: Vec<PackedFile>,
    folders: Vec<PackedFolder>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PackedFile {
    name: String,
    content: Vec<u8>,
}

/// Packs every file below `folder`
///
/// Fails if any file cannot be read, a partial archive would silently lose assets.
pub async fn pack(folder: &dyn Folder) -> Result<Vec<u8>, PackError> {
    let tree = pack_folder(folder).await?;
    let mut archive = MAGIC.to_vec();
    archive.push(VERSION);
    archive.extend(bincode::serde::encode_to_vec(&tree, bincode::config::standard())?);
    tracing::info!(folder = folder.full_name(), len = archive.len(), "packed");
    Ok(archive)
}

fn pack_folder(folder: &dyn Folder) -> BoxFuture<'_, Result<PackedFolder, PackError>> {
    async move {
        let mut files = vec![];
        for file in folder.files().await {
            let Some(content) = file.bytes().await else {
                return Err(PackError::Unreadable(file.full_name().to_string()));
            };
            files.push(PackedFile {
                name: file.name().to_string(),
                content: content.to_vec(),
            });
        }
        let mut folders = vec![];
        for child in folder.folders().await {
            folders.push(pack_folder(child.as_ref()).await?);
        }
        Ok(PackedFolder {
            name: folder.name().to_string(),
            files,
            folders,
        })
    }
    .boxed()
}

/// Unpacks an archive into memory
pub fn unpack(archive: &[u8]) -> Result<Arc<MemoryFolder>, PackError> {
    let body = archive.strip_prefix(MAGIC.as_slice()).ok_or(PackError::BadMagic)?;
    let (version, body) = body.split_first().ok_or(PackError::BadMagic)?;
    if *version != VERSION {
        return Err(PackError::UnsupportedVersion(*version));
    }
    let (tree, _): (PackedFolder, usize) =
        bincode::serde::decode_from_slice(body, bincode::config::standard())?;
    let root = MemoryFolder::from_packed(tree, "");
    tracing::debug!(root = root.name(), "unpacked");
    Ok(Arc::new(root))
}

/// Reads and unpacks an archive from disk
pub fn read(path: &Path) -> Result<Arc<MemoryFolder>, PackError> {
    let archive = std::fs::read(path).map_err(|source| PackError::Io {
        path: path.display().to_string(),
        source,
    })?;
    unpack(&archive)
}

/// Read-only in-memory folder
#[derive(Debug, derive_new::new)]
pub struct MemoryFolder {
    name: String,
    full_name: String,
    files: Vec<Arc<MemoryFile>>,
    folders: Vec<Arc<MemoryFolder>>,
}

impl MemoryFolder {
    fn from_packed(packed: PackedFolder, full_name: &str) -> Self {
        let files = packed
            .files
            .into_iter()
            .map(|file| {
                Arc::new(MemoryFile::new(
                    join_path(full_name, &file.name),
                    Bytes::from(file.content),
                ))
            })
            .collect();
        let folders = packed
            .folders
            .into_iter()
            .map(|folder| {
                let child_name = join_path(full_name, &folder.name);
                Arc::new(MemoryFolder::from_packed(folder, &child_name))
            })
            .collect();
        Self {
            name: packed.name,
            full_name: full_name.to_string(),
            files,
            folders,
        }
    }
}

impl FileOrFolder for MemoryFolder {
    fn name(&self) -> &str {
        &self.name
    }

    fn full_name(&self) -> &str {
        &self.full_name
    }
}

#[async_trait]
impl Folder for MemoryFolder {
    async fn files(&self) -> Vec<Arc<dyn File>> {
        self.files
            .iter()
            .map(|file| file.clone() as Arc<dyn File>)
            .collect()
    }

    async fn folders(&self) -> Vec<Arc<dyn Folder>> {
        self.folders
            .iter()
            .map(|folder| folder.clone() as Arc<dyn Folder>)
            .collect()
    }

    fn is_listed(&self) -> bool {
        true
    }
}

/// Read-only in-memory file
#[derive(Debug)]
pub struct MemoryFile {
    name: String,
    full_name: String,
    content: Bytes,
}

impl MemoryFile {
    pub fn new(full_name: String, content: Bytes) -> Self {
        Self {
            name: full_name.rsplit('/').next().unwrap_or_default().to_string(),
            full_name,
            content,
        }
    }
}

impl FileOrFolder for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn full_name(&self) -> &str {
        &self.full_name
    }
}

#[async_trait]
impl File for MemoryFile {
    fn cached_bytes(&self) -> Option<Bytes> {
        Some(self.content.clone())
    }

    async fn download(&self) -> TransferOutcome {
        TransferOutcome::Completed
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vfs::local::LocalFolder;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn pack_local_tree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("unit.hcl"), "hp = 80").unwrap();
        std::fs::create_dir_all(dir.path().join("units/heavy")).unwrap();
        std::fs::write(dir.path().join("units/heavy/tank.hcl"), "hp = 400").unwrap();

        let archive = pack(&LocalFolder::new(dir.path())).await.unwrap();
        assert!(archive.starts_with(MAGIC));

        let root = unpack(&archive).unwrap();
        assert_eq!(root.full_name(), "");
        let files = root.files().await;
        assert_eq!(files[0].full_name(), "unit.hcl");
        assert_eq!(files[0].text().await.as_deref(), Some("hp = 80"));

        let units = &root.folders().await[0];
        let heavy = &units.folders().await[0];
        assert_eq!(heavy.full_name(), "units/heavy");
        let tank = &heavy.files().await[0];
        assert_eq!(tank.name(), "tank.hcl");
        assert_eq!(tank.full_name(), "units/heavy/tank.hcl");
        assert_eq!(tank.text().await.as_deref(), Some("hp = 400"));
    }

    #[test]
    fn rejects_foreign_bytes() {
        assert!(matches!(unpack(b"PK\x03\x04"), Err(PackError::BadMagic)));
        assert!(matches!(unpack(b"ASPK"), Err(PackError::BadMagic)));
        assert!(matches!(
            unpack(b"ASPK\x09"),
            Err(PackError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn memory_nodes_are_read_only() {
        let file = MemoryFile::new("sub/a.hcl".into(), Bytes::from_static(b"a = 1"));
        assert_eq!(file.name(), "a.hcl");
        assert!(file.as_modifiable().is_none());
    }
}
