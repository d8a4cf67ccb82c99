//! searching a folder tree
//!
//! All searches visit the tree depth-first: a folder's own files first, then each sub folder in
//! listing order. Eager searches collect everything, [walk_files] yields lazily so callers can stop
//! early.
use crate::vfs::{normalize_path, File, Folder};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;

/// Every file below `root`
pub async fn files(root: &Arc<dyn Folder>) -> Vec<Arc<dyn File>> {
    walk_files(root.clone()).collect().await
}

/// Every file below `root` whose name matches `pattern`
pub async fn find_files(root: &Arc<dyn Folder>, pattern: &glob::Pattern) -> Vec<Arc<dyn File>> {
    walk_files(root.clone())
        .filter(|file| futures::future::ready(pattern.matches(file.name())))
        .collect()
        .await
}

/// First file named `name`
pub async fn find_file(root: &Arc<dyn Folder>, name: &str) -> Option<Arc<dyn File>> {
    walk_files(root.clone())
        .filter(|file| futures::future::ready(file.name() == name))
        .next()
        .await
}

/// Every folder below `root`, `root` excluded
pub async fn folders(root: &Arc<dyn Folder>) -> Vec<Arc<dyn Folder>> {
    let mut found = vec![];
    collect_folders(root.as_ref(), &mut found).await;
    found
}

fn collect_folders<'a>(
    folder: &'a dyn Folder,
    found: &'a mut Vec<Arc<dyn Folder>>,
) -> BoxFuture<'a, ()> {
    async move {
        for child in folder.folders().await {
            found.push(child.clone());
            collect_folders(child.as_ref(), found).await;
        }
    }
    .boxed()
}

struct Walk {
    /// folders still to visit, the next one last
    pending: Vec<Arc<dyn Folder>>,
    files: VecDeque<Arc<dyn File>>,
}

/// Lazily yields every file below `root`
///
/// Listings are fetched only when the walk reaches them. Each call starts a new walk.
pub fn walk_files(root: Arc<dyn Folder>) -> BoxStream<'static, Arc<dyn File>> {
    let walk = Walk {
        pending: vec![root],
        files: VecDeque::new(),
    };
    stream::unfold(walk, |mut walk| async move {
        loop {
            if let Some(file) = walk.files.pop_front() {
                return Some((file, walk));
            }
            let folder = walk.pending.pop()?;
            walk.files.extend(folder.files().await);
            let mut folders = folder.folders().await;
            folders.reverse();
            walk.pending.extend(folders);
        }
    })
    .boxed()
}

/// The file at `path`
///
/// `path` may be the full name of the file or relative to `root`, with either separator.
pub async fn absolute_file(root: &Arc<dyn Folder>, path: &str) -> Option<Arc<dyn File>> {
    for relative in candidates(root.as_ref(), path) {
        let Some((parent, name)) = split_file(&relative) else {
            continue;
        };
        let Some(folder) = descend(root, &parent).await else {
            continue;
        };
        if let Some(file) = folder.files().await.into_iter().find(|f| f.name() == name) {
            return Some(file);
        }
    }
    None
}

/// The folder at `path`, see [absolute_file]
pub async fn absolute_folder(root: &Arc<dyn Folder>, path: &str) -> Option<Arc<dyn Folder>> {
    for relative in candidates(root.as_ref(), path) {
        if let Some(folder) = descend(root, &relative).await {
            return Some(folder);
        }
    }
    None
}

/// Root-relative readings of `path`: the full-name reading first, then `path` itself
fn candidates(root: &dyn Folder, path: &str) -> Vec<String> {
    let path = normalize_path(path);
    let root_name = normalize_path(root.full_name());
    let mut candidates = vec![];
    if !root_name.is_empty() {
        if path == root_name {
            candidates.push(String::new());
        } else if let Some(relative) = path.strip_prefix(&format!("{root_name}/")) {
            candidates.push(relative.to_string());
        }
    }
    let relative = path.trim_start_matches('/').to_string();
    if !candidates.contains(&relative) {
        candidates.push(relative);
    }
    candidates
}

fn split_file(relative: &str) -> Option<(&str, &str)> {
    if relative.is_empty() {
        return None;
    }
    Some(relative.rsplit_once('/').unwrap_or(("", relative)))
}

/// Follows `relative` folder by folder, `None` if a segment is missing
async fn descend(root: &Arc<dyn Folder>, relative: &str) -> Option<Arc<dyn Folder>> {
    let mut current = root.clone();
    for segment in relative.split('/').filter(|s| !s.is_empty()) {
        current = current
            .folders()
            .await
            .into_iter()
            .find(|child| child.name() == segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vfs::packed::{MemoryFile, MemoryFolder};
    use crate::vfs::FileOrFolder;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn file(full_name: &str) -> Arc<MemoryFile> {
        Arc::new(MemoryFile::new(full_name.into(), Bytes::new()))
    }

    /// ```text
    /// a.hcl
    /// units/
    ///   tank.hcl
    ///   heavy/
    ///     mammoth.hcl
    /// weapons/
    ///   laser.png
    /// ```
    fn tree() -> Arc<dyn Folder> {
        let heavy = MemoryFolder::new(
            "heavy".into(),
            "units/heavy".into(),
            vec![file("units/heavy/mammoth.hcl")],
            vec![],
        );
        let units = MemoryFolder::new(
            "units".into(),
            "units".into(),
            vec![file("units/tank.hcl")],
            vec![Arc::new(heavy)],
        );
        let weapons = MemoryFolder::new(
            "weapons".into(),
            "weapons".into(),
            vec![file("weapons/laser.png")],
            vec![],
        );
        Arc::new(MemoryFolder::new(
            "".into(),
            "".into(),
            vec![file("a.hcl")],
            vec![Arc::new(units), Arc::new(weapons)],
        ))
    }

    fn full_names<T: FileOrFolder + ?Sized>(nodes: &[Arc<T>]) -> Vec<&str> {
        nodes.iter().map(|node| node.full_name()).collect()
    }

    #[tokio::test]
    async fn depth_first_own_files_first() {
        let root = tree();
        let all = files(&root).await;
        assert_eq!(
            full_names(&all),
            [
                "a.hcl",
                "units/tank.hcl",
                "units/heavy/mammoth.hcl",
                "weapons/laser.png"
            ]
        );

        let all = folders(&root).await;
        assert_eq!(full_names(&all), ["units", "units/heavy", "weapons"]);
    }

    #[tokio::test]
    async fn walk_is_lazy_and_restartable() {
        let root = tree();
        let first_two: Vec<_> = walk_files(root.clone()).take(2).collect().await;
        assert_eq!(full_names(&first_two), ["a.hcl", "units/tank.hcl"]);

        let again: Vec<_> = walk_files(root.clone()).collect().await;
        assert_eq!(again.len(), 4);
    }

    #[tokio::test]
    async fn glob_on_names() {
        let root = tree();
        let pattern = glob::Pattern::new("*.hcl").unwrap();
        let found = find_files(&root, &pattern).await;
        assert_eq!(found.len(), 3);

        let found = find_file(&root, "mammoth.hcl").await.unwrap();
        assert_eq!(found.full_name(), "units/heavy/mammoth.hcl");
        assert!(find_file(&root, "nothing.hcl").await.is_none());
    }

    #[tokio::test]
    async fn absolute_lookup_normalizes() {
        let root = tree();
        let slash = absolute_file(&root, "units/heavy/mammoth.hcl").await.unwrap();
        let backslash = absolute_file(&root, "units\\heavy\\mammoth.hcl").await.unwrap();
        let dotted = absolute_file(&root, "./units//heavy/mammoth.hcl").await.unwrap();
        assert_eq!(slash.full_name(), backslash.full_name());
        assert_eq!(slash.full_name(), dotted.full_name());

        assert!(absolute_file(&root, "units/mammoth.hcl").await.is_none());
        assert_eq!(
            absolute_folder(&root, "units/heavy/").await.unwrap().full_name(),
            "units/heavy"
        );
        assert_eq!(absolute_folder(&root, "").await.unwrap().full_name(), "");
        assert!(absolute_folder(&root, "vehicles").await.is_none());
    }

    #[test]
    fn full_name_reading_comes_first() {
        let root = MemoryFolder::new("assets".into(), "/srv/assets".into(), vec![], vec![]);
        assert_eq!(
            candidates(&root, "/srv/assets/units/tank.hcl"),
            ["units/tank.hcl", "srv/assets/units/tank.hcl"]
        );
        assert_eq!(candidates(&root, "units\\tank.hcl"), ["units/tank.hcl"]);
        assert_eq!(candidates(&root, "/srv/assets/"), ["", "srv/assets"]);
    }
}
