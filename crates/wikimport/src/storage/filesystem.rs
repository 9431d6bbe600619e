use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use walkdir::WalkDir;

use super::{Node, StorageClient};
use crate::error::StorageError;

/// Upper bound on numbered variants tried when a clone target name is taken.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// [`StorageClient`] over a local directory.
///
/// Node ids are slash-separated paths relative to the root directory; the
/// root itself has the empty id. Listings are sorted by name so that the
/// "source order" of an import is deterministic.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a node id to a path below the root, rejecting traversal.
    fn resolve(&self, id: &str) -> Result<PathBuf, StorageError> {
        if id.is_empty() {
            return Ok(self.root.clone());
        }
        let relative = Path::new(id);
        let clean = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(StorageError::InvalidId(id.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn child_id(parent_id: &str, name: &str) -> String {
        if parent_id.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", parent_id, name)
        }
    }

    fn io_error(id: &str, path: PathBuf, source: std::io::Error) -> StorageError {
        if source.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(id.to_string())
        } else {
            StorageError::Io { path, source }
        }
    }
}

fn validate_segment(name: &str) -> Result<(), StorageError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(StorageError::InvalidId(name.to_string()));
    }
    Ok(())
}

#[async_trait]
impl StorageClient for FsStorage {
    async fn list_children(&self, folder_id: &str) -> Result<Vec<Node>, StorageError> {
        let dir = self.resolve(folder_id)?;
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| Self::io_error(folder_id, dir.clone(), e))?;

        let mut nodes = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Self::io_error(folder_id, dir.clone(), e))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                log::warn!("Skipping non UTF-8 entry in '{}'", dir.display());
                continue;
            };
            let file_type = entry.file_type().await.map_err(|e| StorageError::Io {
                path: entry.path(),
                source: e,
            })?;
            let id = Self::child_id(folder_id, &name);
            nodes.push(Node {
                id,
                name,
                is_folder: file_type.is_dir(),
            });
        }

        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(nodes)
    }

    async fn get_content(&self, file_id: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(file_id)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| Self::io_error(file_id, path, e))
    }

    async fn ensure_folder(&self, parent_id: &str, name: &str) -> Result<String, StorageError> {
        validate_segment(name)?;
        let id = Self::child_id(parent_id, name);
        let path = self.resolve(&id)?;

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => return Ok(id),
            Ok(_) => {
                return Err(StorageError::Backend(format!(
                    "'{}' exists and is not a folder",
                    id
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::Io { path, source: e }),
        }

        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| StorageError::Io {
                path: path.clone(),
                source: e,
            })?;
        Ok(id)
    }

    async fn clone_subtree(
        &self,
        source_id: &str,
        dest_parent_id: &str,
    ) -> Result<String, StorageError> {
        let source = self.resolve(source_id)?;
        let dest_parent = self.resolve(dest_parent_id)?;

        if dest_parent.starts_with(&source) {
            return Err(StorageError::Backend(format!(
                "cannot clone '{}' into its own subtree",
                source_id
            )));
        }

        let base_name = source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("clone")
            .to_string();

        // Claim the target directory with create_dir so concurrent clones
        // never share one copy.
        let mut claimed = None;
        for counter in 1..=MAX_NAME_ATTEMPTS {
            let name = if counter == 1 {
                base_name.clone()
            } else {
                format!("{}_{}", base_name, counter)
            };
            let target = dest_parent.join(&name);
            match tokio::fs::create_dir(&target).await {
                Ok(()) => {
                    claimed = Some((name, target));
                    break;
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(StorageError::Io {
                        path: target,
                        source: e,
                    })
                }
            }
        }
        let (name, target) = claimed.ok_or_else(|| {
            StorageError::Backend(format!(
                "no free clone name for '{}' in '{}'",
                base_name, dest_parent_id
            ))
        })?;

        let from = source.clone();
        let to = target.clone();
        tokio::task::spawn_blocking(move || copy_tree(&from, &to))
            .await
            .map_err(|e| StorageError::Backend(format!("clone task failed: {}", e)))??;

        log::debug!(
            "Cloned '{}' to '{}'",
            source.display(),
            target.display()
        );
        Ok(Self::child_id(dest_parent_id, &name))
    }
}

/// Recursively copies the contents of `src` into the existing directory `dst`.
fn copy_tree(src: &Path, dst: &Path) -> Result<(), StorageError> {
    for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| StorageError::Io {
            path: e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| src.to_path_buf()),
            source: e.into(),
        })?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let target = dst.join(relative);

        let result = if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)
        } else {
            std::fs::copy(entry.path(), &target).map(|_| ())
        };
        result.map_err(|e| StorageError::Io {
            path: target.clone(),
            source: e,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FsStorage) {
        let tmp = TempDir::new().unwrap();
        let storage = FsStorage::new(tmp.path());
        (tmp, storage)
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_list_children_sorted_with_kinds() {
        let (tmp, storage) = setup();
        write(tmp.path(), "src/zeta/zeta.md", "z");
        write(tmp.path(), "src/alpha/alpha.md", "a");
        write(tmp.path(), "src/notes.txt", "n");

        let nodes = storage.list_children("src").await.unwrap();
        assert_eq!(
            nodes,
            vec![
                Node::folder("src/alpha", "alpha"),
                Node::file("src/notes.txt", "notes.txt"),
                Node::folder("src/zeta", "zeta"),
            ]
        );
    }

    #[tokio::test]
    async fn test_list_missing_folder_is_not_found() {
        let (_tmp, storage) = setup();
        let err = storage.list_children("missing").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_traversal_ids_rejected() {
        let (_tmp, storage) = setup();
        let err = storage.get_content("../etc/passwd").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidId(_)));
        let err = storage.get_content("/etc/passwd").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidId(_)));
    }

    #[tokio::test]
    async fn test_get_content() {
        let (tmp, storage) = setup();
        write(tmp.path(), "a/a.md", "# A");
        assert_eq!(storage.get_content("a/a.md").await.unwrap(), b"# A");
    }

    #[tokio::test]
    async fn test_ensure_folder_is_idempotent() {
        let (tmp, storage) = setup();
        let first = storage.ensure_folder("", "images").await.unwrap();
        let second = storage.ensure_folder("", "images").await.unwrap();
        assert_eq!(first, "images");
        assert_eq!(first, second);
        assert!(tmp.path().join("images").is_dir());
    }

    #[tokio::test]
    async fn test_ensure_folder_rejects_separator() {
        let (_tmp, storage) = setup();
        let err = storage.ensure_folder("", "a/b").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidId(_)));
    }

    #[tokio::test]
    async fn test_clone_subtree_copies_everything() {
        let (tmp, storage) = setup();
        write(tmp.path(), "source/page1/page1.md", "one");
        write(tmp.path(), "source/page1/child/child.md", "child");
        storage.ensure_folder("", "work").await.unwrap();

        let cloned = storage.clone_subtree("source", "work").await.unwrap();
        assert_eq!(cloned, "work/source");
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("work/source/page1/child/child.md")).unwrap(),
            "child"
        );
        // Original untouched.
        assert!(tmp.path().join("source/page1/page1.md").exists());
    }

    #[tokio::test]
    async fn test_clone_subtree_twice_gets_numbered_name() {
        let (tmp, storage) = setup();
        write(tmp.path(), "source/a/a.md", "a");
        storage.ensure_folder("", "work").await.unwrap();

        let first = storage.clone_subtree("source", "work").await.unwrap();
        let second = storage.clone_subtree("source", "work").await.unwrap();
        assert_eq!(first, "work/source");
        assert_eq!(second, "work/source_2");
    }

    #[tokio::test]
    async fn test_clone_into_own_subtree_rejected() {
        let (tmp, storage) = setup();
        write(tmp.path(), "source/a/a.md", "a");
        let err = storage.clone_subtree("source", "source/a").await.unwrap_err();
        assert!(matches!(err, StorageError::Backend(_)));
    }
}
