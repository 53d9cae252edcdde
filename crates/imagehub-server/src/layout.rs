use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("invalid name: {0}")]
    InvalidName(String),
}

pub type LayoutResult<T> = Result<T, LayoutError>;

/// On-disk placement of repositories and packages.
///
/// ```text
/// {images_root}/{owner}/{folder}/...        canonical copy
/// {archive_root}/{owner}/{folder}-{fp}.zip  stored snapshots
/// ```
#[derive(Debug, Clone)]
pub struct StorageLayout {
    images_root: PathBuf,
    archive_root: PathBuf,
}

impl StorageLayout {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(images_root: P, archive_root: Q) -> Self {
        Self {
            images_root: images_root.into(),
            archive_root: archive_root.into(),
        }
    }

    pub fn canonical_dir(&self, owner: &str, folder_name: &str) -> LayoutResult<PathBuf> {
        Ok(self
            .images_root
            .join(plain_segment(owner)?)
            .join(plain_segment(folder_name)?))
    }

    pub fn archive_dir(&self, owner: &str) -> LayoutResult<PathBuf> {
        Ok(self.archive_root.join(plain_segment(owner)?))
    }

    pub fn package_path(&self, owner: &str, package_name: &str) -> LayoutResult<PathBuf> {
        Ok(self.archive_dir(owner)?.join(plain_segment(package_name)?))
    }

    /// Create `{images_root}/{owner}` and `{archive_root}/{owner}`.
    pub fn create_owner_dirs(&self, owner: &str) -> io::Result<()> {
        let owner = plain_segment(owner)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err.to_string()))?;
        fs::create_dir_all(self.images_root.join(owner))?;
        fs::create_dir_all(self.archive_root.join(owner))?;
        Ok(())
    }
}

/// Accept `name` only if it is a single normal path component.
pub fn plain_segment(name: &str) -> LayoutResult<&str> {
    if name.is_empty() || name.contains('/') || name.contains('\\') {
        return Err(LayoutError::InvalidName(name.to_string()));
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => Err(LayoutError::InvalidName(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths() {
        let layout = StorageLayout::new("/srv/images", "/srv/archive");
        assert_eq!(
            layout.canonical_dir("alice", "cats").unwrap(),
            PathBuf::from("/srv/images/alice/cats")
        );
        assert_eq!(
            layout.package_path("alice", "cats-1.zip").unwrap(),
            PathBuf::from("/srv/archive/alice/cats-1.zip")
        );
    }

    #[test]
    fn test_rejects_non_plain_names() {
        let layout = StorageLayout::new("images", "archive");
        for bad in ["", ".", "..", "a/b", "a\\b", "/abs"] {
            assert!(layout.canonical_dir("alice", bad).is_err(), "{:?}", bad);
            assert!(layout.archive_dir(bad).is_err(), "{:?}", bad);
        }
    }

    #[test]
    fn test_create_owner_dirs() {
        let temp = tempdir().unwrap();
        let layout = StorageLayout::new(temp.path().join("images"), temp.path().join("archive"));
        layout.create_owner_dirs("alice").unwrap();
        assert!(temp.path().join("images/alice").is_dir());
        assert!(temp.path().join("archive/alice").is_dir());
        assert!(layout.create_owner_dirs("..").is_err());
    }
}
