//! Working directory helpers: snapshot scanning and clone destinations.

use crate::Result;
use imagehub_format::{fingerprint, PACKAGE_EXTENSION, STATE_FILE_NAME};
use log::debug;
use rand::Rng;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Files of a working directory that make up a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Regular files, sorted by name.
    pub files: Vec<PathBuf>,
    pub fingerprint: u32,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// List the snapshot files of `dir`.
///
/// Subdirectories, the state file and package files are skipped. Names
/// that are not valid UTF-8 are rejected.
pub fn scan<P: AsRef<Path>>(dir: P) -> Result<Snapshot> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir.as_ref())? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().into_string().map_err(|name| {
            crate::Error::InvalidInput(format!("non UTF-8 file name: {:?}", name))
        })?;
        if is_skipped(&name) {
            continue;
        }
        entries.push((name, entry.path()));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let fingerprint = fingerprint(entries.iter().map(|(name, _)| name.as_str()));
    debug!(
        "scanned {} file(s) in {}, fingerprint {}",
        entries.len(),
        dir.as_ref().display(),
        fingerprint
    );
    Ok(Snapshot {
        files: entries.into_iter().map(|(_, path)| path).collect(),
        fingerprint,
    })
}

fn is_skipped(name: &str) -> bool {
    name == STATE_FILE_NAME
        || Path::new(name)
            .extension()
            .map_or(false, |ext| ext == PACKAGE_EXTENSION)
}

/// Create a fresh directory named `name` under `parent`.
///
/// When the name is taken a random numeric suffix is appended, retrying
/// until creation succeeds. An existing directory is never reused.
pub fn create_clone_dir<P: AsRef<Path>>(parent: P, name: &str) -> Result<PathBuf> {
    let parent = parent.as_ref();
    let mut candidate = parent.join(name);
    let mut rng = rand::thread_rng();
    loop {
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                let suffix: u32 = rng.gen_range(1..100_000);
                debug!("{} exists, trying suffix {}", candidate.display(), suffix);
                candidate = parent.join(format!("{}-{}", name, suffix));
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Local package path for a clone directory: `{dir}/{dir name}.zip`.
pub fn local_package_path(dir: &Path) -> PathBuf {
    let stem = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "repository".to_string());
    dir.join(format!("{}.{}", stem, PACKAGE_EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.png"), b"b").unwrap();
        fs::write(dir.path().join("a.png"), b"a").unwrap();
        fs::write(dir.path().join(STATE_FILE_NAME), b"x").unwrap();
        fs::write(dir.path().join("old.zip"), b"zip").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        let snapshot = scan(dir.path()).unwrap();
        assert_eq!(
            snapshot.files,
            vec![dir.path().join("a.png"), dir.path().join("b.png")]
        );
        assert_eq!(snapshot.fingerprint, fingerprint(["a.png", "b.png"]));
    }

    #[test]
    fn test_scan_empty_dir() {
        let dir = tempdir().unwrap();
        let snapshot = scan(dir.path()).unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.fingerprint, fingerprint(Vec::<&str>::new()));
    }

    #[test]
    fn test_create_clone_dir_avoids_collisions() {
        let parent = tempdir().unwrap();
        let first = create_clone_dir(parent.path(), "cats").unwrap();
        assert_eq!(first, parent.path().join("cats"));
        fs::write(first.join("keep.png"), b"keep").unwrap();

        let second = create_clone_dir(parent.path(), "cats").unwrap();
        assert_ne!(second, first);
        assert!(second
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("cats-"));
        assert!(second.is_dir());
        assert_eq!(fs::read(first.join("keep.png")).unwrap(), b"keep");
    }

    #[test]
    fn test_local_package_path() {
        assert_eq!(
            local_package_path(Path::new("/work/cats-17")),
            PathBuf::from("/work/cats-17/cats-17.zip")
        );
    }
}
