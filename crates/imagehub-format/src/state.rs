use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Name of the hidden state file kept at the root of a working copy.
pub const STATE_FILE_NAME: &str = ".imagehub.toml";

/// What a working copy was cloned from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalState {
    /// Fingerprint of the snapshot that was cloned.
    pub fingerprint: u32,
    /// Owner of the remote repository.
    pub owner: String,
    /// Folder name of the remote repository.
    pub folder_name: String,
}

impl LocalState {
    /// Record that a working copy holds snapshot `fingerprint` of
    /// `owner/folder_name`.
    pub fn new(fingerprint: u32, owner: impl Into<String>, folder_name: impl Into<String>) -> Self {
        Self {
            fingerprint,
            owner: owner.into(),
            folder_name: folder_name.into(),
        }
    }

    /// Location of the state file inside `dir`.
    pub fn path_in<P: AsRef<Path>>(dir: P) -> PathBuf {
        dir.as_ref().join(STATE_FILE_NAME)
    }

    /// Parse a state record from TOML bytes.
    pub fn from_toml(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::InvalidState(format!("Invalid UTF-8: {}", e)))?;
        toml::from_str(text).map_err(|e| Error::InvalidState(e.to_string()))
    }

    /// Render the state record as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load the state file from the working copy at `dir`.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let path = Self::path_in(dir);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(Error::StateNotFound(path));
            }
            Err(err) => return Err(err.into()),
        };
        Self::from_toml(&data)
    }

    /// Write the state file into `dir`, replacing any previous one.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let dir = dir.as_ref();
        let path = Self::path_in(dir);
        let text = self.to_toml()?;

        let mut temp = tempfile::Builder::new()
            .prefix(".tmp.imagehub-")
            .suffix(".toml")
            .tempfile_in(dir)?;
        temp.write_all(text.as_bytes())?;
        temp.persist(&path).map_err(|err| Error::IoError(err.error))?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let state = LocalState::new(3_735_928_559, "alice", "cats");

        let path = state.save(dir.path()).unwrap();
        assert_eq!(path, dir.path().join(STATE_FILE_NAME));
        assert_eq!(LocalState::load(dir.path()).unwrap(), state);
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempdir().unwrap();
        LocalState::new(1, "alice", "cats").save(dir.path()).unwrap();
        LocalState::new(2, "bob", "dogs").save(dir.path()).unwrap();

        let loaded = LocalState::load(dir.path()).unwrap();
        assert_eq!(loaded, LocalState::new(2, "bob", "dogs"));

        let text = fs::read_to_string(dir.path().join(STATE_FILE_NAME)).unwrap();
        assert_eq!(text.matches("owner").count(), 1);
    }

    #[test]
    fn test_missing_state() {
        let dir = tempdir().unwrap();
        let err = LocalState::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::StateNotFound(p) if p == dir.path().join(STATE_FILE_NAME)));
    }

    #[test]
    fn test_malformed_state() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(STATE_FILE_NAME), "fingerprint = \"nope\"\n").unwrap();
        let err = LocalState::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));

        fs::write(dir.path().join(STATE_FILE_NAME), [0xff, 0xfe, 0x00]).unwrap();
        let err = LocalState::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid UTF-8"));
    }

    #[test]
    fn test_toml_shape() {
        let state = LocalState::new(42, "alice", "cats");
        let text = state.to_toml().unwrap();
        assert!(text.contains("fingerprint = 42"));
        assert!(text.contains("owner = \"alice\""));
        assert!(text.contains("folder_name = \"cats\""));
    }
}
