use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Identity of a stored snapshot as seen by a working copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Snapshot fingerprint.
    pub fingerprint: u32,
    /// Owner of the repository.
    pub owner: String,
    /// Folder name of the repository.
    pub folder_name: String,
}

impl Metadata {
    /// Create metadata for the snapshot `fingerprint` of `owner/folder_name`.
    pub fn new(fingerprint: u32, owner: impl Into<String>, folder_name: impl Into<String>) -> Self {
        Self {
            fingerprint,
            owner: owner.into(),
            folder_name: folder_name.into(),
        }
    }
}

/// Request opening a clone exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneRequest {
    /// Full repository URL or `owner/folder` path.
    pub repository_path: String,
}

/// One message of a clone response stream.
///
/// The first message is always `Metadata`; every following one is a `Chunk`
/// of the package, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloneResponse {
    Metadata(Metadata),
    Chunk(Bytes),
}

/// First message of a push stream.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Username or email of the pushing identity.
    pub username: String,
    /// Plaintext password, verified server side.
    pub password: String,
    /// Target repository URL.
    pub repository_path: String,
    /// Fingerprint of the snapshot being pushed.
    pub fingerprint: u32,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("repository_path", &self.repository_path)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

/// One message of a push request stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushRequest {
    Info(Credentials),
    Chunk(Bytes),
}

/// Outcome of a push, success or failure, as human-readable text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {
    pub result: String,
}

impl PushResponse {
    pub fn new(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
        }
    }
}

/// Request asking whether a working copy is stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRequest {
    pub metadata: Metadata,
}

/// Freshness of a working copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckStatus {
    /// The presented fingerprint is the latest snapshot.
    UpToDate,
    /// A newer snapshot exists on the server.
    UpdateFound,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckStatus::UpToDate => write!(f, "UpToDate"),
            CheckStatus::UpdateFound => write!(f, "UpdateFound"),
        }
    }
}

/// Outcome of a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResponse {
    pub status: CheckStatus,
}

/// Request creating a new identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Login name, also the owner segment of every repository URL.
    pub username: String,
    /// Alternative login for pushes.
    pub email: String,
    pub password: String,
    /// Must equal `password`.
    pub password_confirmation: String,
}

impl std::fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// The identity created by a register call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    /// Record id assigned by the store.
    pub id: u64,
    pub username: String,
    pub email: String,
}

/// Operation selected by the first frame of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Call {
    Clone(CloneRequest),
    Push,
    Check(CheckRequest),
    Register(RegisterRequest),
}

impl Call {
    /// Short operation name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Call::Clone(_) => "clone",
            Call::Push => "push",
            Call::Check(_) => "check",
            Call::Register(_) => "register",
        }
    }
}

/// Single response closing a push, check or register exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Reply {
    Push(PushResponse),
    Check(CheckResponse),
    Register(RegisterResponse),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_hides_password() {
        let credentials = Credentials {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
            repository_path: "http://localhost:5000/alice/cats".to_string(),
            fingerprint: 7,
        };
        let rendered = format!("{:?}", credentials);
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_call_json_shape() {
        let call = Call::Clone(CloneRequest {
            repository_path: "alice/cats".to_string(),
        });
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["op"], "clone");
        assert_eq!(json["repository_path"], "alice/cats");

        let push: Call = serde_json::from_str(r#"{"op":"push"}"#).unwrap();
        assert_eq!(push, Call::Push);
        assert_eq!(push.name(), "push");
    }

    #[test]
    fn test_check_status_display() {
        assert_eq!(CheckStatus::UpToDate.to_string(), "UpToDate");
        assert_eq!(CheckStatus::UpdateFound.to_string(), "UpdateFound");
    }
}
