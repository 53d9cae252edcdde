use super::Record;
use chrono::{DateTime, Utc};
use imagehub_format::package_file_name;
use serde::{Deserialize, Serialize};

pub type RecordId = u64;

/// A registered identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub id: RecordId,
    pub username: String,
    pub email: String,
    /// PHC-formatted password hash.
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl UserRecord {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            username: username.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            created_at: Utc::now(),
        }
    }
}

/// Matches identities whose username or email equals one of the given
/// values; an empty filter matches everyone.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub username: Option<String>,
    pub email: Option<String>,
}

impl UserFilter {
    pub fn username(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            email: None,
        }
    }

    /// Look an identity up by username or email.
    pub fn login(login: impl Into<String>) -> Self {
        let login = login.into();
        Self {
            username: Some(login.clone()),
            email: Some(login),
        }
    }

    pub fn username_or_email(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            email: Some(email.into()),
        }
    }
}

impl Record for UserRecord {
    type Filter = UserFilter;

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn matches(&self, filter: &UserFilter) -> bool {
        if filter.username.is_none() && filter.email.is_none() {
            return true;
        }
        filter.username.as_deref() == Some(self.username.as_str())
            || filter.email.as_deref() == Some(self.email.as_str())
    }
}

/// One distinct `(owner, folder)` pair, created by its first push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    #[serde(default)]
    pub id: RecordId,
    pub owner: String,
    pub folder_name: String,
    pub created_at: DateTime<Utc>,
}

impl RepositoryRecord {
    pub fn new(owner: impl Into<String>, folder_name: impl Into<String>) -> Self {
        Self {
            id: 0,
            owner: owner.into(),
            folder_name: folder_name.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RepositoryFilter {
    pub owner: Option<String>,
    pub folder_name: Option<String>,
}

impl RepositoryFilter {
    pub fn new(owner: impl Into<String>, folder_name: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
            folder_name: Some(folder_name.into()),
        }
    }
}

impl Record for RepositoryRecord {
    type Filter = RepositoryFilter;

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn matches(&self, filter: &RepositoryFilter) -> bool {
        field_matches(&filter.owner, &self.owner)
            && field_matches(&filter.folder_name, &self.folder_name)
    }
}

/// One stored snapshot of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    #[serde(default)]
    pub id: RecordId,
    pub owner: String,
    pub folder_name: String,
    pub fingerprint: u32,
    /// File name of the package inside the owner's archive directory.
    pub package_name: String,
    pub created_at: DateTime<Utc>,
}

impl ArchiveRecord {
    pub fn new(owner: impl Into<String>, folder_name: impl Into<String>, fingerprint: u32) -> Self {
        let folder_name = folder_name.into();
        Self {
            id: 0,
            owner: owner.into(),
            package_name: package_file_name(&folder_name, fingerprint),
            folder_name,
            fingerprint,
            created_at: Utc::now(),
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Conjunction of the fields that are set.
#[derive(Debug, Clone, Default)]
pub struct ArchiveFilter {
    pub owner: Option<String>,
    pub folder_name: Option<String>,
    pub fingerprint: Option<u32>,
    pub package_name: Option<String>,
}

impl ArchiveFilter {
    /// All snapshots of one repository.
    pub fn repository(owner: impl Into<String>, folder_name: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
            folder_name: Some(folder_name.into()),
            ..Default::default()
        }
    }

    /// The snapshot stored under a package name for an owner.
    pub fn package(owner: impl Into<String>, package_name: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
            package_name: Some(package_name.into()),
            ..Default::default()
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: u32) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }
}

impl Record for ArchiveRecord {
    type Filter = ArchiveFilter;

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn matches(&self, filter: &ArchiveFilter) -> bool {
        field_matches(&filter.owner, &self.owner)
            && field_matches(&filter.folder_name, &self.folder_name)
            && field_matches(&filter.package_name, &self.package_name)
            && filter.fingerprint.map_or(true, |fp| fp == self.fingerprint)
    }
}

fn field_matches(expected: &Option<String>, actual: &str) -> bool {
    expected.as_deref().map_or(true, |value| value == actual)
}
