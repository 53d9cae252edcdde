//! Record store used by the sync engine.
//!
//! The engine only sees the [`RecordStore`] trait: three typed collections
//! (identities, repositories, archives) supporting `count`, `find`,
//! `find_one` and `insert_one`. [`LocalStore`] is the bundled
//! implementation, in memory with optional JSON persistence.

mod local;
mod records;

pub use local::{LocalStore, MemoryCollection};
pub use records::{
    ArchiveFilter, ArchiveRecord, RecordId, RepositoryFilter, RepositoryRecord, UserFilter,
    UserRecord,
};

use chrono::{DateTime, Utc};
use imagehub_protocol::Status;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("collection lock poisoned: {0}")]
    Poisoned(&'static str),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for Status {
    fn from(err: StoreError) -> Self {
        Status::internal(format!("record store failure: {}", err))
    }
}

/// Ordering applied by `find` and `find_one`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sort {
    /// Oldest insert first.
    InsertionOrder,
    /// Most recent insert first.
    LastInserted,
    /// Latest `created_at` first; equal timestamps fall back to insert order.
    Newest,
}

/// A record kind stored in a collection.
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    type Filter: Send + Sync;

    fn id(&self) -> RecordId;
    fn set_id(&mut self, id: RecordId);
    fn created_at(&self) -> DateTime<Utc>;
    fn matches(&self, filter: &Self::Filter) -> bool;
}

/// Operations the engine performs on one collection.
pub trait Collection<T: Record>: Send + Sync {
    /// Number of records matching `filter`.
    fn count(&self, filter: &T::Filter) -> StoreResult<u64>;

    /// Records matching `filter`, ordered by `sort`.
    fn find(&self, filter: &T::Filter, sort: Sort) -> StoreResult<Vec<T>>;

    /// First record of [`Collection::find`].
    fn find_one(&self, filter: &T::Filter, sort: Sort) -> StoreResult<Option<T>> {
        Ok(self.find(filter, sort)?.into_iter().next())
    }

    /// Insert a record, returning it with its assigned id.
    fn insert_one(&self, record: T) -> StoreResult<T>;

    /// Insert `record` only if no record matches `filter`. The check and the
    /// insert happen as one step; `None` means a match already existed.
    fn insert_unless_exists(&self, filter: &T::Filter, record: T) -> StoreResult<Option<T>>;
}

/// The three collections the engine works with.
pub trait RecordStore: Send + Sync {
    fn users(&self) -> &dyn Collection<UserRecord>;
    fn repositories(&self) -> &dyn Collection<RepositoryRecord>;
    fn archives(&self) -> &dyn Collection<ArchiveRecord>;
}

pub(crate) fn sort_records<T: Record>(records: &mut [T], sort: Sort) {
    match sort {
        Sort::InsertionOrder => records.sort_by_key(|r| r.id()),
        Sort::LastInserted => records.sort_by_key(|r| std::cmp::Reverse(r.id())),
        Sort::Newest => {
            records.sort_by_key(|r| std::cmp::Reverse((r.created_at(), r.id())));
        }
    }
}
