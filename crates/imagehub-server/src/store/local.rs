use super::{
    sort_records, ArchiveRecord, Collection, Record, RecordId, RecordStore, RepositoryRecord,
    Sort, StoreError, StoreResult, UserRecord,
};
use log::{debug, info};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tempfile::NamedTempFile;

const USERS_FILE: &str = "users.json";
const REPOSITORIES_FILE: &str = "repositories.json";
const ARCHIVES_FILE: &str = "archives.json";

struct Rows<T> {
    next_id: RecordId,
    records: Vec<T>,
}

/// A collection held in memory, optionally mirrored to a JSON file.
///
/// The backing file is rewritten through a temp file after every insert so
/// a crash leaves either the old or the new contents.
pub struct MemoryCollection<T> {
    name: &'static str,
    rows: RwLock<Rows<T>>,
    file: Option<PathBuf>,
}

impl<T: Record> MemoryCollection<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            rows: RwLock::new(Rows {
                next_id: 1,
                records: Vec::new(),
            }),
            file: None,
        }
    }

    /// Load the collection from `path`, starting empty if it does not exist.
    pub fn open<P: Into<PathBuf>>(name: &'static str, path: P) -> StoreResult<Self> {
        let path = path.into();
        let records: Vec<T> = if path.exists() {
            serde_json::from_reader(BufReader::new(File::open(&path)?))?
        } else {
            Vec::new()
        };
        let next_id = records.iter().map(Record::id).max().unwrap_or(0) + 1;
        debug!(
            "loaded {} {} record(s) from {}",
            records.len(),
            name,
            path.display()
        );

        Ok(Self {
            name,
            rows: RwLock::new(Rows { next_id, records }),
            file: Some(path),
        })
    }

    /// Rewrite the backing file, if any.
    pub fn flush(&self) -> StoreResult<()> {
        let rows = self.read()?;
        self.persist(&rows.records)
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Rows<T>>> {
        self.rows.read().map_err(|_| StoreError::Poisoned(self.name))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Rows<T>>> {
        self.rows.write().map_err(|_| StoreError::Poisoned(self.name))
    }

    fn append(&self, rows: &mut Rows<T>, mut record: T) -> StoreResult<T> {
        record.set_id(rows.next_id);
        rows.records.push(record.clone());
        if let Err(err) = self.persist(&rows.records) {
            rows.records.pop();
            return Err(err);
        }
        rows.next_id += 1;
        Ok(record)
    }

    fn persist(&self, records: &[T]) -> StoreResult<()> {
        let path = match &self.file {
            Some(path) => path,
            None => return Ok(()),
        };
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::Builder::new()
            .prefix(".tmp.store-")
            .suffix(".json")
            .tempfile_in(parent)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, records)?;
            writer.flush()?;
        }
        persist_tempfile(temp, path)
    }
}

impl<T: Record> Collection<T> for MemoryCollection<T> {
    fn count(&self, filter: &T::Filter) -> StoreResult<u64> {
        let rows = self.read()?;
        Ok(rows.records.iter().filter(|r| r.matches(filter)).count() as u64)
    }

    fn find(&self, filter: &T::Filter, sort: Sort) -> StoreResult<Vec<T>> {
        let rows = self.read()?;
        let mut found: Vec<T> = rows
            .records
            .iter()
            .filter(|r| r.matches(filter))
            .cloned()
            .collect();
        sort_records(&mut found, sort);
        Ok(found)
    }

    fn insert_one(&self, record: T) -> StoreResult<T> {
        let mut rows = self.write()?;
        self.append(&mut rows, record)
    }

    fn insert_unless_exists(&self, filter: &T::Filter, record: T) -> StoreResult<Option<T>> {
        let mut rows = self.write()?;
        if rows.records.iter().any(|r| r.matches(filter)) {
            return Ok(None);
        }
        self.append(&mut rows, record).map(Some)
    }
}

/// The bundled [`RecordStore`]: one [`MemoryCollection`] per record kind,
/// persisted as `users.json`, `repositories.json` and `archives.json` when
/// opened on a directory.
pub struct LocalStore {
    dir: Option<PathBuf>,
    users: MemoryCollection<UserRecord>,
    repositories: MemoryCollection<RepositoryRecord>,
    archives: MemoryCollection<ArchiveRecord>,
}

impl LocalStore {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            users: MemoryCollection::new("users"),
            repositories: MemoryCollection::new("repositories"),
            archives: MemoryCollection::new("archives"),
        }
    }

    pub fn open<P: AsRef<Path>>(dir: P) -> StoreResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let store = Self {
            dir: Some(dir.to_path_buf()),
            users: MemoryCollection::open("users", dir.join(USERS_FILE))?,
            repositories: MemoryCollection::open("repositories", dir.join(REPOSITORIES_FILE))?,
            archives: MemoryCollection::open("archives", dir.join(ARCHIVES_FILE))?,
        };
        info!("record store opened at {}", dir.display());
        Ok(store)
    }

    /// Flush every collection. Called once at shutdown.
    pub fn close(&self) -> StoreResult<()> {
        self.users.flush()?;
        self.repositories.flush()?;
        self.archives.flush()?;
        if let Some(dir) = &self.dir {
            info!("record store at {} closed", dir.display());
        }
        Ok(())
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl RecordStore for LocalStore {
    fn users(&self) -> &dyn Collection<UserRecord> {
        &self.users
    }

    fn repositories(&self) -> &dyn Collection<RepositoryRecord> {
        &self.repositories
    }

    fn archives(&self) -> &dyn Collection<ArchiveRecord> {
        &self.archives
    }
}

fn persist_tempfile(temp: NamedTempFile, final_path: &Path) -> StoreResult<()> {
    temp.persist(final_path)
        .map(|_| ())
        .map_err(|err| StoreError::Io(err.error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ArchiveFilter, RepositoryFilter, UserFilter};
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    #[test]
    fn test_insert_assigns_increasing_ids() {
        let store = LocalStore::in_memory();
        let first = store
            .repositories()
            .insert_one(RepositoryRecord::new("alice", "cats"))
            .unwrap();
        let second = store
            .repositories()
            .insert_one(RepositoryRecord::new("alice", "dogs"))
            .unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(
            store
                .repositories()
                .count(&RepositoryFilter {
                    owner: Some("alice".to_string()),
                    folder_name: None,
                })
                .unwrap(),
            2
        );
    }

    #[test]
    fn test_insert_unless_exists_keeps_one_record() {
        let store = LocalStore::in_memory();
        let filter = ArchiveFilter::package("alice", "cats-7.zip");
        let first = store
            .archives()
            .insert_unless_exists(&filter, ArchiveRecord::new("alice", "cats", 7))
            .unwrap();
        assert_eq!(first.map(|record| record.id), Some(1));

        let second = store
            .archives()
            .insert_unless_exists(&filter, ArchiveRecord::new("alice", "cats", 7))
            .unwrap();
        assert!(second.is_none());
        assert_eq!(store.archives().count(&filter).unwrap(), 1);
    }

    #[test]
    fn test_concurrent_insert_unless_exists() {
        let collection = MemoryCollection::<RepositoryRecord>::new("repositories");
        let filter = RepositoryFilter::new("alice", "cats");
        let inserted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    scope.spawn(|| {
                        collection
                            .insert_unless_exists(&filter, RepositoryRecord::new("alice", "cats"))
                            .unwrap()
                            .is_some() as usize
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(inserted, 1);
        assert_eq!(collection.count(&filter).unwrap(), 1);
    }

    #[test]
    fn test_sort_orders() {
        let store = LocalStore::in_memory();
        let now = Utc::now();
        let archives = store.archives();
        archives
            .insert_one(ArchiveRecord::new("alice", "cats", 1).with_created_at(now))
            .unwrap();
        archives
            .insert_one(
                ArchiveRecord::new("alice", "cats", 2).with_created_at(now - Duration::seconds(10)),
            )
            .unwrap();
        archives
            .insert_one(ArchiveRecord::new("alice", "cats", 3).with_created_at(now))
            .unwrap();

        let filter = ArchiveFilter::repository("alice", "cats");
        let newest = archives.find_one(&filter, Sort::Newest).unwrap().unwrap();
        assert_eq!(newest.fingerprint, 3);

        let last = archives.find_one(&filter, Sort::LastInserted).unwrap().unwrap();
        assert_eq!(last.fingerprint, 3);

        let ordered: Vec<u32> = archives
            .find(&filter, Sort::Newest)
            .unwrap()
            .iter()
            .map(|r| r.fingerprint)
            .collect();
        assert_eq!(ordered, vec![3, 1, 2]);

        let inserted: Vec<u32> = archives
            .find(&filter, Sort::InsertionOrder)
            .unwrap()
            .iter()
            .map(|r| r.fingerprint)
            .collect();
        assert_eq!(inserted, vec![1, 2, 3]);
    }

    #[test]
    fn test_find_one_without_match() {
        let store = LocalStore::in_memory();
        assert!(store
            .users()
            .find_one(&UserFilter::login("nobody"), Sort::InsertionOrder)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_open_reloads_persisted_records() {
        let dir = tempdir().unwrap();
        {
            let store = LocalStore::open(dir.path()).unwrap();
            store
                .users()
                .insert_one(UserRecord::new("alice", "alice@example.org", "hash"))
                .unwrap();
            store
                .archives()
                .insert_one(ArchiveRecord::new("alice", "cats", 7))
                .unwrap();
            store.close().unwrap();
        }
        assert!(dir.path().join(USERS_FILE).exists());

        let store = LocalStore::open(dir.path()).unwrap();
        let user = store
            .users()
            .find_one(&UserFilter::login("alice@example.org"), Sort::InsertionOrder)
            .unwrap()
            .unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.id, 1);

        let next = store
            .archives()
            .insert_one(ArchiveRecord::new("alice", "cats", 8))
            .unwrap();
        assert_eq!(next.id, 2);
    }

    #[test]
    fn test_open_rejects_corrupt_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(ARCHIVES_FILE), b"not json").unwrap();
        assert!(matches!(
            LocalStore::open(dir.path()),
            Err(StoreError::Json(_))
        ));
    }
}
