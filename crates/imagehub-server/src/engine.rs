//! Clone, Push, Check and Register exchanges.
//!
//! The engine owns no transport. Streams are handed in as ordered tokio
//! channels: a push arrives as a receiver of request items whose closing is
//! the end of the stream, and a clone is produced into a sender.

use crate::config::ServerConfig;
use crate::identity;
use crate::layout::{plain_segment, LayoutError, StorageLayout};
use crate::store::{
    ArchiveFilter, ArchiveRecord, RecordStore, RepositoryFilter, RepositoryRecord, Sort,
    UserFilter, UserRecord,
};
use bytes::Bytes;
use imagehub_format::{package_file_name, Package};
use imagehub_protocol::{
    CheckRequest, CheckResponse, CheckStatus, CloneRequest, CloneResponse, Credentials, Metadata,
    PushRequest, PushResponse, RegisterRequest, RegisterResponse, RepositoryPath, Status,
};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task;

const INTERNAL_ERROR: &str = "Internal server error";

/// Settings the engine needs at runtime.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Prefix of public repository URLs.
    pub base_url: String,
    /// Where canonical copies and packages live.
    pub layout: StorageLayout,
    /// Bytes per chunk when streaming a clone.
    pub chunk_size: usize,
    /// scrypt log2 N for new password hashes.
    pub password_cost: u8,
}

impl From<&ServerConfig> for EngineConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            layout: config.layout(),
            chunk_size: config.chunk_size,
            password_cost: config.password_cost,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum SnapshotError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Format(#[from] imagehub_format::Error),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error("push stream failed: {0}")]
    Stream(Status),
    #[error("unexpected credentials after the first push message")]
    DuplicateInfo,
    #[error("unpack task failed: {0}")]
    Join(#[from] task::JoinError),
}

/// Server side of the Clone, Push, Check and Register exchanges.
///
/// Shared by every connection; all state lives in the record store and on
/// disk.
pub struct SyncEngine {
    /// Runtime settings.
    config: EngineConfig,
    /// Identities, repositories and archive records.
    store: Arc<dyn RecordStore>,
}

impl SyncEngine {
    /// Create an engine over `store`.
    pub fn new(config: EngineConfig, store: Arc<dyn RecordStore>) -> Self {
        Self { config, store }
    }

    fn layout(&self) -> &StorageLayout {
        &self.config.layout
    }

    /// Stream the latest snapshot of a repository into `responses`.
    ///
    /// The first item is the snapshot metadata, every following item a
    /// chunk of its package. Returning `Ok` means the stream is complete.
    pub async fn clone_repository(
        &self,
        request: CloneRequest,
        responses: mpsc::Sender<CloneResponse>,
    ) -> Result<(), Status> {
        let path = RepositoryPath::parse(&self.config.base_url, &request.repository_path)?;

        let owner = self
            .store
            .users()
            .find_one(&UserFilter::username(&path.owner), Sort::InsertionOrder)?;
        if owner.is_none() {
            return Err(Status::not_found(format!(
                "Cannot find user with the provided username: {}",
                path.owner
            )));
        }

        let canonical = self
            .layout()
            .canonical_dir(&path.owner, &path.folder_name)
            .map_err(|err| Status::invalid_argument(err.to_string()))?;
        if !tokio::fs::try_exists(&canonical).await.unwrap_or(false) {
            return Err(Status::not_found(format!(
                "Cannot find image repository with the provided folder name: {}",
                path.folder_name
            )));
        }

        let archive = self
            .store
            .archives()
            .find_one(
                &ArchiveFilter::repository(&path.owner, &path.folder_name),
                Sort::LastInserted,
            )?
            .ok_or_else(|| {
                Status::not_found(format!(
                    "No snapshot stored for {}/{}",
                    path.owner, path.folder_name
                ))
            })?;

        let package_path = self
            .layout()
            .package_path(&archive.owner, &archive.package_name)
            .map_err(|err| Status::internal(err.to_string()))?;
        let mut package = tokio::fs::File::open(&package_path).await.map_err(|err| {
            error!("failed to open package {}: {}", package_path.display(), err);
            Status::internal("Internal Error")
        })?;

        send_clone_item(
            &responses,
            CloneResponse::Metadata(Metadata::new(
                archive.fingerprint,
                &archive.owner,
                &archive.folder_name,
            )),
        )
        .await?;

        let mut buf = vec![0u8; self.config.chunk_size];
        let mut sent = 0u64;
        loop {
            let n = package.read(&mut buf).await.map_err(|err| {
                error!("failed to read package {}: {}", package_path.display(), err);
                Status::internal("Internal Error")
            })?;
            if n == 0 {
                break;
            }
            send_clone_item(&responses, CloneResponse::Chunk(Bytes::copy_from_slice(&buf[..n])))
                .await?;
            sent += n as u64;
        }

        info!(
            "cloned {}/{} ({} bytes, fingerprint {})",
            archive.owner, archive.folder_name, sent, archive.fingerprint
        );
        Ok(())
    }

    /// Consume a push stream and report its outcome.
    ///
    /// Credential, ownership and storage failures are reported inside the
    /// returned [`PushResponse`]. An `Err` is returned only when the stream
    /// itself is malformed before the credentials arrive.
    pub async fn push(
        &self,
        mut requests: mpsc::Receiver<Result<PushRequest, Status>>,
    ) -> Result<PushResponse, Status> {
        let credentials = match requests.recv().await {
            Some(Ok(PushRequest::Info(credentials))) => credentials,
            Some(Ok(PushRequest::Chunk(_))) => {
                return Err(Status::invalid_argument(
                    "push stream must start with credentials",
                ))
            }
            Some(Err(status)) => {
                return Err(Status::unknown(format!(
                    "Unknown error happened while receiving stream: {}",
                    status.message
                )))
            }
            None => return Err(Status::unknown("push stream closed before credentials")),
        };
        debug!("push request {:?}", credentials);

        let path = match self.authenticate(&credentials).await {
            Ok(path) => path,
            Err(rejection) => {
                info!("push to {} rejected: {}", credentials.repository_path, rejection);
                return Ok(PushResponse::new(rejection));
            }
        };

        if let Err(err) = self.ensure_repository(&path) {
            error!(
                "failed to create repository {}/{}: {}",
                path.owner, path.folder_name, err
            );
            return Ok(PushResponse::new(
                "Internal Server Error while creating new repository",
            ));
        }

        let package_name = match self
            .receive_snapshot(&path, credentials.fingerprint, &mut requests)
            .await
        {
            Ok(package_name) => package_name,
            Err(err) => {
                error!(
                    "failed to store snapshot for {}/{}: {}",
                    path.owner, path.folder_name, err
                );
                return Ok(PushResponse::new(INTERNAL_ERROR));
            }
        };

        if let Err(err) = self.record_archive(&path, credentials.fingerprint, &package_name) {
            error!("failed to record archive {}: {}", package_name, err);
            return Ok(PushResponse::new(INTERNAL_ERROR));
        }

        let url = path.to_url(&self.config.base_url);
        info!("stored {} as {}", url, package_name);
        Ok(PushResponse::new(format!("Successfully pushed to {}", url)))
    }

    /// Compare a working copy's fingerprint with the latest snapshot.
    pub async fn check(&self, request: CheckRequest) -> Result<CheckResponse, Status> {
        let metadata = request.metadata;
        let repository = ArchiveFilter::repository(&metadata.owner, &metadata.folder_name);

        let known = self
            .store
            .archives()
            .count(&repository.clone().with_fingerprint(metadata.fingerprint))?;
        if known == 0 {
            return Err(Status::not_found(format!(
                "The provided hash is invalid {}",
                metadata.fingerprint
            )));
        }

        let latest = self
            .store
            .archives()
            .find_one(&repository, Sort::Newest)?
            .ok_or_else(|| Status::internal("archive disappeared during check"))?;

        let status = if latest.fingerprint == metadata.fingerprint {
            CheckStatus::UpToDate
        } else {
            CheckStatus::UpdateFound
        };
        debug!(
            "check {}/{} at {}: {}",
            metadata.owner, metadata.folder_name, metadata.fingerprint, status
        );
        Ok(CheckResponse { status })
    }

    /// Create a new identity and its storage directories.
    pub async fn register(&self, request: RegisterRequest) -> Result<RegisterResponse, Status> {
        if plain_segment(&request.username).is_err() {
            return Err(Status::invalid_argument(format!(
                "invalid username: {}",
                request.username
            )));
        }
        if request.email.trim().is_empty() {
            return Err(Status::invalid_argument("email must not be empty"));
        }

        let taken = self.store.users().count(&UserFilter::username_or_email(
            &request.username,
            &request.email,
        ))?;
        if taken > 0 {
            return Err(Status::cancelled(format!(
                "username: {} or email: {} already exists",
                request.username, request.email
            )));
        }
        if request.password != request.password_confirmation {
            return Err(Status::cancelled("passwords don't match"));
        }

        let password = request.password;
        let cost = self.config.password_cost;
        let password_hash = task::spawn_blocking(move || identity::hash_password(&password, cost))
            .await
            .map_err(|err| Status::internal(err.to_string()))?
            .map_err(|err| Status::internal(err.to_string()))?;

        let user = self
            .store
            .users()
            .insert_unless_exists(
                &UserFilter::username_or_email(&request.username, &request.email),
                UserRecord::new(&request.username, &request.email, password_hash),
            )
            .map_err(|err| {
                error!("failed to insert user {}: {}", request.username, err);
                Status::internal(format!("Error while creating user {}", request.username))
            })?
            .ok_or_else(|| {
                Status::cancelled(format!(
                    "username: {} or email: {} already exists",
                    request.username, request.email
                ))
            })?;

        if let Err(err) = self.layout().create_owner_dirs(&user.username) {
            error!("failed to create directories for {}: {}", user.username, err);
            return Err(Status::internal(format!(
                "Error while creating directories for {}",
                user.username
            )));
        }

        info!("registered {} <{}>", user.username, user.email);
        Ok(RegisterResponse {
            id: user.id,
            username: user.username,
            email: user.email,
        })
    }

    /// Resolve and verify the pushing identity, returning the target
    /// repository inside its namespace. `Err` carries the rejection text.
    async fn authenticate(&self, credentials: &Credentials) -> Result<RepositoryPath, String> {
        let user = match self
            .store
            .users()
            .find_one(&UserFilter::login(&credentials.username), Sort::InsertionOrder)
        {
            Ok(Some(user)) => user,
            Ok(None) => return Err(format!("Invalid username field: {}", credentials.username)),
            Err(err) => {
                error!("identity lookup failed: {}", err);
                return Err(INTERNAL_ERROR.to_string());
            }
        };

        let path = match RepositoryPath::parse(&self.config.base_url, &credentials.repository_path)
        {
            Ok(path) if path.owner == user.username => path,
            _ => {
                return Err(format!(
                    "No repository found in {}",
                    credentials.repository_path
                ))
            }
        };

        let password = credentials.password.clone();
        let password_hash = user.password_hash.clone();
        let verified =
            task::spawn_blocking(move || identity::verify_password(&password, &password_hash))
                .await
                .unwrap_or(false);
        if !verified {
            return Err("The provided password is invalid".to_string());
        }
        Ok(path)
    }

    fn ensure_repository(&self, path: &RepositoryPath) -> Result<(), crate::store::StoreError> {
        let created = self.store.repositories().insert_unless_exists(
            &RepositoryFilter::new(&path.owner, &path.folder_name),
            RepositoryRecord::new(&path.owner, &path.folder_name),
        )?;
        if created.is_some() {
            info!("created repository {}/{}", path.owner, path.folder_name);
        }
        Ok(())
    }

    /// Write the pushed package to a temp file in the owner's archive
    /// directory, unpack it over the canonical copy and move it into place.
    async fn receive_snapshot(
        &self,
        path: &RepositoryPath,
        fingerprint: u32,
        requests: &mut mpsc::Receiver<Result<PushRequest, Status>>,
    ) -> Result<String, SnapshotError> {
        let package_name = package_file_name(&path.folder_name, fingerprint);
        let archive_dir = self.layout().archive_dir(&path.owner)?;
        let canonical = self.layout().canonical_dir(&path.owner, &path.folder_name)?;
        let final_path = self.layout().package_path(&path.owner, &package_name)?;
        tokio::fs::create_dir_all(&archive_dir).await?;

        let temp = tempfile::Builder::new()
            .prefix(&format!(".tmp.{}-", package_name))
            .tempfile_in(&archive_dir)?;
        let mut file = tokio::fs::File::from_std(temp.as_file().try_clone()?);
        let mut received = 0u64;
        while let Some(item) = requests.recv().await {
            match item {
                Ok(PushRequest::Chunk(data)) => {
                    file.write_all(&data).await?;
                    received += data.len() as u64;
                }
                Ok(PushRequest::Info(_)) => return Err(SnapshotError::DuplicateInfo),
                Err(status) => return Err(SnapshotError::Stream(status)),
            }
        }
        file.flush().await?;
        drop(file);
        debug!("received {} bytes for {}", received, package_name);

        let temp = task::spawn_blocking(move || unpack_snapshot(temp, canonical)).await??;
        persist_package(temp, final_path)?;
        Ok(package_name)
    }

    fn record_archive(
        &self,
        path: &RepositoryPath,
        fingerprint: u32,
        package_name: &str,
    ) -> Result<(), crate::store::StoreError> {
        let inserted = self.store.archives().insert_unless_exists(
            &ArchiveFilter::package(&path.owner, package_name),
            ArchiveRecord::new(&path.owner, &path.folder_name, fingerprint),
        )?;
        if inserted.is_none() {
            warn!("{} already recorded; keeping the existing record", package_name);
        }
        Ok(())
    }
}

fn unpack_snapshot(temp: NamedTempFile, canonical: PathBuf) -> Result<NamedTempFile, SnapshotError> {
    let written = Package::open(temp.path())?.unpack_into(&canonical)?;
    debug!("unpacked {} entries into {}", written.len(), canonical.display());
    Ok(temp)
}

fn persist_package(temp: NamedTempFile, final_path: PathBuf) -> Result<(), SnapshotError> {
    temp.persist(&final_path)
        .map(|_| ())
        .map_err(|err| SnapshotError::Io(err.error))
}

async fn send_clone_item(
    responses: &mpsc::Sender<CloneResponse>,
    item: CloneResponse,
) -> Result<(), Status> {
    responses
        .send(item)
        .await
        .map_err(|_| Status::cancelled("clone stream closed by peer"))
}
