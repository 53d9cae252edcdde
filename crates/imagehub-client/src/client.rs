//! Transfer client issuing Push, Clone, Check and Register exchanges.

use crate::workdir::{self, Snapshot};
use crate::{ClientConfig, Error, Result};
use bytes::Bytes;
use imagehub_format::{LocalState, Package, PackageBuilder};
use imagehub_protocol::{
    read_frame, write_frame, Call, CheckRequest, CheckStatus, CloneRequest, Credentials, Frame,
    Metadata, PushResponse, RegisterRequest, RegisterResponse, Reply,
};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Credentials entered by the operator for a push.
#[derive(Clone)]
pub struct Login {
    /// Username or email.
    pub username: String,
    pub password: String,
}

impl Login {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Login {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Login")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// A completed clone.
#[derive(Debug, Clone)]
pub struct ClonedRepository {
    /// Directory created for the working copy.
    pub dir: PathBuf,
    /// Downloaded package inside `dir`.
    pub package_path: PathBuf,
    pub metadata: Metadata,
    /// Files written when the package was extracted.
    pub extracted: Vec<PathBuf>,
}

/// Client side of the sync protocol.
#[derive(Debug, Clone)]
pub struct TransferClient {
    config: ClientConfig,
}

impl TransferClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Expand a bare `owner/folder` into a URL under the configured base.
    /// Anything with a scheme is used as given.
    pub fn repository_url(&self, raw: &str) -> String {
        let raw = raw.trim();
        if raw.contains("://") {
            return raw.to_string();
        }
        let base = self.config.base_url.as_str();
        let path = raw.trim_start_matches('/');
        if base.is_empty() || base.ends_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    async fn connect(&self) -> Result<TcpStream> {
        let addr = self.config.server_addr.as_str();
        let stream = timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::Timeout(addr.to_string()))??;
        stream.set_nodelay(true)?;
        debug!("connected to {}", addr);
        Ok(stream)
    }

    /// Package the files of `dir` and push them to `repository_url`, which
    /// may be a bare `owner/folder`.
    ///
    /// The returned [`PushResponse`] carries the server's verdict, which
    /// may be a rejection; only transport and server-side protocol failures
    /// are reported as `Err`.
    pub async fn push<P: AsRef<Path>>(
        &self,
        dir: P,
        repository_url: &str,
        login: &Login,
    ) -> Result<PushResponse> {
        let repository_url = self.repository_url(repository_url);
        let snapshot = workdir::scan(dir.as_ref())?;
        if snapshot.is_empty() {
            warn!("{} has no files; pushing an empty snapshot", dir.as_ref().display());
        }
        let package = build_package(snapshot.clone()).await?;
        info!(
            "pushing {} file(s) as fingerprint {} to {}",
            snapshot.files.len(),
            snapshot.fingerprint,
            repository_url
        );

        let stream = self.connect().await?;
        let (mut reader, writer) = stream.into_split();
        let mut writer = BufWriter::new(writer);

        write_frame(&mut writer, &Frame::Call(Call::Push)).await?;
        write_frame(
            &mut writer,
            &Frame::Info(Credentials {
                username: login.username.clone(),
                password: login.password.clone(),
                repository_path: repository_url,
                fingerprint: snapshot.fingerprint,
            }),
        )
        .await?;

        let mut file = File::open(package.path()).await?;
        let mut buf = vec![0u8; self.config.chunk_size];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            write_frame(&mut writer, &Frame::Chunk(Bytes::copy_from_slice(&buf[..n]))).await?;
        }
        write_frame(&mut writer, &Frame::End).await?;
        writer.flush().await?;

        match expect_reply(&mut reader).await? {
            Reply::Push(response) => Ok(response),
            other => Err(unexpected_reply("push", &other)),
        }
    }

    /// Clone the latest snapshot of `repository_url` into a new directory
    /// under `parent`.
    ///
    /// The directory is named after the repository folder, with a random
    /// suffix when that name is taken. It receives the state file and the
    /// package; with `extract` the package is also unpacked in place.
    pub async fn clone_repository<P: AsRef<Path>>(
        &self,
        repository_url: &str,
        parent: P,
        extract: bool,
    ) -> Result<ClonedRepository> {
        let stream = self.connect().await?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let call = Call::Clone(CloneRequest {
            repository_path: self.repository_url(repository_url),
        });
        write_frame(&mut writer, &Frame::Call(call)).await?;
        writer.flush().await?;

        let metadata = match read_frame(&mut reader).await? {
            Some(Frame::Metadata(metadata)) => metadata,
            Some(Frame::Status(status)) => return Err(Error::Status(status)),
            Some(other) => {
                return Err(Error::Protocol(format!(
                    "expected clone metadata, got {}",
                    other.name()
                )))
            }
            None => return Err(closed("clone")),
        };

        let dir = workdir::create_clone_dir(parent.as_ref(), &metadata.folder_name)?;
        LocalState::new(metadata.fingerprint, &metadata.owner, &metadata.folder_name)
            .save(&dir)?;

        let package_path = workdir::local_package_path(&dir);
        let mut package = BufWriter::new(File::create(&package_path).await?);
        let mut received = 0u64;
        loop {
            match read_frame(&mut reader).await? {
                Some(Frame::Chunk(data)) => {
                    package.write_all(&data).await?;
                    received += data.len() as u64;
                }
                Some(Frame::End) => break,
                Some(Frame::Status(status)) => return Err(Error::Status(status)),
                Some(other) => {
                    return Err(Error::Protocol(format!(
                        "expected package chunk, got {}",
                        other.name()
                    )))
                }
                None => return Err(closed("clone")),
            }
        }
        package.flush().await?;
        drop(package);
        info!(
            "cloned {}/{} into {} ({} bytes)",
            metadata.owner,
            metadata.folder_name,
            dir.display(),
            received
        );

        let extracted = if extract {
            unpack_package(package_path.clone(), dir.clone()).await?
        } else {
            Vec::new()
        };

        Ok(ClonedRepository {
            dir,
            package_path,
            metadata,
            extracted,
        })
    }

    /// Ask whether the working copy in `dir` is the latest snapshot.
    pub async fn check<P: AsRef<Path>>(&self, dir: P) -> Result<CheckStatus> {
        let state = LocalState::load(dir.as_ref())?;
        let metadata = Metadata::new(state.fingerprint, state.owner, state.folder_name);
        match self.unary(Call::Check(CheckRequest { metadata })).await? {
            Reply::Check(response) => Ok(response.status),
            other => Err(unexpected_reply("check", &other)),
        }
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<RegisterResponse> {
        if request.password != request.password_confirmation {
            return Err(Error::InvalidInput("passwords don't match".to_string()));
        }
        match self.unary(Call::Register(request)).await? {
            Reply::Register(response) => Ok(response),
            other => Err(unexpected_reply("register", &other)),
        }
    }

    async fn unary(&self, call: Call) -> Result<Reply> {
        let mut stream = self.connect().await?;
        write_frame(&mut stream, &Frame::Call(call)).await?;
        stream.flush().await?;
        expect_reply(&mut stream).await
    }
}

async fn expect_reply<R>(reader: &mut R) -> Result<Reply>
where
    R: tokio::io::AsyncRead + Unpin,
{
    match read_frame(reader).await? {
        Some(Frame::Reply(reply)) => Ok(reply),
        Some(Frame::Status(status)) => Err(Error::Status(status)),
        Some(other) => Err(Error::Protocol(format!(
            "expected a reply, got {}",
            other.name()
        ))),
        None => Err(closed("reply")),
    }
}

fn unexpected_reply(exchange: &str, reply: &Reply) -> Error {
    Error::Protocol(format!("unexpected reply to {}: {:?}", exchange, reply))
}

fn closed(exchange: &str) -> Error {
    Error::Protocol(format!("server closed the {} stream early", exchange))
}

async fn build_package(snapshot: Snapshot) -> Result<tempfile::NamedTempFile> {
    tokio::task::spawn_blocking(move || -> Result<tempfile::NamedTempFile> {
        let temp = tempfile::Builder::new()
            .prefix(".tmp.imagehub-push-")
            .suffix(".zip")
            .tempfile()?;
        let file = temp.reopen()?;
        PackageBuilder::new().with_files(snapshot.files).write_to(file)?;
        Ok(temp)
    })
    .await
    .map_err(|err| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, err)))?
}

async fn unpack_package(package_path: PathBuf, dir: PathBuf) -> Result<Vec<PathBuf>> {
    tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>> {
        Ok(Package::open(&package_path)?.unpack_into(&dir)?)
    })
    .await
    .map_err(|err| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, err)))?
}
