//! TCP server hosting the sync engine.
//!
//! Every connection carries exactly one exchange, selected by its first
//! `Call` frame.

use crate::engine::SyncEngine;
use imagehub_protocol::{
    read_frame, write_frame, Call, CloneRequest, Frame, FrameResult, PushRequest, Reply, Status,
};
use log::{debug, error, info, warn};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

/// Items buffered between the connection and the engine.
const CHANNEL_DEPTH: usize = 16;

/// Pause after a failed accept, e.g. while the process is out of file
/// descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Handle to a server started with [`serve_background`].
pub struct ImagehubServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ImagehubServer {
    /// Address the listener is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections. Exchanges already running finish on
    /// their own.
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Accept connections on `addr` until the task is dropped.
pub async fn serve(addr: SocketAddr, engine: Arc<SyncEngine>) -> io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("imagehub server listening on {}", listener.local_addr()?);

    accept_loop(listener, engine, std::future::pending()).await;
    Ok(())
}

/// Start a server in the background. Pass port 0 to pick a free port.
pub async fn serve_background(
    addr: SocketAddr,
    engine: Arc<SyncEngine>,
) -> io::Result<ImagehubServer> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    info!("imagehub server started on {}", local_addr);

    tokio::spawn(async move {
        accept_loop(listener, engine, async {
            let _ = shutdown_rx.await;
        })
        .await;
        info!("imagehub server on {} shutting down", local_addr);
    });

    Ok(ImagehubServer {
        addr: local_addr,
        shutdown_tx: Some(shutdown_tx),
    })
}

/// Hand every accepted connection to its own task until `shutdown`
/// completes. Accept errors are logged and do not stop the loop.
async fn accept_loop<F>(listener: TcpListener, engine: Arc<SyncEngine>, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, remote_addr)) => {
                        debug!("connection from {}", remote_addr);
                        spawn_connection(stream, remote_addr, Arc::clone(&engine));
                    }
                    Err(e) => {
                        error!("accept error: {:?}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
            }
            _ = &mut shutdown => break,
        }
    }
}

fn spawn_connection<S>(stream: S, remote_addr: SocketAddr, engine: Arc<SyncEngine>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(err) = handle_connection(stream, engine).await {
            warn!("connection {} failed: {}", remote_addr, err);
        }
    });
}

/// Run one exchange over `stream`.
pub async fn handle_connection<S>(stream: S, engine: Arc<SyncEngine>) -> FrameResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    let call = match read_frame(&mut reader).await? {
        Some(Frame::Call(call)) => call,
        Some(other) => {
            let status = Status::invalid_argument(format!(
                "expected a call frame, got {}",
                other.name()
            ));
            write_frame(&mut writer, &Frame::Status(status)).await?;
            writer.shutdown().await?;
            return Ok(());
        }
        None => return Ok(()),
    };
    debug!("{} exchange started", call.name());

    match call {
        Call::Clone(request) => serve_clone(&engine, request, &mut writer).await?,
        Call::Push => serve_push(&engine, &mut reader, &mut writer).await?,
        Call::Check(request) => {
            let frame = match engine.check(request).await {
                Ok(response) => Frame::Reply(Reply::Check(response)),
                Err(status) => Frame::Status(status),
            };
            write_frame(&mut writer, &frame).await?;
        }
        Call::Register(request) => {
            let frame = match engine.register(request).await {
                Ok(response) => Frame::Reply(Reply::Register(response)),
                Err(status) => Frame::Status(status),
            };
            write_frame(&mut writer, &frame).await?;
        }
    }

    writer.shutdown().await?;
    Ok(())
}

async fn serve_clone<W>(
    engine: &Arc<SyncEngine>,
    request: CloneRequest,
    writer: &mut W,
) -> FrameResult<()>
where
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::channel(CHANNEL_DEPTH);
    let task_engine = Arc::clone(engine);
    let producer =
        tokio::spawn(async move { task_engine.clone_repository(request, tx).await });

    let mut written = Ok(());
    while let Some(item) = rx.recv().await {
        if let Err(err) = write_frame(writer, &Frame::from(item)).await {
            written = Err(err);
            break;
        }
    }
    // Unblocks a producer still waiting on a full channel.
    drop(rx);

    let outcome = producer
        .await
        .unwrap_or_else(|err| Err(Status::internal(format!("clone task failed: {}", err))));
    written?;

    let last = match outcome {
        Ok(()) => Frame::End,
        Err(status) => {
            debug!("clone failed: {}", status);
            Frame::Status(status)
        }
    };
    write_frame(writer, &last).await
}

async fn serve_push<R, W>(engine: &SyncEngine, reader: &mut R, writer: &mut W) -> FrameResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
    let (outcome, ()) = tokio::join!(engine.push(rx), forward_push_frames(reader, tx));

    let frame = match outcome {
        Ok(response) => Frame::Reply(Reply::Push(response)),
        Err(status) => Frame::Status(status),
    };
    write_frame(writer, &frame).await
}

/// Feed inbound push frames to the engine until `End`.
///
/// Once the engine stops listening the remaining frames are read and
/// discarded so the peer is never blocked before it reads the result.
async fn forward_push_frames<R>(
    reader: &mut R,
    tx: mpsc::Sender<Result<PushRequest, Status>>,
) where
    R: AsyncRead + Unpin,
{
    let mut tx = Some(tx);
    loop {
        let item = match read_frame(reader).await {
            Ok(Some(Frame::End)) => return,
            Ok(Some(frame)) => {
                PushRequest::try_from(frame).map_err(|err| Status::invalid_argument(err.to_string()))
            }
            Ok(None) => Err(Status::cancelled("push stream closed before end")),
            Err(err) => Err(Status::unknown(err.to_string())),
        };
        let terminal = item.is_err();

        if let Some(sender) = &tx {
            if sender.send(item).await.is_err() {
                tx = None;
            }
        }
        if terminal {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EngineConfig, LocalStore, ServerConfig};
    use imagehub_protocol::{CheckRequest, Code, Metadata};
    use tempfile::tempdir;
    use tokio::net::TcpStream;

    async fn check_over(addr: SocketAddr) -> Frame {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let call = Call::Check(CheckRequest {
            metadata: Metadata::new(1, "alice", "cats"),
        });
        write_frame(&mut stream, &Frame::Call(call)).await.unwrap();
        stream.flush().await.unwrap();
        read_frame(&mut stream).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_accept_loop_outlives_failed_connections() {
        let temp = tempdir().unwrap();
        let config = ServerConfig::default()
            .with_roots(temp.path().join("images"), temp.path().join("archive"));
        let engine = Arc::new(SyncEngine::new(
            EngineConfig::from(&config),
            Arc::new(LocalStore::in_memory()),
        ));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(accept_loop(listener, engine, async {
            let _ = stop_rx.await;
        }));

        // Peers that vanish mid-exchange do not stop the loop.
        for _ in 0..3 {
            drop(TcpStream::connect(addr).await.unwrap());
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"IMGH").await.unwrap();
            drop(stream);
        }

        for _ in 0..2 {
            match check_over(addr).await {
                Frame::Status(status) => assert_eq!(status.code(), Code::NotFound),
                other => panic!("unexpected frame: {:?}", other),
            }
        }

        stop_tx.send(()).unwrap();
        server.await.unwrap();
    }
}
