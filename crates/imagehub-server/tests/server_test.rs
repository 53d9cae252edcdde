use bytes::Bytes;
use imagehub_protocol::{
    read_frame, write_frame, Call, CheckRequest, Code, Credentials, Frame, Metadata, Reply,
};
use imagehub_server::store::{ArchiveRecord, RecordStore};
use imagehub_server::{
    handle_connection, serve_background, EngineConfig, LocalStore, ServerConfig, SyncEngine,
};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};
use tokio::io::{duplex, AsyncWriteExt};
use tokio::net::TcpStream;

fn engine(temp: &TempDir, store: Arc<LocalStore>) -> Arc<SyncEngine> {
    let config = ServerConfig::default()
        .with_roots(temp.path().join("images"), temp.path().join("archive"))
        .with_password_cost(4);
    Arc::new(SyncEngine::new(EngineConfig::from(&config), store))
}

#[tokio::test]
async fn test_check_exchange() {
    let temp = tempdir().unwrap();
    let store = Arc::new(LocalStore::in_memory());
    store
        .archives()
        .insert_one(ArchiveRecord::new("alice", "cats", 5))
        .unwrap();
    let engine = engine(&temp, store);

    let (mut client, server) = duplex(64 * 1024);
    let handler = tokio::spawn(handle_connection(server, engine));

    let call = Call::Check(CheckRequest {
        metadata: Metadata::new(5, "alice", "cats"),
    });
    write_frame(&mut client, &Frame::Call(call)).await.unwrap();

    match read_frame(&mut client).await.unwrap() {
        Some(Frame::Reply(Reply::Check(response))) => {
            assert_eq!(response.status, imagehub_protocol::CheckStatus::UpToDate)
        }
        other => panic!("unexpected frame: {:?}", other),
    }
    assert!(read_frame(&mut client).await.unwrap().is_none());
    handler.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_rejected_push_drains_and_replies() {
    let temp = tempdir().unwrap();
    let engine = engine(&temp, Arc::new(LocalStore::in_memory()));

    let (mut client, server) = duplex(8 * 1024);
    let handler = tokio::spawn(handle_connection(server, engine));

    write_frame(&mut client, &Frame::Call(Call::Push)).await.unwrap();
    write_frame(
        &mut client,
        &Frame::Info(Credentials {
            username: "ghost".to_string(),
            password: "pw".to_string(),
            repository_path: "http://localhost:5000/ghost/cats".to_string(),
            fingerprint: 1,
        }),
    )
    .await
    .unwrap();
    // Far more than the pipe and channel buffer together.
    let chunk = Bytes::from(vec![7u8; 4096]);
    for _ in 0..64 {
        write_frame(&mut client, &Frame::Chunk(chunk.clone()))
            .await
            .unwrap();
    }
    write_frame(&mut client, &Frame::End).await.unwrap();

    match read_frame(&mut client).await.unwrap() {
        Some(Frame::Reply(Reply::Push(response))) => {
            assert_eq!(response.result, "Invalid username field: ghost")
        }
        other => panic!("unexpected frame: {:?}", other),
    }
    handler.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_first_frame_must_be_call() {
    let temp = tempdir().unwrap();
    let engine = engine(&temp, Arc::new(LocalStore::in_memory()));

    let (mut client, server) = duplex(1024);
    let handler = tokio::spawn(handle_connection(server, engine));

    write_frame(&mut client, &Frame::End).await.unwrap();
    match read_frame(&mut client).await.unwrap() {
        Some(Frame::Status(status)) => assert_eq!(status.code(), Code::InvalidArgument),
        other => panic!("unexpected frame: {:?}", other),
    }
    handler.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_clone_failure_is_status_frame() {
    let temp = tempdir().unwrap();
    let engine = engine(&temp, Arc::new(LocalStore::in_memory()));

    let (mut client, server) = duplex(1024);
    let handler = tokio::spawn(handle_connection(server, engine));

    let call = Call::Clone(imagehub_protocol::CloneRequest {
        repository_path: "http://localhost:5000/nobody/cats".to_string(),
    });
    write_frame(&mut client, &Frame::Call(call)).await.unwrap();
    match read_frame(&mut client).await.unwrap() {
        Some(Frame::Status(status)) => assert_eq!(status.code(), Code::NotFound),
        other => panic!("unexpected frame: {:?}", other),
    }
    handler.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_background_server_accepts_and_shuts_down() {
    let temp = tempdir().unwrap();
    let engine = engine(&temp, Arc::new(LocalStore::in_memory()));
    let server = serve_background("127.0.0.1:0".parse().unwrap(), engine)
        .await
        .unwrap();
    let addr = server.addr();
    assert_ne!(addr.port(), 0);

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let call = Call::Check(CheckRequest {
        metadata: Metadata::new(9, "alice", "cats"),
    });
    write_frame(&mut stream, &Frame::Call(call)).await.unwrap();
    stream.flush().await.unwrap();
    match read_frame(&mut stream).await.unwrap() {
        Some(Frame::Status(status)) => assert_eq!(status.code(), Code::NotFound),
        other => panic!("unexpected frame: {:?}", other),
    }

    server.shutdown();
}
