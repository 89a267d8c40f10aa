//! TCP round trips against a live listener.

mod common;

use std::time::Duration;

use common::TestWorld;
use fierycms::api::server::serve;
use fierycms::api::ApiResponse;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

async fn start(world: &TestWorld, max_line: usize) -> (std::net::SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    let api = world.api.clone();
    let handle = tokio::spawn(async move {
        serve(listener, api, max_line, async {
            let _ = rx.await;
        })
        .await
        .unwrap();
    });
    (addr, tx, handle)
}

async fn exchange(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> ApiResponse {
    let mut line = String::new();
    tokio::time::timeout(Duration::from_secs(5), reader.read_line(&mut line))
        .await
        .expect("response in time")
        .unwrap();
    serde_json::from_str(&line).unwrap()
}

#[tokio::test]
async fn requests_are_answered_in_order() {
    let world = TestWorld::new();
    let (addr, shutdown, handle) = start(&world, 64 * 1024).await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let requests = concat!(
        r#"{"id":1,"operation":"createZone","actor":"root","args":{"data":{"id":30,"name":"Midgaard"}}}"#,
        "\n",
        "\n",
        r#"{"id":2,"operation":"zones","actor":"root"}"#,
        "\n",
        r#"{"id":3,"operation":"zone","actor":"root","args":{"id":99}}"#,
        "\n",
        "garbage\n",
    );
    write_half.write_all(requests.as_bytes()).await.unwrap();

    let created = exchange(&mut reader).await;
    assert_eq!(created.id, Some(serde_json::json!(1)));
    assert_eq!(created.data.as_ref().unwrap()["name"], "Midgaard");

    let listed = exchange(&mut reader).await;
    assert_eq!(listed.id, Some(serde_json::json!(2)));
    assert_eq!(listed.data.unwrap().as_array().unwrap().len(), 1);

    let missing = exchange(&mut reader).await;
    assert_eq!(missing.id, Some(serde_json::json!(3)));
    assert_eq!(missing.error_code(), Some("NOT_FOUND"));

    let bad = exchange(&mut reader).await;
    assert_eq!(bad.error_code(), Some("BAD_USER_INPUT"));

    shutdown.send(()).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn oversized_line_is_skipped() {
    let world = TestWorld::new();
    let (addr, shutdown, handle) = start(&world, 128).await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let big = format!("{{\"operation\":\"zones\",\"actor\":\"{}\"}}\n", "x".repeat(512));
    write_half.write_all(big.as_bytes()).await.unwrap();
    write_half
        .write_all(b"{\"id\":\"after\",\"operation\":\"zones\",\"actor\":\"root\"}\n")
        .await
        .unwrap();

    let resp = exchange(&mut reader).await;
    assert_eq!(resp.error_code(), Some("BAD_USER_INPUT"));
    let next = exchange(&mut reader).await;
    assert_eq!(next.id, Some(serde_json::json!("after")));
    assert!(next.errors.is_none());

    shutdown.send(()).unwrap();
    handle.await.unwrap();
}
