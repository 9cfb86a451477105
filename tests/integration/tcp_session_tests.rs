//! Sessions over real TCP connections through the endpoint listener.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use noise_generator::models::endpoint::EndpointAddress;
use noise_generator::protocol::{encode, Probe, Tag};
use noise_generator::session::listener;
use noise_generator::AppError;

use super::test_helpers::{session_context, wait_until};

async fn next_line<R: tokio::io::AsyncBufRead + Unpin>(lines: &mut tokio::io::Lines<R>) -> Option<String> {
    tokio::time::timeout(Duration::from_secs(5), lines.next_line())
        .await
        .expect("line timed out")
        .expect("read")
}

#[tokio::test]
async fn connected_shell_is_probed_and_identified() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_config, ctx, _db) = session_context(dir.path()).await;
    let endpoints = ctx.endpoints.clone();

    let tcp = listener::bind("127.0.0.1:0".parse().expect("addr")).await.expect("bind");
    let server_addr = tcp.local_addr().expect("local addr");
    let cancel = CancellationToken::new();
    let serve = tokio::spawn(listener::serve(tcp, ctx, cancel.clone()));

    let stream = TcpStream::connect(server_addr).await.expect("connect");
    let address = EndpointAddress::from(stream.local_addr().expect("client addr"));
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let first = next_line(&mut lines).await.expect("uname probe");
    assert_eq!(format!("{first}\n"), encode("uname -a", Tag::Probe(Probe::Uname)));
    let second = next_line(&mut lines).await.expect("whoami probe");
    assert_eq!(format!("{second}\n"), encode("whoami", Tag::Probe(Probe::Whoami)));

    write_half
        .write_all(b"[PRIORITY_uname] Linux box1 5.15\r\n[PRIORITY_whoami] root\r\n")
        .await
        .expect("reply");

    let resolved = wait_until(|| {
        let endpoints = endpoints.clone();
        async move {
            endpoints
                .get(&address)
                .await
                .ok()
                .flatten()
                .is_some_and(|r| r.uname.is_some() && r.user.is_some())
        }
    })
    .await;
    assert!(resolved, "identity never resolved");

    let record = endpoints.get(&address).await.expect("get").expect("record");
    assert_eq!(record.uname.as_deref(), Some("Linux box1 5.15"));
    assert_eq!(record.user.as_deref(), Some("root"));

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), serve)
        .await
        .expect("listener did not stop")
        .expect("join");

    // Sessions are children of the listener's token.
    let mut closed = false;
    for _ in 0..10 {
        if next_line(&mut lines).await.is_none() {
            closed = true;
            break;
        }
    }
    assert!(closed, "session stayed open after shutdown");
}

#[tokio::test]
async fn concurrent_shells_get_separate_records() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_config, ctx, _db) = session_context(dir.path()).await;
    let endpoints = ctx.endpoints.clone();

    let tcp = listener::bind("127.0.0.1:0".parse().expect("addr")).await.expect("bind");
    let server_addr = tcp.local_addr().expect("local addr");
    let cancel = CancellationToken::new();
    tokio::spawn(listener::serve(tcp, ctx, cancel.clone()));

    let first = TcpStream::connect(server_addr).await.expect("first");
    let second = TcpStream::connect(server_addr).await.expect("second");

    let registered = wait_until(|| {
        let endpoints = endpoints.clone();
        async move { endpoints.list().await.is_ok_and(|records| records.len() == 2) }
    })
    .await;
    assert!(registered, "both shells should be registered");

    let addresses: Vec<_> = endpoints
        .list()
        .await
        .expect("list")
        .into_iter()
        .map(|r| r.address)
        .collect();
    assert!(addresses.contains(&EndpointAddress::from(first.local_addr().expect("addr"))));
    assert!(addresses.contains(&EndpointAddress::from(second.local_addr().expect("addr"))));

    cancel.cancel();
}

#[tokio::test]
async fn one_shell_hanging_up_leaves_others_running() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_config, ctx, _db) = session_context(dir.path()).await;

    let tcp = listener::bind("127.0.0.1:0".parse().expect("addr")).await.expect("bind");
    let server_addr = tcp.local_addr().expect("local addr");
    let cancel = CancellationToken::new();
    tokio::spawn(listener::serve(tcp, ctx, cancel.clone()));

    let stay = TcpStream::connect(server_addr).await.expect("stay");
    let leave = TcpStream::connect(server_addr).await.expect("leave");
    let mut stay_lines = BufReader::new(stay).lines();
    next_line(&mut stay_lines).await.expect("uname probe");
    drop(leave);

    let whoami = next_line(&mut stay_lines).await.expect("whoami probe");
    assert!(whoami.contains("[PRIORITY_whoami]"));

    cancel.cancel();
}

#[tokio::test]
async fn bind_on_taken_port_is_a_transport_error() {
    let taken = listener::bind("127.0.0.1:0".parse().expect("addr")).await.expect("bind");
    let addr = taken.local_addr().expect("local addr");

    let err = listener::bind(addr).await.expect_err("port in use");
    assert!(matches!(err, AppError::Transport(_)), "{err}");
}
