use std::sync::Arc;
use std::time::Duration;

use tailcast::{LogServer, Severity, MAX_CLIENTS};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

const READ_TIMEOUT: Duration = Duration::from_secs(2);

async fn connect(port: u16) -> BufReader<TcpStream> {
    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    BufReader::new(stream)
}

async fn read_line(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    timeout(READ_TIMEOUT, reader.read_line(&mut line))
        .await
        .expect("timed out waiting for a line")
        .unwrap();
    line
}

/// Connect and consume the handshake, leaving the stream positioned at the
/// first log line. Sleeps briefly so the server has registered the client
/// before the caller starts logging.
async fn attach_observer(port: u16) -> BufReader<TcpStream> {
    let mut reader = connect(port).await;
    assert_eq!(read_line(&mut reader).await, "0 OK\n");
    tokio::time::sleep(Duration::from_millis(100)).await;
    reader
}

#[tokio::test]
async fn test_port_reflects_lifecycle() {
    let server = LogServer::new();
    assert_eq!(server.port(), 0);

    server.start().await;
    let port = server.port();
    assert_ne!(port, 0);

    // Double start is a no-op
    server.start().await;
    assert_eq!(server.port(), port);

    server.stop().await;
    assert_eq!(server.port(), 0);

    // Double stop is a no-op
    server.stop().await;
    assert_eq!(server.port(), 0);
}

#[tokio::test]
async fn test_handshake_then_filtered_stream() {
    let server = LogServer::new();
    server.start().await;
    server.set_level(Severity::Info);

    let mut observer = attach_observer(server.port()).await;

    server.log(Severity::Info, "TEST", "hello");
    let line = read_line(&mut observer).await;
    assert!(line.contains("TEST"));
    assert!(line.contains("hello"));
    assert_eq!(line, "INFO:TEST: hello\n");

    // Below the threshold: nothing may arrive. The next line the observer
    // sees must be the warning emitted afterwards.
    server.log(Severity::Debug, "TEST", "invisible");
    server.log(Severity::Warning, "TEST", "visible");
    assert_eq!(read_line(&mut observer).await, "WARNING:TEST: visible\n");

    server.stop().await;
}

#[tokio::test]
async fn test_two_observers_see_identical_sequence() {
    let server = LogServer::new();
    server.start().await;

    let mut first = attach_observer(server.port()).await;
    let mut second = attach_observer(server.port()).await;

    for i in 0..20 {
        server.info("SEQ", &format!("message {}", i));
    }

    for i in 0..20 {
        let expected = format!("INFO:SEQ: message {}\n", i);
        assert_eq!(read_line(&mut first).await, expected);
        assert_eq!(read_line(&mut second).await, expected);
    }

    server.stop().await;
}

#[tokio::test]
async fn test_disconnect_does_not_affect_other_observers() {
    let server = LogServer::new();
    server.start().await;

    let first = attach_observer(server.port()).await;
    let mut second = attach_observer(server.port()).await;

    server.info("TEST", "before disconnect");
    assert_eq!(
        read_line(&mut second).await,
        "INFO:TEST: before disconnect\n"
    );

    drop(first);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Logging must neither fail nor skip the surviving observer.
    server.info("TEST", "after disconnect");
    assert_eq!(read_line(&mut second).await, "INFO:TEST: after disconnect\n");

    server.stop().await;
}

#[tokio::test]
async fn test_stop_closes_observers() {
    let server = LogServer::new();
    server.start().await;

    let mut observer = attach_observer(server.port()).await;

    server.stop().await;
    assert_eq!(server.port(), 0);

    // The connection is closed; the observer reads EOF, not more lines.
    let mut line = String::new();
    let n = timeout(READ_TIMEOUT, observer.read_line(&mut line))
        .await
        .expect("timed out waiting for EOF")
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_restart_serves_new_observers() {
    let server = LogServer::new();
    server.start().await;
    server.stop().await;

    server.start().await;
    assert_ne!(server.port(), 0);

    let mut observer = attach_observer(server.port()).await;
    server.info("RESTART", "back again");
    assert_eq!(read_line(&mut observer).await, "INFO:RESTART: back again\n");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_logging_from_plain_threads() {
    let server = Arc::new(LogServer::new());
    server.start().await;

    let mut observer = attach_observer(server.port()).await;

    // The publish path is synchronous and must work from threads that have
    // no runtime of their own.
    let producer = std::thread::spawn({
        let server = Arc::clone(&server);
        move || {
            for i in 0..10 {
                server.info("THREAD", &format!("line {}", i));
            }
        }
    });
    producer.join().unwrap();

    for i in 0..10 {
        assert_eq!(
            read_line(&mut observer).await,
            format!("INFO:THREAD: line {}\n", i)
        );
    }

    server.stop().await;
}

#[tokio::test]
async fn test_capacity_refusal_handshake() {
    let server = LogServer::new();
    server.start().await;

    let mut held = Vec::new();
    for _ in 0..MAX_CLIENTS {
        held.push(connect(server.port()).await);
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut extra = connect(server.port()).await;
    assert_eq!(read_line(&mut extra).await, "1 too many connections\n");

    // Refused connections are closed right after the status line.
    let mut rest = String::new();
    let n = timeout(READ_TIMEOUT, extra.read_line(&mut rest))
        .await
        .expect("timed out waiting for EOF")
        .unwrap();
    assert_eq!(n, 0);

    server.stop().await;
}
