//! Test the idle timeout against a paused clock.
use std::future::ready;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use icystream::dns::SocketAddrs;
use icystream::{Callbacks, Connection, ConnectionHandle, Error, ErrorKind, State, Termination};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::Instant;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Start a connection which talks to `server`'s end of an in-memory stream.
fn start(timeout: Duration, callbacks: Callbacks) -> (ConnectionHandle, DuplexStream) {
    let (client, server) = tokio::io::duplex(1024);
    let mut client = Some(client);
    let addr: SocketAddr = "10.0.0.1:0".parse().unwrap();

    let handle = Connection::builder("caster.test", 2101)
        .with_resolver(tower::service_fn(move |_host: Box<str>| {
            ready(Ok::<_, io::Error>(SocketAddrs::from_iter([addr])))
        }))
        .with_connector(tower::service_fn(move |_addr: SocketAddr| {
            ready(
                client
                    .take()
                    .ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionRefused)),
            )
        }))
        .build()
        .unwrap()
        .start_with_timeout(callbacks, timeout);

    (handle, server)
}

async fn skip_request(stream: &mut DuplexStream) -> io::Result<()> {
    let mut request = Vec::new();
    let mut buf = [0u8; 256];
    while !request.windows(4).any(|window| window == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        request.extend_from_slice(&buf[..n]);
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stalled_stream_times_out() -> Result<(), BoxError> {
    let _ = tracing_subscriber::fmt::try_init();

    let (tx, rx) = tokio::sync::oneshot::channel();
    let mut tx = Some(tx);
    let callbacks = Callbacks::new().on_error(move |error: &Error| {
        if let Some(tx) = tx.take() {
            let _ = tx.send(error.kind());
        }
    });

    let began = Instant::now();
    let (handle, mut server) = start(Duration::from_secs(2), callbacks);

    let server = tokio::spawn(async move {
        skip_request(&mut server).await?;
        server.write_all(b"ICY 200 OK\r\nX").await?;

        let mut buf = [0u8; 64];
        while server.read(&mut buf).await? > 0 {}
        Ok::<_, io::Error>(())
    });

    let error = handle.join().await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::ConnectionTimeout);
    assert_eq!(rx.await?, ErrorKind::ConnectionTimeout);
    assert!(began.elapsed() >= Duration::from_secs(2));

    server.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn slow_progress_does_not_time_out() -> Result<(), BoxError> {
    let _ = tracing_subscriber::fmt::try_init();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let callbacks = Callbacks::new().on_data(move |bytes: &[u8]| {
        let _ = tx.send(bytes.to_vec());
    });

    let began = Instant::now();
    let (handle, mut server) = start(Duration::from_secs(2), callbacks);

    tokio::spawn(async move {
        skip_request(&mut server).await?;
        server.write_all(b"ICY 200 OK\r\n").await?;
        for byte in b"SLOW" {
            tokio::time::sleep(Duration::from_secs(1)).await;
            server.write_all(&[*byte]).await?;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        server.shutdown().await
    });

    assert_eq!(handle.join().await?, Termination::Eof);
    assert!(began.elapsed() >= Duration::from_secs(5));

    let mut received = Vec::new();
    while let Ok(bytes) = rx.try_recv() {
        received.extend(bytes);
    }
    assert_eq!(received, b"SLOW");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn zero_timeout_is_disabled() -> Result<(), BoxError> {
    let _ = tracing_subscriber::fmt::try_init();

    let (handle, mut server) = start(Duration::ZERO, Callbacks::new());

    tokio::spawn(async move {
        skip_request(&mut server).await?;
        server.write_all(b"ICY 200 OK\r\n").await?;

        let mut buf = [0u8; 64];
        while server.read(&mut buf).await? > 0 {}
        Ok::<_, io::Error>(())
    });

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert!(handle.is_active());

    handle.shutdown();
    assert_eq!(handle.join().await?, Termination::Shutdown);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn state_is_closed_after_timeout() -> Result<(), BoxError> {
    let _ = tracing_subscriber::fmt::try_init();

    // The server never answers the request.
    let (handle, _server) = start(Duration::from_secs(1), Callbacks::new());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(handle.state(), State::Closed);

    let error = handle.join().await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::ConnectionTimeout);
    Ok(())
}
