//! Test connections over loopback TCP, with the default resolver and connector.
use std::io;
use std::time::Duration;

use icystream::{Callbacks, Connection, ErrorKind, TcpConfig, Termination};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

async fn read_request(stream: &mut TcpStream) -> io::Result<String> {
    let mut request = Vec::new();
    let mut buf = [0u8; 256];
    while !request.windows(4).any(|window| window == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        request.extend_from_slice(&buf[..n]);
    }
    Ok(String::from_utf8_lossy(&request).into_owned())
}

#[tokio::test]
async fn loopback_stream() -> Result<(), BoxError> {
    let _ = tracing_subscriber::fmt::try_init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await?;
        let request = read_request(&mut stream).await?;
        stream.write_all(b"ICY 200 OK\r\n").await?;
        for _ in 0..4 {
            stream.write_all(&[0xd3; 256]).await?;
        }
        stream.shutdown().await?;
        Ok::<_, io::Error>(request)
    });

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let termination = Connection::builder("127.0.0.1", port)
        .mountpoint("RTCM3")
        .credentials("user", "pass")
        .tcp_config(TcpConfig {
            connect_timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        })
        .build()?
        .run(Callbacks::new().on_data(move |bytes: &[u8]| {
            let _ = tx.send(bytes.len());
        }))
        .await?;
    assert_eq!(termination, Termination::Eof);

    let mut received = 0;
    while let Ok(n) = rx.try_recv() {
        received += n;
    }
    assert_eq!(received, 1024);

    let request = server.await??;
    assert!(request.starts_with("GET /RTCM3 HTTP/1.1\r\n"));
    assert!(request.contains(&format!("Host: 127.0.0.1:{port}\r\n")));
    assert!(request.contains("Authorization: Basic dXNlcjpwYXNz\r\n"));
    assert!(request.contains("User-Agent: NTRIP icystream/"));
    Ok(())
}

#[tokio::test]
async fn connection_refused() -> Result<(), BoxError> {
    let _ = tracing_subscriber::fmt::try_init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    drop(listener);

    let (tx, rx) = tokio::sync::oneshot::channel();
    let mut tx = Some(tx);
    let handle = Connection::new("127.0.0.1", port)?.start(Callbacks::new().on_error(
        move |error: &icystream::Error| {
            if let Some(tx) = tx.take() {
                let _ = tx.send(error.kind());
            }
        },
    ));

    let error = handle.join().await.unwrap_err();
    assert_eq!(
        error.io().map(io::Error::kind),
        Some(io::ErrorKind::ConnectionRefused)
    );
    assert_eq!(rx.await?, ErrorKind::Io);
    Ok(())
}
