//! Connect to an ICY / NTRIP stream and copy the body to stdout.
//!
//! Headers (when the server sends any) and the final outcome are reported on
//! stderr. Use `--help` to see the options; set `RUST_LOG=icystream=debug` to
//! follow the connection.

use std::time::Duration;

use icystream::{Callbacks, Connection};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = clap::Command::new("icy-dump")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Dump an ICY / NTRIP stream to stdout")
        .arg(
            clap::Arg::new("host")
                .help("The server host")
                .required(true),
        )
        .arg(
            clap::Arg::new("port")
                .help("The server port")
                .value_parser(clap::value_parser!(u16))
                .default_value("2101"),
        )
        .arg(
            clap::Arg::new("mountpoint")
                .short('m')
                .long("mountpoint")
                .help("The mountpoint to request"),
        )
        .arg(clap::Arg::new("user").short('u').long("user"))
        .arg(clap::Arg::new("password").short('p').long("password"))
        .arg(
            clap::Arg::new("ntrip2")
                .long("ntrip2")
                .help("Send the Ntrip-Version: Ntrip/2.0 header")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            clap::Arg::new("gga")
                .long("gga")
                .help("NMEA GGA sentence to report to the caster once streaming"),
        )
        .arg(
            clap::Arg::new("timeout")
                .short('t')
                .long("timeout")
                .help("Idle timeout in seconds, 0 to disable")
                .value_parser(clap::value_parser!(u64))
                .default_value("10"),
        )
        .get_matches();

    let host = args
        .get_one::<String>("host")
        .ok_or_else(|| color_eyre::eyre::eyre!("host argument must be present"))?;
    let port = args.get_one::<u16>("port").copied().unwrap_or(2101);
    let timeout = Duration::from_secs(args.get_one::<u64>("timeout").copied().unwrap_or(10));

    let mut builder = Connection::builder(host.as_str(), port);
    if let Some(mountpoint) = args.get_one::<String>("mountpoint") {
        builder = builder.mountpoint(mountpoint);
    }
    if let Some(user) = args.get_one::<String>("user") {
        let password = args.get_one::<String>("password").cloned().unwrap_or_default();
        builder = builder.credentials(user.as_str(), password);
    }
    if args.get_flag("ntrip2") {
        builder = builder.header("Ntrip-Version", "Ntrip/2.0");
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Vec<u8>>();
    let callbacks = Callbacks::new()
        .on_headers(|headers| {
            for (name, value) in headers.iter() {
                eprintln!("  {name}: {}", String::from_utf8_lossy(value));
            }
        })
        .on_data(move |bytes: &[u8]| {
            let _ = tx.send(bytes.to_vec());
        });

    let handle = builder.build()?.start_with_timeout(callbacks, timeout);
    let shutdown = handle.shutdown_handle();

    if let Some(gga) = args.get_one::<String>("gga") {
        handle.send(format!("{}\r\n", gga.trim_end()))?;
    }

    let writer = tokio::spawn(async move {
        use tokio::io::AsyncWriteExt as _;

        let mut stdout = tokio::io::stdout();
        let mut total = 0usize;
        while let Some(bytes) = rx.recv().await {
            total += bytes.len();
            stdout.write_all(&bytes).await?;
        }
        stdout.flush().await?;
        Ok::<_, std::io::Error>(total)
    });

    tokio::select! {
        outcome = handle.join() => {
            let termination = outcome?;
            let total = writer.await??;
            eprintln!("Stream ended ({termination:?}) after {total} bytes");
        }
        _ = tokio::signal::ctrl_c() => {
            shutdown.shutdown();
            eprintln!("Interrupted");
        }
    }

    Ok(())
}
