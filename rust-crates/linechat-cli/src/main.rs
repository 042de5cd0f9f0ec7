//! linechat-cli - interactive line client
//!
//! Prints every line the server sends and forwards every stdin line to it.

use anyhow::{Context, Result};
use clap::Parser;
use linechat_protocol::{split, LineReader, ReadOutcome};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[derive(Debug, Parser)]
#[command(name = "linechat-cli", version)]
struct Args {
    /// Server host
    host: String,

    /// Server port
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let stream = TcpStream::connect((args.host.as_str(), args.port))
        .await
        .with_context(|| format!("Failed to connect to {}:{}", args.host, args.port))?;
    let (reader, mut writer) = split(stream);

    println!(
        "[client] connected to {}:{}. Type a line and press Enter. Ctrl+C to quit.",
        args.host, args.port
    );

    // Reading lives in its own task; read_line must not be cancelled mid-line
    let mut receiver = tokio::spawn(print_incoming(reader));
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = &mut receiver => break,
            line = stdin.next_line() => match line.context("Failed to read stdin")? {
                Some(line) => writer.write_line(&line).await
                    .context("Failed to send line")?,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let _ = writer.shutdown().await;
    receiver.abort();
    println!("[client] bye");
    Ok(())
}

/// Print server lines until the connection ends
async fn print_incoming<R: AsyncRead + Unpin>(mut reader: LineReader<R>) {
    let mut stdout = tokio::io::stdout();

    loop {
        match reader.read_line().await {
            Ok(ReadOutcome::Line(line)) => {
                let shown = format!("[recv] {}\n", line);
                if stdout.write_all(shown.as_bytes()).await.is_err() {
                    break;
                }
                let _ = stdout.flush().await;
            }
            Ok(ReadOutcome::Oversized) => {
                println!("[client] skipped an oversized line");
            }
            Ok(ReadOutcome::Eof) => {
                println!("[client] server closed the connection.");
                break;
            }
            Err(e) => {
                println!("[client] connection error: {}", e);
                break;
            }
        }
    }
}
