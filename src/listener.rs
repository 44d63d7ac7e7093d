//! Mixer listener (C13): accepts one-shot editor connections, frames a
//! single command line, drives the request router, and writes the
//! response back before closing.
//!
//! Driven directly over `tokio::net::TcpListener` — the wire protocol
//! here is a bespoke line framing, not HTTP, so a routing framework
//! buys nothing.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::mixer::Router;
use crate::watch::Command as WatchCommand;

/// Runs until the listener errors or the process is signalled to stop.
/// One task per accepted connection; no keep-alive, no pipelining.
pub async fn serve(addr: SocketAddr, router: Arc<Router>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "mixer listener bound");
    loop {
        let (stream, peer) = listener.accept().await?;
        let router = router.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, router).await {
                tracing::warn!(%peer, error = %err, "mixer connection failed");
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, router: Arc<Router>) -> anyhow::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    let bytes_read = reader.read_line(&mut line).await?;
    if bytes_read == 0 {
        return Ok(()); // peer closed before sending anything
    }
    let command = line.trim_end_matches('\n').trim_end_matches('\r');
    let response = router.handle(command).await;
    write_half.write_all(response.as_bytes()).await?;
    write_half.shutdown().await?;
    Ok(())
}

/// Internal RPC: version/shutdown service. `v\n` replies with the
/// protocol version; `!\n` acknowledges and exits the process.
pub async fn serve_version_shutdown(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "version/shutdown listener bound");
    loop {
        let (stream, _) = listener.accept().await?;
        tokio::spawn(async move {
            let _ = handle_version_shutdown(stream).await;
        });
    }
}

async fn handle_version_shutdown(stream: TcpStream) -> anyhow::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(());
    }
    match line.trim_end() {
        "v" => {
            write_half.write_all(b"2").await?;
            write_half.shutdown().await?;
        }
        "!" => {
            write_half.shutdown().await?;
            std::process::exit(0);
        }
        _ => {}
    }
    Ok(())
}

/// Internal RPC: watcher-command listener. One line of shape
/// `(add|remove (dirs "p" …) (excludes "p" …)?)`; the response is
/// ignored by the caller, so the connection is simply closed after the
/// command is enqueued.
pub async fn serve_watcher_commands(addr: SocketAddr, tx: flume::Sender<WatchCommand>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "watcher-command listener bound");
    loop {
        let (stream, _) = listener.accept().await?;
        let tx = tx.clone();
        tokio::spawn(async move {
            let _ = handle_watcher_command(stream, tx).await;
        });
    }
}

async fn handle_watcher_command(stream: TcpStream, tx: flume::Sender<WatchCommand>) -> anyhow::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(());
    }
    let command = line.trim_end_matches('\n').trim_end_matches('\r');
    if let Ok(parsed) = crate::sexpr::parse(command) {
        dispatch_watcher_command(&parsed, &tx);
    }
    write_half.shutdown().await?;
    Ok(())
}

fn dispatch_watcher_command(parsed: &crate::sexpr::Value, tx: &flume::Sender<WatchCommand>) {
    use crate::sexpr::Value;

    let Some(op) = parsed.car().and_then(Value::symbol_name) else {
        return;
    };
    let dirs: Vec<PathBuf> = crate::sexpr::assoc_get(parsed, "dirs")
        .map(|v| v.iter_list().filter_map(|d| d.as_str()).map(PathBuf::from).collect())
        .unwrap_or_default();
    let excludes: Vec<String> = crate::sexpr::assoc_get(parsed, "excludes")
        .map(|v| v.iter_list().filter_map(|e| e.as_str()).map(str::to_owned).collect())
        .unwrap_or_default();
    match op {
        "add" => crate::watch::enqueue_add(tx, &dirs, &excludes),
        "remove" => crate::watch::enqueue_remove(tx, &dirs, &excludes),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::{RouterDefaults, SourceMap};
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn s1_ping_round_trips_over_the_wire() {
        let router = Arc::new(Router::new(
            SourceMap::new(),
            RouterDefaults {
                corpus: "corpus1".into(),
                language: "c++".into(),
                callers: false,
            },
        ));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let _ = handle_connection(stream, router).await;
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"(ping (language \"c++\"))\n").await.unwrap();
        client.shutdown().await.unwrap();
        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        assert_eq!(response, "((value t))");
    }
}
