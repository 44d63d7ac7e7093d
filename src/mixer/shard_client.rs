//! Remote shard client (C8): one TCP connection per RPC. Connects, writes
//! the request line, reads until the peer half-closes, and reports the
//! bytes to the owning result holder.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::result_holder::ResultHolder;

/// Issues one RPC against `addr`. Spawned as its own task per in-flight
/// request: a cooperative task standing in for one event-loop thread per
/// in-flight RPC.
pub async fn query_shard(addr: SocketAddr, request: String, holder: Arc<ResultHolder>) {
    let stream = match TcpStream::connect(addr).await {
        Ok(stream) => stream,
        Err(err) => {
            holder.report_failure(format!("failed to connect to {addr}: {err}"));
            return;
        }
    };
    match run(stream, &request).await {
        Ok(response) => holder.report_success(response),
        Err(err) => holder.report_failure(format!("rpc to {addr} failed: {err}")),
    }
}

async fn run(mut stream: TcpStream, request: &str) -> std::io::Result<String> {
    stream.write_all(request.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.shutdown().await.ok();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
