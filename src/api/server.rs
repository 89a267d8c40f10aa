//! Line-delimited JSON transport for [`Api`].
//!
//! One request object per line in, one response object per line out.
//! Requests on a connection are answered in order; separate connections run
//! concurrently. Store work happens on the blocking pool.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use log::{debug, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use uuid::Uuid;

use super::{Api, ApiRequest, ApiResponse};
use crate::logutil::escape_log;
use crate::metrics;

/// Default cap on a single request line.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Bind `bind` and serve until ctrl-c.
pub async fn run(api: Arc<Api>, bind: SocketAddr, max_line_bytes: usize) -> Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!("API listening on {}", listener.local_addr()?);
    serve(listener, api, max_line_bytes, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("ctrl-c handler failed: {}", e);
        }
    })
    .await
}

/// Accept connections on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, api: Arc<Api>, max_line_bytes: usize, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("API server shutting down");
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("accept failed: {}", e);
                        continue;
                    }
                };
                let conn_id = Uuid::new_v4();
                debug!("connection {} from {}", conn_id, peer);
                let api = api.clone();
                tokio::spawn(async move {
                    match handle_connection(stream, api, max_line_bytes).await {
                        Ok(()) => debug!("connection {} closed", conn_id),
                        Err(e) => debug!("connection {} dropped: {}", conn_id, e),
                    }
                });
            }
        }
    }
    let snap = metrics::snapshot();
    info!(
        "API totals: requests={} errors={} auth_denials={}",
        snap.requests, snap.request_errors, snap.auth_denials
    );
    for (operation, counter) in metrics::operation_counters() {
        info!("  {}: calls={} errors={}", operation, counter.calls, counter.errors);
    }
    Ok(())
}

async fn handle_connection(stream: TcpStream, api: Arc<Api>, max_line_bytes: usize) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut buf = Vec::new();
    loop {
        if !read_bounded_line(&mut reader, &mut buf, max_line_bytes).await? {
            return Ok(());
        }
        if buf.len() > max_line_bytes && !buf.ends_with(b"\n") {
            warn!("request line over {} bytes skipped", max_line_bytes);
            let resp = ApiResponse::error(None, "request line too long", "BAD_USER_INPUT");
            write_response(&mut write_half, &resp).await?;
            if !skip_rest_of_line(&mut reader, &mut buf, max_line_bytes).await? {
                return Ok(());
            }
            continue;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let resp = respond(&api, line).await;
        write_response(&mut write_half, &resp).await?;
    }
}

/// Read up to `max + 1` bytes of the next line into `buf`. `false` on EOF.
async fn read_bounded_line<R>(reader: &mut R, buf: &mut Vec<u8>, max: usize) -> Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let n = (&mut *reader).take(max as u64 + 1).read_until(b'\n', buf).await?;
    Ok(n > 0)
}

/// Discard input through the next newline. `false` on EOF.
async fn skip_rest_of_line<R>(reader: &mut R, buf: &mut Vec<u8>, max: usize) -> Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        if !read_bounded_line(reader, buf, max).await? {
            return Ok(false);
        }
        if buf.ends_with(b"\n") {
            return Ok(true);
        }
    }
}

/// Decode and run one request line.
pub async fn respond(api: &Arc<Api>, line: &str) -> ApiResponse {
    let request: ApiRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            debug!("malformed request {}: {}", escape_log(line), e);
            return ApiResponse::error(None, format!("malformed request: {}", e), "BAD_USER_INPUT");
        }
    };
    let id = request.id.clone();
    let api = api.clone();
    match tokio::task::spawn_blocking(move || api.handle(request)).await {
        Ok(resp) => resp,
        Err(e) => {
            warn!("request task failed: {}", e);
            ApiResponse::error(id, "internal error", "INTERNAL")
        }
    }
}

async fn write_response<W>(writer: &mut W, resp: &ApiResponse) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    let mut bytes = serde_json::to_vec(resp)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiOptions;
    use crate::cms::storage::CmsStoreBuilder;
    use tempfile::TempDir;

    fn api() -> (Arc<Api>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = CmsStoreBuilder::new(dir.path().join("cms"))
            .with_bootstrap_admin("root")
            .open()
            .unwrap();
        (Arc::new(Api::new(Arc::new(store), ApiOptions::default())), dir)
    }

    #[tokio::test]
    async fn malformed_line_is_bad_input() {
        let (api, _dir) = api();
        let resp = respond(&api, "{not json").await;
        assert_eq!(resp.error_code(), Some("BAD_USER_INPUT"));
    }

    #[tokio::test]
    async fn well_formed_line_is_dispatched() {
        let (api, _dir) = api();
        let resp = respond(&api, r#"{"id":7,"operation":"zones","actor":"root"}"#).await;
        assert!(resp.errors.is_none(), "{:?}", resp.errors);
        assert_eq!(resp.id, Some(serde_json::json!(7)));
    }
}
