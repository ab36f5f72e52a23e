// src/http/proxy.rs

//! `http-proxy` helper mode: one request in on stdin, one reply out on
//! stdout, then exit.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::errors::Result;
use crate::http::client::{HttpClient, HttpRequest, NativeClient, ProxyReply};
use crate::http::pool::PoolLimits;

/// Serve exactly one request with a client built from `limits`. Request
/// failures are reported in the reply; only IO on `reader`/`writer` fails
/// this function.
pub async fn serve_one<R, W>(mut reader: R, mut writer: W, limits: &PoolLimits) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut input = Vec::new();
    reader.read_to_end(&mut input).await?;

    let reply = match serde_json::from_slice::<HttpRequest>(&input) {
        Ok(request) => perform(request, limits).await,
        Err(e) => {
            warn!(error = %e, "invalid request on helper stdin");
            ProxyReply::Error {
                message: format!("invalid request: {e}"),
            }
        }
    };

    let mut out = serde_json::to_vec(&reply)?;
    out.push(b'\n');
    writer.write_all(&out).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn serve_stdio(limits: PoolLimits) -> Result<()> {
    serve_one(tokio::io::stdin(), tokio::io::stdout(), &limits).await
}

async fn perform(request: HttpRequest, limits: &PoolLimits) -> ProxyReply {
    debug!(
        method = %request.method,
        url = %request.url,
        timeout = ?limits.request_timeout,
        "helper performing request"
    );

    let client = match NativeClient::new(limits) {
        Ok(client) => client,
        Err(e) => {
            return ProxyReply::Error {
                message: e.to_string(),
            };
        }
    };

    match client.execute(request).await {
        Ok(response) => ProxyReply::Ok { response },
        Err(e) => ProxyReply::Error {
            message: e.to_string(),
        },
    }
}
