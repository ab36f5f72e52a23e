// src/http/client.rs

//! HTTP client capability and its two implementations.
//!
//! Test code sees only [`HttpClient`]. Which implementation it gets is a
//! pure function of the platform ([`strategy_for_platform`]):
//! [`NativeClient`] runs requests in-process on a shared `reqwest` pool,
//! [`SubprocessClient`] runs each request in a freshly spawned helper.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, trace};

use crate::errors::{NacRunnerError, Result};
use crate::http::pool::PoolLimits;

/// Serializable request, so it can cross a process boundary unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: Option<String>,
    /// Overrides the pool's request timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
}

fn default_verify_tls() -> bool {
    true
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout_secs: None,
            verify_tls: true,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: String,
}

/// Helper process reply, one JSON document on stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProxyReply {
    Ok { response: HttpResponse },
    Error { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStrategy {
    Native,
    SubprocessProxied,
}

impl ClientStrategy {
    pub fn current() -> Self {
        strategy_for_platform(std::env::consts::OS)
    }
}

/// macOS crashes when the system TLS stack's locks are touched after a
/// fork, so every request there goes through a helper process.
pub fn strategy_for_platform(os: &str) -> ClientStrategy {
    match os {
        "macos" => ClientStrategy::SubprocessProxied,
        _ => ClientStrategy::Native,
    }
}

pub type HttpFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send + 'a>>;

pub trait HttpClient: Send + Sync {
    fn execute(&self, request: HttpRequest) -> HttpFuture<'_>;

    fn strategy(&self) -> ClientStrategy;
}

/// In-process client on a shared connection pool.
///
/// `max_connections` caps in-flight requests; idle keep-alive connections
/// are capped per host by `max_keepalive` and closed after
/// `keepalive_expiry`.
pub struct NativeClient {
    verified: reqwest::Client,
    unverified: reqwest::Client,
    permits: Arc<Semaphore>,
}

impl NativeClient {
    pub fn new(limits: &PoolLimits) -> Result<Self> {
        Ok(Self {
            verified: build_reqwest(limits, true)?,
            unverified: build_reqwest(limits, false)?,
            permits: Arc::new(Semaphore::new(limits.max_connections.max(1))),
        })
    }
}

fn build_reqwest(limits: &PoolLimits, verify_tls: bool) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(limits.max_keepalive)
        .pool_idle_timeout(limits.keepalive_expiry)
        .timeout(limits.request_timeout)
        .danger_accept_invalid_certs(!verify_tls)
        .build()?;
    Ok(client)
}

impl HttpClient for NativeClient {
    fn execute(&self, request: HttpRequest) -> HttpFuture<'_> {
        Box::pin(async move {
            let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
                .map_err(|e| NacRunnerError::HttpError(format!("invalid method: {e}")))?;

            let client = if request.verify_tls {
                &self.verified
            } else {
                &self.unverified
            };

            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|e| NacRunnerError::HttpError(e.to_string()))?;

            let mut builder = client.request(method, &request.url);
            if let Some(secs) = request.timeout_secs {
                builder = builder.timeout(Duration::from_secs(secs));
            }
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            trace!(url = %request.url, "sending request");
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect();
            let body = response.text().await?;

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        })
    }

    fn strategy(&self) -> ClientStrategy {
        ClientStrategy::Native
    }
}

/// Runs every request in a short-lived helper process.
///
/// The helper reads one [`HttpRequest`] as JSON on stdin and answers with
/// one [`ProxyReply`] on stdout. By default it is this binary in
/// `http-proxy` mode.
#[derive(Debug, Clone)]
pub struct SubprocessClient {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl SubprocessClient {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// The current executable in `http-proxy` mode, told to use `limits`.
    pub fn self_helper(limits: &PoolLimits) -> Result<Self> {
        let exe = std::env::current_exe()?;
        let mut args = vec!["http-proxy".to_string()];
        args.extend(limits.helper_args());
        Ok(Self::new(exe, args, limits.request_timeout))
    }

    async fn run_helper(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let payload = serde_json::to_vec(request)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        debug!(program = ?self.program, url = %request.url, "spawned http helper");

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).await?;
            stdin.shutdown().await?;
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| NacRunnerError::HttpError("http helper timed out".to_string()))??;

        if output.stdout.is_empty() {
            return Err(NacRunnerError::HttpError(format!(
                "http helper exited with {} and no reply",
                output.status
            )));
        }

        match serde_json::from_slice::<ProxyReply>(&output.stdout)? {
            ProxyReply::Ok { response } => Ok(response),
            ProxyReply::Error { message } => Err(NacRunnerError::HttpError(message)),
        }
    }
}

impl HttpClient for SubprocessClient {
    fn execute(&self, request: HttpRequest) -> HttpFuture<'_> {
        Box::pin(async move { self.run_helper(&request).await })
    }

    fn strategy(&self) -> ClientStrategy {
        ClientStrategy::SubprocessProxied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_macos_gets_the_subprocess_strategy() {
        assert_eq!(strategy_for_platform("macos"), ClientStrategy::SubprocessProxied);
        assert_eq!(strategy_for_platform("linux"), ClientStrategy::Native);
        assert_eq!(strategy_for_platform("windows"), ClientStrategy::Native);
        assert_eq!(strategy_for_platform("freebsd"), ClientStrategy::Native);
    }

    #[test]
    fn proxy_reply_is_tagged_by_status() {
        let reply: ProxyReply =
            serde_json::from_str(r#"{"status":"error","message":"boom"}"#).unwrap();
        assert_eq!(
            reply,
            ProxyReply::Error {
                message: "boom".into()
            }
        );

        let reply: ProxyReply =
            serde_json::from_str(r#"{"status":"ok","response":{"status":204}}"#).unwrap();
        assert_eq!(
            reply,
            ProxyReply::Ok {
                response: HttpResponse {
                    status: 204,
                    headers: vec![],
                    body: String::new(),
                }
            }
        );
    }
}
