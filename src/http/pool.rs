// src/http/pool.rs

//! Per-process HTTP client factory.
//!
//! A [`ConnectionPool`] is owned by whoever runs the test code and passed
//! down explicitly. It remembers the pid it was built in; when it is used
//! from a different pid (the process forked) the pooled client is thrown
//! away and rebuilt, so a child never reuses its parent's sockets.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info};

use crate::config::HttpSection;
use crate::errors::Result;
use crate::http::client::{ClientStrategy, HttpClient, NativeClient, SubprocessClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    pub max_connections: usize,
    pub max_keepalive: usize,
    pub keepalive_expiry: Duration,
    pub request_timeout: Duration,
}

impl PoolLimits {
    pub fn from_config(section: &HttpSection) -> Self {
        Self {
            max_connections: section.max_connections,
            max_keepalive: section.max_keepalive,
            keepalive_expiry: Duration::from_secs(section.keepalive_expiry_secs),
            request_timeout: Duration::from_secs(section.request_timeout_secs),
        }
    }

    /// `http-proxy` flags that make a helper use these limits.
    pub fn helper_args(&self) -> Vec<String> {
        vec![
            "--max-connections".to_string(),
            self.max_connections.to_string(),
            "--max-keepalive".to_string(),
            self.max_keepalive.to_string(),
            "--keepalive-expiry-secs".to_string(),
            self.keepalive_expiry.as_secs().to_string(),
            "--request-timeout-secs".to_string(),
            self.request_timeout.as_secs().to_string(),
        ]
    }
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self::from_config(&HttpSection::default())
    }
}

/// Helper process used by the subprocess strategy.
#[derive(Debug, Clone)]
struct ProxyHelper {
    program: PathBuf,
    args: Vec<String>,
}

#[derive(Default)]
struct PoolState {
    owner_pid: u32,
    generation: u64,
    client: Option<Arc<dyn HttpClient>>,
}

pub struct ConnectionPool {
    limits: PoolLimits,
    strategy: ClientStrategy,
    /// `None` means this binary in `http-proxy` mode.
    helper: Option<ProxyHelper>,
    state: Mutex<PoolState>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("limits", &self.limits)
            .field("strategy", &self.strategy)
            .field("owner_pid", &self.owner_pid())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    pub fn new(limits: PoolLimits, strategy: ClientStrategy) -> Self {
        Self {
            limits,
            strategy,
            helper: None,
            state: Mutex::new(PoolState {
                owner_pid: std::process::id(),
                ..PoolState::default()
            }),
        }
    }

    /// Pool with `[http]` limits and the strategy for this platform.
    pub fn from_config(section: &HttpSection) -> Self {
        Self::new(PoolLimits::from_config(section), ClientStrategy::current())
    }

    /// Use `program args...` as the helper for the subprocess strategy.
    pub fn with_proxy_helper(mut self, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        self.helper = Some(ProxyHelper {
            program: program.into(),
            args,
        });
        self
    }

    pub fn limits(&self) -> PoolLimits {
        self.limits
    }

    pub fn strategy(&self) -> ClientStrategy {
        self.strategy
    }

    pub fn owner_pid(&self) -> u32 {
        self.state().owner_pid
    }

    /// Bumped every time a fork is detected.
    pub fn generation(&self) -> u64 {
        self.state().generation
    }

    /// Client for the calling process.
    pub fn client(&self) -> Result<Arc<dyn HttpClient>> {
        self.client_for_pid(std::process::id())
    }

    /// Client for a process with id `pid`, rebuilding if that is not the
    /// pid this pool was built in.
    pub fn client_for_pid(&self, pid: u32) -> Result<Arc<dyn HttpClient>> {
        let mut state = self.state();

        if state.owner_pid != pid {
            info!(
                owner_pid = state.owner_pid,
                current_pid = pid,
                "process id changed since the connection pool was built; rebuilding"
            );
            state.owner_pid = pid;
            state.generation += 1;
            state.client = None;
        }

        if let Some(client) = &state.client {
            return Ok(Arc::clone(client));
        }

        let client = self.build_client()?;
        debug!(
            strategy = ?self.strategy,
            generation = state.generation,
            "built http client"
        );
        state.client = Some(Arc::clone(&client));
        Ok(client)
    }

    fn build_client(&self) -> Result<Arc<dyn HttpClient>> {
        match self.strategy {
            ClientStrategy::Native => Ok(Arc::new(NativeClient::new(&self.limits)?)),
            ClientStrategy::SubprocessProxied => {
                let client = match &self.helper {
                    Some(helper) => SubprocessClient::new(
                        helper.program.clone(),
                        helper.args.clone(),
                        self.limits.request_timeout,
                    ),
                    None => SubprocessClient::self_helper(&self.limits)?,
                };
                Ok(Arc::new(client))
            }
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
