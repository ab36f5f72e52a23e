// src/http/mod.rs

//! HTTP access for test code running inside runner processes.
//!
//! - [`client`] is the `HttpClient` strategy trait and its native and
//!   subprocess-proxied implementations.
//! - [`pool`] is the fork-aware `ConnectionPool` handing out clients.
//! - [`proxy`] is the helper-process side of the subprocess strategy.

pub mod client;
pub mod pool;
pub mod proxy;

pub use client::{
    ClientStrategy, HttpClient, HttpFuture, HttpRequest, HttpResponse, NativeClient, ProxyReply,
    SubprocessClient, strategy_for_platform,
};
pub use pool::{ConnectionPool, PoolLimits};
