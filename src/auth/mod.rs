// src/auth/mod.rs

//! Cross-process credential caching for test code talking to controllers.
//!
//! - [`cache`] is the `AuthCache` itself.
//! - [`lock`] is the advisory file lock guarding each entry.
//! - [`entry`] is the stored credential format.
//! - [`clock`] abstracts "now" so expiry can be tested deterministically.

pub mod cache;
pub mod clock;
pub mod entry;
pub mod lock;

pub use cache::{AuthCache, cache_key};
pub use clock::{Clock, SystemClock};
pub use entry::{CacheEntry, CacheShape, Credential, IssuedCredential};
pub use lock::FileLock;
