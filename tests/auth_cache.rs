mod common;
use crate::common::{init_tracing, with_timeout};

use std::convert::Infallible;
use std::error::Error;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use nac_runner::auth::{AuthCache, CacheShape, Credential, FileLock, IssuedCredential};
use nac_runner_test_utils::clock::ManualClock;
use serde_json::json;

type TestResult = Result<(), Box<dyn Error>>;

const URL: &str = "https://apic.example.com";

fn cache(dir: &std::path::Path, clock: &ManualClock) -> AuthCache {
    AuthCache::new(dir, Duration::from_secs(5), Duration::from_secs(60))
        .with_clock(Arc::new(clock.clone()))
}

/// Auth function that counts its calls and issues `token-<n>` for 600s.
fn counting_auth(
    calls: &Arc<AtomicUsize>,
) -> impl FnOnce() -> std::future::Ready<Result<IssuedCredential, Infallible>> + use<> {
    let calls = Arc::clone(calls);
    move || {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        std::future::ready(Ok(IssuedCredential::token(
            format!("token-{n}"),
            Duration::from_secs(600),
        )))
    }
}

#[tokio::test]
async fn entry_is_a_hit_until_expiry_minus_margin() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let clock = ManualClock::new(1_000.0);
    let cache = cache(dir.path(), &clock);
    let calls = Arc::new(AtomicUsize::new(0));

    let first = cache
        .get_or_create("ACI", URL, CacheShape::Token, counting_auth(&calls))
        .await?;
    assert_eq!(first, Credential::Token("token-1".into()));

    // Written with expires_at = 1000 + 600 - 60 = 1540.
    clock.set(1_539.9);
    let again = cache
        .get_or_create("ACI", URL, CacheShape::Token, counting_auth(&calls))
        .await?;
    assert_eq!(again, first);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    clock.set(1_540.0);
    let renewed = cache
        .get_or_create("ACI", URL, CacheShape::Token, counting_auth(&calls))
        .await?;
    assert_eq!(renewed, Credential::Token("token-2".into()));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn racing_callers_regenerate_only_once() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let clock = ManualClock::new(1_000.0);
    let cache = Arc::new(cache(dir.path(), &clock));
    let calls = Arc::new(AtomicUsize::new(0));

    // Hold the entry's lock so both callers queue up behind it.
    let held = FileLock::try_acquire(&cache.lock_path("ACI", URL))?.ok_or("lock busy")?;

    let mut handles = Vec::new();
    for _ in 0..2 {
        let cache = Arc::clone(&cache);
        let auth = counting_auth(&calls);
        handles.push(tokio::spawn(async move {
            cache
                .get_or_create("ACI", URL, CacheShape::Token, auth)
                .await
        }));
    }

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0, "auth ran while lock was held");
    drop(held);

    let mut results = Vec::new();
    for handle in handles {
        results.push(with_timeout(handle).await??);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(results[0], results[1]);
    Ok(())
}

#[tokio::test]
async fn lock_timeout_degrades_to_uncached_call() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let clock = ManualClock::new(1_000.0);
    let cache = AuthCache::new(dir.path(), Duration::from_millis(100), Duration::from_secs(60))
        .with_clock(Arc::new(clock.clone()));
    let calls = Arc::new(AtomicUsize::new(0));

    let _held = FileLock::try_acquire(&cache.lock_path("ACI", URL))?.ok_or("lock busy")?;

    let cred = with_timeout(cache.get_or_create("ACI", URL, CacheShape::Token, counting_auth(&calls)))
        .await?;

    assert_eq!(cred, Credential::Token("token-1".into()));
    assert!(!cache.entry_path("ACI", URL).exists(), "nothing cached without the lock");
    Ok(())
}

#[tokio::test]
async fn corrupt_entry_is_a_silent_miss() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let clock = ManualClock::new(1_000.0);
    let cache = cache(dir.path(), &clock);
    let calls = Arc::new(AtomicUsize::new(0));

    let garbage: [&[u8]; 4] = [
        b"\xff\xfe not utf8",
        br#"{"token": "x"}"#,
        br#"{"token": 42, "expires_at": 99999}"#,
        b"[]",
    ];
    for garbage in garbage {
        fs::write(cache.entry_path("ACI", URL), garbage)?;
        cache
            .get_or_create("ACI", URL, CacheShape::Token, counting_auth(&calls))
            .await?;
    }

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    Ok(())
}

#[tokio::test]
async fn field_dicts_round_trip_and_shapes_do_not_mix() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let clock = ManualClock::new(1_000.0);
    let cache = cache(dir.path(), &clock);

    let fields = json!({"APIC-cookie": "abc", "csrf": "def"})
        .as_object()
        .cloned()
        .ok_or("not an object")?;
    let issued = IssuedCredential::fields(fields.clone(), Duration::from_secs(600));

    let first = cache
        .get_or_create("SDWAN", URL, CacheShape::Fields, move || async move {
            Ok::<_, Infallible>(issued)
        })
        .await?;
    assert_eq!(first.as_fields(), Some(&fields));

    let hit = cache
        .get_or_create("SDWAN", URL, CacheShape::Fields, || async {
            Err::<IssuedCredential, _>("must not be called")
        })
        .await?;
    assert_eq!(hit, first);

    // Asking for a token where fields are stored regenerates.
    let calls = Arc::new(AtomicUsize::new(0));
    let token = cache
        .get_or_create("SDWAN", URL, CacheShape::Token, counting_auth(&calls))
        .await?;
    assert_eq!(token.as_token(), Some("token-1"));
    Ok(())
}

#[tokio::test]
async fn auth_errors_propagate_and_nothing_is_cached() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let clock = ManualClock::new(1_000.0);
    let cache = cache(dir.path(), &clock);

    let err = cache
        .get_or_create("ACI", URL, CacheShape::Token, || async {
            Err::<IssuedCredential, _>("controller said no")
        })
        .await
        .unwrap_err();

    assert_eq!(err, "controller said no");
    assert!(!cache.entry_path("ACI", URL).exists());
    Ok(())
}

#[tokio::test]
async fn invalidate_forces_regeneration_and_never_fails() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let clock = ManualClock::new(1_000.0);
    let cache = cache(dir.path(), &clock);
    let calls = Arc::new(AtomicUsize::new(0));

    cache
        .get_or_create("ACI", URL, CacheShape::Token, counting_auth(&calls))
        .await?;
    assert!(cache.entry_path("ACI", URL).exists());

    cache.invalidate("ACI", URL);
    assert!(!cache.entry_path("ACI", URL).exists());
    assert!(!cache.lock_path("ACI", URL).exists());

    // Nothing left to remove: still fine.
    cache.invalidate("ACI", URL);
    cache.invalidate("NDO", "https://never-used");

    let cred = cache
        .get_or_create("ACI", URL, CacheShape::Token, counting_auth(&calls))
        .await?;
    assert_eq!(cred.as_token(), Some("token-2"));
    Ok(())
}

#[tokio::test]
async fn invalidate_keeps_a_lock_that_is_in_use() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let clock = ManualClock::new(1_000.0);
    let cache = cache(dir.path(), &clock);
    let calls = Arc::new(AtomicUsize::new(0));

    cache
        .get_or_create("ACI", URL, CacheShape::Token, counting_auth(&calls))
        .await?;
    let lock_path = cache.lock_path("ACI", URL);
    let held = FileLock::try_acquire(&lock_path)?.ok_or("lock busy")?;

    cache.invalidate("ACI", URL);

    assert!(!cache.entry_path("ACI", URL).exists());
    assert!(lock_path.exists(), "held lock file was unlinked");
    assert!(
        FileLock::try_acquire(&lock_path)?.is_none(),
        "second holder got the lock while the first still holds it"
    );

    drop(held);
    cache.invalidate("ACI", URL);
    assert!(!lock_path.exists());
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn cache_files_are_owner_only() -> TestResult {
    use std::os::unix::fs::PermissionsExt;

    init_tracing();
    let dir = tempfile::tempdir()?;
    let cache_dir = dir.path().join("auth");
    let clock = ManualClock::new(1_000.0);
    let cache = cache(&cache_dir, &clock);
    let calls = Arc::new(AtomicUsize::new(0));

    cache
        .get_or_create("ACI", URL, CacheShape::Token, counting_auth(&calls))
        .await?;

    let dir_mode = fs::metadata(&cache_dir)?.permissions().mode() & 0o777;
    let entry_mode = fs::metadata(cache.entry_path("ACI", URL))?.permissions().mode() & 0o777;
    let lock_mode = fs::metadata(cache.lock_path("ACI", URL))?.permissions().mode() & 0o777;
    assert_eq!(dir_mode, 0o700);
    assert_eq!(entry_mode, 0o600);
    assert_eq!(lock_mode & 0o077, 0);
    Ok(())
}

#[tokio::test]
async fn short_lived_credentials_are_not_cached() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let clock = ManualClock::new(1_000.0);
    let cache = cache(dir.path(), &clock);

    cache
        .get_or_create("ACI", URL, CacheShape::Token, || async {
            Ok::<_, Infallible>(IssuedCredential::token("brief", Duration::from_secs(30)))
        })
        .await?;

    assert!(!cache.entry_path("ACI", URL).exists());
    Ok(())
}
