//! Memory provider integration tests
//!
//! End-to-end tests exercising the full SessionManager lifecycle with the
//! in-memory provider. Covers first contact, resumption, expiry, logout,
//! URL-rewrite transport, registry errors, and concurrency.

use a3s_session::{
    IdGenerator, ManagerConfig, ManualClock, MemoryProvider, ProviderRegistry, Session,
    SessionError, SessionManager, SessionValue, TransportContext,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

const HOUR: Duration = Duration::from_secs(3600);

fn test_manager() -> (Arc<SessionManager>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let registry = ProviderRegistry::builder()
        .register("memory", Arc::new(MemoryProvider::with_clock(clock.clone())))
        .unwrap()
        .build();
    let config = ManagerConfig::new("memory", "gosessionid", HOUR);
    let manager = SessionManager::new(&registry, config).unwrap();
    (Arc::new(manager), clock)
}

/// Simulate the browser echoing back the cookie it was given
fn browser_request(previous: &TransportContext) -> TransportContext {
    let header = previous
        .set_cookie_headers()
        .into_iter()
        .next()
        .and_then(|h| h.split(';').next().map(str::to_string))
        .unwrap_or_default();
    TransportContext::new().with_cookie_header(&header)
}

async fn count_visit(session: &dyn Session) -> i64 {
    let count = session
        .get("countnum")
        .await
        .unwrap()
        .and_then(|v| v.as_integer())
        .unwrap_or(0)
        + 1;
    session.set("countnum", count.into()).await.unwrap();
    count
}

// ─── Full lifecycle ──────────────────────────────────────────────

#[tokio::test]
async fn test_counter_scenario_with_expiry() {
    let (manager, clock) = test_manager();

    // First visit: no cookie
    let mut first = TransportContext::new();
    let session = manager.start(&mut first).await.unwrap();
    let t1 = session.id().to_string();
    assert_eq!(count_visit(session.as_ref()).await, 1);

    let headers = first.set_cookie_headers();
    assert_eq!(headers.len(), 1);
    assert!(headers[0].starts_with(&format!("gosessionid={}", t1)));
    assert!(headers[0].contains("Max-Age=3600"));
    assert!(headers[0].contains("HttpOnly"));
    assert!(headers[0].contains("Path=/"));

    // Return visit within the hour
    clock.advance(Duration::from_secs(1800));
    let mut second = browser_request(&first);
    let session = manager.start(&mut second).await.unwrap();
    assert_eq!(session.id(), t1);
    assert_eq!(count_visit(session.as_ref()).await, 2);
    assert!(second.staged().is_empty());

    // Idle for just over the lifetime, then sweep
    clock.advance(Duration::from_secs(3601));
    assert_eq!(manager.run_sweep().await.unwrap(), 1);
    assert!(!manager.provider().exists(&t1).await.unwrap());

    // The stale cookie yields a fresh empty session, not an error
    let mut third = browser_request(&first);
    let session = assert_ok!(manager.start(&mut third).await);
    assert_eq!(session.id(), t1);
    assert_eq!(session.get("countnum").await.unwrap(), None);
}

#[tokio::test]
async fn test_session_survives_sweep_at_exact_lifetime() {
    let (manager, clock) = test_manager();
    let mut ctx = TransportContext::new();
    let session = manager.start(&mut ctx).await.unwrap();
    session.set("k", "v".into()).await.unwrap();

    clock.advance(HOUR);
    assert_eq!(manager.run_sweep().await.unwrap(), 0);

    let mut again = browser_request(&ctx);
    let resumed = manager.start(&mut again).await.unwrap();
    assert_eq!(resumed.get("k").await.unwrap(), Some("v".into()));
}

#[tokio::test]
async fn test_activity_postpones_expiry() {
    let (manager, clock) = test_manager();
    let mut ctx = TransportContext::new();
    let session = manager.start(&mut ctx).await.unwrap();

    for _ in 0..5 {
        clock.advance(Duration::from_secs(3000));
        session.get("anything").await.unwrap();
        assert_eq!(manager.run_sweep().await.unwrap(), 0);
    }
    assert_eq!(manager.session_count().await.unwrap(), 1);
}

// ─── Logout ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_logout_expires_cookie_and_next_visit_is_new() {
    let (manager, _) = test_manager();
    let mut login = TransportContext::new();
    let session = manager.start(&mut login).await.unwrap();
    session.set("user", "alice".into()).await.unwrap();
    let t1 = session.id().to_string();

    let mut logout = browser_request(&login);
    manager.destroy(&mut logout).await.unwrap();
    let header = &logout.set_cookie_headers()[0];
    assert!(header.starts_with("gosessionid=;"));
    assert!(header.contains("Max-Age=0"));
    assert!(header.contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT"));

    let mut next = TransportContext::new();
    let fresh = manager.start(&mut next).await.unwrap();
    assert_ne!(fresh.id(), t1);
    assert_eq!(fresh.get("user").await.unwrap(), None);
}

#[tokio::test]
async fn test_destroy_without_token_leaves_response_untouched() {
    let (manager, _) = test_manager();
    let mut ctx = TransportContext::new().with_cookie_header("theme=dark");
    assert_ok!(manager.destroy(&mut ctx).await);
    assert!(ctx.staged().is_empty());
    assert_eq!(manager.session_count().await.unwrap(), 0);
}

// ─── Transport ───────────────────────────────────────────────────

#[tokio::test]
async fn test_cookie_and_url_transports_are_interchangeable() {
    let (manager, _) = test_manager();
    let mut ctx = TransportContext::new();
    let session = manager.start(&mut ctx).await.unwrap();
    session.set("step", 1.into()).await.unwrap();

    let link = manager.rewrite_url("/checkout#pay", session.as_ref());
    assert!(link.starts_with("/checkout?gosessionid="));
    assert!(link.ends_with("#pay"));

    let mut via_url = TransportContext::new().with_url(&link);
    let resumed = manager.start(&mut via_url).await.unwrap();
    assert_eq!(resumed.id(), session.id());
    assert_eq!(resumed.get("step").await.unwrap(), Some(SessionValue::Integer(1)));
}

// ─── Registry ────────────────────────────────────────────────────

#[test]
fn test_registry_duplicate_is_fatal() {
    let result = ProviderRegistry::builder()
        .register("memory", Arc::new(MemoryProvider::default()))
        .unwrap()
        .register("memory", Arc::new(MemoryProvider::default()));
    match result {
        Err(e @ SessionError::DuplicateRegistration(_)) => assert!(e.is_fatal()),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("duplicate registration accepted"),
    }
}

#[test]
fn test_manager_against_unregistered_backend() {
    let registry = ProviderRegistry::builder()
        .register("memory", Arc::new(MemoryProvider::default()))
        .unwrap()
        .build();
    let config = ManagerConfig::new("mysql", "sid", HOUR);
    assert_err!(SessionManager::new(&registry, config).map(|_| ()));
}

// ─── Tokens & concurrency ────────────────────────────────────────

#[test]
fn test_token_uniqueness_sample() {
    let ids = IdGenerator::new();
    let sample: HashSet<String> = (0..50_000).map(|_| ids.generate().unwrap()).collect();
    assert_eq!(sample.len(), 50_000);
}

#[tokio::test]
async fn test_concurrent_clients_do_not_lose_updates() {
    let (manager, _) = test_manager();
    let mut ctx = TransportContext::new();
    manager.start(&mut ctx).await.unwrap();
    let cookie = ctx.staged()[0].clone();

    let tasks = (0..20).map(|i| {
        let manager = manager.clone();
        let cookie = cookie.clone();
        async move {
            let mut ctx = TransportContext::new().with_cookie(cookie.name(), cookie.value());
            let session = manager.start(&mut ctx).await.unwrap();
            session.set(&format!("item-{}", i), i.into()).await.unwrap();
        }
    });
    futures::future::join_all(tasks).await;

    let mut ctx = TransportContext::new().with_cookie(cookie.name(), cookie.value());
    let session = manager.start(&mut ctx).await.unwrap();
    assert_eq!(session.entries().await.unwrap().len(), 20);
}

#[tokio::test]
async fn test_sweep_races_with_new_sessions() {
    let (manager, clock) = test_manager();
    for _ in 0..10 {
        manager.start(&mut TransportContext::new()).await.unwrap();
    }
    clock.advance(HOUR + Duration::from_secs(1));

    let creators = (0..10).map(|_| {
        let manager = manager.clone();
        async move {
            manager.start(&mut TransportContext::new()).await.unwrap();
        }
    });
    let sweep = {
        let manager = manager.clone();
        async move { manager.run_sweep().await.unwrap() }
    };

    let (removed, _) = tokio::join!(sweep, futures::future::join_all(creators));
    assert_eq!(removed, 10);
    // Sessions created after the clock jump are never swept
    assert_eq!(manager.run_sweep().await.unwrap(), 0);
    assert_eq!(manager.session_count().await.unwrap(), 10);
}
