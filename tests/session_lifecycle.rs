//! Integration tests for session acquisition and inactivity expiry
//!
//! Drives a fully built server through [`HttpServer::handle`] with a manual
//! clock, so no sockets are involved.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rudiment_http_server::{HttpExchange, HttpServer, Method, Router, StatusCode, keys};
use rudiment_session_storage::{ManualClock, SessionStore};
use serde_json::json;
use tokio::sync::Barrier;

fn visits_router() -> Router {
    Router::new().route_fn(Method::GET, "/visits", |exchange| {
        let Some(session) = exchange.session() else {
            exchange.respond(StatusCode::OK, "0");
            return Ok(());
        };
        let visits = session
            .attribute("visits")
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
            + 1;
        session.set_attribute("visits", json!(visits));
        exchange.set_body(visits.to_string());
        Ok(())
    })
}

fn server_with(clock: &Arc<ManualClock>, inactivity_secs: u64) -> HttpServer {
    HttpServer::builder()
        .clock(clock.clone())
        .property(keys::SESSION_INACTIVITY_PERIOD, inactivity_secs)
        .property(keys::SESSION_CORRELATION_HEADER, "X-Client-Id")
        .dispatcher(visits_router())
        .build()
        .expect("server should build")
}

fn session_cookie(exchange: &HttpExchange) -> String {
    exchange
        .response_cookie("RSID")
        .expect("RSID cookie")
        .value()
        .to_string()
}

fn visit(rsid: &str) -> HttpExchange {
    HttpExchange::request(Method::GET, "/visits").with_cookie("RSID", rsid)
}

#[tokio::test]
async fn test_session_survives_between_requests() {
    let clock = Arc::new(ManualClock::new(0));
    let server = server_with(&clock, 60);

    let first = server
        .handle(HttpExchange::request(Method::GET, "/visits"))
        .await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.response_body(), "1");
    let rsid = session_cookie(&first);

    let second = server.handle(visit(&rsid)).await;
    assert_eq!(second.response_body(), "2");
    // Known sessions are not re-announced
    assert!(second.response_cookie("RSID").is_none());
    assert_eq!(server.stats().await.sessions, 1);
}

#[tokio::test]
async fn test_inactivity_expiry() {
    let clock = Arc::new(ManualClock::new(0));
    let server = server_with(&clock, 60);

    let first = server
        .handle(HttpExchange::request(Method::GET, "/visits"))
        .await;
    let rsid = session_cookie(&first);

    // Idle for 59s: still within the allowed period
    clock.advance(Duration::from_secs(59));
    let within = server.handle(visit(&rsid)).await;
    assert_eq!(within.status(), StatusCode::OK);
    assert_eq!(within.response_body(), "2");

    // Idle for 120s since the last access
    clock.advance(Duration::from_secs(120));
    let expired = server.handle(visit(&rsid)).await;
    assert_eq!(expired.status().as_u16(), 440);
    assert!(expired.response_cookie("RSID").unwrap().is_removal());
    assert!(expired.response_body().is_empty());
    assert_eq!(server.stats().await.sessions, 0);

    // The stale cookie now counts as absent and a fresh session starts
    let fresh = server.handle(visit(&rsid)).await;
    assert_eq!(fresh.status(), StatusCode::OK);
    assert_eq!(fresh.response_body(), "1");
    assert_ne!(session_cookie(&fresh), rsid);
}

#[tokio::test]
async fn test_idle_time_measured_from_last_access() {
    let clock = Arc::new(ManualClock::new(0));
    let server = server_with(&clock, 60);

    let first = server
        .handle(HttpExchange::request(Method::GET, "/visits"))
        .await;
    let rsid = session_cookie(&first);

    clock.advance(Duration::from_secs(59));
    let at_59 = server.handle(visit(&rsid)).await;
    assert_eq!(at_59.status(), StatusCode::OK);

    // 118s after creation but only 59s after the previous access
    clock.advance(Duration::from_secs(59));
    let at_118 = server.handle(visit(&rsid)).await;
    assert_eq!(at_118.status(), StatusCode::OK);
    assert_eq!(at_118.response_body(), "3");

    clock.advance(Duration::from_secs(62));
    let expired = server.handle(visit(&rsid)).await;
    assert_eq!(expired.status().as_u16(), 440);
    assert_eq!(server.stats().await.sessions, 0);

    let lookup = server.sessions().store().get_session(&rsid).await.unwrap();
    assert!(lookup.is_none(), "expired session must leave the store");
}

#[tokio::test]
async fn test_idle_exactly_allowed_period_survives() {
    let clock = Arc::new(ManualClock::new(0));
    let server = server_with(&clock, 60);

    let first = server
        .handle(HttpExchange::request(Method::GET, "/visits"))
        .await;
    let rsid = session_cookie(&first);

    clock.advance(Duration::from_millis(60_999));
    let boundary = server.handle(visit(&rsid)).await;
    assert_eq!(boundary.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_contact_shares_one_session() {
    const CLIENTS: usize = 16;

    let clock = Arc::new(ManualClock::new(0));
    let server = server_with(&clock, 60);
    let barrier = Arc::new(Barrier::new(CLIENTS));

    let mut handles = Vec::with_capacity(CLIENTS);
    for _ in 0..CLIENTS {
        let server = server.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let exchange = HttpExchange::request(Method::GET, "/visits")
                .with_header("X-Client-Id", "client-42");
            server.handle(exchange).await
        }));
    }

    let mut session_ids = HashSet::new();
    let mut creators = 0;
    for handle in handles {
        let exchange = handle.await.unwrap();
        assert_eq!(exchange.status(), StatusCode::OK);
        session_ids.insert(session_cookie(&exchange));
        if exchange.session_access().unwrap().created {
            creators += 1;
        }
    }

    assert_eq!(session_ids.len(), 1, "all requests must share one session");
    assert_eq!(creators, 1, "exactly one request creates the session");
    assert_eq!(server.stats().await.sessions, 1);
}

#[tokio::test]
async fn test_distinct_correlation_keys_get_distinct_sessions() {
    let clock = Arc::new(ManualClock::new(0));
    let server = server_with(&clock, 60);

    let a = server
        .handle(HttpExchange::request(Method::GET, "/visits").with_header("X-Client-Id", "a"))
        .await;
    let b = server
        .handle(HttpExchange::request(Method::GET, "/visits").with_header("X-Client-Id", "b"))
        .await;

    assert_ne!(session_cookie(&a), session_cookie(&b));
    assert_eq!(server.stats().await.sessions, 2);
}

#[tokio::test]
async fn test_session_filters_inactive_when_creation_disabled() {
    let server = HttpServer::builder()
        .property(keys::SESSION_CREATE, false)
        .dispatcher(visits_router())
        .build()
        .unwrap();

    assert!(server.stats().await.filters.is_empty());

    let exchange = server
        .handle(HttpExchange::request(Method::GET, "/visits"))
        .await;
    assert_eq!(exchange.status(), StatusCode::OK);
    assert_eq!(exchange.response_body(), "0");
    assert!(exchange.response_cookies().is_empty());
}

#[tokio::test]
async fn test_session_capacity_answers_503() {
    let server = HttpServer::builder()
        .property(keys::SESSION_MAX_SESSIONS, 2)
        .dispatcher(visits_router())
        .build()
        .unwrap();

    for _ in 0..2 {
        let exchange = server
            .handle(HttpExchange::request(Method::GET, "/visits"))
            .await;
        assert_eq!(exchange.status(), StatusCode::OK);
    }

    let rejected = server
        .handle(HttpExchange::request(Method::GET, "/visits"))
        .await;
    assert_eq!(rejected.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_full_store_reclaims_abandoned_sessions() {
    let clock = Arc::new(ManualClock::new(0));
    let server = HttpServer::builder()
        .clock(clock.clone())
        .property(keys::SESSION_INACTIVITY_PERIOD, 60)
        .property(keys::SESSION_MAX_SESSIONS, 2)
        .dispatcher(visits_router())
        .build()
        .unwrap();

    // Two clients take a session each and never return
    for _ in 0..2 {
        let exchange = server
            .handle(HttpExchange::request(Method::GET, "/visits"))
            .await;
        assert_eq!(exchange.status(), StatusCode::OK);
    }

    clock.advance(Duration::from_secs(86_400));
    let newcomer = server
        .handle(HttpExchange::request(Method::GET, "/visits"))
        .await;
    assert_eq!(newcomer.status(), StatusCode::OK);
    assert_eq!(newcomer.response_body(), "1");
    assert_eq!(server.stats().await.sessions, 1);
}
