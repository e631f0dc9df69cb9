//! Integration tests for double-submit CSRF protection
//!
//! Verifies that:
//! - A request without a token cookie is answered 204 with a fresh token
//! - Stateless mode forwards unsafe requests whose header echoes the cookie
//! - Stateful mode binds the token to the session and checks the cookie against it
//! - Safe methods are never rejected for a token mismatch

use rudiment_http_server::{HttpExchange, HttpServer, Method, Router, StatusCode, keys};

fn orders_router() -> Router {
    Router::new()
        .route_fn(Method::GET, "/orders", |exchange| {
            exchange.set_body("[]");
            Ok(())
        })
        .route_fn(Method::POST, "/orders", |exchange| {
            exchange.respond(StatusCode::CREATED, "created");
            Ok(())
        })
}

fn csrf_server(stateless: bool) -> HttpServer {
    HttpServer::builder()
        .property(keys::CSRF_ENABLED, true)
        .property(keys::CSRF_STATELESS, stateless)
        .dispatcher(orders_router())
        .build()
        .expect("server should build")
}

fn cookie_value(exchange: &HttpExchange, name: &str) -> String {
    exchange
        .response_cookie(name)
        .unwrap_or_else(|| panic!("{} cookie missing", name))
        .value()
        .to_string()
}

#[tokio::test]
async fn test_csrf_filter_runs_after_session_filters() {
    let server = csrf_server(true);
    assert_eq!(
        server.stats().await.filters,
        vec!["session", "inactive-session", "csrf"]
    );
}

#[tokio::test]
async fn test_stateless_double_submit() {
    let server = csrf_server(true);

    let issued = server
        .handle(HttpExchange::request(Method::GET, "/orders"))
        .await;
    assert_eq!(issued.status(), StatusCode::NO_CONTENT);
    assert!(issued.response_body().is_empty());
    let token = cookie_value(&issued, "XSRF-TOKEN");
    assert!(!issued.response_cookie("XSRF-TOKEN").unwrap().is_http_only());

    let accepted = server
        .handle(
            HttpExchange::request(Method::POST, "/orders")
                .with_cookie("XSRF-TOKEN", &token)
                .with_header("X-XSRF-TOKEN", &token),
        )
        .await;
    assert_eq!(accepted.status(), StatusCode::CREATED);

    let forged = server
        .handle(
            HttpExchange::request(Method::POST, "/orders")
                .with_cookie("XSRF-TOKEN", &token)
                .with_header("X-XSRF-TOKEN", "attacker-guess"),
        )
        .await;
    assert_eq!(forged.status(), StatusCode::FORBIDDEN);
    assert!(forged.response_body().is_empty());

    let headerless = server
        .handle(HttpExchange::request(Method::POST, "/orders").with_cookie("XSRF-TOKEN", &token))
        .await;
    assert_eq!(headerless.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_safe_methods_bypass_token_check() {
    let server = csrf_server(true);

    let response = server
        .handle(
            HttpExchange::request(Method::GET, "/orders")
                .with_cookie("XSRF-TOKEN", "whatever")
                .with_header("X-XSRF-TOKEN", "something-else"),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.response_body(), "[]");
}

#[tokio::test]
async fn test_stateful_token_bound_to_session() {
    let server = csrf_server(false);

    let issued = server
        .handle(HttpExchange::request(Method::GET, "/orders"))
        .await;
    assert_eq!(issued.status(), StatusCode::NO_CONTENT);
    let rsid = cookie_value(&issued, "RSID");
    let token = cookie_value(&issued, "XSRF-TOKEN");
    assert_eq!(
        issued.session().unwrap().csrf_token().unwrap().value(),
        token
    );

    // No header needed: the session is the second factor
    let accepted = server
        .handle(
            HttpExchange::request(Method::POST, "/orders")
                .with_cookie("RSID", &rsid)
                .with_cookie("XSRF-TOKEN", &token),
        )
        .await;
    assert_eq!(accepted.status(), StatusCode::CREATED);

    let forged = server
        .handle(
            HttpExchange::request(Method::POST, "/orders")
                .with_cookie("RSID", &rsid)
                .with_cookie("XSRF-TOKEN", "attacker-guess"),
        )
        .await;
    assert_eq!(forged.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_stateful_rejects_unsafe_request_on_new_session() {
    let server = csrf_server(false);

    // Token cookie from a session the server no longer knows
    let response = server
        .handle(
            HttpExchange::request(Method::POST, "/orders")
                .with_cookie("RSID", "expired-session")
                .with_cookie("XSRF-TOKEN", "old-token"),
        )
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    // The new session and its token still reach the client
    let token = cookie_value(&response, "XSRF-TOKEN");
    assert_ne!(token, "old-token");
    assert!(response.response_cookie("RSID").is_some());
}

#[tokio::test]
async fn test_stateful_without_sessions_rejects() {
    let server = HttpServer::builder()
        .property(keys::SESSION_CREATE, false)
        .property(keys::CSRF_ENABLED, true)
        .dispatcher(orders_router())
        .build()
        .unwrap();

    let response = server
        .handle(HttpExchange::request(Method::GET, "/orders"))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(response.response_cookies().is_empty());
}

#[tokio::test]
async fn test_csrf_disabled_by_default() {
    let server = HttpServer::builder()
        .dispatcher(orders_router())
        .build()
        .unwrap();

    let response = server
        .handle(HttpExchange::request(Method::POST, "/orders"))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(response.response_cookie("XSRF-TOKEN").is_none());
}
