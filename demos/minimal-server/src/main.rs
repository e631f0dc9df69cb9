//! # Minimal Server Demo
//!
//! Small order-taking service showing the session, inactivity and CSRF
//! filters in front of a router.
//!
//! ```bash
//! cargo run --bin minimal-server -- --config demos/minimal-server/rudiment.toml
//!
//! # Obtain RSID and XSRF-TOKEN cookies (answered with 204)
//! curl -i -c jar -H 'X-Client-Id: demo-1' http://127.0.0.1:8080/hello
//! # Logging in reissues RSID, so keep writing the jar
//! curl -i -b jar -c jar -X POST -H "X-XSRF-TOKEN: $TOKEN" \
//!      -d '{"username":"alice"}' http://127.0.0.1:8080/login
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use parking_lot::Mutex;
use rudiment_http_server::{
    ComponentDescriptor, Config, DispatchError, Endpoint, HttpExchange, HttpServer, Method,
    Router, SessionManager, StatusCode, keys,
};
use rudiment_session_storage::{DEEP_LINK_URI, Identity};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port to listen on, overriding `server.port`
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Order {
    item: String,
    quantity: u32,
    #[serde(default)]
    placed_by: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Login {
    username: String,
}

/// Orders placed since startup
#[derive(Default)]
struct OrderBook {
    orders: Mutex<Vec<Order>>,
}

impl OrderBook {
    fn place(&self, order: Order) -> usize {
        let mut orders = self.orders.lock();
        orders.push(order);
        orders.len()
    }

    fn snapshot(&self) -> Vec<Order> {
        self.orders.lock().clone()
    }
}

impl rudiment_http_server::Component for OrderBook {
    fn destroy(&self) {
        info!("Discarding {} orders", self.orders.lock().len());
    }
}

fn respond_json(
    exchange: &mut HttpExchange,
    status: StatusCode,
    value: &serde_json::Value,
) -> Result<(), DispatchError> {
    let body = serde_json::to_vec(value)?;
    exchange.response_headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    exchange.respond(status, body);
    Ok(())
}

/// Attaches an identity under a freshly issued session identifier
struct LoginEndpoint {
    sessions: Arc<SessionManager>,
}

#[async_trait]
impl Endpoint for LoginEndpoint {
    async fn handle(&self, exchange: &mut HttpExchange) -> Result<(), DispatchError> {
        let login: Login = serde_json::from_slice(exchange.body())?;
        // An identifier seen before login must not carry the identity
        let Some(session) = self.sessions.rotate(exchange).await? else {
            return respond_json(
                exchange,
                StatusCode::UNAUTHORIZED,
                &json!({ "error": "no session" }),
            );
        };

        let identity = Identity::new(&login.username, json!({ "source": "demo" }))
            .with_realm("demo")
            .with_roles(["customer"]);
        session.set_identity(&identity)?;
        info!("{} logged in", login.username);

        let next = session
            .remove_attribute(DEEP_LINK_URI)
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "/orders".to_string());
        respond_json(
            exchange,
            StatusCode::OK,
            &json!({ "username": login.username, "next": next }),
        )
    }
}

fn router(orders: Arc<OrderBook>, sessions: Arc<SessionManager>) -> Router {
    let listing = orders.clone();

    Router::new()
        .route_fn(Method::GET, "/hello", |exchange| {
            let visits = match exchange.session() {
                Some(session) => {
                    let visits = session
                        .attribute("visits")
                        .and_then(|v| v.as_u64())
                        .unwrap_or(0)
                        + 1;
                    session.set_attribute("visits", json!(visits));
                    visits
                }
                None => 0,
            };
            respond_json(
                exchange,
                StatusCode::OK,
                &json!({ "message": "hello", "visits": visits }),
            )
        })
        .route(Method::POST, "/login", LoginEndpoint { sessions })
        .route_fn(Method::GET, "/orders", move |exchange| {
            let orders = serde_json::to_value(listing.snapshot())?;
            respond_json(exchange, StatusCode::OK, &json!({ "orders": orders }))
        })
        .route_fn(Method::POST, "/orders", move |exchange| {
            let identity = exchange.session().and_then(|session| {
                if session.identity().is_none() {
                    // Resume here after logging in
                    session.set_attribute(DEEP_LINK_URI, json!("/orders"));
                }
                session.identity()
            });
            let Some(identity) = identity else {
                return respond_json(
                    exchange,
                    StatusCode::UNAUTHORIZED,
                    &json!({ "error": "login required" }),
                );
            };

            let mut order: Order = serde_json::from_slice(exchange.body())?;
            if order.quantity == 0 {
                return respond_json(
                    exchange,
                    StatusCode::BAD_REQUEST,
                    &json!({ "error": "quantity must be positive" }),
                );
            }
            order.placed_by = Some(identity.username().to_string());
            let number = orders.place(order);
            respond_json(exchange, StatusCode::CREATED, &json!({ "order": number }))
        })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::new()
            .with_property(keys::CSRF_ENABLED, true)
            .with_property(keys::SESSION_CORRELATION_HEADER, "X-Client-Id"),
    };
    if let Some(port) = args.port {
        config.set_property(keys::SERVER_PORT, port);
    }

    let orders = Arc::new(OrderBook::default());

    let server = HttpServer::builder()
        .config(config)
        .component(
            ComponentDescriptor::instance::<OrderBook, OrderBook>(orders.clone(), |o| o)
                .description("Demo order book"),
        )
        .dispatcher_with(move |components| {
            Ok(router(orders, components.of::<SessionManager>()?))
        })
        .build()?;

    let addr: SocketAddr = server.config().bind_address;
    info!("Starting minimal server at http://{}", addr);
    info!("Server stats: {}", serde_json::to_string(&server.stats().await)?);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C");
        }
    }

    server.shutdown();
    Ok(())
}
