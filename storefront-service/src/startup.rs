//! Application startup and lifecycle management.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::FromRef,
    http::{header, HeaderValue, Method, Request},
    middleware::from_fn,
    routing::{get, post, put},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics_middleware, request_id_middleware, security_headers_middleware, RequestId,
};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::{CatalogConfig, StoreBackend, StorefrontConfig};
use crate::handlers::{admin, cart, checkout, health, orders};
use crate::services::{
    init_metrics, CallerAssertedPayment, CartRepository, CartStore, CatalogLookup,
    CheckoutManager, CheckoutRepository, HttpCatalog, InMemoryStore, MongoStore,
    OrderMaterializer, OrderRepository, StaticCatalog, TokenService,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub carts: CartStore,
    pub checkouts: CheckoutManager,
    pub orders: OrderMaterializer,
    pub tokens: TokenService,
    /// Set when the MongoDB backend is in use; readiness pings it.
    pub mongo: Option<MongoStore>,
}

impl FromRef<AppState> for TokenService {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

struct Repositories {
    carts: Arc<dyn CartRepository>,
    checkouts: Arc<dyn CheckoutRepository>,
    orders: Arc<dyn OrderRepository>,
    mongo: Option<MongoStore>,
}

async fn open_store(config: &StorefrontConfig) -> Result<Repositories, AppError> {
    match config.store.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            let store = Arc::new(InMemoryStore::new());
            Ok(Repositories {
                carts: store.clone(),
                checkouts: store.clone(),
                orders: store,
                mongo: None,
            })
        }
        StoreBackend::MongoDb => {
            let mongo =
                MongoStore::connect(&config.store.mongodb_uri, &config.store.mongodb_database)
                    .await?;
            mongo.initialize_indexes().await.map_err(|e| {
                tracing::error!("Failed to initialize database indexes: {}", e);
                e
            })?;
            let store = Arc::new(mongo.clone());
            Ok(Repositories {
                carts: store.clone(),
                checkouts: store.clone(),
                orders: store,
                mongo: Some(mongo),
            })
        }
    }
}

fn build_catalog(config: &CatalogConfig) -> Result<Arc<dyn CatalogLookup>, AppError> {
    match config {
        CatalogConfig::Http { base_url, timeout } => {
            tracing::info!(base_url = %base_url, "Using HTTP product catalog");
            Ok(Arc::new(HttpCatalog::new(base_url, *timeout)))
        }
        CatalogConfig::Static {
            seed_path: Some(path),
        } => Ok(Arc::new(
            StaticCatalog::from_file(path).map_err(AppError::ConfigError)?,
        )),
        CatalogConfig::Static { seed_path: None } => {
            tracing::warn!("Static catalog has no seed file; every product lookup will miss");
            Ok(Arc::new(StaticCatalog::default()))
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", origin, e);
                None
            }
        })
        .collect::<Vec<HeaderValue>>();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Every storefront route with the shared middleware stack applied.
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route(
            "/cart",
            get(cart::get_cart)
                .post(cart::add_to_cart)
                .put(cart::update_cart_item)
                .delete(cart::remove_from_cart),
        )
        .route("/cart/merge", post(cart::merge_carts))
        .route("/checkout", post(checkout::create_checkout))
        .route("/checkout/:id", get(checkout::get_checkout))
        .route("/checkout/:id/pay", put(checkout::pay_checkout))
        .route("/checkout/:id/finalize", post(checkout::finalize_checkout))
        .route("/orders/my-orders", get(orders::my_orders))
        .route("/orders/:id", get(orders::get_order))
        .route("/admin/orders", get(admin::list_orders))
        .route(
            "/admin/orders/:id",
            get(admin::get_order)
                .put(admin::update_order_status)
                .delete(admin::delete_order),
        )
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_endpoint))
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .extensions()
                    .get::<RequestId>()
                    .map(RequestId::as_str)
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                    user_id = tracing::field::Empty,
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(allowed_origins))
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: StorefrontConfig) -> Result<Self, AppError> {
        init_metrics();

        let repositories = open_store(&config).await?;
        let catalog = build_catalog(&config.catalog)?;

        tracing::warn!(
            "Payment confirmations are caller-asserted; no payment gateway is consulted"
        );
        let payments = Arc::new(CallerAssertedPayment);

        let orders = OrderMaterializer::new(repositories.orders);
        let state = AppState {
            carts: CartStore::new(repositories.carts.clone(), catalog),
            checkouts: CheckoutManager::new(
                repositories.checkouts,
                repositories.carts,
                orders.clone(),
                payments,
            ),
            orders,
            tokens: TokenService::new(&config.jwt.secret, config.jwt.expiry_hours),
            mongo: repositories.mongo,
        };

        let router = build_router(state, &config.allowed_origins);

        // Port 0 binds a random port for tests.
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Storefront service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until SIGINT or SIGTERM, then drain in-flight requests.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
