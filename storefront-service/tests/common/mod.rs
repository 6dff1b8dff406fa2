#![allow(dead_code)]

use std::io::Write;

use secrecy::Secret;
use service_core::config::Config;
use storefront_service::config::{
    CatalogConfig, JwtConfig, StoreBackend, StoreConfig, StorefrontConfig,
};
use storefront_service::models::{Principal, Role};
use storefront_service::services::TokenService;
use storefront_service::startup::Application;
use tempfile::NamedTempFile;

pub const TEST_JWT_SECRET: &str = "storefront-test-secret";
pub const TEST_USER_ID: &str = "user-1";
pub const OTHER_USER_ID: &str = "user-2";
pub const TEST_ADMIN_ID: &str = "admin-1";

const CATALOG_SEED: &str = r#"[
    { "id": "P1", "name": "Linen Shirt", "price": "25.00", "image": "https://img.example/p1.jpg" },
    { "id": "P2", "name": "Canvas Tote", "price": "12.50" }
]"#;

pub struct TestApp {
    pub http_address: String,
    pub http_port: u16,
    pub client: reqwest::Client,
    tokens: TokenService,
    _catalog_seed: NamedTempFile,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let mut catalog_seed = NamedTempFile::new().expect("Failed to create catalog seed");
        catalog_seed
            .write_all(CATALOG_SEED.as_bytes())
            .expect("Failed to write catalog seed");

        let jwt_secret = Secret::new(TEST_JWT_SECRET.to_string());
        let config = StorefrontConfig {
            common: Config {
                port: 0, // Random port
                log_level: "info".to_string(),
                otlp_endpoint: None,
            },
            store: StoreConfig {
                backend: StoreBackend::Memory,
                mongodb_uri: Secret::new(String::new()),
                mongodb_database: String::new(),
            },
            jwt: JwtConfig {
                secret: jwt_secret.clone(),
                expiry_hours: 1,
            },
            catalog: CatalogConfig::Static {
                seed_path: Some(catalog_seed.path().to_path_buf()),
            },
            allowed_origins: vec!["http://localhost:5173".to_string()],
        };

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let http_port = app.port();
        let http_address = format!("http://127.0.0.1:{}", http_port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::new();
        let health_url = format!("{}/health", http_address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            http_address,
            http_port,
            client,
            tokens: TokenService::new(&jwt_secret, 1),
            _catalog_seed: catalog_seed,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.http_address, path)
    }

    pub fn token_for(&self, user_id: &str, role: Role) -> String {
        self.tokens
            .issue(&Principal::new(user_id, role))
            .expect("Failed to issue token")
    }

    pub fn customer_token(&self) -> String {
        self.token_for(TEST_USER_ID, Role::Customer)
    }

    pub fn admin_token(&self) -> String {
        self.token_for(TEST_ADMIN_ID, Role::Admin)
    }

    pub async fn post_json(
        &self,
        path: &str,
        token: Option<&str>,
        body: &serde_json::Value,
    ) -> reqwest::Response {
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.expect("Failed to execute request")
    }

    pub async fn put_json(
        &self,
        path: &str,
        token: Option<&str>,
        body: &serde_json::Value,
    ) -> reqwest::Response {
        let mut request = self.client.put(self.url(path)).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.expect("Failed to execute request")
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> reqwest::Response {
        let mut request = self.client.get(self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.expect("Failed to execute request")
    }

    /// A paid checkout for `token`'s owner with one `P1` line.
    pub async fn paid_checkout(&self, token: &str) -> serde_json::Value {
        let created = self
            .post_json("/checkout", Some(token), &checkout_body())
            .await;
        assert_eq!(created.status(), reqwest::StatusCode::CREATED);
        let checkout: serde_json::Value = created.json().await.expect("Failed to parse JSON");

        let id = checkout["id"].as_str().expect("checkout id");
        let paid = self
            .put_json(
                &format!("/checkout/{}/pay", id),
                Some(token),
                &serde_json::json!({ "paymentStatus": "paid", "paymentDetails": { "ref": "tx-1" } }),
            )
            .await;
        assert_eq!(paid.status(), reqwest::StatusCode::OK);
        paid.json().await.expect("Failed to parse JSON")
    }
}

pub fn checkout_body() -> serde_json::Value {
    serde_json::json!({
        "checkoutItems": [{
            "productId": "P1",
            "name": "Linen Shirt",
            "price": "50.00",
            "quantity": 2,
            "size": "M",
            "color": "Red"
        }],
        "shippingAddress": {
            "address": "1 Main St",
            "city": "Springfield",
            "postalCode": "12345",
            "country": "US"
        },
        "paymentMethod": "card",
        "totalPrice": "100.00"
    })
}

pub fn decimal(value: &serde_json::Value) -> rust_decimal::Decimal {
    value
        .as_str()
        .expect("decimal serialized as string")
        .parse()
        .expect("valid decimal")
}
