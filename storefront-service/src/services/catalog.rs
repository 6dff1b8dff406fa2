use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::observability::TracedClientExt;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use super::ServiceError;
use crate::models::ProductSnapshot;

/// Read-only view of the product catalog, owned by another service.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn product(&self, id: &str) -> Result<Option<ProductSnapshot>, ServiceError>;
}

/// Catalog reached over HTTP at `{base_url}/api/products/{id}`.
pub struct HttpCatalog {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogProduct {
    #[serde(alias = "_id")]
    id: String,
    name: String,
    price: f64,
    #[serde(default)]
    images: Vec<CatalogImage>,
    #[serde(default)]
    count_in_stock: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct CatalogImage {
    url: String,
}

impl HttpCatalog {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

impl TryFrom<CatalogProduct> for ProductSnapshot {
    type Error = ServiceError;

    fn try_from(product: CatalogProduct) -> Result<Self, Self::Error> {
        let price = Decimal::try_from(product.price)
            .map_err(|e| ServiceError::Catalog(format!("invalid price for {}: {}", product.id, e)))?
            .round_dp(2);

        Ok(ProductSnapshot {
            image: product.images.into_iter().next().map(|image| image.url),
            available: product.count_in_stock.map_or(true, |stock| stock > 0),
            id: product.id,
            name: product.name,
            price,
        })
    }
}

#[async_trait]
impl CatalogLookup for HttpCatalog {
    #[tracing::instrument(skip(self))]
    async fn product(&self, id: &str) -> Result<Option<ProductSnapshot>, ServiceError> {
        let url = format!("{}/api/products/{}", self.base_url, id);

        let response = self
            .client
            .traced_get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Catalog request failed");
                ServiceError::Catalog(e.to_string())
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            tracing::warn!(status = %status, "Catalog returned an error status");
            return Err(ServiceError::Catalog(format!("catalog responded with {}", status)));
        }

        let product: CatalogProduct = response
            .json()
            .await
            .map_err(|e| ServiceError::Catalog(format!("unreadable catalog response: {}", e)))?;

        ProductSnapshot::try_from(product).map(Some)
    }
}

/// Fixed product list held in memory.
#[derive(Default)]
pub struct StaticCatalog {
    products: HashMap<String, ProductSnapshot>,
}

impl StaticCatalog {
    pub fn new(products: impl IntoIterator<Item = ProductSnapshot>) -> Self {
        Self {
            products: products.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    /// Load a JSON array of products.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read catalog seed {}: {}", path.display(), e))?;
        let products: Vec<ProductSnapshot> = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Invalid catalog seed {}: {}", path.display(), e))?;

        tracing::info!(count = products.len(), path = %path.display(), "Loaded static catalog");
        Ok(Self::new(products))
    }
}

#[async_trait]
impl CatalogLookup for StaticCatalog {
    async fn product(&self, id: &str) -> Result<Option<ProductSnapshot>, ServiceError> {
        Ok(self.products.get(id).cloned())
    }
}
