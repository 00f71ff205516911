use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::RoutineError;

pub type ProductId = i64;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub image: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    products: Vec<Product>,
}

/// The products loaded for this session. Read-only once loaded.
#[derive(Debug, Default)]
pub struct CatalogStore {
    products: Vec<Product>,
    loaded: bool,
}

impl CatalogStore {
    #[cfg(test)]
    pub fn from_products(products: Vec<Product>) -> Self {
        Self {
            products,
            loaded: true,
        }
    }

    /// Fetch and parse the catalog once. Later calls return the snapshot
    /// without touching the source again.
    pub async fn load(&mut self, source: &str) -> Result<&[Product], RoutineError> {
        if !self.loaded {
            let body = fetch_source(source).await?;
            let doc: CatalogDocument = serde_json::from_str(&body)
                .map_err(|e| RoutineError::load(format!("{source}: {e}")))?;
            info!(count = doc.products.len(), source, "catalog loaded");
            self.products = doc.products;
            self.loaded = true;
        }
        Ok(&self.products)
    }

    /// Current snapshot, empty until `load` succeeds.
    pub fn all(&self) -> &[Product] {
        &self.products
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn find(&self, id: ProductId) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    /// Distinct categories in first-seen order.
    pub fn categories(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for product in &self.products {
            if !seen.contains(&product.category.as_str()) {
                seen.push(&product.category);
            }
        }
        seen
    }
}

async fn fetch_source(source: &str) -> Result<String, RoutineError> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let response = reqwest::get(source)
            .await
            .map_err(|e| RoutineError::load(e.to_string()))?;
        if !response.status().is_success() {
            warn!(status = %response.status(), source, "catalog fetch failed");
            return Err(RoutineError::load(format!(
                "{source} returned {}",
                response.status()
            )));
        }
        response
            .text()
            .await
            .map_err(|e| RoutineError::load(e.to_string()))
    } else {
        tokio::fs::read_to_string(source)
            .await
            .map_err(|e| RoutineError::load(format!("{source}: {e}")))
    }
}

#[cfg(test)]
pub(crate) fn sample_product(id: ProductId, name: &str, category: &str) -> Product {
    Product {
        id,
        name: name.to_string(),
        brand: "CeraVe".to_string(),
        category: category.to_string(),
        image: format!("https://img.example/{id}.jpg"),
        description: Some(format!("{name} description")),
    }
}
