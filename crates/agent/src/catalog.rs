//! Per-tenant product catalog cache.
//!
//! Entries are keyed by tenant id and can only be read through a
//! [`RequestContext`], so nothing is served before the tenant is resolved.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use salesagent_core::domain::product::{CreativeFormat, Product};
use salesagent_core::domain::tenant::TenantId;
use salesagent_db::repositories::{ProductRepository, RepositoryError};

use crate::context::RequestContext;

struct CachedCatalog {
    products: Arc<Vec<Product>>,
    loaded_at: Instant,
}

pub struct CatalogCache {
    products: Arc<dyn ProductRepository>,
    ttl: Duration,
    entries: RwLock<HashMap<TenantId, CachedCatalog>>,
}

impl CatalogCache {
    /// A zero `ttl` reads through to the repository on every call.
    pub fn new(products: Arc<dyn ProductRepository>, ttl: Duration) -> Self {
        Self { products, ttl, entries: RwLock::new(HashMap::new()) }
    }

    pub async fn products(&self, ctx: &RequestContext) -> Result<Arc<Vec<Product>>, RepositoryError> {
        let tenant_id = ctx.tenant_id();
        if !self.ttl.is_zero() {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(tenant_id) {
                if entry.loaded_at.elapsed() < self.ttl {
                    return Ok(Arc::clone(&entry.products));
                }
            }
        }

        let products = Arc::new(self.products.list_for_tenant(tenant_id).await?);
        debug!(
            event_name = "catalog.loaded",
            correlation_id = %ctx.correlation_id(),
            tenant_id = %tenant_id,
            product_count = products.len(),
            "loaded tenant catalog"
        );
        if !self.ttl.is_zero() {
            self.entries.write().await.insert(
                tenant_id.clone(),
                CachedCatalog { products: Arc::clone(&products), loaded_at: Instant::now() },
            );
        }
        Ok(products)
    }

    /// Creative formats accepted by at least one product, sorted by id.
    pub async fn formats(&self, ctx: &RequestContext) -> Result<Vec<CreativeFormat>, RepositoryError> {
        let products = self.products(ctx).await?;
        let ids: BTreeSet<&str> = products
            .iter()
            .flat_map(|product| product.format_ids.iter().map(String::as_str))
            .collect();
        Ok(ids.into_iter().map(describe_format).collect())
    }

    pub async fn evict(&self, tenant_id: &TenantId) {
        self.entries.write().await.remove(tenant_id);
    }
}

/// Build a format description from its id. Ids of the form
/// `<kind>_<width>x<height>` carry their dimensions.
pub fn describe_format(format_id: &str) -> CreativeFormat {
    let (kind, size) = match format_id.rsplit_once('_') {
        Some((kind, size)) => (kind, Some(size)),
        None => (format_id, None),
    };
    let dimensions = size.and_then(|size| {
        let (width, height) = size.split_once('x')?;
        Some((width.parse::<u32>().ok()?, height.parse::<u32>().ok()?))
    });

    match dimensions {
        Some((width, height)) => CreativeFormat {
            format_id: format_id.to_string(),
            name: format!("{} {width}x{height}", title_case(kind)),
            width: Some(width),
            height: Some(height),
        },
        None => CreativeFormat {
            format_id: format_id.to_string(),
            name: title_case(format_id),
            width: None,
            height: None,
        },
    }
}

fn title_case(value: &str) -> String {
    value
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::describe_format;

    #[test]
    fn sized_formats_carry_dimensions() {
        let format = describe_format("display_300x250");
        assert_eq!(format.name, "Display 300x250");
        assert_eq!(format.width, Some(300));
        assert_eq!(format.height, Some(250));
    }

    #[test]
    fn unsized_formats_are_title_cased() {
        let format = describe_format("video_vast_30s");
        assert_eq!(format.name, "Video Vast 30s");
        assert_eq!(format.width, None);
        assert_eq!(format.height, None);
    }
}
