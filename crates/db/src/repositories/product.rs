use sqlx::Row;

use salesagent_core::domain::product::{Product, ProductId};
use salesagent_core::domain::tenant::TenantId;

use super::{decode_document, encode_document, ProductRepository, RepositoryError};
use crate::DbPool;

/// Products are stored as documents; pricing options are re-validated on
/// every load.
pub struct SqlProductRepository {
    pool: DbPool,
}

impl SqlProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ProductRepository for SqlProductRepository {
    async fn list_for_tenant(&self, tenant_id: &TenantId) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT document_json FROM product WHERE tenant_id = ? ORDER BY product_id ASC",
        )
        .bind(&tenant_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let document: String = row.try_get("document_json")?;
                decode_document("document_json", &document)
            })
            .collect()
    }

    async fn find(
        &self,
        tenant_id: &TenantId,
        id: &ProductId,
    ) -> Result<Option<Product>, RepositoryError> {
        let document: Option<String> = sqlx::query_scalar(
            "SELECT document_json FROM product WHERE tenant_id = ? AND product_id = ?",
        )
        .bind(&tenant_id.0)
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        document.map(|document| decode_document("document_json", &document)).transpose()
    }

    async fn save(&self, product: Product) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO product (tenant_id, product_id, name, document_json)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(tenant_id, product_id) DO UPDATE SET
                name = excluded.name,
                document_json = excluded.document_json",
        )
        .bind(&product.tenant_id.0)
        .bind(&product.product_id.0)
        .bind(&product.name)
        .bind(encode_document("document_json", &product)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use salesagent_core::domain::product::ProductId;
    use salesagent_core::domain::tenant::TenantId;

    use super::SqlProductRepository;
    use crate::repositories::test_support::{sample_product, sample_tenant, setup_pool};
    use crate::repositories::{ProductRepository, SqlTenantRepository, TenantRepository};

    #[tokio::test]
    async fn catalog_is_listed_per_tenant() {
        let pool = setup_pool().await;
        let tenants = SqlTenantRepository::new(pool.clone());
        tenants.save(sample_tenant("acme")).await.expect("save acme");
        tenants.save(sample_tenant("globex")).await.expect("save globex");

        let repo = SqlProductRepository::new(pool);
        repo.save(sample_product("acme", "sports")).await.expect("save sports");
        repo.save(sample_product("acme", "homepage")).await.expect("save homepage");
        repo.save(sample_product("globex", "homepage")).await.expect("save globex homepage");

        let acme = repo.list_for_tenant(&TenantId("acme".to_string())).await.expect("list acme");
        let ids: Vec<&str> = acme.iter().map(|product| product.product_id.0.as_str()).collect();
        assert_eq!(ids, ["homepage", "sports"]);
        assert!(acme.iter().all(|product| product.tenant_id.0 == "acme"));
    }

    #[tokio::test]
    async fn pricing_options_survive_storage() {
        let pool = setup_pool().await;
        SqlTenantRepository::new(pool.clone())
            .save(sample_tenant("acme"))
            .await
            .expect("save tenant");
        let repo = SqlProductRepository::new(pool);
        let product = sample_product("acme", "homepage");
        repo.save(product.clone()).await.expect("save product");

        let found = repo
            .find(&TenantId("acme".to_string()), &ProductId("homepage".to_string()))
            .await
            .expect("find")
            .expect("present");
        let option = &found.pricing_options[0];
        assert_eq!(option.fixed_rate(), Some(Decimal::new(125, 1)));
        assert_eq!(option.min_spend, Some(Decimal::from(500)));
        assert_eq!(found, product);
    }
}
