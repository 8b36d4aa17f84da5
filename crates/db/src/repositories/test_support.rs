use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::json;

use salesagent_core::domain::creative::{Creative, CreativeId, CreativeReview};
use salesagent_core::domain::media_buy::{
    FlightWindow, MediaBuy, MediaBuyId, MediaBuyStatus, Package, PackageId,
};
use salesagent_core::domain::pricing_option::{Currency, PricingOption, PricingOptionId};
use salesagent_core::domain::principal::{PermissionScope, Principal, PrincipalId, TokenHash};
use salesagent_core::domain::product::{DeliveryType, Product, ProductId};
use salesagent_core::domain::tenant::{Tenant, TenantConfig, TenantId};

use crate::{connect_with_settings, migrations, DbPool};

pub(crate) async fn setup_pool() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
    migrations::run_pending(&pool).await.expect("run migrations");
    pool
}

pub(crate) fn sample_tenant(id: &str) -> Tenant {
    let created_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("timestamp");
    Tenant {
        id: TenantId(id.to_string()),
        name: format!("{id} media"),
        subdomain: id.to_string(),
        active: true,
        config: TenantConfig::default(),
        created_at,
        updated_at: created_at,
    }
}

pub(crate) fn sample_principal(tenant: &str, id: &str, token: &str) -> Principal {
    Principal {
        id: PrincipalId(id.to_string()),
        tenant_id: TenantId(tenant.to_string()),
        name: format!("{id} agency"),
        token_hash: TokenHash::of(token),
        scope: PermissionScope::Buyer,
        created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("timestamp"),
    }
}

pub(crate) fn sample_product(tenant: &str, id: &str) -> Product {
    let option: PricingOption = serde_json::from_value(json!({
        "pricing_option_id": "cpm_usd_fixed",
        "pricing_model": "cpm",
        "currency": "USD",
        "is_fixed": true,
        "rate": 12.5,
        "min_spend": 500.0
    }))
    .expect("pricing option");

    Product {
        product_id: ProductId(id.to_string()),
        tenant_id: TenantId(tenant.to_string()),
        name: format!("{id} placement"),
        description: "Above-the-fold display".to_string(),
        delivery_type: DeliveryType::Guaranteed,
        format_ids: vec!["display_300x250".to_string()],
        pricing_options: vec![option],
    }
}

pub(crate) fn sample_media_buy(tenant: &str, id: &str) -> MediaBuy {
    let created_at = Utc.with_ymd_and_hms(2026, 2, 1, 9, 30, 0).single().expect("timestamp");
    MediaBuy {
        id: MediaBuyId(id.to_string()),
        tenant_id: TenantId(tenant.to_string()),
        principal_id: PrincipalId("buyer-1".to_string()),
        buyer_ref: Some("campaign-42".to_string()),
        status: MediaBuyStatus::Draft,
        currency: Currency::parse("USD").expect("currency"),
        total_budget: Decimal::new(250050, 2),
        flight: FlightWindow { start: created_at + Duration::days(1), end: created_at + Duration::days(31) },
        packages: vec![Package {
            package_id: PackageId("pkg_1".to_string()),
            product_id: ProductId("homepage".to_string()),
            pricing_option_id: PricingOptionId("cpm_usd_fixed".to_string()),
            budget: Decimal::new(250050, 2),
        }],
        creative_ids: Vec::new(),
        external_ref: None,
        state_version: 0,
        status_changed_at: created_at,
        created_at,
        updated_at: created_at,
    }
}

pub(crate) fn sample_creative(tenant: &str, id: &str, media_buy: Option<&str>) -> Creative {
    let created_at = Utc.with_ymd_and_hms(2026, 2, 2, 12, 0, 0).single().expect("timestamp");
    Creative {
        id: CreativeId(id.to_string()),
        tenant_id: TenantId(tenant.to_string()),
        principal_id: PrincipalId("buyer-1".to_string()),
        media_buy_id: media_buy.map(|value| MediaBuyId(value.to_string())),
        name: format!("{id} banner"),
        format_id: "display_300x250".to_string(),
        asset_url: "https://cdn.example.com/banner.png".to_string(),
        click_url: Some("https://brand.example.com".to_string()),
        review: CreativeReview::pending(),
        created_at,
        updated_at: created_at,
    }
}
