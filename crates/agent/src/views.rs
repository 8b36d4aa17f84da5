//! Wire payloads returned by skills.
//!
//! Each view is built field by field from the stored record. Review status
//! and reviewer feedback only appear in reviewer-facing payloads.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use salesagent_core::domain::creative::{Creative, CreativeId, CreativeView};
use salesagent_core::domain::delivery::DeliveryReport;
use salesagent_core::domain::media_buy::{MediaBuy, MediaBuyId, MediaBuyStatus, PackageId};
use salesagent_core::domain::pricing_option::{Currency, PricingOption, PricingOptionId};
use salesagent_core::domain::principal::PrincipalId;
use salesagent_core::domain::product::{CreativeFormat, DeliveryType, Product, ProductId};
use salesagent_core::domain::workflow_step::WorkflowStep;

use crate::inputs::ReviewDecision;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductView {
    pub product_id: ProductId,
    pub name: String,
    pub description: String,
    pub delivery_type: DeliveryType,
    pub format_ids: Vec<String>,
    pub pricing_options: Vec<PricingOption>,
}

impl From<&Product> for ProductView {
    fn from(product: &Product) -> Self {
        Self {
            product_id: product.product_id.clone(),
            name: product.name.clone(),
            description: product.description.clone(),
            delivery_type: product.delivery_type,
            format_ids: product.format_ids.clone(),
            pricing_options: product.pricing_options.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductList {
    pub products: Vec<ProductView>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormatList {
    pub formats: Vec<CreativeFormat>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageView {
    pub package_id: PackageId,
    pub product_id: ProductId,
    pub pricing_option_id: PricingOptionId,
    #[serde(with = "rust_decimal::serde::float")]
    pub budget: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MediaBuyView {
    pub media_buy_id: MediaBuyId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_ref: Option<String>,
    pub status: MediaBuyStatus,
    pub currency: Currency,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_budget: Decimal,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub packages: Vec<PackageView>,
    pub creative_ids: Vec<CreativeId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&MediaBuy> for MediaBuyView {
    fn from(buy: &MediaBuy) -> Self {
        Self {
            media_buy_id: buy.id.clone(),
            buyer_ref: buy.buyer_ref.clone(),
            status: buy.status,
            currency: buy.currency.clone(),
            total_budget: buy.total_budget,
            start_time: buy.flight.start,
            end_time: buy.flight.end,
            packages: buy
                .packages
                .iter()
                .map(|package| PackageView {
                    package_id: package.package_id.clone(),
                    product_id: package.product_id.clone(),
                    pricing_option_id: package.pricing_option_id.clone(),
                    budget: package.budget,
                })
                .collect(),
            creative_ids: buy.creative_ids.clone(),
            created_at: buy.created_at,
            updated_at: buy.updated_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeliveryView {
    pub media_buy_id: MediaBuyId,
    pub status: MediaBuyStatus,
    pub delivery: DeliveryReport,
    #[serde(with = "rust_decimal::serde::float")]
    pub pacing_pct: Decimal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Created,
    Updated,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncedCreative {
    pub creative_id: CreativeId,
    pub action: SyncAction,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncCreativesResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_buy_id: Option<MediaBuyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_buy_status: Option<MediaBuyStatus>,
    pub creatives: Vec<SyncedCreative>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreativeList {
    pub creatives: Vec<CreativeView>,
}

/// Echo of a reviewer's decision. Reviewer-facing only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReviewOutcome {
    pub creative_id: CreativeId,
    pub decision: ReviewDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_buy_id: Option<MediaBuyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_buy_status: Option<MediaBuyStatus>,
}

/// A creative waiting for a human decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReviewTask {
    pub creative_id: CreativeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_buy_id: Option<MediaBuyId>,
    pub principal_id: PrincipalId,
    pub name: String,
    pub format_id: String,
    pub asset_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click_url: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl From<&Creative> for ReviewTask {
    fn from(creative: &Creative) -> Self {
        Self {
            creative_id: creative.id.clone(),
            media_buy_id: creative.media_buy_id.clone(),
            principal_id: creative.principal_id.clone(),
            name: creative.name.clone(),
            format_id: creative.format_id.clone(),
            asset_url: creative.asset_url.clone(),
            click_url: creative.click_url.clone(),
            submitted_at: creative.updated_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReviewTaskList {
    pub tasks: Vec<ReviewTask>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowStepList {
    pub media_buy_id: MediaBuyId,
    pub steps: Vec<WorkflowStep>,
}
