//! Typed skill inputs. Unknown fields are rejected so that typos and
//! misplaced fields surface as schema errors instead of being ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use salesagent_core::domain::creative::CreativeId;
use salesagent_core::domain::media_buy::{MediaBuyId, PackageId};
use salesagent_core::domain::product::DeliveryType;
use salesagent_core::pricing::PackageSelection;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetProductsInput {
    /// Free-text brief, matched against product names and descriptions.
    #[serde(default)]
    pub brief: Option<String>,
    #[serde(default)]
    pub delivery_type: Option<DeliveryType>,
    #[serde(default)]
    pub format_ids: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmptyInput {}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMediaBuyInput {
    #[serde(default)]
    pub buyer_ref: Option<String>,
    pub packages: Vec<PackageSelection>,
    /// Bare number; the currency comes from the pricing options.
    #[serde(default)]
    pub total_budget: Option<Value>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuyAction {
    Pause,
    Resume,
    Cancel,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageBudgetUpdate {
    pub package_id: PackageId,
    pub budget: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMediaBuyInput {
    pub media_buy_id: MediaBuyId,
    #[serde(default)]
    pub action: Option<BuyAction>,
    #[serde(default)]
    pub total_budget: Option<Value>,
    #[serde(default)]
    pub packages: Vec<PackageBudgetUpdate>,
}

impl UpdateMediaBuyInput {
    pub fn changes_budget(&self) -> bool {
        self.total_budget.is_some() || !self.packages.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MediaBuyRef {
    pub media_buy_id: MediaBuyId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreativeUpload {
    pub creative_id: CreativeId,
    pub name: String,
    pub format_id: String,
    pub asset_url: String,
    #[serde(default)]
    pub click_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncCreativesInput {
    /// Creatives without a media buy are stored in the principal's library.
    #[serde(default)]
    pub media_buy_id: Option<MediaBuyId>,
    pub creatives: Vec<CreativeUpload>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListCreativesInput {
    #[serde(default)]
    pub media_buy_id: Option<MediaBuyId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approved",
            Self::Reject => "rejected",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReviewCreativeInput {
    pub creative_id: CreativeId,
    pub decision: ReviewDecision,
    /// Required when rejecting.
    #[serde(default)]
    pub feedback: Option<String>,
}
