use serde::{Deserialize, Serialize};

use crate::domain::pricing_option::{PricingOption, PricingOptionId};
use crate::domain::tenant::TenantId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
    Guaranteed,
    NonGuaranteed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: ProductId,
    pub tenant_id: TenantId,
    pub name: String,
    pub description: String,
    pub delivery_type: DeliveryType,
    pub format_ids: Vec<String>,
    pub pricing_options: Vec<PricingOption>,
}

impl Product {
    pub fn pricing_option(&self, id: &PricingOptionId) -> Option<&PricingOption> {
        self.pricing_options.iter().find(|option| &option.id == id)
    }
}

/// A creative format a tenant's products accept.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreativeFormat {
    pub format_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}
