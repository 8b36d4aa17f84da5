use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::creative::CreativeId;
use crate::domain::pricing_option::{Currency, PricingOptionId};
use crate::domain::principal::PrincipalId;
use crate::domain::product::ProductId;
use crate::domain::tenant::TenantId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaBuyId(pub String);

impl MediaBuyId {
    pub fn generate() -> Self {
        Self(format!("mb_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl std::fmt::Display for MediaBuyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaBuyStatus {
    Draft,
    PendingCreative,
    PendingApproval,
    Active,
    Paused,
    Completed,
    Failed,
}

impl MediaBuyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingCreative => "pending_creative",
            Self::PendingApproval => "pending_approval",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "pending_creative" => Some(Self::PendingCreative),
            "pending_approval" => Some(Self::PendingApproval),
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for MediaBuyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FlightWindow {
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.start
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end
    }

    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.has_started(now) && !self.has_ended(now)
    }
}

/// A budget-bearing line item. `budget` is in the currency of the referenced
/// pricing option; the currency is never stored on the package itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub package_id: PackageId,
    pub product_id: ProductId,
    pub pricing_option_id: PricingOptionId,
    #[serde(with = "rust_decimal::serde::float")]
    pub budget: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaBuy {
    pub id: MediaBuyId,
    pub tenant_id: TenantId,
    pub principal_id: PrincipalId,
    pub buyer_ref: Option<String>,
    pub status: MediaBuyStatus,
    /// Currency shared by every package's pricing option.
    pub currency: Currency,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_budget: Decimal,
    pub flight: FlightWindow,
    pub packages: Vec<Package>,
    pub creative_ids: Vec<CreativeId>,
    /// Order id assigned by the ad server once it accepted the buy.
    pub external_ref: Option<String>,
    /// Incremented on every persisted change; used for compare-and-set writes.
    pub state_version: u32,
    pub status_changed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaBuy {
    pub fn package(&self, package_id: &PackageId) -> Option<&Package> {
        self.packages.iter().find(|package| &package.package_id == package_id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{FlightWindow, MediaBuyStatus};

    #[test]
    fn status_round_trips_from_storage_encoding() {
        let cases = [
            MediaBuyStatus::Draft,
            MediaBuyStatus::PendingCreative,
            MediaBuyStatus::PendingApproval,
            MediaBuyStatus::Active,
            MediaBuyStatus::Paused,
            MediaBuyStatus::Completed,
            MediaBuyStatus::Failed,
        ];

        for status in cases {
            assert_eq!(MediaBuyStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MediaBuyStatus::parse("archived"), None);
    }

    #[test]
    fn flight_window_bounds() {
        let now = Utc::now();
        let flight = FlightWindow { start: now - Duration::days(1), end: now + Duration::days(1) };

        assert!(flight.contains(now));
        assert!(!flight.contains(now + Duration::days(2)));
        assert!(!flight.has_started(now - Duration::days(2)));
        assert!(flight.has_ended(now + Duration::days(1)));
    }
}
