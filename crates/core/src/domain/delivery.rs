use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::media_buy::PackageId;
use crate::domain::pricing_option::Currency;

/// Reporting window for delivery metrics, `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDelivery {
    pub package_id: PackageId,
    pub impressions: u64,
    pub clicks: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub spend: Decimal,
}

/// Cumulative delivery for one media buy up to `window.end`. Reports are
/// snapshots, never deltas, so applying the same report twice cannot
/// double-count spend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub window: DeliveryWindow,
    pub currency: Currency,
    pub impressions: u64,
    pub clicks: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub spend: Decimal,
    pub packages: Vec<PackageDelivery>,
}

impl DeliveryReport {
    /// Content fingerprint used to recognise a report that was already recorded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.window.start.to_rfc3339().as_bytes());
        hasher.update(self.window.end.to_rfc3339().as_bytes());
        hasher.update(self.currency.as_str().as_bytes());
        hasher.update(&self.impressions.to_le_bytes());
        hasher.update(&self.clicks.to_le_bytes());
        hasher.update(self.spend.normalize().to_string().as_bytes());
        for package in &self.packages {
            hasher.update(package.package_id.0.as_bytes());
            hasher.update(&package.impressions.to_le_bytes());
            hasher.update(&package.clicks.to_le_bytes());
            hasher.update(package.spend.normalize().to_string().as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Share of `budget` already spent, as a percentage rounded to two places.
    pub fn pacing_pct(&self, budget: Decimal) -> Decimal {
        if budget.is_zero() {
            return Decimal::ZERO;
        }
        (self.spend / budget * Decimal::from(100)).round_dp(2)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::{DeliveryReport, DeliveryWindow};
    use crate::domain::pricing_option::Currency;

    fn report(spend: Decimal) -> DeliveryReport {
        let end = Utc::now();
        DeliveryReport {
            window: DeliveryWindow { start: end - Duration::days(3), end },
            currency: Currency::parse("USD").expect("currency"),
            impressions: 10_000,
            clicks: 12,
            spend,
            packages: Vec::new(),
        }
    }

    #[test]
    fn fingerprint_ignores_decimal_scale_but_tracks_values() {
        let base = report(Decimal::new(1250, 1));
        let rescaled = DeliveryReport { spend: Decimal::new(12500, 2), ..base.clone() };
        let changed = DeliveryReport { spend: Decimal::new(1260, 1), ..base.clone() };

        assert_eq!(base.fingerprint(), rescaled.fingerprint());
        assert_ne!(base.fingerprint(), changed.fingerprint());
    }

    #[test]
    fn pacing_is_percentage_of_budget() {
        let report = report(Decimal::from(250));
        assert_eq!(report.pacing_pct(Decimal::from(1000)), Decimal::from(25));
        assert_eq!(report.pacing_pct(Decimal::ZERO), Decimal::ZERO);
    }
}
