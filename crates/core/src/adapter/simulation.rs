//! In-process ad server.
//!
//! Orders are accepted immediately, creatives are accepted when their asset is
//! an http(s) URL, and delivery accrues linearly across the flight. Failures
//! can be scripted per operation for tests and demos.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::adapter::{
    AdServerAdapter, AdServerReview, AdapterCredentials, AdapterError, AdapterHealth,
    BuyAcceptance, BuyOrder, CreativeAsset, CreativeSyncResult, DeliveryRequest,
};
use crate::domain::delivery::{DeliveryReport, PackageDelivery};
use crate::domain::media_buy::MediaBuyId;
use crate::domain::tenant::AdapterKind;

/// Impressions per unit of spend at the simulator's nominal 10.00 CPM.
const IMPRESSIONS_PER_SPEND: u64 = 100;
/// One click per thousand impressions.
const IMPRESSIONS_PER_CLICK: u64 = 1_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SimulatedOperation {
    CreateOrUpdateBuy,
    SyncCreatives,
    FetchDeliveryMetrics,
    HealthCheck,
}

#[derive(Default)]
struct SimulationState {
    orders: HashMap<MediaBuyId, String>,
    scripted: HashMap<SimulatedOperation, VecDeque<AdapterError>>,
    calls: HashMap<SimulatedOperation, u32>,
}

#[derive(Default)]
pub struct SimulationAdapter {
    state: Mutex<SimulationState>,
}

impl SimulationAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `error` to be returned by the next call of `operation`.
    pub fn fail_next(&self, operation: SimulatedOperation, error: AdapterError) {
        self.with_state(|state| state.scripted.entry(operation).or_default().push_back(error));
    }

    pub fn call_count(&self, operation: SimulatedOperation) -> u32 {
        self.with_state(|state| state.calls.get(&operation).copied().unwrap_or(0))
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut SimulationState) -> T) -> T {
        match self.state.lock() {
            Ok(mut state) => f(&mut state),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    fn begin(&self, operation: SimulatedOperation) -> Result<(), AdapterError> {
        self.with_state(|state| {
            *state.calls.entry(operation).or_insert(0) += 1;
            match state.scripted.get_mut(&operation).and_then(VecDeque::pop_front) {
                Some(error) => Err(error),
                None => Ok(()),
            }
        })
    }
}

#[async_trait]
impl AdServerAdapter for SimulationAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Simulation
    }

    async fn create_or_update_buy(
        &self,
        _credentials: &AdapterCredentials,
        order: &BuyOrder,
    ) -> Result<BuyAcceptance, AdapterError> {
        self.begin(SimulatedOperation::CreateOrUpdateBuy)?;
        if order.flight.end <= order.flight.start {
            return Err(AdapterError::fatal("flight end must be after flight start"));
        }

        let external_ref = self.with_state(|state| {
            state
                .orders
                .entry(order.media_buy_id.clone())
                .or_insert_with(|| format!("sim-{}", order.media_buy_id))
                .clone()
        });
        Ok(BuyAcceptance { external_ref })
    }

    async fn sync_creatives(
        &self,
        _credentials: &AdapterCredentials,
        _external_ref: &str,
        creatives: &[CreativeAsset],
    ) -> Result<Vec<CreativeSyncResult>, AdapterError> {
        self.begin(SimulatedOperation::SyncCreatives)?;
        Ok(creatives
            .iter()
            .map(|creative| {
                let url = creative.asset_url.to_ascii_lowercase();
                let review = if url.starts_with("https://") || url.starts_with("http://") {
                    AdServerReview::Accepted
                } else {
                    AdServerReview::Rejected {
                        reason: format!("asset url `{}` is not an http(s) URL", creative.asset_url),
                    }
                };
                CreativeSyncResult { creative_id: creative.creative_id.clone(), review }
            })
            .collect())
    }

    async fn fetch_delivery_metrics(
        &self,
        _credentials: &AdapterCredentials,
        request: &DeliveryRequest,
    ) -> Result<DeliveryReport, AdapterError> {
        self.begin(SimulatedOperation::FetchDeliveryMetrics)?;

        let flight = request.flight;
        let total_seconds = (flight.end - flight.start).num_seconds();
        let elapsed_seconds =
            (request.window.end.min(flight.end) - flight.start).num_seconds().clamp(0, total_seconds);
        let fraction = if total_seconds > 0 {
            Decimal::from(elapsed_seconds) / Decimal::from(total_seconds)
        } else {
            Decimal::ZERO
        };

        let packages: Vec<PackageDelivery> = request
            .packages
            .iter()
            .map(|package| {
                let spend = package.budget.saturating_mul(fraction).round_dp(2);
                let impressions =
                    spend.floor().to_u64().unwrap_or(u64::MAX).saturating_mul(IMPRESSIONS_PER_SPEND);
                PackageDelivery {
                    package_id: package.package_id.clone(),
                    impressions,
                    clicks: impressions / IMPRESSIONS_PER_CLICK,
                    spend,
                }
            })
            .collect();

        Ok(DeliveryReport {
            window: request.window,
            currency: request.currency.clone(),
            impressions: packages.iter().fold(0, |sum, package| sum.saturating_add(package.impressions)),
            clicks: packages.iter().fold(0, |sum, package| sum.saturating_add(package.clicks)),
            spend: packages.iter().fold(Decimal::ZERO, |sum, package| sum.saturating_add(package.spend)),
            packages,
        })
    }

    async fn health_check(
        &self,
        _credentials: &AdapterCredentials,
    ) -> Result<AdapterHealth, AdapterError> {
        self.begin(SimulatedOperation::HealthCheck)?;
        Ok(AdapterHealth {
            healthy: true,
            detail: "simulation backend".to_string(),
            checked_at: Utc::now(),
        })
    }
}
