//! Background delivery reconciliation.
//!
//! Each pass walks the active tenants, runs the time-driven sweeps, then
//! re-fetches delivery for every active or paused buy. Passes are idempotent:
//! a pass that sees the same cumulative report as the last recorded one adds
//! nothing.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use salesagent_core::domain::media_buy::MediaBuyStatus;
use salesagent_core::domain::tenant::Tenant;
use salesagent_core::errors::ApplicationError;
use salesagent_db::repositories::{MediaBuyRepository, TenantRepository};

use crate::service::{DeliveryOutcome, MediaBuyService};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconciliationSummary {
    pub tenants: usize,
    pub buys_checked: usize,
    pub steps_recorded: usize,
    pub completed: usize,
    pub activated: usize,
    pub expired: usize,
    pub failed_unactivated: usize,
    pub fetch_failures: usize,
}

pub struct Reconciler {
    service: Arc<MediaBuyService>,
    granularity: chrono::Duration,
}

impl Reconciler {
    pub fn new(service: Arc<MediaBuyService>, granularity: Duration) -> Self {
        let granularity = chrono::Duration::from_std(granularity)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        Self { service, granularity }
    }

    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<ReconciliationSummary, ApplicationError> {
        let tenants = self.service.repositories().tenants.list_active().await?;
        let mut summary = ReconciliationSummary { tenants: tenants.len(), ..Default::default() };

        for tenant in &tenants {
            if let Err(error) = self.reconcile_tenant(tenant, now, &mut summary).await {
                warn!(
                    event_name = "reconciliation.tenant_failed",
                    tenant_id = %tenant.id,
                    error_code = error.code().as_str(),
                    error = %error,
                    "tenant reconciliation aborted"
                );
            }
        }

        info!(
            event_name = "reconciliation.pass_completed",
            tenants = summary.tenants,
            buys_checked = summary.buys_checked,
            steps_recorded = summary.steps_recorded,
            completed = summary.completed,
            activated = summary.activated,
            expired = summary.expired,
            failed_unactivated = summary.failed_unactivated,
            fetch_failures = summary.fetch_failures,
            "reconciliation pass completed"
        );
        Ok(summary)
    }

    async fn reconcile_tenant(
        &self,
        tenant: &Tenant,
        now: DateTime<Utc>,
        summary: &mut ReconciliationSummary,
    ) -> Result<(), ApplicationError> {
        summary.expired += self.service.expire_approvals(tenant, now).await?;
        summary.activated += self.service.activate_due(tenant, now).await?;
        summary.failed_unactivated += self.service.fail_unactivated(tenant, now).await?;

        let media_buys = &self.service.repositories().media_buys;
        for status in [MediaBuyStatus::Active, MediaBuyStatus::Paused] {
            for buy in media_buys.list_by_status(&tenant.id, status).await? {
                summary.buys_checked += 1;
                match self.service.reconcile_delivery(tenant, &buy.id, now, self.granularity).await {
                    Ok(DeliveryOutcome::Reconciled { recorded, completed }) => {
                        summary.steps_recorded += usize::from(recorded);
                        summary.completed += usize::from(completed);
                    }
                    Ok(DeliveryOutcome::Skipped) => {}
                    Err(error) => {
                        summary.fetch_failures += 1;
                        warn!(
                            event_name = "reconciliation.buy_failed",
                            tenant_id = %tenant.id,
                            media_buy_id = %buy.id,
                            error_code = error.code().as_str(),
                            error = %error,
                            "delivery reconciliation failed, will retry next pass"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Run a pass every `interval` until `shutdown` flips to true.
    pub fn spawn(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(
                event_name = "reconciliation.started",
                interval_secs = interval.as_secs(),
                "delivery reconciler started"
            );
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(error) = self.run_once(Utc::now()).await {
                            warn!(
                                event_name = "reconciliation.pass_failed",
                                error = %error,
                                "reconciliation pass failed"
                            );
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!(event_name = "reconciliation.stopped", "delivery reconciler stopped");
        })
    }
}
