//! Media-buy operations.
//!
//! Every change to a buy runs under its per-buy lock, re-reads the stored
//! record, computes the transition, writes with compare-and-set on
//! `state_version`, and appends one workflow step. Creative writes also hold
//! the creative's lock, taken after the buy's.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::OwnedMutexGuard;
use tracing::{info, warn};

use salesagent_core::adapter::{
    call_with_retry, AdServerAdapter, AdServerReview, AdapterCredentials, AdapterError,
    AdapterRegistry, BuyOrder, CreativeAsset, CreativeSyncResult, CredentialResolver,
    DeliveryRequest, RetryPolicy,
};
use salesagent_core::domain::creative::{Creative, CreativeReview, ReviewStatus};
use salesagent_core::domain::delivery::{DeliveryReport, DeliveryWindow};
use salesagent_core::domain::media_buy::{
    FlightWindow, MediaBuy, MediaBuyId, MediaBuyStatus, Package, PackageId,
};
use salesagent_core::domain::principal::PermissionScope;
use salesagent_core::domain::product::{CreativeFormat, Product};
use salesagent_core::domain::tenant::{BudgetPolicy, Tenant};
use salesagent_core::domain::workflow_step::{StepOutcome, WorkflowStep, WorkflowStepKind};
use salesagent_core::errors::{ApplicationError, DomainError};
use salesagent_core::pricing;
use salesagent_core::workflow::{
    transition, transition_step, TransitionContext, WorkflowEvent, WorkflowStateError,
};
use salesagent_db::repositories::{
    CreativeRepository, MediaBuyRepository, RepositorySet, WorkflowStepRepository,
};

use crate::catalog::CatalogCache;
use crate::context::RequestContext;
use crate::inputs::{
    BuyAction, CreateMediaBuyInput, CreativeUpload, GetProductsInput, ListCreativesInput,
    ReviewCreativeInput, ReviewDecision, SyncCreativesInput, UpdateMediaBuyInput,
};
use crate::locks::RecordLocks;
use crate::views::{
    DeliveryView, ReviewOutcome, ReviewTask, SyncAction, SyncCreativesResult, SyncedCreative,
};

pub(crate) const SYSTEM_ACTOR: &str = "system:reconciler";
const AUTO_APPROVAL_ACTOR: &str = "system:auto_approval";
const AD_SERVER_ACTOR: &str = "ad_server";

/// Result of reconciling one buy's delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Skipped,
    Reconciled { recorded: bool, completed: bool },
}

/// Review state of the creatives attached to a buy. Rejected creatives are
/// superseded by resubmissions and do not count either way.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct CreativeReadiness {
    approved: usize,
    pending: usize,
}

impl CreativeReadiness {
    fn of(creatives: &[Creative]) -> Self {
        creatives.iter().fold(Self::default(), |mut readiness, creative| {
            match creative.review.status {
                ReviewStatus::Approved => readiness.approved += 1,
                ReviewStatus::PendingReview => readiness.pending += 1,
                ReviewStatus::Rejected => {}
            }
            readiness
        })
    }

    fn is_cleared(&self) -> bool {
        self.pending == 0 && self.approved > 0
    }
}

pub struct MediaBuyService {
    repos: RepositorySet,
    catalog: Arc<CatalogCache>,
    adapters: AdapterRegistry,
    credentials: Arc<dyn CredentialResolver>,
    retry: RetryPolicy,
    locks: RecordLocks,
}

impl MediaBuyService {
    pub fn new(
        repos: RepositorySet,
        catalog: Arc<CatalogCache>,
        adapters: AdapterRegistry,
        credentials: Arc<dyn CredentialResolver>,
        retry: RetryPolicy,
    ) -> Self {
        Self { repos, catalog, adapters, credentials, retry, locks: RecordLocks::default() }
    }

    pub fn repositories(&self) -> &RepositorySet {
        &self.repos
    }

    pub async fn get_products(
        &self,
        ctx: &RequestContext,
        input: &GetProductsInput,
    ) -> Result<Vec<Product>, ApplicationError> {
        let catalog = self.catalog.products(ctx).await?;
        let terms: Vec<String> = input
            .brief
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();

        Ok(catalog
            .iter()
            .filter(|product| {
                input.delivery_type.map_or(true, |wanted| product.delivery_type == wanted)
            })
            .filter(|product| {
                input.format_ids.as_ref().map_or(true, |wanted| {
                    wanted.iter().any(|format_id| product.format_ids.contains(format_id))
                })
            })
            .filter(|product| {
                if terms.is_empty() {
                    return true;
                }
                let haystack =
                    format!("{} {}", product.name, product.description).to_lowercase();
                terms.iter().any(|term| haystack.contains(term.as_str()))
            })
            .cloned()
            .collect())
    }

    pub async fn list_creative_formats(
        &self,
        ctx: &RequestContext,
    ) -> Result<Vec<CreativeFormat>, ApplicationError> {
        Ok(self.catalog.formats(ctx).await?)
    }

    pub async fn create_media_buy(
        &self,
        ctx: &RequestContext,
        input: CreateMediaBuyInput,
    ) -> Result<MediaBuy, ApplicationError> {
        let now = Utc::now();
        let flight = FlightWindow { start: input.start_time, end: input.end_time };
        if flight.end <= flight.start {
            return Err(invariant("end_time must be after start_time"));
        }
        if flight.has_ended(now) {
            return Err(invariant("the flight has already ended"));
        }

        let catalog = self.catalog.products(ctx).await?;
        let resolved = pricing::resolve_buy(
            &catalog,
            ctx.tenant().config.budget_policy,
            input.total_budget.as_ref(),
            &input.packages,
        )?;

        let buy = MediaBuy {
            id: MediaBuyId::generate(),
            tenant_id: ctx.tenant_id().clone(),
            principal_id: ctx.principal_id().clone(),
            buyer_ref: input.buyer_ref,
            status: MediaBuyStatus::Draft,
            currency: resolved.currency,
            total_budget: resolved.total_budget,
            flight,
            packages: resolved
                .allocations
                .iter()
                .enumerate()
                .map(|(index, allocation)| Package {
                    package_id: PackageId(format!("pkg_{}", index + 1)),
                    product_id: allocation.product_id.clone(),
                    pricing_option_id: allocation.pricing_option_id.clone(),
                    budget: allocation.budget,
                })
                .collect(),
            creative_ids: Vec::new(),
            external_ref: None,
            state_version: 0,
            status_changed_at: now,
            created_at: now,
            updated_at: now,
        };

        let _guard = self.locks.media_buy(&buy.tenant_id, &buy.id).await;
        self.repos.media_buys.insert(buy.clone()).await?;
        info!(
            event_name = "media_buy.created",
            correlation_id = %ctx.correlation_id(),
            tenant_id = %buy.tenant_id,
            media_buy_id = %buy.id,
            currency = %buy.currency,
            total_budget = %buy.total_budget,
            package_count = buy.packages.len(),
            "media buy drafted"
        );

        let actor = ctx.actor();
        let order = BuyOrder::from(&buy);
        let accepted = match self.adapter_for(ctx.tenant()) {
            Ok((adapter, credentials)) => {
                let (adapter, credentials, order) = (adapter.as_ref(), &credentials, &order);
                call_with_retry(&self.retry, "create_or_update_buy", move || {
                    adapter.create_or_update_buy(credentials, order)
                })
                .await
            }
            Err(error) => Err(error),
        };

        match accepted {
            Ok(acceptance) => {
                let external_ref = acceptance.external_ref;
                let mut accepted_buy = buy;
                accepted_buy.external_ref = Some(external_ref.clone());
                let context = TransitionContext::new(Utc::now(), flight);
                self.apply_event(accepted_buy, WorkflowEvent::BuyAccepted, context, &actor, |step| {
                    step.with_detail("external_ref", external_ref.as_str())
                })
                .await
            }
            Err(error) => Err(self.fail_on_adapter_error(buy, error, &actor).await),
        }
    }

    pub async fn update_media_buy(
        &self,
        ctx: &RequestContext,
        input: UpdateMediaBuyInput,
    ) -> Result<MediaBuy, ApplicationError> {
        if input.action.is_none() && !input.changes_budget() {
            return Err(invariant("update_media_buy needs an action or a budget change"));
        }

        let _guard = self.locks.media_buy(ctx.tenant_id(), &input.media_buy_id).await;
        let mut buy = self.load_owned_buy(ctx, &input.media_buy_id).await?;
        let actor = ctx.actor();

        let event = input.action.map(|action| match action {
            BuyAction::Pause => WorkflowEvent::PauseRequested,
            BuyAction::Resume => WorkflowEvent::ResumeRequested,
            BuyAction::Cancel => WorkflowEvent::CancelRequested,
        });
        // An illegal action rejects the whole update before anything is written.
        if let Some(event) = &event {
            transition(buy.status, event, &TransitionContext::new(Utc::now(), buy.flight))?;
        }

        if input.changes_budget() {
            buy = self.apply_budget_update(ctx, buy, &input, &actor).await?;
        }

        if let Some(event) = event {
            let context = TransitionContext::new(Utc::now(), buy.flight);
            buy = self.apply_event(buy, event, context, &actor, |step| step).await?;
        }
        Ok(buy)
    }

    pub async fn get_media_buy(
        &self,
        ctx: &RequestContext,
        media_buy_id: &MediaBuyId,
    ) -> Result<MediaBuy, ApplicationError> {
        self.load_visible_buy(ctx, media_buy_id).await
    }

    /// Live delivery from the ad server, cumulative from flight start to now.
    pub async fn get_media_buy_delivery(
        &self,
        ctx: &RequestContext,
        media_buy_id: &MediaBuyId,
    ) -> Result<DeliveryView, ApplicationError> {
        let buy = self.load_visible_buy(ctx, media_buy_id).await?;
        let Some(external_ref) = buy.external_ref.clone() else {
            return Err(invariant(&format!("media buy `{}` has no ad server order", buy.id)));
        };
        let window_end = Utc::now().min(buy.flight.end).max(buy.flight.start);
        let window = DeliveryWindow { start: buy.flight.start, end: window_end };
        let report = self.fetch_delivery(ctx.tenant(), &buy, external_ref, window).await?;
        let pacing_pct = report.pacing_pct(buy.total_budget);
        Ok(DeliveryView { media_buy_id: buy.id, status: buy.status, delivery: report, pacing_pct })
    }

    pub async fn sync_creatives(
        &self,
        ctx: &RequestContext,
        input: SyncCreativesInput,
    ) -> Result<SyncCreativesResult, ApplicationError> {
        self.validate_uploads(ctx, &input.creatives).await?;
        let now = Utc::now();

        let Some(media_buy_id) = input.media_buy_id else {
            let _creative_guards = self.lock_creatives(ctx, &input.creatives).await;
            let mut synced = Vec::with_capacity(input.creatives.len());
            for upload in input.creatives {
                let (creative, action) = self.stage_creative(ctx, upload, None, now).await?;
                synced.push(SyncedCreative { creative_id: creative.id.clone(), action });
                self.repos.creatives.save(creative).await?;
            }
            return Ok(SyncCreativesResult {
                media_buy_id: None,
                media_buy_status: None,
                creatives: synced,
            });
        };

        let _guard = self.locks.media_buy(ctx.tenant_id(), &media_buy_id).await;
        let buy = self.load_owned_buy(ctx, &media_buy_id).await?;
        if buy.status != MediaBuyStatus::PendingCreative {
            return Err(WorkflowStateError::InvalidTransition {
                state: buy.status,
                event: "creatives_synced",
            }
            .into());
        }
        let Some(external_ref) = buy.external_ref.clone() else {
            return Err(invariant(&format!("media buy `{}` has no ad server order", buy.id)));
        };

        let _creative_guards = self.lock_creatives(ctx, &input.creatives).await;
        let mut staged = Vec::with_capacity(input.creatives.len());
        for upload in input.creatives {
            staged.push(self.stage_creative(ctx, upload, Some(media_buy_id.clone()), now).await?);
        }

        let actor = ctx.actor();
        let assets: Vec<CreativeAsset> =
            staged.iter().map(|(creative, _)| CreativeAsset::from(creative)).collect();
        let results = match self.push_creatives(ctx.tenant(), &external_ref, &assets).await {
            Ok(results) => results,
            Err(error) => return Err(self.fail_on_adapter_error(buy, error, &actor).await),
        };

        let policy = &ctx.tenant().config.approval;
        let mut rejected = Vec::new();
        let mut synced = Vec::with_capacity(staged.len());
        for (mut creative, action) in staged {
            let review = results
                .iter()
                .find(|result| result.creative_id == creative.id)
                .map(|result| result.review.clone())
                .unwrap_or(AdServerReview::PendingReview);
            creative.review = match review {
                AdServerReview::Accepted if policy.auto_approves(&creative.format_id) => {
                    CreativeReview::decided(ReviewStatus::Approved, None, AUTO_APPROVAL_ACTOR, now)
                }
                AdServerReview::Accepted | AdServerReview::PendingReview => CreativeReview::pending(),
                AdServerReview::Rejected { reason } => {
                    rejected.push((creative.id.clone(), reason.clone()));
                    CreativeReview::decided(ReviewStatus::Rejected, Some(reason), AD_SERVER_ACTOR, now)
                }
            };
            synced.push(SyncedCreative { creative_id: creative.id.clone(), action });
            self.repos.creatives.save(creative).await?;
        }

        let attached = self.repos.creatives.list_for_media_buy(ctx.tenant_id(), &buy.id).await?;
        let readiness = CreativeReadiness::of(&attached);
        let event = if !rejected.is_empty() {
            WorkflowEvent::CreativeRejected { resubmission_allowed: policy.allow_resubmission }
        } else {
            WorkflowEvent::CreativesSynced { requires_review: readiness.pending > 0 }
        };

        let mut updated = buy;
        let ids: BTreeSet<_> = updated
            .creative_ids
            .iter()
            .cloned()
            .chain(synced.iter().map(|creative| creative.creative_id.clone()))
            .collect();
        updated.creative_ids = ids.into_iter().collect();

        let context = TransitionContext::new(now, updated.flight)
            .with_creatives_cleared(readiness.is_cleared());
        let updated = self
            .apply_event(updated, event, context, &actor, |step| {
                let step = step.with_detail("synced", synced.len().to_string());
                match rejected.first() {
                    Some((creative_id, reason)) => step
                        .with_creative(creative_id.clone())
                        .with_detail("feedback", reason.as_str())
                        .with_detail("rejected", rejected.len().to_string()),
                    None => step,
                }
            })
            .await?;

        Ok(SyncCreativesResult {
            media_buy_id: Some(updated.id),
            media_buy_status: Some(updated.status),
            creatives: synced,
        })
    }

    /// Creatives of one buy, or the caller's own creatives when no buy is named.
    pub async fn list_creatives(
        &self,
        ctx: &RequestContext,
        input: &ListCreativesInput,
    ) -> Result<Vec<Creative>, ApplicationError> {
        match &input.media_buy_id {
            Some(media_buy_id) => {
                let buy = self.load_visible_buy(ctx, media_buy_id).await?;
                Ok(self.repos.creatives.list_for_media_buy(ctx.tenant_id(), &buy.id).await?)
            }
            None => Ok(self
                .repos
                .creatives
                .list_for_principal(ctx.tenant_id(), ctx.principal_id())
                .await?),
        }
    }

    /// Record a human review decision. Callers must hold reviewer scope.
    pub async fn review_creative(
        &self,
        ctx: &RequestContext,
        input: ReviewCreativeInput,
    ) -> Result<ReviewOutcome, ApplicationError> {
        let feedback =
            input.feedback.map(|text| text.trim().to_string()).filter(|text| !text.is_empty());
        if input.decision == ReviewDecision::Reject && feedback.is_none() {
            return Err(invariant("feedback is required when rejecting a creative"));
        }

        let tenant_id = ctx.tenant_id();
        let attached_to = self
            .repos
            .creatives
            .find(tenant_id, &input.creative_id)
            .await?
            .ok_or_else(|| not_found("creative", &input.creative_id.0))?
            .media_buy_id;
        let _buy_guard = match &attached_to {
            Some(media_buy_id) => Some(self.locks.media_buy(tenant_id, media_buy_id).await),
            None => None,
        };
        let _creative_guard = self.locks.creative(tenant_id, &input.creative_id).await;

        let mut creative = self
            .repos
            .creatives
            .find(tenant_id, &input.creative_id)
            .await?
            .ok_or_else(|| not_found("creative", &input.creative_id.0))?;
        if creative.media_buy_id != attached_to {
            return Err(ApplicationError::Conflict(format!(
                "creative `{}` was reassigned while under review",
                creative.id
            )));
        }
        if creative.review.status != ReviewStatus::PendingReview {
            return Err(ApplicationError::Conflict(format!(
                "creative `{}` was already reviewed",
                creative.id
            )));
        }

        let now = Utc::now();
        let actor = ctx.actor();
        let status = match input.decision {
            ReviewDecision::Approve => ReviewStatus::Approved,
            ReviewDecision::Reject => ReviewStatus::Rejected,
        };
        creative.review = CreativeReview::decided(status, feedback.clone(), actor.as_str(), now);
        creative.updated_at = now;
        self.repos.creatives.save(creative.clone()).await?;
        info!(
            event_name = "creative.reviewed",
            correlation_id = %ctx.correlation_id(),
            tenant_id = %tenant_id,
            creative_id = %creative.id,
            decision = input.decision.as_str(),
            "creative review recorded"
        );

        let Some(media_buy_id) = creative.media_buy_id.clone() else {
            return Ok(ReviewOutcome {
                creative_id: creative.id,
                decision: input.decision,
                media_buy_id: None,
                media_buy_status: None,
            });
        };

        let buy = self
            .repos
            .media_buys
            .find(tenant_id, &media_buy_id)
            .await?
            .ok_or_else(|| not_found("media buy", &media_buy_id.0))?;
        let attached = self.repos.creatives.list_for_media_buy(tenant_id, &buy.id).await?;
        let readiness = CreativeReadiness::of(&attached);
        let policy = &ctx.tenant().config.approval;
        let event = match (input.decision, buy.status) {
            (
                ReviewDecision::Reject,
                MediaBuyStatus::PendingApproval | MediaBuyStatus::PendingCreative,
            ) => Some(WorkflowEvent::CreativeRejected {
                resubmission_allowed: policy.allow_resubmission,
            }),
            (ReviewDecision::Approve, MediaBuyStatus::PendingApproval) if readiness.is_cleared() => {
                Some(WorkflowEvent::CreativesApproved)
            }
            _ => None,
        };

        let annotate = |step: WorkflowStep| {
            let step = step
                .with_creative(creative.id.clone())
                .with_detail("decision", input.decision.as_str());
            match &feedback {
                Some(text) => step.with_detail("feedback", text.as_str()),
                None => step,
            }
        };

        let buy = match event {
            Some(event) => {
                let context = TransitionContext::new(now, buy.flight)
                    .with_creatives_cleared(readiness.is_cleared());
                self.apply_event(buy, event, context, &actor, annotate).await?
            }
            None => {
                let outcome = match status {
                    ReviewStatus::Rejected => StepOutcome::Rejected,
                    _ => StepOutcome::Succeeded,
                };
                let step = annotate(WorkflowStep::new(
                    buy.tenant_id.clone(),
                    buy.id.clone(),
                    WorkflowStepKind::CreativeReview,
                    actor.as_str(),
                    outcome,
                ));
                self.repos.workflow_steps.append(step).await?;
                buy
            }
        };

        Ok(ReviewOutcome {
            creative_id: creative.id,
            decision: input.decision,
            media_buy_id: Some(buy.id),
            media_buy_status: Some(buy.status),
        })
    }

    pub async fn list_review_tasks(
        &self,
        ctx: &RequestContext,
    ) -> Result<Vec<ReviewTask>, ApplicationError> {
        let pending = self.repos.creatives.list_pending_review(ctx.tenant_id()).await?;
        Ok(pending.iter().map(ReviewTask::from).collect())
    }

    pub async fn list_workflow_steps(
        &self,
        ctx: &RequestContext,
        media_buy_id: &MediaBuyId,
    ) -> Result<Vec<WorkflowStep>, ApplicationError> {
        let buy = self.load_visible_buy(ctx, media_buy_id).await?;
        Ok(self.repos.workflow_steps.list_for_media_buy(ctx.tenant_id(), &buy.id).await?)
    }

    /// Activate `pending_creative` buys whose creatives are all approved and
    /// whose flight has started.
    pub async fn activate_due(&self, tenant: &Tenant, now: DateTime<Utc>) -> Result<usize, ApplicationError> {
        let candidates =
            self.repos.media_buys.list_by_status(&tenant.id, MediaBuyStatus::PendingCreative).await?;
        let mut activated = 0;
        for candidate in candidates.into_iter().filter(|buy| buy.flight.contains(now)) {
            let _guard = self.locks.media_buy(&tenant.id, &candidate.id).await;
            let Some(buy) = self.reload_in_status(tenant, &candidate.id, &[MediaBuyStatus::PendingCreative]).await? else {
                continue;
            };
            let attached = self.repos.creatives.list_for_media_buy(&tenant.id, &buy.id).await?;
            if !CreativeReadiness::of(&attached).is_cleared() {
                continue;
            }
            let context = TransitionContext::new(now, buy.flight).with_creatives_cleared(true);
            match self.apply_event(buy, WorkflowEvent::FlightStarted, context, SYSTEM_ACTOR, |step| step).await {
                Ok(_) => activated += 1,
                Err(error) => log_sweep_error("activation", &candidate.id, &error),
            }
        }
        Ok(activated)
    }

    /// Fail `pending_approval` buys that waited longer than the tenant's
    /// approval timeout. A zero timeout never expires.
    pub async fn expire_approvals(&self, tenant: &Tenant, now: DateTime<Utc>) -> Result<usize, ApplicationError> {
        let timeout_hours = tenant.config.approval.approval_timeout_hours;
        if timeout_hours == 0 {
            return Ok(0);
        }
        let timeout = Duration::hours(i64::from(timeout_hours));
        let candidates =
            self.repos.media_buys.list_by_status(&tenant.id, MediaBuyStatus::PendingApproval).await?;

        let mut expired = 0;
        for candidate in candidates.into_iter().filter(|buy| buy.status_changed_at + timeout <= now) {
            let _guard = self.locks.media_buy(&tenant.id, &candidate.id).await;
            let Some(buy) = self.reload_in_status(tenant, &candidate.id, &[MediaBuyStatus::PendingApproval]).await? else {
                continue;
            };
            if buy.status_changed_at + timeout > now {
                continue;
            }
            let context = TransitionContext::new(now, buy.flight);
            let result = self
                .apply_event(buy, WorkflowEvent::ApprovalExpired, context, SYSTEM_ACTOR, |step| {
                    step.with_detail("approval_timeout_hours", timeout_hours.to_string())
                })
                .await;
            match result {
                Ok(_) => expired += 1,
                Err(error) => log_sweep_error("approval_expiry", &candidate.id, &error),
            }
        }
        Ok(expired)
    }

    /// Fail buys that never activated before their flight ended.
    pub async fn fail_unactivated(&self, tenant: &Tenant, now: DateTime<Utc>) -> Result<usize, ApplicationError> {
        let waiting = [MediaBuyStatus::PendingCreative, MediaBuyStatus::PendingApproval];
        let mut failed = 0;
        for status in waiting {
            let candidates = self.repos.media_buys.list_by_status(&tenant.id, status).await?;
            for candidate in candidates.into_iter().filter(|buy| buy.flight.has_ended(now)) {
                let _guard = self.locks.media_buy(&tenant.id, &candidate.id).await;
                let Some(buy) = self.reload_in_status(tenant, &candidate.id, &waiting).await? else {
                    continue;
                };
                let context = TransitionContext::new(now, buy.flight);
                let result = self
                    .apply_event(buy, WorkflowEvent::FlightEnded, context, SYSTEM_ACTOR, |step| {
                        step.with_detail("reason", "flight ended before activation")
                    })
                    .await;
                match result {
                    Ok(_) => failed += 1,
                    Err(error) => log_sweep_error("flight_expiry", &candidate.id, &error),
                }
            }
        }
        Ok(failed)
    }

    /// Fetch cumulative delivery for an active or paused buy, record it when
    /// it differs from the last recorded snapshot, and complete the buy once
    /// its flight has ended.
    pub async fn reconcile_delivery(
        &self,
        tenant: &Tenant,
        media_buy_id: &MediaBuyId,
        now: DateTime<Utc>,
        granularity: Duration,
    ) -> Result<DeliveryOutcome, ApplicationError> {
        let _guard = self.locks.media_buy(&tenant.id, media_buy_id).await;
        let live = [MediaBuyStatus::Active, MediaBuyStatus::Paused];
        let Some(buy) = self.reload_in_status(tenant, media_buy_id, &live).await? else {
            return Ok(DeliveryOutcome::Skipped);
        };
        let Some(external_ref) = buy.external_ref.clone() else {
            return Ok(DeliveryOutcome::Skipped);
        };

        let ended = buy.flight.has_ended(now);
        let window_end = if ended { buy.flight.end } else { truncate(now, granularity) };
        if window_end <= buy.flight.start {
            return Ok(DeliveryOutcome::Skipped);
        }
        let window = DeliveryWindow { start: buy.flight.start, end: window_end };
        let report = self.fetch_delivery(tenant, &buy, external_ref, window).await?;

        let fingerprint = report.fingerprint();
        let last = self
            .repos
            .workflow_steps
            .latest_of_kind(&tenant.id, &buy.id, WorkflowStepKind::DeliveryReconciliation)
            .await?;
        let recorded = last.and_then(|step| step.fingerprint).as_deref() != Some(fingerprint.as_str());
        if recorded {
            let step = WorkflowStep::new(
                tenant.id.clone(),
                buy.id.clone(),
                WorkflowStepKind::DeliveryReconciliation,
                SYSTEM_ACTOR,
                StepOutcome::Recorded,
            )
            .with_detail("window_start", report.window.start.to_rfc3339())
            .with_detail("window_end", report.window.end.to_rfc3339())
            .with_detail("impressions", report.impressions.to_string())
            .with_detail("clicks", report.clicks.to_string())
            .with_detail("spend", report.spend.normalize().to_string())
            .with_detail("pacing_pct", report.pacing_pct(buy.total_budget).to_string())
            .with_fingerprint(fingerprint);
            self.repos.workflow_steps.append(step).await?;
        }

        let completed = if ended {
            let context =
                TransitionContext::new(now, buy.flight).with_final_delivery_reconciled(true);
            self.apply_event(buy, WorkflowEvent::FlightEnded, context, SYSTEM_ACTOR, |step| step)
                .await?;
            true
        } else {
            false
        };
        Ok(DeliveryOutcome::Reconciled { recorded, completed })
    }

    async fn apply_budget_update(
        &self,
        ctx: &RequestContext,
        buy: MediaBuy,
        input: &UpdateMediaBuyInput,
        actor: &str,
    ) -> Result<MediaBuy, ApplicationError> {
        if buy.status.is_terminal() || buy.status == MediaBuyStatus::Draft {
            return Err(WorkflowStateError::InvalidTransition {
                state: buy.status,
                event: "budget_update",
            }
            .into());
        }

        let catalog = self.catalog.products(ctx).await?;
        let mut updated = buy.clone();
        for change in &input.packages {
            let package = updated
                .packages
                .iter_mut()
                .find(|package| package.package_id == change.package_id)
                .ok_or_else(|| not_found("package", &change.package_id.0))?;
            let allocation = pricing::resolve(
                &catalog,
                &package.product_id,
                &package.pricing_option_id,
                &change.budget,
            )?;
            package.budget = allocation.budget;
        }

        let policy = ctx.tenant().config.budget_policy;
        let package_sum =
            pricing::sum_budgets("packages", updated.packages.iter().map(|package| package.budget))?;
        updated.total_budget = match &input.total_budget {
            Some(value) => pricing::parse_budget("total_budget", value)?,
            None if policy == BudgetPolicy::ExactSum => package_sum,
            None => updated.total_budget,
        };
        pricing::check_total(policy, updated.total_budget, package_sum)?;

        let step = |outcome| {
            WorkflowStep::new(
                buy.tenant_id.clone(),
                buy.id.clone(),
                WorkflowStepKind::BudgetUpdate,
                actor,
                outcome,
            )
            .with_detail("previous_total_budget", buy.total_budget.normalize().to_string())
            .with_detail("total_budget", updated.total_budget.normalize().to_string())
        };

        if let Some(external_ref) = updated.external_ref.clone() {
            let order = BuyOrder::from(&updated);
            let pushed = match self.adapter_for(ctx.tenant()) {
                Ok((adapter, credentials)) => {
                    let (adapter, credentials, order) = (adapter.as_ref(), &credentials, &order);
                    call_with_retry(&self.retry, "create_or_update_buy", move || {
                        adapter.create_or_update_buy(credentials, order)
                    })
                    .await
                }
                Err(error) => Err(error),
            };
            if let Err(error) = pushed {
                warn!(
                    event_name = "media_buy.budget_update_failed",
                    correlation_id = %ctx.correlation_id(),
                    tenant_id = %buy.tenant_id,
                    media_buy_id = %buy.id,
                    external_ref = %external_ref,
                    error = %error,
                    "ad server rejected budget update"
                );
                let failed = step(StepOutcome::Failed).with_detail("error", error.message());
                self.repos.workflow_steps.append(failed).await?;
                return Err(error.into());
            }
        }

        let recorded = step(StepOutcome::Succeeded)
            .with_detail("packages_changed", input.packages.len().to_string());
        let expected = buy.state_version;
        updated.state_version = expected + 1;
        updated.updated_at = Utc::now();
        self.repos.media_buys.update(updated.clone(), expected).await?;
        self.repos.workflow_steps.append(recorded).await?;
        Ok(updated)
    }

    async fn apply_event<F>(
        &self,
        buy: MediaBuy,
        event: WorkflowEvent,
        context: TransitionContext,
        actor: &str,
        annotate: F,
    ) -> Result<MediaBuy, ApplicationError>
    where
        F: FnOnce(WorkflowStep) -> WorkflowStep,
    {
        let outcome = transition(buy.status, &event, &context)?;
        let expected = buy.state_version;
        let mut next = buy;
        next.status = outcome.to;
        next.state_version = expected + 1;
        next.updated_at = context.now;
        if outcome.changes_status() {
            next.status_changed_at = context.now;
        }

        self.repos.media_buys.update(next.clone(), expected).await?;
        let step = self
            .repos
            .workflow_steps
            .append(annotate(transition_step(&next, &outcome, actor)))
            .await?;
        info!(
            event_name = "workflow.transition_applied",
            tenant_id = %next.tenant_id,
            media_buy_id = %next.id,
            event = outcome.event.as_str(),
            from = outcome.from.as_str(),
            to = outcome.to.as_str(),
            sequence = step.sequence,
            "media buy transition applied"
        );
        Ok(next)
    }

    async fn fail_on_adapter_error(
        &self,
        buy: MediaBuy,
        error: AdapterError,
        actor: &str,
    ) -> ApplicationError {
        let media_buy_id = buy.id.clone();
        let tenant_id = buy.tenant_id.clone();
        let kind = if error.is_transient() { "transient" } else { "fatal" };
        let context = TransitionContext::new(Utc::now(), buy.flight);
        let applied = self
            .apply_event(buy, WorkflowEvent::AdapterFailed, context, actor, |step| {
                step.with_detail("error", error.message()).with_detail("error_kind", kind)
            })
            .await;
        if let Err(apply_error) = applied {
            warn!(
                event_name = "media_buy.failure_not_recorded",
                tenant_id = %tenant_id,
                media_buy_id = %media_buy_id,
                error = %apply_error,
                "could not record adapter failure"
            );
        }
        warn!(
            event_name = "media_buy.adapter_failed",
            tenant_id = %tenant_id,
            media_buy_id = %media_buy_id,
            error_kind = kind,
            error = %error,
            "ad server call failed"
        );

        let message = format!("media buy `{media_buy_id}` failed: {}", error.message());
        ApplicationError::Adapter(if error.is_transient() {
            AdapterError::transient(message)
        } else {
            AdapterError::fatal(message)
        })
    }

    async fn load_visible_buy(
        &self,
        ctx: &RequestContext,
        media_buy_id: &MediaBuyId,
    ) -> Result<MediaBuy, ApplicationError> {
        match self.repos.media_buys.find(ctx.tenant_id(), media_buy_id).await? {
            Some(buy) if ctx.can_see(&buy.principal_id) => Ok(buy),
            _ => Err(not_found("media buy", &media_buy_id.0)),
        }
    }

    /// Buys are changed by their owner or by an admin.
    async fn load_owned_buy(
        &self,
        ctx: &RequestContext,
        media_buy_id: &MediaBuyId,
    ) -> Result<MediaBuy, ApplicationError> {
        match self.repos.media_buys.find(ctx.tenant_id(), media_buy_id).await? {
            Some(buy)
                if &buy.principal_id == ctx.principal_id()
                    || ctx.scope() == PermissionScope::Admin =>
            {
                Ok(buy)
            }
            _ => Err(not_found("media buy", &media_buy_id.0)),
        }
    }

    async fn reload_in_status(
        &self,
        tenant: &Tenant,
        media_buy_id: &MediaBuyId,
        statuses: &[MediaBuyStatus],
    ) -> Result<Option<MediaBuy>, ApplicationError> {
        Ok(self
            .repos
            .media_buys
            .find(&tenant.id, media_buy_id)
            .await?
            .filter(|buy| statuses.contains(&buy.status)))
    }

    /// Locks every uploaded creative, in id order.
    async fn lock_creatives(
        &self,
        ctx: &RequestContext,
        uploads: &[CreativeUpload],
    ) -> Vec<OwnedMutexGuard<()>> {
        let ids: BTreeSet<_> = uploads.iter().map(|upload| &upload.creative_id).collect();
        let mut guards = Vec::with_capacity(ids.len());
        for creative_id in ids {
            guards.push(self.locks.creative(ctx.tenant_id(), creative_id).await);
        }
        guards
    }

    async fn validate_uploads(
        &self,
        ctx: &RequestContext,
        uploads: &[CreativeUpload],
    ) -> Result<(), ApplicationError> {
        if uploads.is_empty() {
            return Err(invariant("creatives must not be empty"));
        }
        let formats = self.catalog.formats(ctx).await?;
        let mut seen = BTreeSet::new();
        for upload in uploads {
            if !seen.insert(&upload.creative_id) {
                return Err(invariant(&format!(
                    "creative `{}` appears more than once",
                    upload.creative_id
                )));
            }
            if upload.asset_url.trim().is_empty() {
                return Err(invariant(&format!(
                    "creative `{}` has an empty asset_url",
                    upload.creative_id
                )));
            }
            if !formats.iter().any(|format| format.format_id == upload.format_id) {
                return Err(invariant(&format!(
                    "format `{}` is not accepted by any product",
                    upload.format_id
                )));
            }
        }
        Ok(())
    }

    /// Build the stored record for an upload. Re-syncing resets the review.
    async fn stage_creative(
        &self,
        ctx: &RequestContext,
        upload: CreativeUpload,
        media_buy_id: Option<MediaBuyId>,
        now: DateTime<Utc>,
    ) -> Result<(Creative, SyncAction), ApplicationError> {
        let existing = self.repos.creatives.find(ctx.tenant_id(), &upload.creative_id).await?;
        if let Some(existing) = &existing {
            if &existing.principal_id != ctx.principal_id() {
                return Err(ApplicationError::Conflict(format!(
                    "creative id `{}` is already in use",
                    upload.creative_id
                )));
            }
            if let Some(attached) = &existing.media_buy_id {
                if media_buy_id.as_ref() != Some(attached) {
                    return Err(ApplicationError::Conflict(format!(
                        "creative `{}` is attached to media buy `{attached}`",
                        upload.creative_id
                    )));
                }
            }
        }

        let (created_at, action) = match &existing {
            Some(existing) => (existing.created_at, SyncAction::Updated),
            None => (now, SyncAction::Created),
        };
        let creative = Creative {
            id: upload.creative_id,
            tenant_id: ctx.tenant_id().clone(),
            principal_id: ctx.principal_id().clone(),
            media_buy_id,
            name: upload.name,
            format_id: upload.format_id,
            asset_url: upload.asset_url,
            click_url: upload.click_url,
            review: CreativeReview::pending(),
            created_at,
            updated_at: now,
        };
        Ok((creative, action))
    }

    fn adapter_for(
        &self,
        tenant: &Tenant,
    ) -> Result<(Arc<dyn AdServerAdapter>, AdapterCredentials), AdapterError> {
        let adapter = self.adapters.get(tenant.config.adapter.kind)?;
        let credentials = self.credentials.resolve(&tenant.config.adapter.credentials)?;
        Ok((adapter, credentials))
    }

    async fn push_creatives(
        &self,
        tenant: &Tenant,
        external_ref: &str,
        assets: &[CreativeAsset],
    ) -> Result<Vec<CreativeSyncResult>, AdapterError> {
        let (adapter, credentials) = self.adapter_for(tenant)?;
        let (adapter, credentials) = (adapter.as_ref(), &credentials);
        call_with_retry(&self.retry, "sync_creatives", move || {
            adapter.sync_creatives(credentials, external_ref, assets)
        })
        .await
    }

    async fn fetch_delivery(
        &self,
        tenant: &Tenant,
        buy: &MediaBuy,
        external_ref: String,
        window: DeliveryWindow,
    ) -> Result<DeliveryReport, AdapterError> {
        let (adapter, credentials) = self.adapter_for(tenant)?;
        let request = DeliveryRequest {
            media_buy_id: buy.id.clone(),
            external_ref,
            currency: buy.currency.clone(),
            total_budget: buy.total_budget,
            flight: buy.flight,
            packages: buy.packages.clone(),
            window,
        };
        let (adapter, credentials, request) = (adapter.as_ref(), &credentials, &request);
        call_with_retry(&self.retry, "fetch_delivery_metrics", move || {
            adapter.fetch_delivery_metrics(credentials, request)
        })
        .await
    }
}

fn invariant(message: &str) -> ApplicationError {
    ApplicationError::Domain(DomainError::InvariantViolation(message.to_string()))
}

fn not_found(kind: &'static str, id: &str) -> ApplicationError {
    ApplicationError::NotFound { kind, id: id.to_string() }
}

/// Round `now` down to a multiple of `granularity` since the epoch, so
/// reconciliation runs inside one bucket ask for the same window.
fn truncate(now: DateTime<Utc>, granularity: Duration) -> DateTime<Utc> {
    let step = granularity.num_seconds().max(1);
    let seconds = now.timestamp();
    DateTime::from_timestamp(seconds - seconds.rem_euclid(step), 0).unwrap_or(now)
}

fn log_sweep_error(sweep: &str, media_buy_id: &MediaBuyId, error: &ApplicationError) {
    warn!(
        event_name = "workflow.sweep_failed",
        sweep,
        media_buy_id = %media_buy_id,
        error_code = error.code().as_str(),
        error = %error,
        "sweep skipped media buy"
    );
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::truncate;

    #[test]
    fn truncation_buckets_by_granularity() {
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 10, 47, 12).single().expect("now");
        let hour = truncate(now, Duration::hours(1));
        assert_eq!(hour, Utc.with_ymd_and_hms(2026, 3, 4, 10, 0, 0).single().expect("hour"));
        assert_eq!(truncate(now, Duration::zero()), now);
    }
}
