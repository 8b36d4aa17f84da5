use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::media_buy::{FlightWindow, MediaBuyStatus};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// The ad server accepted the order.
    BuyAccepted,
    /// Every attached creative has a sync result.
    CreativesSynced { requires_review: bool },
    /// The last pending creative was approved.
    CreativesApproved,
    CreativeRejected { resubmission_allowed: bool },
    FlightStarted,
    PauseRequested,
    ResumeRequested,
    /// Flight end reached. Only accepted from `active`/`paused` after a
    /// successful final delivery fetch; from pre-activation states it fails the buy.
    FlightEnded,
    ApprovalExpired,
    CancelRequested,
    AdapterFailed,
}

impl WorkflowEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BuyAccepted => "buy_accepted",
            Self::CreativesSynced { .. } => "creatives_synced",
            Self::CreativesApproved => "creatives_approved",
            Self::CreativeRejected { .. } => "creative_rejected",
            Self::FlightStarted => "flight_started",
            Self::PauseRequested => "pause_requested",
            Self::ResumeRequested => "resume_requested",
            Self::FlightEnded => "flight_ended",
            Self::ApprovalExpired => "approval_expired",
            Self::CancelRequested => "cancel_requested",
            Self::AdapterFailed => "adapter_failed",
        }
    }
}

/// Facts the transition table needs beyond the current status. Built fresh by
/// the caller under the per-buy lock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionContext {
    pub now: DateTime<Utc>,
    pub flight: FlightWindow,
    /// Every attached creative is approved.
    pub creatives_cleared: bool,
    pub final_delivery_reconciled: bool,
}

impl TransitionContext {
    pub fn new(now: DateTime<Utc>, flight: FlightWindow) -> Self {
        Self { now, flight, creatives_cleared: false, final_delivery_reconciled: false }
    }

    pub fn with_creatives_cleared(mut self, cleared: bool) -> Self {
        self.creatives_cleared = cleared;
        self
    }

    pub fn with_final_delivery_reconciled(mut self, reconciled: bool) -> Self {
        self.final_delivery_reconciled = reconciled;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: MediaBuyStatus,
    pub to: MediaBuyStatus,
    pub event: WorkflowEvent,
}

impl TransitionOutcome {
    pub fn changes_status(&self) -> bool {
        self.from != self.to
    }
}
