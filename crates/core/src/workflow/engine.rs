use thiserror::Error;

use crate::domain::media_buy::{MediaBuy, MediaBuyStatus};
use crate::domain::workflow_step::{StepOutcome, WorkflowStep, WorkflowStepKind};
use crate::workflow::states::{TransitionContext, TransitionOutcome, WorkflowEvent};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowStateError {
    #[error("`{event}` is not allowed while the media buy is {state}")]
    InvalidTransition { state: MediaBuyStatus, event: &'static str },
    #[error("cannot activate from {state}: not every creative is approved")]
    CreativesNotCleared { state: MediaBuyStatus },
    #[error("flight has not started yet")]
    FlightNotStarted,
    #[error("flight has not ended yet")]
    FlightNotEnded,
    #[error("final delivery has not been reconciled")]
    DeliveryNotReconciled,
}

/// The media-buy transition table. Pure: no I/O, no clock reads.
pub fn transition(
    current: MediaBuyStatus,
    event: &WorkflowEvent,
    context: &TransitionContext,
) -> Result<TransitionOutcome, WorkflowStateError> {
    use MediaBuyStatus::{
        Active, Completed, Draft, Failed, Paused, PendingApproval, PendingCreative,
    };
    use WorkflowEvent::{
        AdapterFailed, ApprovalExpired, BuyAccepted, CancelRequested, CreativeRejected,
        CreativesApproved, CreativesSynced, FlightEnded, FlightStarted, PauseRequested,
        ResumeRequested,
    };

    let invalid = || WorkflowStateError::InvalidTransition { state: current, event: event.as_str() };
    if current.is_terminal() {
        return Err(invalid());
    }

    let in_flight = context.flight.contains(context.now);
    let to = match (current, event) {
        (Draft, BuyAccepted) => PendingCreative,
        (PendingCreative, CreativesSynced { requires_review: true }) => PendingApproval,
        (PendingCreative, CreativesSynced { requires_review: false }) => {
            if in_flight {
                Active
            } else {
                PendingCreative
            }
        }
        (PendingApproval, CreativesApproved) => {
            if in_flight {
                Active
            } else {
                PendingCreative
            }
        }
        (PendingApproval | PendingCreative, CreativeRejected { resubmission_allowed }) => {
            if *resubmission_allowed {
                PendingCreative
            } else {
                Failed
            }
        }
        (PendingCreative, FlightStarted) => {
            if !context.creatives_cleared {
                return Err(WorkflowStateError::CreativesNotCleared { state: current });
            }
            if !context.flight.has_started(context.now) {
                return Err(WorkflowStateError::FlightNotStarted);
            }
            if context.flight.has_ended(context.now) {
                return Err(invalid());
            }
            Active
        }
        (Active, PauseRequested) => Paused,
        (Paused, ResumeRequested) => Active,
        (Active | Paused, FlightEnded) => {
            if !context.flight.has_ended(context.now) {
                return Err(WorkflowStateError::FlightNotEnded);
            }
            if !context.final_delivery_reconciled {
                return Err(WorkflowStateError::DeliveryNotReconciled);
            }
            Completed
        }
        (PendingCreative | PendingApproval, FlightEnded) => {
            if !context.flight.has_ended(context.now) {
                return Err(WorkflowStateError::FlightNotEnded);
            }
            Failed
        }
        (PendingApproval, ApprovalExpired) => Failed,
        (_, CancelRequested) | (_, AdapterFailed) => Failed,
        _ => return Err(invalid()),
    };

    Ok(TransitionOutcome { from: current, to, event: event.clone() })
}

/// The audit step recording an applied transition.
pub fn transition_step(
    buy: &MediaBuy,
    outcome: &TransitionOutcome,
    actor: impl Into<String>,
) -> WorkflowStep {
    let step_outcome = match outcome.to {
        MediaBuyStatus::Failed => StepOutcome::Failed,
        _ => StepOutcome::Succeeded,
    };
    WorkflowStep::new(
        buy.tenant_id.clone(),
        buy.id.clone(),
        WorkflowStepKind::StatusTransition,
        actor,
        step_outcome,
    )
    .with_transition(outcome.from, outcome.to)
    .with_detail("event", outcome.event.as_str())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{transition, WorkflowStateError};
    use crate::domain::media_buy::{FlightWindow, MediaBuyStatus};
    use crate::workflow::states::{TransitionContext, WorkflowEvent};

    fn running() -> TransitionContext {
        let now = Utc::now();
        TransitionContext::new(
            now,
            FlightWindow { start: now - Duration::days(1), end: now + Duration::days(7) },
        )
    }

    fn upcoming() -> TransitionContext {
        let now = Utc::now();
        TransitionContext::new(
            now,
            FlightWindow { start: now + Duration::days(2), end: now + Duration::days(9) },
        )
    }

    fn finished() -> TransitionContext {
        let now = Utc::now();
        TransitionContext::new(
            now,
            FlightWindow { start: now - Duration::days(9), end: now - Duration::hours(1) },
        )
    }

    fn to(
        current: MediaBuyStatus,
        event: WorkflowEvent,
        context: &TransitionContext,
    ) -> Result<MediaBuyStatus, WorkflowStateError> {
        transition(current, &event, context).map(|outcome| outcome.to)
    }

    #[test]
    fn happy_path_with_review_inside_flight() {
        let context = running();
        let mut state = MediaBuyStatus::Draft;
        for (event, expected) in [
            (WorkflowEvent::BuyAccepted, MediaBuyStatus::PendingCreative),
            (WorkflowEvent::CreativesSynced { requires_review: true }, MediaBuyStatus::PendingApproval),
            (WorkflowEvent::CreativesApproved, MediaBuyStatus::Active),
            (WorkflowEvent::PauseRequested, MediaBuyStatus::Paused),
            (WorkflowEvent::ResumeRequested, MediaBuyStatus::Active),
        ] {
            state = to(state, event, &context).expect("transition");
            assert_eq!(state, expected);
        }
    }

    #[test]
    fn approval_before_flight_start_parks_in_pending_creative() {
        let context = upcoming();
        assert_eq!(
            to(MediaBuyStatus::PendingApproval, WorkflowEvent::CreativesApproved, &context),
            Ok(MediaBuyStatus::PendingCreative)
        );
        assert_eq!(
            to(
                MediaBuyStatus::PendingCreative,
                WorkflowEvent::CreativesSynced { requires_review: false },
                &context
            ),
            Ok(MediaBuyStatus::PendingCreative)
        );
    }

    #[test]
    fn auto_approved_creatives_activate_inside_flight() {
        assert_eq!(
            to(
                MediaBuyStatus::PendingCreative,
                WorkflowEvent::CreativesSynced { requires_review: false },
                &running()
            ),
            Ok(MediaBuyStatus::Active)
        );
    }

    #[test]
    fn rejection_fails_or_returns_for_resubmission() {
        let context = running();
        assert_eq!(
            to(
                MediaBuyStatus::PendingApproval,
                WorkflowEvent::CreativeRejected { resubmission_allowed: false },
                &context
            ),
            Ok(MediaBuyStatus::Failed)
        );
        assert_eq!(
            to(
                MediaBuyStatus::PendingApproval,
                WorkflowEvent::CreativeRejected { resubmission_allowed: true },
                &context
            ),
            Ok(MediaBuyStatus::PendingCreative)
        );
    }

    #[test]
    fn activation_sweep_requires_cleared_creatives() {
        let context = running();
        assert_eq!(
            to(MediaBuyStatus::PendingCreative, WorkflowEvent::FlightStarted, &context),
            Err(WorkflowStateError::CreativesNotCleared { state: MediaBuyStatus::PendingCreative })
        );
        assert_eq!(
            to(
                MediaBuyStatus::PendingCreative,
                WorkflowEvent::FlightStarted,
                &context.clone().with_creatives_cleared(true)
            ),
            Ok(MediaBuyStatus::Active)
        );
        assert_eq!(
            to(
                MediaBuyStatus::PendingCreative,
                WorkflowEvent::FlightStarted,
                &upcoming().with_creatives_cleared(true)
            ),
            Err(WorkflowStateError::FlightNotStarted)
        );
    }

    #[test]
    fn completion_needs_flight_end_and_final_reconciliation() {
        assert_eq!(
            to(MediaBuyStatus::Active, WorkflowEvent::FlightEnded, &running()),
            Err(WorkflowStateError::FlightNotEnded)
        );
        assert_eq!(
            to(MediaBuyStatus::Active, WorkflowEvent::FlightEnded, &finished()),
            Err(WorkflowStateError::DeliveryNotReconciled)
        );
        assert_eq!(
            to(
                MediaBuyStatus::Active,
                WorkflowEvent::FlightEnded,
                &finished().with_final_delivery_reconciled(true)
            ),
            Ok(MediaBuyStatus::Completed)
        );
        assert_eq!(
            to(MediaBuyStatus::PendingApproval, WorkflowEvent::FlightEnded, &finished()),
            Ok(MediaBuyStatus::Failed)
        );
    }

    #[test]
    fn terminal_states_reject_every_event() {
        let context = finished().with_final_delivery_reconciled(true);
        for state in [MediaBuyStatus::Completed, MediaBuyStatus::Failed] {
            for event in [
                WorkflowEvent::FlightEnded,
                WorkflowEvent::CancelRequested,
                WorkflowEvent::ResumeRequested,
                WorkflowEvent::AdapterFailed,
            ] {
                assert!(matches!(
                    to(state, event, &context),
                    Err(WorkflowStateError::InvalidTransition { .. })
                ));
            }
        }
    }

    #[test]
    fn pause_and_resume_only_from_matching_states() {
        let context = running();
        assert!(to(MediaBuyStatus::PendingApproval, WorkflowEvent::PauseRequested, &context).is_err());
        assert!(to(MediaBuyStatus::Active, WorkflowEvent::ResumeRequested, &context).is_err());
        assert!(to(MediaBuyStatus::Paused, WorkflowEvent::PauseRequested, &context).is_err());
    }

    #[test]
    fn cancel_and_adapter_failure_fail_any_live_buy() {
        let context = running();
        for state in [
            MediaBuyStatus::Draft,
            MediaBuyStatus::PendingCreative,
            MediaBuyStatus::PendingApproval,
            MediaBuyStatus::Active,
            MediaBuyStatus::Paused,
        ] {
            assert_eq!(to(state, WorkflowEvent::CancelRequested, &context), Ok(MediaBuyStatus::Failed));
            assert_eq!(to(state, WorkflowEvent::AdapterFailed, &context), Ok(MediaBuyStatus::Failed));
        }
        assert_eq!(
            to(MediaBuyStatus::PendingApproval, WorkflowEvent::ApprovalExpired, &context),
            Ok(MediaBuyStatus::Failed)
        );
        assert!(to(MediaBuyStatus::Active, WorkflowEvent::ApprovalExpired, &context).is_err());
    }
}
