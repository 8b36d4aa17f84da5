use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapter::AdapterError;
use crate::pricing::PricingError;
use crate::workflow::WorkflowStateError;

/// Stable, caller-visible error identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    TenantResolutionError,
    InvalidAuthToken,
    RateLimited,
    PermissionDenied,
    SchemaValidationError,
    UnknownPricingOption,
    BudgetBelowMinimumSpend,
    MalformedBudgetShape,
    WorkflowStateError,
    AdapterTransientError,
    AdapterFatalError,
    UnsupportedOperation,
    NotFound,
    Conflict,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TenantResolutionError => "TenantResolutionError",
            Self::InvalidAuthToken => "InvalidAuthToken",
            Self::RateLimited => "RateLimited",
            Self::PermissionDenied => "PermissionDenied",
            Self::SchemaValidationError => "SchemaValidationError",
            Self::UnknownPricingOption => "UnknownPricingOption",
            Self::BudgetBelowMinimumSpend => "BudgetBelowMinimumSpend",
            Self::MalformedBudgetShape => "MalformedBudgetShape",
            Self::WorkflowStateError => "WorkflowStateError",
            Self::AdapterTransientError => "AdapterTransientError",
            Self::AdapterFatalError => "AdapterFatalError",
            Self::UnsupportedOperation => "UnsupportedOperation",
            Self::NotFound => "NotFound",
            Self::Conflict => "Conflict",
            Self::InternalError => "InternalError",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Pricing(#[from] PricingError),
    #[error(transparent)]
    WorkflowState(#[from] WorkflowStateError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Pricing(PricingError::UnknownPricingOption { .. }) => {
                ErrorCode::UnknownPricingOption
            }
            Self::Pricing(PricingError::BudgetBelowMinimumSpend { .. }) => {
                ErrorCode::BudgetBelowMinimumSpend
            }
            Self::Pricing(PricingError::MalformedBudgetShape { .. }) => {
                ErrorCode::MalformedBudgetShape
            }
            Self::Pricing(
                PricingError::CurrencyMismatch { .. }
                | PricingError::TotalBudgetMismatch { .. }
                | PricingError::NoPackages,
            )
            | Self::InvariantViolation(_) => ErrorCode::SchemaValidationError,
            Self::WorkflowState(_) => ErrorCode::WorkflowStateError,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error("{kind} `{id}` was not found")]
    NotFound { kind: &'static str, id: String },
    #[error("concurrent update conflict: {0}")]
    Conflict(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Domain(error) => error.code(),
            Self::Adapter(AdapterError::Transient { .. }) => ErrorCode::AdapterTransientError,
            Self::Adapter(AdapterError::Fatal { .. }) => ErrorCode::AdapterFatalError,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Conflict(_) => ErrorCode::Conflict,
            Self::Persistence(_) | Self::Configuration(_) => ErrorCode::InternalError,
        }
    }
}

impl From<PricingError> for ApplicationError {
    fn from(value: PricingError) -> Self {
        Self::Domain(DomainError::Pricing(value))
    }
}

impl From<WorkflowStateError> for ApplicationError {
    fn from(value: WorkflowStateError) -> Self {
        Self::Domain(DomainError::WorkflowState(value))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    /// Caller-safe rendering. Persistence and configuration details stay in
    /// the logs; domain and adapter messages are returned as-is.
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        match self {
            Self::Domain(_) | Self::NotFound { .. } | Self::Conflict(_) => {
                InterfaceError::BadRequest { message: self.to_string(), correlation_id }
            }
            Self::Adapter(_) => {
                InterfaceError::ServiceUnavailable { message: self.to_string(), correlation_id }
            }
            Self::Persistence(_) => InterfaceError::ServiceUnavailable {
                message: "storage is unavailable".to_owned(),
                correlation_id,
            },
            Self::Configuration(_) => InterfaceError::Internal {
                message: "the agent is misconfigured".to_owned(),
                correlation_id,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::adapter::AdapterError;
    use crate::domain::pricing_option::{Currency, PricingOptionId};
    use crate::domain::media_buy::MediaBuyStatus;
    use crate::errors::{ApplicationError, DomainError, ErrorCode, InterfaceError};
    use crate::pricing::PricingError;
    use crate::workflow::WorkflowStateError;

    #[test]
    fn pricing_errors_keep_their_own_codes() {
        let below = ApplicationError::from(PricingError::BudgetBelowMinimumSpend {
            pricing_option_id: PricingOptionId("cpm_usd".to_owned()),
            budget: Decimal::from(10),
            min_spend: Decimal::from(100),
            currency: Currency::parse("USD").expect("currency"),
        });
        let malformed = ApplicationError::from(PricingError::MalformedBudgetShape {
            field: "budget".to_owned(),
            reason: "got an object".to_owned(),
        });

        assert_eq!(below.code(), ErrorCode::BudgetBelowMinimumSpend);
        assert_eq!(malformed.code(), ErrorCode::MalformedBudgetShape);
        assert_eq!(malformed.code().as_str(), "MalformedBudgetShape");
    }

    #[test]
    fn workflow_and_adapter_errors_map_to_codes() {
        let workflow = ApplicationError::from(WorkflowStateError::InvalidTransition {
            state: MediaBuyStatus::Completed,
            event: "pause_requested",
        });
        assert_eq!(workflow.code(), ErrorCode::WorkflowStateError);
        assert_eq!(
            ApplicationError::from(AdapterError::fatal("bad key")).code(),
            ErrorCode::AdapterFatalError
        );
    }

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::InvariantViolation(
            "missing required field".to_owned(),
        ))
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn persistence_error_hides_details() {
        let interface = ApplicationError::Persistence("database lock timeout".to_owned())
            .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert!(!interface.to_string().contains("lock timeout"));
    }
}
