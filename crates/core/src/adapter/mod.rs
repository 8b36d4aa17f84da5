//! Ad-server adapter contract.
//!
//! Concrete backends implement [`AdServerAdapter`]. Callers hand over the
//! tenant's resolved [`AdapterCredentials`] without inspecting which
//! authentication mode they carry, and get back normalized results or an
//! [`AdapterError`] classified as transient or fatal.

pub mod registry;
pub mod retry;
pub mod simulation;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::creative::{Creative, CreativeId};
use crate::domain::delivery::{DeliveryReport, DeliveryWindow};
use crate::domain::media_buy::{FlightWindow, MediaBuy, MediaBuyId, Package};
use crate::domain::pricing_option::Currency;
use crate::domain::tenant::AdapterKind;

pub use registry::{AdapterRegistry, CredentialResolver, EnvCredentialResolver};
pub use retry::{call_with_retry, RetryPolicy};
pub use simulation::{SimulatedOperation, SimulationAdapter};

/// Secret material for one adapter call. `Debug` never prints secrets.
#[derive(Debug)]
pub enum AdapterCredentials {
    /// Backends that need no authentication, such as the simulator.
    Unauthenticated,
    OAuthDelegated { access_token: SecretString, refresh_token: Option<SecretString> },
    ServiceCredential { client_email: Option<String>, private_key: SecretString },
}

impl AdapterCredentials {
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "none",
            Self::OAuthDelegated { .. } => "oauth_delegated",
            Self::ServiceCredential { .. } => "service_credential",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AdapterError {
    /// Safe to retry: timeouts, throttling, upstream 5xx.
    #[error("transient ad server failure: {message}")]
    Transient { message: String },
    /// Bad credentials or a permanent rejection. Never retried.
    #[error("ad server rejected the request: {message}")]
    Fatal { message: String },
}

impl AdapterError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient { message: message.into() }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal { message: message.into() }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transient { message } | Self::Fatal { message } => message,
        }
    }
}

/// Order as pushed to the ad server on create and on every budget update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyOrder {
    pub media_buy_id: MediaBuyId,
    pub external_ref: Option<String>,
    pub currency: Currency,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_budget: Decimal,
    pub flight: FlightWindow,
    pub packages: Vec<Package>,
}

impl From<&MediaBuy> for BuyOrder {
    fn from(buy: &MediaBuy) -> Self {
        Self {
            media_buy_id: buy.id.clone(),
            external_ref: buy.external_ref.clone(),
            currency: buy.currency.clone(),
            total_budget: buy.total_budget,
            flight: buy.flight,
            packages: buy.packages.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyAcceptance {
    pub external_ref: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreativeAsset {
    pub creative_id: CreativeId,
    pub format_id: String,
    pub asset_url: String,
    pub click_url: Option<String>,
}

impl From<&Creative> for CreativeAsset {
    fn from(creative: &Creative) -> Self {
        Self {
            creative_id: creative.id.clone(),
            format_id: creative.format_id.clone(),
            asset_url: creative.asset_url.clone(),
            click_url: creative.click_url.clone(),
        }
    }
}

/// What the ad server said about one creative.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdServerReview {
    Accepted,
    PendingReview,
    Rejected { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreativeSyncResult {
    pub creative_id: CreativeId,
    pub review: AdServerReview,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub media_buy_id: MediaBuyId,
    pub external_ref: String,
    pub currency: Currency,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_budget: Decimal,
    pub flight: FlightWindow,
    pub packages: Vec<Package>,
    pub window: DeliveryWindow,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterHealth {
    pub healthy: bool,
    pub detail: String,
    pub checked_at: DateTime<Utc>,
}

#[async_trait]
pub trait AdServerAdapter: Send + Sync {
    fn kind(&self) -> AdapterKind;

    /// Idempotent on `order.media_buy_id`: pushing the same buy again updates
    /// the existing order and returns the same external reference.
    async fn create_or_update_buy(
        &self,
        credentials: &AdapterCredentials,
        order: &BuyOrder,
    ) -> Result<BuyAcceptance, AdapterError>;

    async fn sync_creatives(
        &self,
        credentials: &AdapterCredentials,
        external_ref: &str,
        creatives: &[CreativeAsset],
    ) -> Result<Vec<CreativeSyncResult>, AdapterError>;

    /// Cumulative delivery up to `request.window.end`.
    async fn fetch_delivery_metrics(
        &self,
        credentials: &AdapterCredentials,
        request: &DeliveryRequest,
    ) -> Result<DeliveryReport, AdapterError>;

    async fn health_check(
        &self,
        credentials: &AdapterCredentials,
    ) -> Result<AdapterHealth, AdapterError>;
}
