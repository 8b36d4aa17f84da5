//! Skill dispatch shared by the MCP and A2A surfaces.
//!
//! The dispatcher returns a [`DomainResult`]; wrapping it into a protocol
//! envelope is the transport's job (see [`crate::envelope`]).

use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use salesagent_core::domain::creative::CreativeView;
use salesagent_core::errors::{ApplicationError, ErrorCode};

use crate::context::RequestContext;
use crate::inputs::{
    CreateMediaBuyInput, EmptyInput, GetProductsInput, ListCreativesInput, MediaBuyRef,
    ReviewCreativeInput, SyncCreativesInput, UpdateMediaBuyInput,
};
use crate::service::MediaBuyService;
use crate::skills::Skill;
use crate::views::{
    CreativeList, DeliveryView, FormatList, MediaBuyView, ProductList, ProductView,
    ReviewOutcome, ReviewTaskList, SyncCreativesResult, WorkflowStepList,
};

/// The pure domain payload of a successful skill call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DomainResult {
    Products(ProductList),
    CreativeFormats(FormatList),
    MediaBuy(MediaBuyView),
    Delivery(DeliveryView),
    CreativesSynced(SyncCreativesResult),
    Creatives(CreativeList),
    ReviewRecorded(ReviewOutcome),
    ReviewTasks(ReviewTaskList),
    WorkflowSteps(WorkflowStepList),
}

impl DomainResult {
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Products(result) => serde_json::to_value(result),
            Self::CreativeFormats(result) => serde_json::to_value(result),
            Self::MediaBuy(result) => serde_json::to_value(result),
            Self::Delivery(result) => serde_json::to_value(result),
            Self::CreativesSynced(result) => serde_json::to_value(result),
            Self::Creatives(result) => serde_json::to_value(result),
            Self::ReviewRecorded(result) => serde_json::to_value(result),
            Self::ReviewTasks(result) => serde_json::to_value(result),
            Self::WorkflowSteps(result) => serde_json::to_value(result),
        }
    }

    /// Decode a payload extracted from either envelope back into the result
    /// type of `skill`.
    pub fn from_value(skill: Skill, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match skill {
            Skill::GetProducts => Self::Products(serde_json::from_value(value)?),
            Skill::ListCreativeFormats => Self::CreativeFormats(serde_json::from_value(value)?),
            Skill::CreateMediaBuy | Skill::UpdateMediaBuy | Skill::GetMediaBuy => {
                Self::MediaBuy(serde_json::from_value(value)?)
            }
            Skill::GetMediaBuyDelivery => Self::Delivery(serde_json::from_value(value)?),
            Skill::SyncCreatives => Self::CreativesSynced(serde_json::from_value(value)?),
            Skill::ListCreatives => Self::Creatives(serde_json::from_value(value)?),
            Skill::ReviewCreative => Self::ReviewRecorded(serde_json::from_value(value)?),
            Skill::ListReviewTasks => Self::ReviewTasks(serde_json::from_value(value)?),
            Skill::ListWorkflowSteps => Self::WorkflowSteps(serde_json::from_value(value)?),
        })
    }

    /// One-line human-readable summary. Carried next to the payload, never in it.
    pub fn summary(&self) -> String {
        match self {
            Self::Products(list) => format!("Found {}", plural(list.products.len(), "product")),
            Self::CreativeFormats(list) => {
                format!("{} accepted", plural(list.formats.len(), "creative format"))
            }
            Self::MediaBuy(buy) => format!(
                "Media buy {} is {} with a total budget of {} {}",
                buy.media_buy_id,
                buy.status,
                buy.total_budget.normalize(),
                buy.currency
            ),
            Self::Delivery(view) => format!(
                "Media buy {} delivered {} and {}, spending {} {} ({}% of budget)",
                view.media_buy_id,
                plural(view.delivery.impressions as usize, "impression"),
                plural(view.delivery.clicks as usize, "click"),
                view.delivery.spend.normalize(),
                view.delivery.currency,
                view.pacing_pct.normalize()
            ),
            Self::CreativesSynced(result) => {
                let synced = format!("Synced {}", plural(result.creatives.len(), "creative"));
                match (&result.media_buy_id, result.media_buy_status) {
                    (Some(id), Some(status)) => format!("{synced}; media buy {id} is {status}"),
                    _ => synced,
                }
            }
            Self::Creatives(list) => format!("Found {}", plural(list.creatives.len(), "creative")),
            Self::ReviewRecorded(outcome) => {
                let recorded =
                    format!("Creative {} {}", outcome.creative_id, outcome.decision.as_str());
                match (&outcome.media_buy_id, outcome.media_buy_status) {
                    (Some(id), Some(status)) => format!("{recorded}; media buy {id} is {status}"),
                    _ => recorded,
                }
            }
            Self::ReviewTasks(list) => {
                format!("{} awaiting review", plural(list.tasks.len(), "creative"))
            }
            Self::WorkflowSteps(list) => format!(
                "{} recorded for media buy {}",
                plural(list.steps.len(), "workflow step"),
                list.media_buy_id
            ),
        }
    }
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unsupported operation `{0}`")]
    UnsupportedOperation(String),
    #[error("invalid input for `{skill}`: {message}")]
    SchemaValidation { skill: Skill, message: String },
    #[error("`{0}` requires reviewer scope")]
    PermissionDenied(Skill),
    #[error(transparent)]
    Application(#[from] ApplicationError),
}

impl DispatchError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedOperation(_) => ErrorCode::UnsupportedOperation,
            Self::SchemaValidation { .. } => ErrorCode::SchemaValidationError,
            Self::PermissionDenied(_) => ErrorCode::PermissionDenied,
            Self::Application(error) => error.code(),
        }
    }

    /// Message safe to hand to the caller. Storage and configuration details
    /// stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Application(
                error @ (ApplicationError::Persistence(_) | ApplicationError::Configuration(_)),
            ) => error.clone().into_interface("").user_message().to_string(),
            other => other.to_string(),
        }
    }
}

/// Structured error payload placed where a domain result would go.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    pub correlation_id: String,
}

impl ErrorBody {
    pub fn new(code: ErrorCode, message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self { code, message: message.into(), correlation_id: correlation_id.into() }
    }

    pub fn for_error(error: &DispatchError, correlation_id: &str) -> Self {
        Self::new(error.code(), error.public_message(), correlation_id)
    }
}

/// A finished skill call, before envelope construction.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub skill: String,
    pub correlation_id: String,
    pub result: Result<DomainResult, DispatchError>,
}

impl DispatchOutcome {
    pub fn error_body(&self) -> Option<ErrorBody> {
        self.result.as_ref().err().map(|error| ErrorBody::for_error(error, &self.correlation_id))
    }
}

pub struct Dispatcher {
    service: Arc<MediaBuyService>,
}

impl Dispatcher {
    pub fn new(service: Arc<MediaBuyService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<MediaBuyService> {
        &self.service
    }

    pub async fn dispatch(&self, ctx: &RequestContext, skill_name: &str, input: Value) -> DispatchOutcome {
        let started = Instant::now();
        let result = match Skill::parse(skill_name) {
            Some(skill) => self.run(ctx, skill, input).await,
            None => Err(DispatchError::UnsupportedOperation(skill_name.to_string())),
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => info!(
                event_name = "dispatch.completed",
                correlation_id = %ctx.correlation_id(),
                tenant_id = %ctx.tenant_id(),
                principal_id = %ctx.principal_id(),
                skill = skill_name,
                duration_ms,
                "skill completed"
            ),
            Err(error) => warn!(
                event_name = "dispatch.failed",
                correlation_id = %ctx.correlation_id(),
                tenant_id = %ctx.tenant_id(),
                principal_id = %ctx.principal_id(),
                skill = skill_name,
                duration_ms,
                error_code = error.code().as_str(),
                error = %error,
                "skill failed"
            ),
        }

        DispatchOutcome {
            skill: skill_name.to_string(),
            correlation_id: ctx.correlation_id().to_string(),
            result,
        }
    }

    async fn run(&self, ctx: &RequestContext, skill: Skill, input: Value) -> Result<DomainResult, DispatchError> {
        if skill.requires_reviewer() && !ctx.scope().can_review_creatives() {
            return Err(DispatchError::PermissionDenied(skill));
        }

        let service = &self.service;
        Ok(match skill {
            Skill::GetProducts => {
                let input: GetProductsInput = parse(skill, input)?;
                let products = service.get_products(ctx, &input).await?;
                DomainResult::Products(ProductList {
                    products: products.iter().map(ProductView::from).collect(),
                })
            }
            Skill::ListCreativeFormats => {
                let _: EmptyInput = parse(skill, input)?;
                DomainResult::CreativeFormats(FormatList {
                    formats: service.list_creative_formats(ctx).await?,
                })
            }
            Skill::CreateMediaBuy => {
                let input: CreateMediaBuyInput = parse(skill, input)?;
                let buy = service.create_media_buy(ctx, input).await?;
                DomainResult::MediaBuy(MediaBuyView::from(&buy))
            }
            Skill::UpdateMediaBuy => {
                let input: UpdateMediaBuyInput = parse(skill, input)?;
                let buy = service.update_media_buy(ctx, input).await?;
                DomainResult::MediaBuy(MediaBuyView::from(&buy))
            }
            Skill::GetMediaBuy => {
                let input: MediaBuyRef = parse(skill, input)?;
                let buy = service.get_media_buy(ctx, &input.media_buy_id).await?;
                DomainResult::MediaBuy(MediaBuyView::from(&buy))
            }
            Skill::GetMediaBuyDelivery => {
                let input: MediaBuyRef = parse(skill, input)?;
                DomainResult::Delivery(service.get_media_buy_delivery(ctx, &input.media_buy_id).await?)
            }
            Skill::SyncCreatives => {
                let input: SyncCreativesInput = parse(skill, input)?;
                DomainResult::CreativesSynced(service.sync_creatives(ctx, input).await?)
            }
            Skill::ListCreatives => {
                let input: ListCreativesInput = parse(skill, input)?;
                let creatives = service.list_creatives(ctx, &input).await?;
                DomainResult::Creatives(CreativeList {
                    creatives: creatives.iter().map(CreativeView::from).collect(),
                })
            }
            Skill::ReviewCreative => {
                let input: ReviewCreativeInput = parse(skill, input)?;
                DomainResult::ReviewRecorded(service.review_creative(ctx, input).await?)
            }
            Skill::ListReviewTasks => {
                let _: EmptyInput = parse(skill, input)?;
                DomainResult::ReviewTasks(ReviewTaskList {
                    tasks: service.list_review_tasks(ctx).await?,
                })
            }
            Skill::ListWorkflowSteps => {
                let input: MediaBuyRef = parse(skill, input)?;
                let steps = service.list_workflow_steps(ctx, &input.media_buy_id).await?;
                DomainResult::WorkflowSteps(WorkflowStepList {
                    media_buy_id: input.media_buy_id,
                    steps,
                })
            }
        })
    }
}

/// Missing arguments are treated as an empty object.
fn parse<T: DeserializeOwned>(skill: Skill, input: Value) -> Result<T, DispatchError> {
    let input = if input.is_null() { json!({}) } else { input };
    serde_json::from_value(input)
        .map_err(|error| DispatchError::SchemaValidation { skill, message: error.to_string() })
}
