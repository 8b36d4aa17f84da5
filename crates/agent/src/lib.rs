//! Sales agent runtime.
//!
//! Requests flow through three layers:
//! 1. **Guard** (`guard`) - resolve the tenant, authenticate the principal,
//!    throttle, and produce an immutable `RequestContext`
//! 2. **Dispatch** (`dispatch`, `skills`, `inputs`) - validate the input of a
//!    named skill and call the media-buy service
//! 3. **Envelope** (`envelope`) - encode the domain result for the transports
//!    and wrap it as an A2A task
//!
//! The media-buy service (`service`) owns the workflow: pricing, adapter
//! calls with retry, per-buy locking, compare-and-set persistence, and the
//! workflow-step audit trail. The `reconciler` drives the time-based
//! transitions and delivery snapshots in the background.

pub mod catalog;
pub mod context;
pub mod dispatch;
pub mod envelope;
pub mod guard;
pub mod inputs;
pub mod locks;
pub mod reconciler;
pub mod runtime;
pub mod service;
pub mod skills;
pub mod throttle;
pub mod views;

pub use context::RequestContext;
pub use dispatch::{DispatchError, DispatchOutcome, Dispatcher, DomainResult, ErrorBody};
pub use envelope::{Task, TaskState};
pub use guard::{AuthError, InboundCredentials, TenantGuard};
pub use reconciler::{ReconciliationSummary, Reconciler};
pub use runtime::{AgentRuntime, AgentSettings};
pub use service::MediaBuyService;
pub use skills::Skill;
