//! Tenant model.
//!
//! A tenant is one publisher account. Every catalog entry, principal, media
//! buy, creative and workflow step is owned by exactly one tenant, and every
//! repository lookup is keyed by [`TenantId`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    /// Routing key under the deployment's base domain (`acme` in `acme.example.com`).
    pub subdomain: String,
    pub active: bool,
    pub config: TenantConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantConfig {
    pub adapter: AdapterSelection,
    #[serde(default)]
    pub approval: ApprovalPolicy,
    #[serde(default)]
    pub budget_policy: BudgetPolicy,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            adapter: AdapterSelection {
                kind: AdapterKind::Simulation,
                credentials: CredentialRef::None,
            },
            approval: ApprovalPolicy::default(),
            budget_policy: BudgetPolicy::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    Simulation,
    GoogleAdManager,
    Kevel,
    TritonDigital,
    Xandr,
}

impl AdapterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simulation => "simulation",
            Self::GoogleAdManager => "google_ad_manager",
            Self::Kevel => "kevel",
            Self::TritonDigital => "triton_digital",
            Self::Xandr => "xandr",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterSelection {
    pub kind: AdapterKind,
    #[serde(default)]
    pub credentials: CredentialRef,
}

/// Where the adapter credentials live. Only references are stored with the
/// tenant; secret material is resolved at call time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CredentialRef {
    #[default]
    None,
    #[serde(rename = "oauth_delegated")]
    OAuthDelegated {
        access_token_env: String,
        #[serde(default)]
        refresh_token_env: Option<String>,
    },
    ServiceCredential {
        key_env: String,
        #[serde(default)]
        client_email: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    /// A rejected creative sends the buy back to `pending_creative` instead of failing it.
    #[serde(default)]
    pub allow_resubmission: bool,
    #[serde(default = "default_approval_timeout_hours")]
    pub approval_timeout_hours: u32,
    /// Creative formats that skip human review when the ad server accepts them.
    #[serde(default)]
    pub auto_approve_formats: Vec<String>,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            allow_resubmission: false,
            approval_timeout_hours: default_approval_timeout_hours(),
            auto_approve_formats: Vec::new(),
        }
    }
}

impl ApprovalPolicy {
    pub fn auto_approves(&self, format_id: &str) -> bool {
        self.auto_approve_formats.iter().any(|format| format == format_id)
    }
}

fn default_approval_timeout_hours() -> u32 {
    72
}

/// How a buy's total budget relates to the sum of its package budgets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPolicy {
    #[default]
    ExactSum,
    UpperBound,
}
