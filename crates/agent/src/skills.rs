//! The closed set of operations the agent serves, shared by both transports.

use serde_json::{json, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Skill {
    GetProducts,
    ListCreativeFormats,
    CreateMediaBuy,
    UpdateMediaBuy,
    GetMediaBuy,
    GetMediaBuyDelivery,
    SyncCreatives,
    ListCreatives,
    ReviewCreative,
    ListReviewTasks,
    ListWorkflowSteps,
}

impl Skill {
    pub const ALL: [Skill; 11] = [
        Skill::GetProducts,
        Skill::ListCreativeFormats,
        Skill::CreateMediaBuy,
        Skill::UpdateMediaBuy,
        Skill::GetMediaBuy,
        Skill::GetMediaBuyDelivery,
        Skill::SyncCreatives,
        Skill::ListCreatives,
        Skill::ReviewCreative,
        Skill::ListReviewTasks,
        Skill::ListWorkflowSteps,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::GetProducts => "get_products",
            Self::ListCreativeFormats => "list_creative_formats",
            Self::CreateMediaBuy => "create_media_buy",
            Self::UpdateMediaBuy => "update_media_buy",
            Self::GetMediaBuy => "get_media_buy",
            Self::GetMediaBuyDelivery => "get_media_buy_delivery",
            Self::SyncCreatives => "sync_creatives",
            Self::ListCreatives => "list_creatives",
            Self::ReviewCreative => "review_creative",
            Self::ListReviewTasks => "list_review_tasks",
            Self::ListWorkflowSteps => "list_workflow_steps",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|skill| skill.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::GetProducts => "List the publisher's products and their pricing options.",
            Self::ListCreativeFormats => "List the creative formats accepted by the catalog.",
            Self::CreateMediaBuy => "Create a media buy from one or more priced packages.",
            Self::UpdateMediaBuy => "Pause, resume or cancel a media buy, or change its budgets.",
            Self::GetMediaBuy => "Fetch the current state of a media buy.",
            Self::GetMediaBuyDelivery => "Fetch cumulative delivery metrics for a media buy.",
            Self::SyncCreatives => "Upload creatives, optionally assigning them to a media buy.",
            Self::ListCreatives => "List creatives of a media buy or of the caller.",
            Self::ReviewCreative => "Approve or reject a creative awaiting review.",
            Self::ListReviewTasks => "List creatives awaiting human review.",
            Self::ListWorkflowSteps => "List the audit trail of a media buy.",
        }
    }

    /// Reviewer-only skills expose review state and must never reach buyers.
    pub fn requires_reviewer(&self) -> bool {
        matches!(self, Self::ReviewCreative | Self::ListReviewTasks | Self::ListWorkflowSteps)
    }

    /// JSON schema of the skill's input, as advertised to MCP clients.
    pub fn input_schema(&self) -> Value {
        let media_buy_ref = json!({
            "type": "object",
            "properties": { "media_buy_id": { "type": "string" } },
            "required": ["media_buy_id"],
            "additionalProperties": false
        });
        let empty = json!({ "type": "object", "properties": {}, "additionalProperties": false });
        let budget = json!({ "type": "number", "minimum": 0 });

        match self {
            Self::GetProducts => json!({
                "type": "object",
                "properties": {
                    "brief": { "type": "string" },
                    "delivery_type": { "enum": ["guaranteed", "non_guaranteed"] },
                    "format_ids": { "type": "array", "items": { "type": "string" } }
                },
                "additionalProperties": false
            }),
            Self::ListCreativeFormats | Self::ListReviewTasks => empty,
            Self::CreateMediaBuy => json!({
                "type": "object",
                "properties": {
                    "buyer_ref": { "type": "string" },
                    "packages": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "product_id": { "type": "string" },
                                "pricing_option_id": { "type": "string" },
                                "budget": budget
                            },
                            "required": ["product_id", "pricing_option_id", "budget"],
                            "additionalProperties": false
                        }
                    },
                    "total_budget": budget,
                    "start_time": { "type": "string", "format": "date-time" },
                    "end_time": { "type": "string", "format": "date-time" }
                },
                "required": ["packages", "start_time", "end_time"],
                "additionalProperties": false
            }),
            Self::UpdateMediaBuy => json!({
                "type": "object",
                "properties": {
                    "media_buy_id": { "type": "string" },
                    "action": { "enum": ["pause", "resume", "cancel"] },
                    "total_budget": budget,
                    "packages": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "package_id": { "type": "string" },
                                "budget": budget
                            },
                            "required": ["package_id", "budget"],
                            "additionalProperties": false
                        }
                    }
                },
                "required": ["media_buy_id"],
                "additionalProperties": false
            }),
            Self::GetMediaBuy | Self::GetMediaBuyDelivery | Self::ListWorkflowSteps => media_buy_ref,
            Self::SyncCreatives => json!({
                "type": "object",
                "properties": {
                    "media_buy_id": { "type": "string" },
                    "creatives": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "creative_id": { "type": "string" },
                                "name": { "type": "string" },
                                "format_id": { "type": "string" },
                                "asset_url": { "type": "string" },
                                "click_url": { "type": "string" }
                            },
                            "required": ["creative_id", "name", "format_id", "asset_url"],
                            "additionalProperties": false
                        }
                    }
                },
                "required": ["creatives"],
                "additionalProperties": false
            }),
            Self::ListCreatives => json!({
                "type": "object",
                "properties": { "media_buy_id": { "type": "string" } },
                "additionalProperties": false
            }),
            Self::ReviewCreative => json!({
                "type": "object",
                "properties": {
                    "creative_id": { "type": "string" },
                    "decision": { "enum": ["approve", "reject"] },
                    "feedback": { "type": "string" }
                },
                "required": ["creative_id", "decision"],
                "additionalProperties": false
            }),
        }
    }
}

impl std::fmt::Display for Skill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
