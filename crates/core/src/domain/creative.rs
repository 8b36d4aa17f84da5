//! Creatives and their review record.
//!
//! [`Creative`] is the stored record and carries the review outcome.
//! [`CreativeView`] is what buyers see; it is built field by field and has no
//! review status or reviewer feedback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::media_buy::MediaBuyId;
use crate::domain::principal::PrincipalId;
use crate::domain::tenant::TenantId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CreativeId(pub String);

impl std::fmt::Display for CreativeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    PendingReview,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingReview => "pending_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreativeReview {
    pub status: ReviewStatus,
    pub feedback: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl CreativeReview {
    pub fn pending() -> Self {
        Self { status: ReviewStatus::PendingReview, feedback: None, reviewed_by: None, reviewed_at: None }
    }

    pub fn decided(
        status: ReviewStatus,
        feedback: Option<String>,
        reviewed_by: impl Into<String>,
        reviewed_at: DateTime<Utc>,
    ) -> Self {
        Self { status, feedback, reviewed_by: Some(reviewed_by.into()), reviewed_at: Some(reviewed_at) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creative {
    pub id: CreativeId,
    pub tenant_id: TenantId,
    pub principal_id: PrincipalId,
    pub media_buy_id: Option<MediaBuyId>,
    pub name: String,
    pub format_id: String,
    pub asset_url: String,
    pub click_url: Option<String>,
    pub review: CreativeReview,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Buyer-facing creative payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreativeView {
    pub creative_id: CreativeId,
    pub name: String,
    pub format_id: String,
    pub asset_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_buy_id: Option<MediaBuyId>,
}

impl From<&Creative> for CreativeView {
    fn from(creative: &Creative) -> Self {
        Self {
            creative_id: creative.id.clone(),
            name: creative.name.clone(),
            format_id: creative.format_id.clone(),
            asset_url: creative.asset_url.clone(),
            click_url: creative.click_url.clone(),
            media_buy_id: creative.media_buy_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{Creative, CreativeId, CreativeReview, CreativeView, ReviewStatus};
    use crate::domain::principal::PrincipalId;
    use crate::domain::tenant::TenantId;

    #[test]
    fn creative_view_omits_review_fields() {
        let creative = Creative {
            id: CreativeId("cr_1".to_string()),
            tenant_id: TenantId("tenant_a".to_string()),
            principal_id: PrincipalId("buyer_1".to_string()),
            media_buy_id: None,
            name: "Autumn banner".to_string(),
            format_id: "display_300x250".to_string(),
            asset_url: "https://cdn.example.com/autumn.png".to_string(),
            click_url: None,
            review: CreativeReview::decided(
                ReviewStatus::Rejected,
                Some("logo too small".to_string()),
                "reviewer_1",
                Utc::now(),
            ),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let value = serde_json::to_value(CreativeView::from(&creative)).expect("serialize view");
        let object = value.as_object().expect("object");

        assert!(!object.contains_key("status"));
        assert!(!object.contains_key("review"));
        assert!(!object.contains_key("review_feedback"));
        assert!(!object.contains_key("tenant_id"));
        assert!(!value.to_string().contains("logo too small"));
        assert_eq!(object["creative_id"], "cr_1");
    }
}
