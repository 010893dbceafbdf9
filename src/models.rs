use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub const ALL_SENTINEL: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestStatus {
    #[default]
    Pending,
    #[serde(alias = "underreview")]
    UnderReview,
    #[serde(alias = "inprogress")]
    InProgress,
    Completed,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::UnderReview => "under-review",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }

    /// Accepts the canonical kebab-case names and the legacy spellings
    /// without dashes.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "under-review" | "underreview" => Some(Self::UnderReview),
            "in-progress" | "inprogress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub id: String,
    #[serde(default)]
    pub manual_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub details: String,
    pub receiving_authority: String,
    #[serde(default)]
    pub submission_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: RequestStatus,
    #[serde(default)]
    pub documents: Vec<String>,
    #[serde(default)]
    pub response_status: bool,
    #[serde(default)]
    pub response_date: Option<NaiveDate>,
    #[serde(default)]
    pub response_details: Option<String>,
    #[serde(default)]
    pub implementation_date: Option<NaiveDate>,
    #[serde(default)]
    pub followup_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequestPayload {
    pub manual_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub details: String,
    pub receiving_authority: String,
    pub submission_date: Option<NaiveDate>,
    pub status: Option<RequestStatus>,
    #[serde(default)]
    pub documents: Vec<String>,
    #[serde(default)]
    pub response_status: bool,
    pub response_date: Option<NaiveDate>,
    pub response_details: Option<String>,
    pub implementation_date: Option<NaiveDate>,
    pub followup_date: Option<NaiveDate>,
}

/// Partial update. Only the fields that are present are written; `id` and
/// `createdAt` cannot be expressed here.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequestPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiving_authority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RequestStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implementation_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub followup_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationType {
    Upcoming,
    Delayed,
    Followup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub r#type: NotificationType,
    pub title: String,
    pub message: String,
    pub request_id: String,
    pub priority: Priority,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    #[serde(default, deserialize_with = "deserialize_status_filter")]
    pub status: Option<RequestStatus>,
    #[serde(default, deserialize_with = "deserialize_text_filter")]
    pub authority: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub text: Option<String>,
}

fn deserialize_status_filter<'de, D>(deserializer: D) -> Result<Option<RequestStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") | Some(ALL_SENTINEL) => Ok(None),
        Some(value) => RequestStatus::parse(value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown request status '{}'", value))),
    }
}

fn deserialize_text_filter<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|value| {
        let trimmed = value.trim();
        !trimmed.is_empty() && trimmed != ALL_SENTINEL
    }))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub pending: usize,
    pub under_review: usize,
    pub rejected: usize,
    pub completion_rate: u32,
    pub average_response_days: u32,
    pub authorities: Vec<String>,
    pub recent: Vec<Request>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
    pub buttons: Vec<PageButton>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PageButton {
    Page { number: usize, current: bool },
    Ellipsis,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub notification: Notification,
    pub play_sound: bool,
    pub desktop: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportFormat {
    Json,
    Md,
}

impl ExportFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "json" => Some(Self::Json),
            "md" => Some(Self::Md),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Md => "md",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse {
    pub path: String,
    pub count: usize,
}
