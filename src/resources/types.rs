use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_LIMIT: u32 = 25;
pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl IngestionStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// `completed` and `failed` accept no further transitions.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Status only moves forward: pending -> processing -> {completed, failed},
    /// and pending may finish directly.
    pub fn can_transition_to(&self, next: IngestionStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Processing | Self::Completed | Self::Failed) => true,
            (Self::Processing, Self::Completed | Self::Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for IngestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IngestionStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown ingestion status: {value}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    pub ingestion_status: IngestionStatus,
    #[serde(default)]
    pub ingestion_error: Option<String>,
    #[serde(default)]
    pub ingestion_started_at: Option<String>,
    #[serde(default)]
    pub ingestion_completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: String,
    pub updated_at: String,
}

impl Resource {
    pub fn status_snapshot(&self) -> ResourceStatusSnapshot {
        ResourceStatusSnapshot {
            id: self.id.clone(),
            ingestion_status: self.ingestion_status,
            ingestion_error: self.ingestion_error.clone(),
            ingestion_started_at: self.ingestion_started_at.clone(),
            ingestion_completed_at: self.ingestion_completed_at.clone(),
        }
    }
}

/// Lightweight projection returned by `GET /resources/{id}/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStatusSnapshot {
    pub id: String,
    pub ingestion_status: IngestionStatus,
    #[serde(default)]
    pub ingestion_error: Option<String>,
    #[serde(default)]
    pub ingestion_started_at: Option<String>,
    #[serde(default)]
    pub ingestion_completed_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateResourceResponse {
    pub id: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Title,
    IngestionStatus,
}

impl SortField {
    pub(crate) const fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::Title => "title",
            Self::IngestionStatus => "ingestion_status",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    Asc,
    #[default]
    Desc,
}

/// Query parameters of `GET /resources`. Unknown `sort_by`/`sort_dir`
/// values fail to deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceListQuery {
    pub offset: u32,
    pub limit: u32,
    pub sort_by: SortField,
    pub sort_dir: SortDir,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<IngestionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
}

impl Default for ResourceListQuery {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
            sort_by: SortField::default(),
            sort_dir: SortDir::default(),
            status: None,
            q: None,
        }
    }
}

impl ResourceListQuery {
    pub fn effective_limit(&self) -> u32 {
        self.limit.clamp(1, MAX_PAGE_LIMIT)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePage {
    pub items: Vec<Resource>,
    pub total: u64,
    pub offset: u32,
    pub limit: u32,
}
