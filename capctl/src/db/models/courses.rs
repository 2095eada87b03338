use crate::api::models::courses::{CourseCreate, CourseModality, CourseUpdate, CourseVisibility};
use crate::api::models::clean_optional;
use crate::types::{CourseId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct CourseCreateDBRequest {
    pub name: String,
    pub description: Option<String>,
    pub modality: CourseModality,
    pub visibility: CourseVisibility,
    pub created_by: Option<UserId>,
}

impl CourseCreateDBRequest {
    pub fn new(created_by: UserId, create: CourseCreate) -> Self {
        Self {
            name: create.name.trim().to_string(),
            description: clean_optional(create.description),
            modality: create.modality.unwrap_or_default(),
            visibility: create.visibility.unwrap_or_default(),
            created_by: Some(created_by),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CourseUpdateDBRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub modality: Option<CourseModality>,
    pub visibility: Option<CourseVisibility>,
}

impl From<CourseUpdate> for CourseUpdateDBRequest {
    fn from(update: CourseUpdate) -> Self {
        Self {
            name: update.name.map(|n| n.trim().to_string()),
            description: update.description.map(|d| d.trim().to_string()),
            modality: update.modality,
            visibility: update.visibility,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CourseDBResponse {
    pub id: CourseId,
    pub name: String,
    pub description: Option<String>,
    pub modality: CourseModality,
    pub visibility: CourseVisibility,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-course counters used to enrich listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct CourseStats {
    pub group_count: i64,
    pub enrollment_count: i64,
}
