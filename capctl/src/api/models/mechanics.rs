//! API request/response models for dealer mechanics.

use super::pagination::Pagination;
use super::{ValidateRequest, not_blank};
use crate::db::models::mechanics::MechanicDBResponse;
use crate::types::{DealerId, MechanicId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Experience tier of a mechanic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "skill_level", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SkillLevel {
    /// Assigned to mechanics registered through the enrollment form
    #[default]
    Junior,
    Basic,
    Advanced,
}

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListMechanicsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub dealer_id: Option<DealerId>,

    /// Case-insensitive match on first or last name
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct MechanicCreate {
    #[schema(value_type = String, format = "uuid")]
    pub dealer_id: DealerId,
    #[schema(example = "Juan")]
    #[validate(length(max = 100), custom(function = "not_blank"))]
    pub first_name: String,
    #[schema(example = "Pérez")]
    #[validate(length(max = 100), custom(function = "not_blank"))]
    pub last_name: String,
    #[schema(example = "Technician")]
    #[validate(length(max = 100))]
    pub role_label: Option<String>,
    /// Defaults to `junior`
    pub skill_level: Option<SkillLevel>,
}

impl ValidateRequest for MechanicCreate {}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, Validate)]
pub struct MechanicUpdate {
    #[schema(value_type = Option<String>, format = "uuid")]
    pub dealer_id: Option<DealerId>,
    #[validate(length(max = 100), custom(function = "not_blank"))]
    pub first_name: Option<String>,
    #[validate(length(max = 100), custom(function = "not_blank"))]
    pub last_name: Option<String>,
    #[validate(length(max = 100))]
    pub role_label: Option<String>,
    pub skill_level: Option<SkillLevel>,
}

impl ValidateRequest for MechanicUpdate {}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MechanicResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: MechanicId,
    #[schema(value_type = String, format = "uuid")]
    pub dealer_id: DealerId,
    pub dealer_name: String,
    pub first_name: String,
    pub last_name: String,
    /// "First Last", as used for enrollment participant names
    pub full_name: String,
    pub role_label: Option<String>,
    pub skill_level: SkillLevel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<MechanicDBResponse> for MechanicResponse {
    fn from(db: MechanicDBResponse) -> Self {
        Self {
            full_name: db.full_name(),
            id: db.id,
            dealer_id: db.dealer_id,
            dealer_name: db.dealer_name,
            first_name: db.first_name,
            last_name: db.last_name,
            role_label: db.role_label,
            skill_level: db.skill_level,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
