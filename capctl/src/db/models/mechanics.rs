use crate::api::models::mechanics::{MechanicCreate, MechanicUpdate, SkillLevel};
use crate::api::models::clean_optional;
use crate::types::{DealerId, MechanicId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct MechanicCreateDBRequest {
    pub dealer_id: DealerId,
    pub first_name: String,
    pub last_name: String,
    pub role_label: Option<String>,
    pub skill_level: SkillLevel,
}

impl From<MechanicCreate> for MechanicCreateDBRequest {
    fn from(create: MechanicCreate) -> Self {
        Self {
            dealer_id: create.dealer_id,
            first_name: create.first_name.trim().to_string(),
            last_name: create.last_name.trim().to_string(),
            role_label: clean_optional(create.role_label),
            skill_level: create.skill_level.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MechanicUpdateDBRequest {
    pub dealer_id: Option<DealerId>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role_label: Option<String>,
    pub skill_level: Option<SkillLevel>,
}

impl From<MechanicUpdate> for MechanicUpdateDBRequest {
    fn from(update: MechanicUpdate) -> Self {
        Self {
            dealer_id: update.dealer_id,
            first_name: update.first_name.map(|s| s.trim().to_string()),
            last_name: update.last_name.map(|s| s.trim().to_string()),
            role_label: update.role_label.map(|s| s.trim().to_string()),
            skill_level: update.skill_level,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct MechanicDBResponse {
    pub id: MechanicId,
    pub dealer_id: DealerId,
    pub dealer_name: String,
    pub first_name: String,
    pub last_name: String,
    pub role_label: Option<String>,
    pub skill_level: SkillLevel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MechanicDBResponse {
    /// Display name used as an enrollment's participant name
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
