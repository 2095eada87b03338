//! API request/response models for dealers ("concesionarios").

use super::pagination::Pagination;
use super::{ValidateRequest, not_blank};
use crate::db::models::dealers::DealerDBResponse;
use crate::types::DealerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListDealersQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Case-insensitive substring match on the dealer name
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct DealerCreate {
    /// Unique, compared case-insensitively
    #[schema(example = "Autos del Sur")]
    #[validate(length(max = 200), custom(function = "not_blank"))]
    pub name: String,
}

impl ValidateRequest for DealerCreate {}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, Validate)]
pub struct DealerUpdate {
    #[validate(length(max = 200), custom(function = "not_blank"))]
    pub name: Option<String>,
}

impl ValidateRequest for DealerUpdate {}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DealerResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: DealerId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DealerDBResponse> for DealerResponse {
    fn from(db: DealerDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
