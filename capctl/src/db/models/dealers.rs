use crate::types::DealerId;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct DealerCreateDBRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct DealerUpdateDBRequest {
    pub name: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DealerDBResponse {
    pub id: DealerId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
