//! Base repository trait for database operations.

use crate::db::errors::Result;
use std::collections::HashMap;

/// Data access layer for one table (plus its owned child tables).
///
/// Create, update and response types are separate associated types so request validation and
/// row shapes can differ.
#[async_trait::async_trait]
pub trait Repository {
    type CreateRequest;
    type UpdateRequest;
    type Response;
    type Id: Send + Sync;
    type Filter: Send + Sync;

    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response>;

    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>>;

    /// Get lots of entities by their IDs, keyed by ID
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>>;

    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>>;

    /// Returns `false` when nothing was deleted
    async fn delete(&mut self, id: Self::Id) -> Result<bool>;

    /// Partial update; fails with `DbError::NotFound` when the row is missing
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response>;
}
