//! Database repository for dealers.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::dealers::{DealerCreateDBRequest, DealerDBResponse, DealerUpdateDBRequest},
};
use crate::types::{DealerId, abbrev_uuid};
use sqlx::{PgConnection, QueryBuilder};
use std::collections::HashMap;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct DealerFilter {
    pub skip: i64,
    pub limit: i64,
    pub search: Option<String>,
}

impl DealerFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit, search: None }
    }

    pub fn with_search(mut self, search: Option<String>) -> Self {
        self.search = search;
        self
    }

    fn push_conditions(&self, query: &mut QueryBuilder<'_, sqlx::Postgres>) {
        if let Some(search) = &self.search {
            query.push(" AND name ILIKE ");
            query.push_bind(format!("%{search}%"));
        }
    }
}

pub struct Dealers<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Dealers<'c> {
    type CreateRequest = DealerCreateDBRequest;
    type UpdateRequest = DealerUpdateDBRequest;
    type Response = DealerDBResponse;
    type Id = DealerId;
    type Filter = DealerFilter;

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let dealer = sqlx::query_as::<_, DealerDBResponse>(
            "INSERT INTO dealers (name) VALUES ($1) RETURNING id, name, created_at, updated_at",
        )
        .bind(&request.name)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(dealer)
    }

    #[instrument(skip(self), fields(dealer_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let dealer = sqlx::query_as::<_, DealerDBResponse>("SELECT id, name, created_at, updated_at FROM dealers WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(dealer)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<DealerId>) -> Result<HashMap<DealerId, DealerDBResponse>> {
        let dealers = sqlx::query_as::<_, DealerDBResponse>(
            "SELECT id, name, created_at, updated_at FROM dealers WHERE id = ANY($1)",
        )
        .bind(ids.as_slice())
        .fetch_all(&mut *self.db)
        .await?;

        Ok(dealers.into_iter().map(|d| (d.id, d)).collect())
    }

    /// Alphabetical, case-insensitive
    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new("SELECT id, name, created_at, updated_at FROM dealers WHERE 1=1");
        filter.push_conditions(&mut query);
        query.push(" ORDER BY LOWER(name) ASC, id LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let dealers = query.build_query_as::<DealerDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(dealers)
    }

    /// Fails with `ForeignKeyViolation` while mechanics or enrollments still reference the dealer
    #[instrument(skip(self), fields(dealer_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM dealers WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(dealer_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let dealer = sqlx::query_as::<_, DealerDBResponse>(
            r#"
            UPDATE dealers SET
                name = COALESCE($2, name),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&request.name)
        .fetch_optional(&mut *self.db)
        .await?;

        dealer.ok_or(DbError::NotFound)
    }
}

impl<'c> Dealers<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &DealerFilter) -> Result<i64> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM dealers WHERE 1=1");
        filter.push_conditions(&mut query);

        let count: i64 = query.build_query_scalar().fetch_one(&mut *self.db).await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::courses::CourseVisibility;
    use crate::test_utils::{create_test_course, create_test_dealer, create_test_group, insert_test_enrollment};
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_name_is_unique_case_insensitively(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Dealers::new(&mut conn);

        repo.create(&DealerCreateDBRequest {
            name: "Autos del Sur".to_string(),
        })
        .await
        .unwrap();

        let err = repo
            .create(&DealerCreateDBRequest {
                name: "AUTOS DEL SUR".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.constraint(), Some("dealers_name_unique"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_search_and_update(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Dealers::new(&mut conn);

        for name in ["zeta motors", "Alfa Autos", "Beta Autos"] {
            repo.create(&DealerCreateDBRequest { name: name.to_string() }).await.unwrap();
        }

        let names: Vec<String> = repo
            .list(&DealerFilter::new(0, 10))
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["Alfa Autos", "Beta Autos", "zeta motors"]);

        let filter = DealerFilter::new(0, 10).with_search(Some("autos".to_string()));
        assert_eq!(repo.count(&filter).await.unwrap(), 2);

        let first = repo.list(&DealerFilter::new(0, 1)).await.unwrap().remove(0);
        let renamed = repo
            .update(
                first.id,
                &DealerUpdateDBRequest {
                    name: Some("Alfa Automotores".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "Alfa Automotores");

        let missing = repo.update(uuid::Uuid::new_v4(), &DealerUpdateDBRequest::default()).await;
        assert!(matches!(missing, Err(DbError::NotFound)));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_delete_referenced_dealer_is_rejected(pool: PgPool) {
        let course = create_test_course(&pool, "Frenos", CourseVisibility::Visible).await;
        let group = create_test_group(&pool, course.id, 5).await;
        let dealer = create_test_dealer(&pool, "Autos del Sur").await;
        insert_test_enrollment(&pool, group.id, dealer.id, "ana@x.com").await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Dealers::new(&mut conn);
        let err = repo.delete(dealer.id).await.unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));

        let unused = create_test_dealer(&pool, "Sin uso").await;
        assert!(repo.delete(unused.id).await.unwrap());
        assert!(!repo.delete(unused.id).await.unwrap());
    }
}
