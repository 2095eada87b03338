//! Database repository for mechanics.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::mechanics::{MechanicCreateDBRequest, MechanicDBResponse, MechanicUpdateDBRequest},
};
use crate::types::{DealerId, MechanicId, abbrev_uuid};
use sqlx::{PgConnection, QueryBuilder};
use std::collections::HashMap;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct MechanicFilter {
    pub skip: i64,
    pub limit: i64,
    pub dealer_id: Option<DealerId>,
    pub search: Option<String>,
}

impl MechanicFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            dealer_id: None,
            search: None,
        }
    }

    pub fn for_dealer(mut self, dealer_id: Option<DealerId>) -> Self {
        self.dealer_id = dealer_id;
        self
    }

    pub fn with_search(mut self, search: Option<String>) -> Self {
        self.search = search;
        self
    }

    fn push_conditions(&self, query: &mut QueryBuilder<'_, sqlx::Postgres>) {
        if let Some(dealer_id) = self.dealer_id {
            query.push(" AND m.dealer_id = ");
            query.push_bind(dealer_id);
        }
        if let Some(search) = &self.search {
            let pattern = format!("%{search}%");
            query.push(" AND ((m.first_name || ' ' || m.last_name) ILIKE ");
            query.push_bind(pattern.clone());
            query.push(" OR d.name ILIKE ");
            query.push_bind(pattern);
            query.push(")");
        }
    }
}

const MECHANIC_SELECT: &str = r#"
    SELECT m.id, m.dealer_id, d.name AS dealer_name, m.first_name, m.last_name, m.role_label,
           m.skill_level, m.created_at, m.updated_at
    FROM mechanics m
    JOIN dealers d ON d.id = m.dealer_id
"#;

pub struct Mechanics<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Mechanics<'c> {
    type CreateRequest = MechanicCreateDBRequest;
    type UpdateRequest = MechanicUpdateDBRequest;
    type Response = MechanicDBResponse;
    type Id = MechanicId;
    type Filter = MechanicFilter;

    #[instrument(skip(self, request), fields(dealer_id = %abbrev_uuid(&request.dealer_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let id: MechanicId = sqlx::query_scalar(
            r#"
            INSERT INTO mechanics (dealer_id, first_name, last_name, role_label, skill_level)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(request.dealer_id)
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(&request.role_label)
        .bind(request.skill_level)
        .fetch_one(&mut *self.db)
        .await?;

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), fields(mechanic_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let mechanic = sqlx::query_as::<_, MechanicDBResponse>(&format!("{MECHANIC_SELECT} WHERE m.id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(mechanic)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<MechanicId>) -> Result<HashMap<MechanicId, MechanicDBResponse>> {
        let mechanics = sqlx::query_as::<_, MechanicDBResponse>(&format!("{MECHANIC_SELECT} WHERE m.id = ANY($1)"))
            .bind(ids.as_slice())
            .fetch_all(&mut *self.db)
            .await?;

        Ok(mechanics.into_iter().map(|m| (m.id, m)).collect())
    }

    /// Most recently registered first
    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new(format!("{MECHANIC_SELECT} WHERE 1=1"));
        filter.push_conditions(&mut query);
        query.push(" ORDER BY m.created_at DESC, m.id LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let mechanics = query.build_query_as::<MechanicDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(mechanics)
    }

    /// Enrollments that named this mechanic keep their participant data and lose the link
    #[instrument(skip(self), fields(mechanic_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM mechanics WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(mechanic_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let updated: Option<MechanicId> = sqlx::query_scalar(
            r#"
            UPDATE mechanics SET
                dealer_id = COALESCE($2, dealer_id),
                first_name = COALESCE($3, first_name),
                last_name = COALESCE($4, last_name),
                role_label = CASE WHEN $5::text IS NULL THEN role_label ELSE NULLIF($5, '') END,
                skill_level = COALESCE($6, skill_level),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(request.dealer_id)
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(&request.role_label)
        .bind(request.skill_level)
        .fetch_optional(&mut *self.db)
        .await?;

        match updated {
            Some(id) => self.get_by_id(id).await?.ok_or(DbError::NotFound),
            None => Err(DbError::NotFound),
        }
    }
}

impl<'c> Mechanics<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &MechanicFilter) -> Result<i64> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM mechanics m JOIN dealers d ON d.id = m.dealer_id WHERE 1=1");
        filter.push_conditions(&mut query);

        let count: i64 = query.build_query_scalar().fetch_one(&mut *self.db).await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::mechanics::SkillLevel;
    use crate::test_utils::create_test_dealer;
    use sqlx::PgPool;

    fn mechanic(dealer_id: DealerId, first: &str, last: &str) -> MechanicCreateDBRequest {
        MechanicCreateDBRequest {
            dealer_id,
            first_name: first.to_string(),
            last_name: last.to_string(),
            role_label: None,
            skill_level: SkillLevel::Junior,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_and_list_by_dealer(pool: PgPool) {
        let north = create_test_dealer(&pool, "Norte").await;
        let south = create_test_dealer(&pool, "Sur").await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Mechanics::new(&mut conn);

        let ana = repo.create(&mechanic(north.id, "Ana", "Gomez")).await.unwrap();
        assert_eq!(ana.dealer_name, "Norte");
        assert_eq!(ana.full_name(), "Ana Gomez");
        assert_eq!(ana.skill_level, SkillLevel::Junior);

        repo.create(&mechanic(south.id, "Luis", "Perez")).await.unwrap();

        let filter = MechanicFilter::new(0, 10).for_dealer(Some(north.id));
        let listed = repo.list(&filter).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, ana.id);

        let search = MechanicFilter::new(0, 10).with_search(Some("luis per".to_string()));
        assert_eq!(repo.count(&search).await.unwrap(), 1);

        let by_dealer_name = MechanicFilter::new(0, 10).with_search(Some("sur".to_string()));
        assert_eq!(repo.count(&by_dealer_name).await.unwrap(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_and_missing_dealer(pool: PgPool) {
        let dealer = create_test_dealer(&pool, "Norte").await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Mechanics::new(&mut conn);

        let created = repo.create(&mechanic(dealer.id, "Ana", "Gomez")).await.unwrap();
        let updated = repo
            .update(
                created.id,
                &MechanicUpdateDBRequest {
                    skill_level: Some(SkillLevel::Advanced),
                    role_label: Some("Jefa de taller".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.skill_level, SkillLevel::Advanced);
        assert_eq!(updated.role_label.as_deref(), Some("Jefa de taller"));
        assert_eq!(updated.first_name, "Ana");

        let err = repo.create(&mechanic(uuid::Uuid::new_v4(), "X", "Y")).await.unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
    }
}
