//! Database repository for course groups and their session days.

use crate::api::models::{courses::CourseVisibility, groups::GroupState};
use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::groups::{GroupCreateDBRequest, GroupDBResponse, GroupDayDBResponse, GroupDayInput, GroupUpdateDBRequest, LockedGroup},
};
use crate::types::{CourseId, GroupId, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::{Connection, FromRow, PgConnection, QueryBuilder};
use std::collections::HashMap;
use tracing::instrument;

/// Filter for listing groups
#[derive(Debug, Clone)]
pub struct GroupFilter {
    pub skip: i64,
    pub limit: i64,
    pub course_id: Option<CourseId>,
    /// Empty means any state
    pub states: Vec<GroupState>,
    /// Only groups whose course is `visible` (the public catalog)
    pub visible_courses_only: bool,
}

impl GroupFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            course_id: None,
            states: Vec::new(),
            visible_courses_only: false,
        }
    }

    pub fn for_course(mut self, course_id: CourseId) -> Self {
        self.course_id = Some(course_id);
        self
    }

    pub fn with_states(mut self, states: Vec<GroupState>) -> Self {
        self.states = states;
        self
    }

    pub fn public_catalog(mut self) -> Self {
        self.visible_courses_only = true;
        self.states = vec![GroupState::Active, GroupState::Full];
        self
    }

    fn push_conditions(&self, query: &mut QueryBuilder<'_, sqlx::Postgres>) {
        if let Some(course_id) = self.course_id {
            query.push(" AND g.course_id = ");
            query.push_bind(course_id);
        }
        if !self.states.is_empty() {
            query.push(" AND g.state = ANY(");
            query.push_bind(self.states.clone());
            query.push(")");
        }
        if self.visible_courses_only {
            query.push(" AND c.visibility = 'visible'");
        }
    }
}

// Group row joined with its course name; days are attached afterwards
#[derive(Debug, Clone, FromRow)]
struct GroupRow {
    id: GroupId,
    course_id: CourseId,
    course_name: String,
    name: Option<String>,
    max_capacity: i32,
    state: GroupState,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const GROUP_SELECT: &str = r#"
    SELECT g.id, g.course_id, c.name AS course_name, g.name, g.max_capacity, g.state, g.created_at, g.updated_at
    FROM groups g
    JOIN courses c ON c.id = g.course_id
"#;

pub struct Groups<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Groups<'c> {
    type CreateRequest = GroupCreateDBRequest;
    type UpdateRequest = GroupUpdateDBRequest;
    type Response = GroupDBResponse;
    type Id = GroupId;
    type Filter = GroupFilter;

    #[instrument(skip(self, request), fields(course_id = %abbrev_uuid(&request.course_id), days = request.days.len()), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let mut tx = self.db.begin().await?;

        let group_id: GroupId = sqlx::query_scalar(
            r#"
            INSERT INTO groups (course_id, name, max_capacity, state)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(request.course_id)
        .bind(&request.name)
        .bind(request.max_capacity)
        .bind(request.state)
        .fetch_one(&mut *tx)
        .await?;

        insert_days(&mut tx, group_id, &request.days).await?;

        let group = Groups::new(&mut tx).get_by_id(group_id).await?.ok_or(DbError::NotFound)?;
        tx.commit().await?;

        Ok(group)
    }

    #[instrument(skip(self), fields(group_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let row = sqlx::query_as::<_, GroupRow>(&format!("{GROUP_SELECT} WHERE g.id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        match row {
            Some(row) => Ok(self.attach_days(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<GroupId>) -> Result<HashMap<GroupId, GroupDBResponse>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, GroupRow>(&format!("{GROUP_SELECT} WHERE g.id = ANY($1)"))
            .bind(ids.as_slice())
            .fetch_all(&mut *self.db)
            .await?;

        let groups = self.attach_days(rows).await?;
        Ok(groups.into_iter().map(|g| (g.id, g)).collect())
    }

    /// Groups in schedule order: earliest session day first, undated groups last
    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new(format!("{GROUP_SELECT} WHERE 1=1"));
        filter.push_conditions(&mut query);

        query.push(
            " ORDER BY (SELECT MIN(d.day) FROM group_days d WHERE d.group_id = g.id) ASC NULLS LAST, g.created_at ASC, g.id LIMIT ",
        );
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let rows = query.build_query_as::<GroupRow>().fetch_all(&mut *self.db).await?;
        self.attach_days(rows).await
    }

    /// Removes the group and its enrollments atomically; session days cascade.
    #[instrument(skip(self), fields(group_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let mut tx = self.db.begin().await?;

        // Serializes with in-flight enrollments for this group
        let locked: Option<GroupId> = sqlx::query_scalar("SELECT id FROM groups WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Ok(false);
        }

        let enrollments = sqlx::query("DELETE FROM enrollments WHERE group_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let group = sqlx::query("DELETE FROM groups WHERE id = $1").bind(id).execute(&mut *tx).await?;

        tx.commit().await?;

        tracing::info!(enrollments = enrollments.rows_affected(), "Deleted group with its enrollments");
        Ok(group.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(group_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let mut tx = self.db.begin().await?;

        let updated: Option<GroupId> = sqlx::query_scalar(
            r#"
            UPDATE groups SET
                name = CASE WHEN $2::text IS NULL THEN name ELSE NULLIF($2, '') END,
                max_capacity = COALESCE($3, max_capacity),
                state = COALESCE($4, state),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(&request.name)
        .bind(request.max_capacity)
        .bind(request.state)
        .fetch_optional(&mut *tx)
        .await?;

        if updated.is_none() {
            return Err(DbError::NotFound);
        }

        if let Some(days) = &request.days {
            sqlx::query("DELETE FROM group_days WHERE group_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            insert_days(&mut tx, id, days).await?;
        }

        let group = Groups::new(&mut tx).get_by_id(id).await?.ok_or(DbError::NotFound)?;
        tx.commit().await?;

        Ok(group)
    }
}

async fn insert_days(conn: &mut PgConnection, group_id: GroupId, days: &[GroupDayInput]) -> Result<()> {
    for day in days {
        sqlx::query("INSERT INTO group_days (group_id, day, start_time, end_time) VALUES ($1, $2, $3, $4)")
            .bind(group_id)
            .bind(day.day)
            .bind(day.start_time)
            .bind(day.end_time)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

impl<'c> Groups<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &GroupFilter) -> Result<i64> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM groups g JOIN courses c ON c.id = g.course_id WHERE 1=1");
        filter.push_conditions(&mut query);

        let count: i64 = query.build_query_scalar().fetch_one(&mut *self.db).await?;
        Ok(count)
    }

    /// Current enrollment count per group; every requested id is present in the result
    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    pub async fn enrollment_counts(&mut self, ids: &[GroupId]) -> Result<HashMap<GroupId, i64>> {
        let mut counts: HashMap<GroupId, i64> = ids.iter().map(|id| (*id, 0)).collect();
        if ids.is_empty() {
            return Ok(counts);
        }

        let rows = sqlx::query_as::<_, (GroupId, i64)>(
            "SELECT group_id, COUNT(*) FROM enrollments WHERE group_id = ANY($1) GROUP BY group_id",
        )
        .bind(ids)
        .fetch_all(&mut *self.db)
        .await?;

        counts.extend(rows);
        Ok(counts)
    }

    /// Lock the group row for the rest of the surrounding transaction and read its live seat count.
    ///
    /// Must run inside a transaction. The count is a separate statement so that, under READ
    /// COMMITTED, it sees every enrollment committed by whoever held the lock before us.
    #[instrument(skip(self), fields(group_id = %abbrev_uuid(&id)), err)]
    pub async fn lock_for_enrollment(&mut self, id: GroupId) -> Result<Option<LockedGroup>> {
        let row = sqlx::query_as::<_, (GroupId, CourseId, CourseVisibility, i32, GroupState)>(
            r#"
            SELECT g.id, g.course_id, c.visibility, g.max_capacity, g.state
            FROM groups g
            JOIN courses c ON c.id = g.course_id
            WHERE g.id = $1
            FOR UPDATE OF g
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        let Some((id, course_id, course_visibility, max_capacity, state)) = row else {
            return Ok(None);
        };

        let enrollment_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM enrollments WHERE group_id = $1")
            .bind(id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(Some(LockedGroup {
            id,
            course_id,
            course_visibility,
            max_capacity,
            state,
            enrollment_count,
        }))
    }

    async fn attach_days(&mut self, rows: Vec<GroupRow>) -> Result<Vec<GroupDBResponse>> {
        let ids: Vec<GroupId> = rows.iter().map(|r| r.id).collect();
        let mut days_by_group: HashMap<GroupId, Vec<GroupDayDBResponse>> = HashMap::new();

        if !ids.is_empty() {
            let days = sqlx::query_as::<_, GroupDayDBResponse>(
                r#"
                SELECT id, group_id, day, start_time, end_time
                FROM group_days
                WHERE group_id = ANY($1)
                ORDER BY day ASC, start_time ASC NULLS FIRST
                "#,
            )
            .bind(ids.as_slice())
            .fetch_all(&mut *self.db)
            .await?;

            for day in days {
                days_by_group.entry(day.group_id).or_default().push(day);
            }
        }

        Ok(rows
            .into_iter()
            .map(|row| GroupDBResponse {
                days: days_by_group.remove(&row.id).unwrap_or_default(),
                id: row.id,
                course_id: row.course_id,
                course_name: row.course_name,
                name: row.name,
                max_capacity: row.max_capacity,
                state: row.state,
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::courses::CourseVisibility;
    use crate::test_utils::{create_test_course, create_test_dealer, create_test_group, insert_test_enrollment};
    use chrono::NaiveDate;
    use sqlx::PgPool;

    fn day(date: &str) -> GroupDayInput {
        GroupDayInput {
            day: date.parse::<NaiveDate>().unwrap(),
            start_time: Some("09:00:00".parse().unwrap()),
            end_time: Some("13:00:00".parse().unwrap()),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_group_with_days(pool: PgPool) {
        let course = create_test_course(&pool, "Maintenance 101", CourseVisibility::Visible).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Groups::new(&mut conn);

        let group = repo
            .create(&GroupCreateDBRequest {
                course_id: course.id,
                name: Some("G1".to_string()),
                max_capacity: 2,
                state: GroupState::Active,
                days: vec![day("2025-04-08"), day("2025-04-07")],
            })
            .await
            .unwrap();

        assert_eq!(group.course_name, "Maintenance 101");
        assert_eq!(group.max_capacity, 2);
        let dates: Vec<String> = group.days.iter().map(|d| d.day.to_string()).collect();
        assert_eq!(dates, vec!["2025-04-07", "2025-04-08"]);
        assert_eq!(group.first_day(), Some("2025-04-07".parse().unwrap()));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_group_for_missing_course_fails(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let result = Groups::new(&mut conn)
            .create(&GroupCreateDBRequest {
                course_id: uuid::Uuid::new_v4(),
                name: None,
                max_capacity: 5,
                state: GroupState::Active,
                days: vec![],
            })
            .await;
        assert!(matches!(result, Err(DbError::ForeignKeyViolation { .. })));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_replaces_days(pool: PgPool) {
        let course = create_test_course(&pool, "Maintenance 101", CourseVisibility::Visible).await;
        let group = create_test_group(&pool, course.id, 2).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Groups::new(&mut conn);

        let updated = repo
            .update(
                group.id,
                &GroupUpdateDBRequest {
                    max_capacity: Some(12),
                    days: Some(vec![day("2025-06-01")]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.max_capacity, 12);
        assert_eq!(updated.days.len(), 1);
        assert_eq!(updated.days[0].day.to_string(), "2025-06-01");
        assert_eq!(updated.name, group.name);

        // Omitting days leaves them alone
        let renamed = repo
            .update(
                group.id,
                &GroupUpdateDBRequest {
                    name: Some("Tarde".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.days.len(), 1);
        assert_eq!(renamed.name.as_deref(), Some("Tarde"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_filters_public_catalog(pool: PgPool) {
        let visible = create_test_course(&pool, "Visible", CourseVisibility::Visible).await;
        let hidden = create_test_course(&pool, "Hidden", CourseVisibility::Hidden).await;
        let open = create_test_group(&pool, visible.id, 5).await;
        let closed = create_test_group(&pool, visible.id, 5).await;
        create_test_group(&pool, hidden.id, 5).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Groups::new(&mut conn);
        repo.update(
            closed.id,
            &GroupUpdateDBRequest {
                state: Some(GroupState::Closed),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let all = repo.list(&GroupFilter::new(0, 50)).await.unwrap();
        assert_eq!(all.len(), 3);

        let public = GroupFilter::new(0, 50).public_catalog();
        let listed = repo.list(&public).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, open.id);
        assert_eq!(repo.count(&public).await.unwrap(), 1);

        let by_course = GroupFilter::new(0, 50).for_course(visible.id);
        assert_eq!(repo.count(&by_course).await.unwrap(), 2);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_delete_removes_enrollments_and_days(pool: PgPool) {
        let course = create_test_course(&pool, "Maintenance 101", CourseVisibility::Visible).await;
        let group = create_test_group(&pool, course.id, 3).await;
        let dealer = create_test_dealer(&pool, "Autos del Sur").await;
        insert_test_enrollment(&pool, group.id, dealer.id, "ana@x.com").await;
        insert_test_enrollment(&pool, group.id, dealer.id, "bob@x.com").await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Groups::new(&mut conn);
        assert!(repo.delete(group.id).await.unwrap());
        assert!(repo.get_by_id(group.id).await.unwrap().is_none());

        let enrollments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM enrollments WHERE group_id = $1")
            .bind(group.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(enrollments, 0);

        // Course survives
        let courses: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses").fetch_one(&pool).await.unwrap();
        assert_eq!(courses, 1);

        assert!(!Groups::new(&mut conn).delete(group.id).await.unwrap());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_enrollment_counts_and_lock(pool: PgPool) {
        let course = create_test_course(&pool, "Maintenance 101", CourseVisibility::Visible).await;
        let g1 = create_test_group(&pool, course.id, 2).await;
        let g2 = create_test_group(&pool, course.id, 2).await;
        let dealer = create_test_dealer(&pool, "Autos del Sur").await;
        insert_test_enrollment(&pool, g1.id, dealer.id, "ana@x.com").await;

        let mut tx = pool.begin().await.unwrap();
        let mut repo = Groups::new(&mut tx);
        let counts = repo.enrollment_counts(&[g1.id, g2.id]).await.unwrap();
        assert_eq!(counts[&g1.id], 1);
        assert_eq!(counts[&g2.id], 0);

        let locked = repo.lock_for_enrollment(g1.id).await.unwrap().unwrap();
        assert_eq!(locked.enrollment_count, 1);
        assert_eq!(locked.max_capacity, 2);
        assert_eq!(locked.course_visibility, CourseVisibility::Visible);
        assert!(repo.lock_for_enrollment(uuid::Uuid::new_v4()).await.unwrap().is_none());
        tx.rollback().await.unwrap();
    }
}
