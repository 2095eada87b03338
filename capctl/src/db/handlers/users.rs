//! Database repository for administrative users and their roles.

use crate::api::models::users::Role;
use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
};
use crate::types::{Operation, UserId, abbrev_uuid};
use sqlx::{Connection, PgConnection, QueryBuilder};
use std::collections::HashMap;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct UserFilter {
    pub skip: i64,
    pub limit: i64,
    pub search: Option<String>,
}

impl UserFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit, search: None }
    }

    pub fn with_search(mut self, search: Option<String>) -> Self {
        self.search = search;
        self
    }

    fn push_conditions(&self, query: &mut QueryBuilder<'_, sqlx::Postgres>) {
        if let Some(search) = &self.search {
            let pattern = format!("%{search}%");
            query.push(" AND (u.email ILIKE ");
            query.push_bind(pattern.clone());
            query.push(" OR u.display_name ILIKE ");
            query.push_bind(pattern);
            query.push(")");
        }
    }
}

const USER_SELECT: &str = r#"
    SELECT u.id, u.email, u.display_name, u.password_hash, u.last_login, u.created_at, u.updated_at,
           COALESCE(array_agg(r.role ORDER BY r.role) FILTER (WHERE r.role IS NOT NULL), '{}') AS roles
    FROM users u
    LEFT JOIN user_roles r ON r.user_id = u.id
"#;

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Users<'c> {
    type CreateRequest = UserCreateDBRequest;
    type UpdateRequest = UserUpdateDBRequest;
    type Response = UserDBResponse;
    type Id = UserId;
    type Filter = UserFilter;

    #[instrument(skip(self, request), fields(email = %request.email), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let mut tx = self.db.begin().await?;

        let user_id: UserId = sqlx::query_scalar(
            "INSERT INTO users (email, display_name, password_hash) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&request.email)
        .bind(&request.display_name)
        .bind(&request.password_hash)
        .fetch_one(&mut *tx)
        .await?;

        replace_roles(&mut tx, user_id, &request.roles).await?;

        let user = Users::new(&mut tx).get_by_id(user_id).await?.ok_or(DbError::NotFound)?;
        tx.commit().await?;

        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let user = sqlx::query_as::<_, UserDBResponse>(&format!("{USER_SELECT} WHERE u.id = $1 GROUP BY u.id"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<UserId>) -> Result<HashMap<UserId, UserDBResponse>> {
        let users = sqlx::query_as::<_, UserDBResponse>(&format!("{USER_SELECT} WHERE u.id = ANY($1) GROUP BY u.id"))
            .bind(ids.as_slice())
            .fetch_all(&mut *self.db)
            .await?;

        Ok(users.into_iter().map(|u| (u.id, u)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new(format!("{USER_SELECT} WHERE 1=1"));
        filter.push_conditions(&mut query);
        query.push(" GROUP BY u.id ORDER BY LOWER(u.email) ASC LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let users = query.build_query_as::<UserDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(users)
    }

    /// Refuses to remove the last super admin
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let mut tx = self.db.begin().await?;

        let remaining = lock_super_admins_except(&mut tx, id).await?;
        if remaining == 0 && is_super_admin(&mut tx, id).await? {
            return Err(protected(Operation::DeleteAll, id, "cannot delete the last super admin"));
        }

        let result = sqlx::query("DELETE FROM users WHERE id = $1").bind(id).execute(&mut *tx).await?;
        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    /// `roles: Some(..)` replaces the role set; demoting the last super admin is refused
    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let mut tx = self.db.begin().await?;

        let updated: Option<UserId> = sqlx::query_scalar(
            r#"
            UPDATE users SET
                display_name = CASE WHEN $2::text IS NULL THEN display_name ELSE NULLIF($2, '') END,
                password_hash = COALESCE($3, password_hash),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(&request.display_name)
        .bind(&request.password_hash)
        .fetch_optional(&mut *tx)
        .await?;

        if updated.is_none() {
            return Err(DbError::NotFound);
        }

        if let Some(roles) = &request.roles {
            if !roles.contains(&Role::SuperAdmin) {
                let remaining = lock_super_admins_except(&mut tx, id).await?;
                if remaining == 0 && is_super_admin(&mut tx, id).await? {
                    return Err(protected(Operation::UpdateAll, id, "cannot remove the last super admin role"));
                }
            }
            replace_roles(&mut tx, id, roles).await?;
        }

        let user = Users::new(&mut tx).get_by_id(id).await?.ok_or(DbError::NotFound)?;
        tx.commit().await?;

        Ok(user)
    }
}

fn protected(operation: Operation, id: UserId, reason: &str) -> DbError {
    DbError::ProtectedEntity {
        operation,
        reason: reason.to_string(),
        entity_type: "User".to_string(),
        entity_id: Some(id.to_string()),
    }
}

async fn replace_roles(conn: &mut PgConnection, user_id: UserId, roles: &[Role]) -> Result<()> {
    sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    for role in roles {
        sqlx::query("INSERT INTO user_roles (user_id, role) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(user_id)
            .bind(*role)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Locks every super admin role row and returns how many belong to someone other than `id`.
/// Concurrent demotions serialize here, so two admins cannot demote each other at once.
async fn lock_super_admins_except(conn: &mut PgConnection, id: UserId) -> Result<i64> {
    let holders: Vec<UserId> = sqlx::query_scalar("SELECT user_id FROM user_roles WHERE role = 'SUPER_ADMIN' FOR UPDATE")
        .fetch_all(&mut *conn)
        .await?;

    Ok(holders.iter().filter(|holder| **holder != id).count() as i64)
}

async fn is_super_admin(conn: &mut PgConnection, id: UserId) -> Result<bool> {
    let found: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM user_roles WHERE user_id = $1 AND role = 'SUPER_ADMIN')")
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(found)
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &UserFilter) -> Result<i64> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM users u WHERE 1=1");
        filter.push_conditions(&mut query);

        let count: i64 = query.build_query_scalar().fetch_one(&mut *self.db).await?;
        Ok(count)
    }

    /// Case-insensitive lookup used by login and signup
    #[instrument(skip(self, email), err)]
    pub async fn get_user_by_email(&mut self, email: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>(&format!(
            "{USER_SELECT} WHERE LOWER(u.email) = LOWER($1) GROUP BY u.id"
        ))
        .bind(email)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn touch_last_login(&mut self, id: UserId) -> Result<()> {
        sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn count_super_admins(&mut self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_roles WHERE role = 'SUPER_ADMIN'")
            .fetch_one(&mut *self.db)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    fn new_user(email: &str, roles: Vec<Role>) -> UserCreateDBRequest {
        UserCreateDBRequest {
            email: email.to_string(),
            display_name: None,
            password_hash: None,
            roles,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_and_lookup_by_email(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo
            .create(&new_user("Admin@Example.com", vec![Role::CourseManager, Role::ReportViewer]))
            .await
            .unwrap();
        assert_eq!(user.roles.len(), 2);
        assert!(user.roles.contains(&Role::CourseManager));
        assert!(user.last_login.is_none());

        let found = repo.get_user_by_email("admin@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);

        repo.touch_last_login(user.id).await.unwrap();
        let reloaded = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert!(reloaded.last_login.is_some());

        let err = repo.create(&new_user("ADMIN@example.com", vec![])).await.unwrap_err();
        assert_eq!(err.constraint(), Some("users_email_unique"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_user_without_roles_lists_empty_roles(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        repo.create(&new_user("b@example.com", vec![])).await.unwrap();
        repo.create(&new_user("a@example.com", vec![Role::SuperAdmin])).await.unwrap();

        let users = repo.list(&UserFilter::new(0, 10)).await.unwrap();
        let emails: Vec<&str> = users.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, vec!["a@example.com", "b@example.com"]);
        assert!(users[1].roles.is_empty());

        let filter = UserFilter::new(0, 10).with_search(Some("b@".to_string()));
        assert_eq!(repo.count(&filter).await.unwrap(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_last_super_admin_is_protected(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let root = repo.create(&new_user("root@example.com", vec![Role::SuperAdmin])).await.unwrap();
        assert_eq!(repo.count_super_admins().await.unwrap(), 1);

        let demote = UserUpdateDBRequest {
            roles: Some(vec![Role::ReportViewer]),
            ..Default::default()
        };
        assert!(matches!(
            repo.update(root.id, &demote).await,
            Err(DbError::ProtectedEntity { .. })
        ));
        assert!(matches!(repo.delete(root.id).await, Err(DbError::ProtectedEntity { .. })));

        // With a second super admin both operations go through
        repo.create(&new_user("second@example.com", vec![Role::SuperAdmin])).await.unwrap();
        let demoted = repo.update(root.id, &demote).await.unwrap();
        assert_eq!(demoted.roles, vec![Role::ReportViewer]);
        assert!(repo.delete(root.id).await.unwrap());
        assert_eq!(repo.count_super_admins().await.unwrap(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_display_name_keeps_roles(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&new_user("c@example.com", vec![Role::DealerManager])).await.unwrap();
        let updated = repo
            .update(
                user.id,
                &UserUpdateDBRequest {
                    display_name: Some("Carla".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Carla"));
        assert_eq!(updated.roles, vec![Role::DealerManager]);

        let missing = repo.update(uuid::Uuid::new_v4(), &UserUpdateDBRequest::default()).await;
        assert!(matches!(missing, Err(DbError::NotFound)));
    }
}
