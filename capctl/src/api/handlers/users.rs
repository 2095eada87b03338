use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::{
        ValidateRequest, clean_optional,
        pagination::PaginatedResponse,
        users::{ListUsersQuery, UserResponse, UserUpdate},
    },
    auth::permissions::{RequiresPermission, operation, resource},
    db::{
        handlers::{Repository, Users, users::UserFilter},
        models::users::UserUpdateDBRequest,
    },
    errors::{Error, Result},
    types::UserId,
};

#[utoipa::path(
    get,
    path = "/usuarios",
    tag = "users",
    summary = "List administrators",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Page of administrator accounts", body = PaginatedResponse<UserResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
    _: RequiresPermission<resource::Users, operation::ReadAll>,
) -> Result<Json<PaginatedResponse<UserResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = UserFilter::new(skip, limit).with_search(clean_optional(query.search));

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut conn);

    let users = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        users.into_iter().map(UserResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    get,
    path = "/usuarios/{id}",
    tag = "users",
    summary = "Get administrator",
    params(("id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Administrator account", body = UserResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    _: RequiresPermission<resource::Users, operation::ReadAll>,
) -> Result<Json<UserResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let user = Users::new(&mut conn)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::not_found("User", id))?;

    Ok(Json(user.into()))
}

/// Change display name or roles. The last super admin cannot be demoted.
#[utoipa::path(
    patch,
    path = "/usuarios/{id}",
    tag = "users",
    summary = "Update administrator",
    request_body = UserUpdate,
    params(("id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Account updated", body = UserResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden, or the change would leave no super admin"),
        (status = 404, description = "User not found"),
        (status = 422, description = "Validation failed"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    _: RequiresPermission<resource::Users, operation::UpdateAll>,
    Json(update): Json<UserUpdate>,
) -> Result<Json<UserResponse>> {
    update.validate_request()?;

    let request = UserUpdateDBRequest {
        display_name: update.display_name.map(|n| n.trim().to_string()),
        roles: update.roles,
        password_hash: None,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut conn).update(id, &request).await?;

    Ok(Json(user.into()))
}

/// Delete an administrator. Nobody can delete their own account, nor the last super admin.
#[utoipa::path(
    delete,
    path = "/usuarios/{id}",
    tag = "users",
    summary = "Delete administrator",
    params(("id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "Account deleted"),
        (status = 400, description = "Attempt to delete one's own account"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden, or the last super admin"),
        (status = 404, description = "User not found"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    current_user: RequiresPermission<resource::Users, operation::DeleteAll>,
) -> Result<StatusCode> {
    if current_user.id == id {
        return Err(Error::BadRequest {
            message: "You cannot delete your own account".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    if Users::new(&mut conn).delete(id).await? {
        tracing::info!(user_id = %id, deleted_by = %current_user.id, "Administrator account deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found("User", id))
    }
}
