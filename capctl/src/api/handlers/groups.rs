use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use super::sees_unpublished;
use crate::{
    AppState,
    api::models::{
        ValidateRequest,
        courses::CourseVisibility,
        groups::{GroupCreate, GroupResponse, GroupUpdate, ListGroupsQuery},
        pagination::PaginatedResponse,
        users::CurrentUser,
    },
    auth::permissions::{RequiresPermission, operation, resource},
    db::{
        handlers::{Courses, Groups, Repository, groups::GroupFilter},
        models::groups::{GroupCreateDBRequest, GroupDBResponse, GroupDayInput, GroupUpdateDBRequest},
    },
    errors::{Error, Result},
    types::{GroupId, Resource},
};
use sqlx::PgConnection;

async fn with_enrollment_count(conn: &mut PgConnection, group: GroupDBResponse) -> Result<GroupResponse> {
    let count = Groups::new(conn)
        .enrollment_counts(&[group.id])
        .await?
        .get(&group.id)
        .copied()
        .unwrap_or(0);
    Ok(GroupResponse::new(group, count))
}

/// List groups with enrollment counts and remaining capacity
#[utoipa::path(
    get,
    path = "/grupos",
    tag = "groups",
    summary = "List groups",
    params(ListGroupsQuery),
    responses(
        (status = 200, description = "Page of groups; anonymous callers only see open groups of visible courses", body = PaginatedResponse<GroupResponse>),
        (status = 500, description = "Internal server error")
    ),
    security(
        (),
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_groups(
    State(state): State<AppState>,
    Query(query): Query<ListGroupsQuery>,
    current_user: Option<CurrentUser>,
) -> Result<Json<PaginatedResponse<GroupResponse>>> {
    let (skip, limit) = query.pagination.params();

    let mut filter = GroupFilter::new(skip, limit);
    if let Some(course_id) = query.course_id {
        filter = filter.for_course(course_id);
    }
    if !sees_unpublished(current_user.as_ref(), Resource::Groups) {
        filter = filter.public_catalog();
    } else if let Some(state) = query.state {
        filter = filter.with_states(vec![state]);
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Groups::new(&mut conn);

    let groups = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;
    let ids: Vec<GroupId> = groups.iter().map(|g| g.id).collect();
    let counts = repo.enrollment_counts(&ids).await?;

    let data = groups
        .into_iter()
        .map(|group| {
            let count = counts.get(&group.id).copied().unwrap_or(0);
            GroupResponse::new(group, count)
        })
        .collect();

    Ok(Json(PaginatedResponse::new(data, total_count, skip, limit)))
}

#[utoipa::path(
    get,
    path = "/grupos/{id}",
    tag = "groups",
    summary = "Get group",
    params(("id" = uuid::Uuid, Path, description = "Group ID")),
    responses(
        (status = 200, description = "Group with its session days", body = GroupResponse),
        (status = 404, description = "Group not found, or not open to the public"),
        (status = 500, description = "Internal server error")
    ),
    security(
        (),
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_group(
    State(state): State<AppState>,
    Path(id): Path<GroupId>,
    current_user: Option<CurrentUser>,
) -> Result<Json<GroupResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let group = Groups::new(&mut conn)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::not_found("Group", id))?;

    if !sees_unpublished(current_user.as_ref(), Resource::Groups) {
        let course_visible = Courses::new(&mut conn)
            .get_by_id(group.course_id)
            .await?
            .is_some_and(|course| course.visibility == CourseVisibility::Visible);
        if !course_visible || !group.state.accepts_enrollments() {
            return Err(Error::not_found("Group", id));
        }
    }

    Ok(Json(with_enrollment_count(&mut conn, group).await?))
}

#[utoipa::path(
    post,
    path = "/grupos",
    tag = "groups",
    summary = "Create group",
    request_body = GroupCreate,
    responses(
        (status = 201, description = "Group created", body = GroupResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Course not found"),
        (status = 422, description = "Validation failed"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_group(
    State(state): State<AppState>,
    _: RequiresPermission<resource::Groups, operation::CreateAll>,
    Json(create): Json<GroupCreate>,
) -> Result<(StatusCode, Json<GroupResponse>)> {
    create.validate_request()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    if Courses::new(&mut conn).get_by_id(create.course_id).await?.is_none() {
        return Err(Error::not_found("Course", create.course_id));
    }

    let request = GroupCreateDBRequest {
        course_id: create.course_id,
        name: create.clean_name(),
        max_capacity: create.max_capacity,
        state: create.state.unwrap_or_default(),
        days: create.days.iter().map(GroupDayInput::from).collect(),
    };
    let group = Groups::new(&mut conn).create(&request).await?;

    Ok((StatusCode::CREATED, Json(GroupResponse::new(group, 0))))
}

/// Partial update; `days`, when present, replaces every session day
#[utoipa::path(
    patch,
    path = "/grupos/{id}",
    tag = "groups",
    summary = "Update group",
    request_body = GroupUpdate,
    params(("id" = uuid::Uuid, Path, description = "Group ID")),
    responses(
        (status = 200, description = "Group updated", body = GroupResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Group not found"),
        (status = 422, description = "Validation failed"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_group(
    State(state): State<AppState>,
    Path(id): Path<GroupId>,
    _: RequiresPermission<resource::Groups, operation::UpdateAll>,
    Json(update): Json<GroupUpdate>,
) -> Result<Json<GroupResponse>> {
    update.validate_request()?;

    let request = GroupUpdateDBRequest {
        name: update.name.map(|n| n.trim().to_string()),
        max_capacity: update.max_capacity,
        state: update.state,
        days: update.days.map(|days| days.iter().map(GroupDayInput::from).collect()),
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let group = Groups::new(&mut conn).update(id, &request).await?;

    Ok(Json(with_enrollment_count(&mut conn, group).await?))
}

/// Delete a group together with its session days and enrollments
#[utoipa::path(
    delete,
    path = "/grupos/{id}",
    tag = "groups",
    summary = "Delete group",
    params(("id" = uuid::Uuid, Path, description = "Group ID")),
    responses(
        (status = 204, description = "Group deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Group not found"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_group(
    State(state): State<AppState>,
    Path(id): Path<GroupId>,
    _: RequiresPermission<resource::Groups, operation::DeleteAll>,
) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    if Groups::new(&mut conn).delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found("Group", id))
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        api::models::{
            courses::CourseVisibility,
            groups::{GroupResponse, GroupState},
            pagination::PaginatedResponse,
            users::Role,
        },
        test_utils::*,
    };
    use axum::http::StatusCode;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_group_with_days(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let manager = create_test_user(&pool, "manager@example.com", vec![Role::CourseManager]).await;
        let course = create_test_course(&pool, "Frenos", CourseVisibility::Visible).await;
        let h = add_auth_headers(&manager);
        let first = Utc::now().date_naive() + Duration::days(10);
        let second = first + Duration::days(1);

        let response = app
            .post("/grupos")
            .add_header(&h[0].0, &h[0].1)
            .json(&json!({
                "course_id": course.id,
                "name": " Turno tarde ",
                "max_capacity": 12,
                "days": [
                    { "day": second, "start_time": "14:00:00", "end_time": "18:00:00" },
                    { "day": first }
                ]
            }))
            .await;

        response.assert_status(StatusCode::CREATED);
        let group: GroupResponse = response.json();
        assert_eq!(group.name.as_deref(), Some("Turno tarde"));
        assert_eq!(group.course_name, "Frenos");
        assert_eq!(group.state, GroupState::Active);
        assert_eq!(group.remaining_capacity, 12);
        let days: Vec<_> = group.days.iter().map(|d| d.day).collect();
        assert_eq!(days, vec![first, second]);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_group_rejects_bad_days(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let admin = create_test_admin(&pool).await;
        let course = create_test_course(&pool, "Frenos", CourseVisibility::Visible).await;
        let h = add_auth_headers(&admin);
        let day = Utc::now().date_naive();

        let response = app
            .post("/grupos")
            .add_header(&h[0].0, &h[0].1)
            .json(&json!({
                "course_id": course.id,
                "max_capacity": 0,
                "days": [
                    { "day": day, "start_time": "12:00:00", "end_time": "09:00:00" },
                    { "day": day }
                ]
            }))
            .await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        let body: serde_json::Value = response.json();
        let fields: Vec<&str> = body["errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, vec!["days[0].end_time", "days[1].day", "max_capacity"]);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_group_for_missing_course(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let admin = create_test_admin(&pool).await;
        let h = add_auth_headers(&admin);

        app.post("/grupos")
            .add_header(&h[0].0, &h[0].1)
            .json(&json!({ "course_id": uuid::Uuid::new_v4(), "max_capacity": 5 }))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_public_group_listing(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let admin = create_test_admin(&pool).await;
        let h = add_auth_headers(&admin);
        let visible = create_test_course(&pool, "Frenos", CourseVisibility::Visible).await;
        let hidden = create_test_course(&pool, "Oculto", CourseVisibility::Hidden).await;
        let open = create_test_group(&pool, visible.id, 3).await;
        let closed = create_test_group(&pool, visible.id, 3).await;
        let unlisted = create_test_group(&pool, hidden.id, 3).await;
        let dealer = create_test_dealer(&pool, "Autos del Sur").await;
        insert_test_enrollment(&pool, open.id, dealer.id, "a@example.com").await;

        app.patch(&format!("/grupos/{}", closed.id))
            .add_header(&h[0].0, &h[0].1)
            .json(&json!({ "state": "closed" }))
            .await
            .assert_status_ok();

        let response = app.get("/grupos").await;
        response.assert_status_ok();
        let page: PaginatedResponse<GroupResponse> = response.json();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.data[0].id, open.id);
        assert_eq!(page.data[0].enrollment_count, 1);
        assert_eq!(page.data[0].remaining_capacity, 2);

        app.get(&format!("/grupos/{}", closed.id))
            .await
            .assert_status(StatusCode::NOT_FOUND);
        app.get(&format!("/grupos/{}", unlisted.id))
            .await
            .assert_status(StatusCode::NOT_FOUND);
        app.get(&format!("/grupos/{}", open.id)).await.assert_status_ok();

        let response = app.get("/grupos").add_header(&h[0].0, &h[0].1).await;
        let page: PaginatedResponse<GroupResponse> = response.json();
        assert_eq!(page.total_count, 3);

        let response = app
            .get(&format!("/grupos?course_id={}&state=closed", visible.id))
            .add_header(&h[0].0, &h[0].1)
            .await;
        let page: PaginatedResponse<GroupResponse> = response.json();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.data[0].id, closed.id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_replaces_days_and_delete(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let admin = create_test_admin(&pool).await;
        let h = add_auth_headers(&admin);
        let course = create_test_course(&pool, "Frenos", CourseVisibility::Visible).await;
        let group = create_test_group(&pool, course.id, 3).await;
        let day = Utc::now().date_naive() + Duration::days(30);

        let response = app
            .patch(&format!("/grupos/{}", group.id))
            .add_header(&h[0].0, &h[0].1)
            .json(&json!({ "max_capacity": 8, "days": [{ "day": day }] }))
            .await;
        response.assert_status_ok();
        let updated: GroupResponse = response.json();
        assert_eq!(updated.max_capacity, 8);
        assert_eq!(updated.days.len(), 1);
        assert_eq!(updated.days[0].day, day);
        assert_eq!(updated.name, group.name);

        app.delete(&format!("/grupos/{}", group.id))
            .add_header(&h[0].0, &h[0].1)
            .await
            .assert_status(StatusCode::NO_CONTENT);
        app.get(&format!("/grupos/{}", group.id))
            .add_header(&h[0].0, &h[0].1)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_dealer_manager_cannot_edit_groups(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool, "dealers@example.com", vec![Role::DealerManager]).await;
        let h = add_auth_headers(&user);
        let course = create_test_course(&pool, "Frenos", CourseVisibility::Visible).await;
        let group = create_test_group(&pool, course.id, 3).await;

        app.delete(&format!("/grupos/{}", group.id))
            .add_header(&h[0].0, &h[0].1)
            .await
            .assert_status_forbidden();
    }
}
