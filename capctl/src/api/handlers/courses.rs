use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
};

use super::sees_unpublished;
use crate::{
    AppState,
    api::models::{
        ValidateRequest,
        courses::{CourseCreate, CourseDetailResponse, CourseResponse, CourseUpdate, CourseVisibility, ListCoursesQuery},
        groups::GroupResponse,
        pagination::{MAX_LIMIT, PaginatedResponse},
        users::CurrentUser,
    },
    auth::permissions::{RequiresPermission, operation, resource},
    db::{
        handlers::{Courses, Enrollments, Groups, Repository, courses::CourseFilter, groups::GroupFilter},
        models::{
            courses::{CourseCreateDBRequest, CourseUpdateDBRequest},
            enrollments::EnrollmentFilter,
        },
    },
    errors::{Error, Result},
    export::{ExportFormat, export_response},
    types::{CourseId, Resource},
};

/// List courses with their group and enrollment counts
#[utoipa::path(
    get,
    path = "/capacitaciones",
    tag = "courses",
    summary = "List courses",
    params(ListCoursesQuery),
    responses(
        (status = 200, description = "Page of courses; anonymous callers only see visible ones", body = PaginatedResponse<CourseResponse>),
        (status = 500, description = "Internal server error")
    ),
    security(
        (),
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_courses(
    State(state): State<AppState>,
    Query(query): Query<ListCoursesQuery>,
    current_user: Option<CurrentUser>,
) -> Result<Json<PaginatedResponse<CourseResponse>>> {
    let admin = sees_unpublished(current_user.as_ref(), Resource::Courses);
    let (skip, limit) = query.pagination.params();

    let mut filter = CourseFilter::new(skip, limit);
    if let Some(search) = query.search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
        filter = filter.with_search(search);
    }
    if !admin {
        filter = filter.with_visibility(CourseVisibility::Visible);
    } else if let Some(visibility) = query.visibility {
        filter = filter.with_visibility(visibility);
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Courses::new(&mut conn);

    let courses = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;
    let ids: Vec<CourseId> = courses.iter().map(|c| c.id).collect();
    let stats = repo.stats(&ids).await?;

    let data = courses
        .into_iter()
        .map(|course| {
            let counts = stats.get(&course.id).copied().unwrap_or_default();
            let response = CourseResponse::from(course).with_counts(counts.group_count, counts.enrollment_count);
            if admin { response } else { response.mask_created_by() }
        })
        .collect();

    Ok(Json(PaginatedResponse::new(data, total_count, skip, limit)))
}

/// One course with its groups, as shown on the course page
#[utoipa::path(
    get,
    path = "/capacitaciones/{id}",
    tag = "courses",
    summary = "Get course",
    params(("id" = uuid::Uuid, Path, description = "Course ID")),
    responses(
        (status = 200, description = "Course with its groups", body = CourseDetailResponse),
        (status = 404, description = "Course not found, or not published"),
        (status = 500, description = "Internal server error")
    ),
    security(
        (),
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_course(
    State(state): State<AppState>,
    Path(id): Path<CourseId>,
    current_user: Option<CurrentUser>,
) -> Result<Json<CourseDetailResponse>> {
    let admin = sees_unpublished(current_user.as_ref(), Resource::Courses);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let course = Courses::new(&mut conn)
        .get_by_id(id)
        .await?
        .filter(|course| admin || course.visibility == CourseVisibility::Visible)
        .ok_or_else(|| Error::not_found("Course", id))?;
    let stats = Courses::new(&mut conn).stats(&[id]).await?.remove(&id).unwrap_or_default();

    let mut group_filter = GroupFilter::new(0, MAX_LIMIT).for_course(id);
    if !sees_unpublished(current_user.as_ref(), Resource::Groups) {
        group_filter = group_filter.public_catalog();
    }
    let mut groups_repo = Groups::new(&mut conn);
    let groups = groups_repo.list(&group_filter).await?;
    let group_ids: Vec<_> = groups.iter().map(|g| g.id).collect();
    let counts = groups_repo.enrollment_counts(&group_ids).await?;

    let groups = groups
        .into_iter()
        .map(|group| {
            let count = counts.get(&group.id).copied().unwrap_or(0);
            GroupResponse::new(group, count)
        })
        .collect();

    let course = CourseResponse::from(course).with_counts(stats.group_count, stats.enrollment_count);
    let course = if admin { course } else { course.mask_created_by() };

    Ok(Json(CourseDetailResponse { course, groups }))
}

#[utoipa::path(
    post,
    path = "/capacitaciones",
    tag = "courses",
    summary = "Create course",
    request_body = CourseCreate,
    responses(
        (status = 201, description = "Course created", body = CourseResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 422, description = "Validation failed"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_course(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Courses, operation::CreateAll>,
    Json(create): Json<CourseCreate>,
) -> Result<(StatusCode, Json<CourseResponse>)> {
    create.validate_request()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let course = Courses::new(&mut conn)
        .create(&CourseCreateDBRequest::new(current_user.id, create))
        .await?;

    Ok((StatusCode::CREATED, Json(CourseResponse::from(course))))
}

#[utoipa::path(
    patch,
    path = "/capacitaciones/{id}",
    tag = "courses",
    summary = "Update course",
    request_body = CourseUpdate,
    params(("id" = uuid::Uuid, Path, description = "Course ID")),
    responses(
        (status = 200, description = "Course updated", body = CourseResponse),
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
pub async fn update_course(
    State(state): State<AppState>,
    Path(id): Path<CourseId>,
    _: RequiresPermission<resource::Courses, operation::UpdateAll>,
    Json(update): Json<CourseUpdate>,
) -> Result<Json<CourseResponse>> {
    update.validate_request()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Courses::new(&mut conn);
    let course = repo.update(id, &CourseUpdateDBRequest::from(update)).await?;
    let stats = repo.stats(&[id]).await?.remove(&id).unwrap_or_default();

    Ok(Json(
        CourseResponse::from(course).with_counts(stats.group_count, stats.enrollment_count),
    ))
}

/// Delete a course together with its groups and their enrollments
#[utoipa::path(
    delete,
    path = "/capacitaciones/{id}",
    tag = "courses",
    summary = "Delete course",
    params(("id" = uuid::Uuid, Path, description = "Course ID")),
    responses(
        (status = 204, description = "Course deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Course not found"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_course(
    State(state): State<AppState>,
    Path(id): Path<CourseId>,
    _: RequiresPermission<resource::Courses, operation::DeleteAll>,
) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    if Courses::new(&mut conn).delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found("Course", id))
    }
}

/// Enrollments of one course as CSV
#[utoipa::path(
    get,
    path = "/capacitaciones/{id}/export/csv",
    tag = "reports",
    summary = "Export course enrollments (CSV)",
    params(("id" = uuid::Uuid, Path, description = "Course ID")),
    responses(
        (status = 200, description = "CSV attachment, or a plain-text notice when there is nothing to export", content_type = "text/csv"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Course not found"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn export_course_csv(
    State(state): State<AppState>,
    Path(id): Path<CourseId>,
    _: RequiresPermission<resource::Reports, operation::ReadAll>,
) -> Result<Response> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    if Courses::new(&mut conn).get_by_id(id).await?.is_none() {
        return Err(Error::not_found("Course", id));
    }
    let rows = Enrollments::new(&mut conn).export_rows(&EnrollmentFilter::for_course(id)).await?;

    export_response(ExportFormat::Csv, &rows)
}

#[cfg(test)]
mod tests {
    use crate::{
        api::models::{
            courses::{CourseDetailResponse, CourseResponse, CourseVisibility},
            pagination::PaginatedResponse,
            users::Role,
        },
        db::handlers::{Groups, Repository},
        db::models::groups::GroupUpdateDBRequest,
        api::models::groups::GroupState,
        export::EMPTY_EXPORT_MESSAGE,
        test_utils::*,
    };
    use axum::http::{StatusCode, header};
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_public_catalog_only_lists_visible_courses(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let admin = create_test_admin(&pool).await;
        let visible = create_test_course(&pool, "Frenos ABS", CourseVisibility::Visible).await;
        create_test_course(&pool, "Borrador", CourseVisibility::Draft).await;
        create_test_course(&pool, "Oculto", CourseVisibility::Hidden).await;
        let group = create_test_group(&pool, visible.id, 10).await;
        let dealer = create_test_dealer(&pool, "Motores del Sur").await;
        insert_test_enrollment(&pool, group.id, dealer.id, "ana@example.com").await;

        let response = app.get("/capacitaciones").await;
        response.assert_status_ok();
        let page: PaginatedResponse<CourseResponse> = response.json();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.data[0].name, "Frenos ABS");
        assert_eq!(page.data[0].group_count, 1);
        assert_eq!(page.data[0].enrollment_count, 1);

        // Visibility filters are ignored for anonymous callers
        let response = app.get("/capacitaciones?visibility=draft").await;
        let page: PaginatedResponse<CourseResponse> = response.json();
        assert_eq!(page.total_count, 1);

        let h = add_auth_headers(&admin);
        let response = app.get("/capacitaciones").add_header(&h[0].0, &h[0].1).await;
        let page: PaginatedResponse<CourseResponse> = response.json();
        assert_eq!(page.total_count, 3);

        let response = app
            .get("/capacitaciones?visibility=draft")
            .add_header(&h[0].0, &h[0].1)
            .await;
        let page: PaginatedResponse<CourseResponse> = response.json();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.data[0].name, "Borrador");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_courses_pagination(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        for i in 0..5 {
            create_test_course(&pool, &format!("Curso {i}"), CourseVisibility::Visible).await;
        }

        let response = app.get("/capacitaciones?skip=1&limit=2").await;
        response.assert_status_ok();
        let page: PaginatedResponse<CourseResponse> = response.json();
        assert_eq!(page.total_count, 5);
        assert_eq!(page.skip, 1);
        assert_eq!(page.limit, 2);
        let names: Vec<_> = page.data.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Curso 1", "Curso 2"]);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_get_course_hides_unpublished_from_public(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let admin = create_test_admin(&pool).await;
        let draft = create_test_course(&pool, "Borrador", CourseVisibility::Draft).await;

        app.get(&format!("/capacitaciones/{}", draft.id))
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let h = add_auth_headers(&admin);
        app.get(&format!("/capacitaciones/{}", draft.id))
            .add_header(&h[0].0, &h[0].1)
            .await
            .assert_status_ok();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_course_detail_lists_open_groups(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let course = create_test_course(&pool, "Inyección", CourseVisibility::Visible).await;
        let open = create_test_group(&pool, course.id, 2).await;
        let closed = create_test_group(&pool, course.id, 5).await;
        let dealer = create_test_dealer(&pool, "Autos del Norte").await;
        insert_test_enrollment(&pool, open.id, dealer.id, "a@example.com").await;

        let mut conn = pool.acquire().await.unwrap();
        Groups::new(&mut conn)
            .update(
                closed.id,
                &GroupUpdateDBRequest {
                    state: Some(GroupState::Closed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let response = app.get(&format!("/capacitaciones/{}", course.id)).await;
        response.assert_status_ok();
        let detail: CourseDetailResponse = response.json();
        assert_eq!(detail.course.name, "Inyección");
        assert!(detail.course.created_by.is_none());
        assert_eq!(detail.groups.len(), 1);
        assert_eq!(detail.groups[0].id, open.id);
        assert_eq!(detail.groups[0].remaining_capacity, 1);
        assert_eq!(detail.groups[0].days.len(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_course_crud_requires_permissions(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let manager = create_test_user(&pool, "manager@example.com", vec![Role::CourseManager]).await;
        let viewer = create_test_user(&pool, "viewer@example.com", vec![Role::ReportViewer]).await;
        let body = json!({ "name": "  Electricidad  ", "visibility": "visible" });

        app.post("/capacitaciones").json(&body).await.assert_status(StatusCode::UNAUTHORIZED);

        let v = add_auth_headers(&viewer);
        app.post("/capacitaciones")
            .add_header(&v[0].0, &v[0].1)
            .json(&body)
            .await
            .assert_status_forbidden();

        let m = add_auth_headers(&manager);
        let response = app.post("/capacitaciones").add_header(&m[0].0, &m[0].1).json(&body).await;
        response.assert_status(StatusCode::CREATED);
        let created: CourseResponse = response.json();
        assert_eq!(created.name, "Electricidad");
        assert_eq!(created.created_by, Some(manager.id));

        let response = app
            .patch(&format!("/capacitaciones/{}", created.id))
            .add_header(&m[0].0, &m[0].1)
            .json(&json!({ "visibility": "hidden" }))
            .await;
        response.assert_status_ok();
        let updated: CourseResponse = response.json();
        assert_eq!(updated.visibility, CourseVisibility::Hidden);
        assert_eq!(updated.name, "Electricidad");

        app.delete(&format!("/capacitaciones/{}", created.id))
            .add_header(&m[0].0, &m[0].1)
            .await
            .assert_status(StatusCode::NO_CONTENT);
        app.delete(&format!("/capacitaciones/{}", created.id))
            .add_header(&m[0].0, &m[0].1)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_course_validation(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let admin = create_test_admin(&pool).await;
        let h = add_auth_headers(&admin);

        let response = app
            .post("/capacitaciones")
            .add_header(&h[0].0, &h[0].1)
            .json(&json!({ "name": "   " }))
            .await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        let body: serde_json::Value = response.json();
        assert_eq!(body["errors"][0]["field"], "name");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_course_csv_export(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let admin = create_test_admin(&pool).await;
        let h = add_auth_headers(&admin);
        let course = create_test_course(&pool, "Frenos", CourseVisibility::Visible).await;
        let other = create_test_course(&pool, "Motor", CourseVisibility::Visible).await;
        let group = create_test_group(&pool, course.id, 10).await;
        let other_group = create_test_group(&pool, other.id, 10).await;
        let dealer = create_test_dealer(&pool, "Motores del Sur").await;

        let url = format!("/capacitaciones/{}/export/csv", course.id);
        let empty = app.get(&url).add_header(&h[0].0, &h[0].1).await;
        empty.assert_status_ok();
        empty.assert_text(EMPTY_EXPORT_MESSAGE);

        insert_test_enrollment(&pool, group.id, dealer.id, "ana@example.com").await;
        insert_test_enrollment(&pool, other_group.id, dealer.id, "luis@example.com").await;

        let response = app.get(&url).add_header(&h[0].0, &h[0].1).await;
        response.assert_status_ok();
        assert_eq!(response.header(header::CONTENT_TYPE), "text/csv; charset=utf-8");
        let text = response.text();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("ana@example.com"));
        assert!(!text.contains("luis@example.com"));

        app.get(&url).await.assert_status(StatusCode::UNAUTHORIZED);
    }
}
