use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
};

use crate::{
    AppState,
    api::models::{
        ValidateRequest,
        enrollments::{
            EnrollmentCreate, EnrollmentFilterQuery, EnrollmentReceipt, EnrollmentResponse, EnrollmentUpdate,
            ListEnrollmentsQuery,
        },
        pagination::PaginatedResponse,
    },
    auth::permissions::{RequiresPermission, operation, resource},
    db::{
        handlers::{Enrollments, Repository, enrollments::EnrollmentListFilter},
        models::enrollments::{EnrollmentFilter, EnrollmentUpdateDBRequest},
    },
    enrollment,
    errors::{Error, Result},
    export::{ExportFormat, export_response},
    types::EnrollmentId,
};

/// List enrollments, newest first
#[utoipa::path(
    get,
    path = "/inscripciones",
    tag = "enrollments",
    summary = "List enrollments",
    params(ListEnrollmentsQuery),
    responses(
        (status = 200, description = "Page of enrollments", body = PaginatedResponse<EnrollmentResponse>),
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
pub async fn list_enrollments(
    State(state): State<AppState>,
    Query(query): Query<ListEnrollmentsQuery>,
    _: RequiresPermission<resource::Enrollments, operation::ReadAll>,
) -> Result<Json<PaginatedResponse<EnrollmentResponse>>> {
    let (skip, limit) = query.pagination.params();
    let criteria = EnrollmentFilter::from(query.filter);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Enrollments::new(&mut conn);

    let total_count = repo.count(&criteria).await?;
    let enrollments = repo.list(&EnrollmentListFilter::new(skip, limit, criteria)).await?;

    Ok(Json(PaginatedResponse::new(
        enrollments.into_iter().map(EnrollmentResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

/// Public enrollment form.
///
/// Reserves a seat if the group still has one, registering the mechanic first when `new_mechanic`
/// is set. A confirmation email is sent in the background once the enrollment is committed.
#[utoipa::path(
    post,
    path = "/inscripciones",
    tag = "enrollments",
    summary = "Enroll in a group",
    request_body = EnrollmentCreate,
    responses(
        (status = 201, description = "Enrollment created", body = EnrollmentReceipt),
        (status = 404, description = "Group, dealer or mechanic not found"),
        (status = 409, description = "Group full or not accepting enrollments, or email already enrolled"),
        (status = 422, description = "Validation failed"),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_enrollment(
    State(state): State<AppState>,
    Json(request): Json<EnrollmentCreate>,
) -> Result<(StatusCode, Json<EnrollmentReceipt>)> {
    let receipt = enrollment::submit(&state, request).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

#[utoipa::path(
    get,
    path = "/inscripciones/{id}",
    tag = "enrollments",
    summary = "Get enrollment",
    params(("id" = uuid::Uuid, Path, description = "Enrollment ID")),
    responses(
        (status = 200, description = "Enrollment", body = EnrollmentResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Enrollment not found"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_enrollment(
    State(state): State<AppState>,
    Path(id): Path<EnrollmentId>,
    _: RequiresPermission<resource::Enrollments, operation::ReadAll>,
) -> Result<Json<EnrollmentResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let enrollment = Enrollments::new(&mut conn)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::not_found("Enrollment", id))?;

    Ok(Json(enrollment.into()))
}

/// Mark attendance or edit contact details; an empty string clears `phone` or `notes`
#[utoipa::path(
    patch,
    path = "/inscripciones/{id}",
    tag = "enrollments",
    summary = "Update enrollment",
    request_body = EnrollmentUpdate,
    params(("id" = uuid::Uuid, Path, description = "Enrollment ID")),
    responses(
        (status = 200, description = "Enrollment updated", body = EnrollmentResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Enrollment not found"),
        (status = 422, description = "Validation failed"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_enrollment(
    State(state): State<AppState>,
    Path(id): Path<EnrollmentId>,
    _: RequiresPermission<resource::Enrollments, operation::UpdateAll>,
    Json(update): Json<EnrollmentUpdate>,
) -> Result<Json<EnrollmentResponse>> {
    update.validate_request()?;

    let request = EnrollmentUpdateDBRequest {
        attendance: update.attendance,
        phone: update.phone.map(|p| p.trim().to_string()),
        notes: update.notes.map(|n| n.trim().to_string()),
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let enrollment = Enrollments::new(&mut conn).update(id, &request).await?;

    Ok(Json(enrollment.into()))
}

#[utoipa::path(
    delete,
    path = "/inscripciones/{id}",
    tag = "enrollments",
    summary = "Delete enrollment",
    params(("id" = uuid::Uuid, Path, description = "Enrollment ID")),
    responses(
        (status = 204, description = "Enrollment deleted, freeing its seat"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Enrollment not found"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_enrollment(
    State(state): State<AppState>,
    Path(id): Path<EnrollmentId>,
    _: RequiresPermission<resource::Enrollments, operation::DeleteAll>,
) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    if Enrollments::new(&mut conn).delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found("Enrollment", id))
    }
}

async fn export(state: &AppState, query: EnrollmentFilterQuery, format: ExportFormat) -> Result<Response> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let criteria = EnrollmentFilter::from(query);
    let rows = Enrollments::new(&mut conn).export_rows(&criteria).await?;

    tracing::debug!(rows = rows.len(), format = format.extension(), "Exporting enrollments");
    export_response(format, &rows)
}

#[utoipa::path(
    get,
    path = "/inscripciones/export/csv",
    tag = "reports",
    summary = "Export enrollments (CSV)",
    params(EnrollmentFilterQuery),
    responses(
        (status = 200, description = "CSV attachment, or a plain-text notice when nothing matches", content_type = "text/csv"),
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
pub async fn export_enrollments_csv(
    State(state): State<AppState>,
    Query(query): Query<EnrollmentFilterQuery>,
    _: RequiresPermission<resource::Reports, operation::ReadAll>,
) -> Result<Response> {
    export(&state, query, ExportFormat::Csv).await
}

#[utoipa::path(
    get,
    path = "/inscripciones/export/xlsx",
    tag = "reports",
    summary = "Export enrollments (Excel)",
    params(EnrollmentFilterQuery),
    responses(
        (status = 200, description = "XLSX attachment, or a plain-text notice when nothing matches",
         content_type = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
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
pub async fn export_enrollments_xlsx(
    State(state): State<AppState>,
    Query(query): Query<EnrollmentFilterQuery>,
    _: RequiresPermission<resource::Reports, operation::ReadAll>,
) -> Result<Response> {
    export(&state, query, ExportFormat::Xlsx).await
}

#[cfg(test)]
mod tests {
    use crate::{
        api::models::{
            courses::CourseVisibility,
            enrollments::{AttendanceStatus, EnrollmentReceipt, EnrollmentResponse},
            pagination::PaginatedResponse,
            users::Role,
        },
        export::EMPTY_EXPORT_MESSAGE,
        test_utils::*,
    };
    use axum::http::{StatusCode, header};
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_public_enrollment_until_full(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let course = create_test_course(&pool, "Maintenance 101", CourseVisibility::Visible).await;
        let group = create_test_group(&pool, course.id, 2).await;
        let dealer = create_test_dealer(&pool, "Autos del Sur").await;

        let enroll = |email: &str| {
            json!({
                "group_id": group.id,
                "dealer_id": dealer.id,
                "participant_name": "Participante",
                "participant_email": email,
            })
        };

        let response = app.post("/inscripciones").json(&enroll("ana@x.com")).await;
        response.assert_status(StatusCode::CREATED);
        let receipt: EnrollmentReceipt = response.json();
        assert_eq!(receipt.course_name, "Maintenance 101");
        assert_eq!(receipt.dealer_name, "Autos del Sur");
        assert_eq!(receipt.remaining_capacity, 1);

        let response = app.post("/inscripciones").json(&enroll("bob@x.com")).await;
        response.assert_status(StatusCode::CREATED);
        let receipt: EnrollmentReceipt = response.json();
        assert_eq!(receipt.remaining_capacity, 0);

        let response = app.post("/inscripciones").json(&enroll("carl@x.com")).await;
        response.assert_status(StatusCode::CONFLICT);
        let body: serde_json::Value = response.json();
        assert_eq!(body["code"], "capacity_exceeded");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_enrollment_conflict(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let course = create_test_course(&pool, "Frenos", CourseVisibility::Visible).await;
        let group = create_test_group(&pool, course.id, 5).await;
        let dealer = create_test_dealer(&pool, "Autos del Sur").await;
        insert_test_enrollment(&pool, group.id, dealer.id, "ana@example.com").await;

        let response = app
            .post("/inscripciones")
            .json(&json!({
                "group_id": group.id,
                "dealer_id": dealer.id,
                "participant_name": "Ana",
                "participant_email": "ANA@example.com",
            }))
            .await;
        response.assert_status(StatusCode::CONFLICT);
        let body: serde_json::Value = response.json();
        assert_eq!(body["code"], "duplicate_enrollment");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_enrollment_validation_errors(pool: PgPool) {
        let app = create_test_app(pool).await;

        let response = app
            .post("/inscripciones")
            .json(&json!({
                "group_id": uuid::Uuid::new_v4(),
                "dealer_id": uuid::Uuid::new_v4(),
                "participant_email": "not-an-email",
                "new_mechanic": true,
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
        assert_eq!(fields, vec!["mechanic_first_name", "mechanic_last_name", "participant_email"]);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_and_filter_enrollments(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let viewer = create_test_user(&pool, "dealers@example.com", vec![Role::DealerManager]).await;
        let h = add_auth_headers(&viewer);
        let course = create_test_course(&pool, "Frenos", CourseVisibility::Visible).await;
        let group = create_test_group(&pool, course.id, 10).await;
        let north = create_test_dealer(&pool, "Norte").await;
        let south = create_test_dealer(&pool, "Sur").await;
        insert_test_enrollment(&pool, group.id, north.id, "a@example.com").await;
        insert_test_enrollment(&pool, group.id, north.id, "b@example.com").await;
        insert_test_enrollment(&pool, group.id, south.id, "c@example.com").await;

        app.get("/inscripciones").await.assert_status(StatusCode::UNAUTHORIZED);

        let response = app.get("/inscripciones").add_header(&h[0].0, &h[0].1).await;
        response.assert_status_ok();
        let page: PaginatedResponse<EnrollmentResponse> = response.json();
        assert_eq!(page.total_count, 3);

        let response = app
            .get(&format!("/inscripciones?dealer_id={}&limit=1", north.id))
            .add_header(&h[0].0, &h[0].1)
            .await;
        let page: PaginatedResponse<EnrollmentResponse> = response.json();
        assert_eq!(page.total_count, 2);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].dealer_id, north.id);

        // Dealer managers may read but not edit
        app.patch(&format!("/inscripciones/{}", page.data[0].id))
            .add_header(&h[0].0, &h[0].1)
            .json(&json!({ "attendance": "present" }))
            .await
            .assert_status_forbidden();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_mark_attendance_and_delete(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let manager = create_test_user(&pool, "manager@example.com", vec![Role::CourseManager]).await;
        let h = add_auth_headers(&manager);
        let course = create_test_course(&pool, "Frenos", CourseVisibility::Visible).await;
        let group = create_test_group(&pool, course.id, 10).await;
        let dealer = create_test_dealer(&pool, "Sur").await;
        let enrollment = insert_test_enrollment(&pool, group.id, dealer.id, "a@example.com").await;

        let response = app
            .patch(&format!("/inscripciones/{}", enrollment.id))
            .add_header(&h[0].0, &h[0].1)
            .json(&json!({ "attendance": "present", "notes": "Llegó temprano" }))
            .await;
        response.assert_status_ok();
        let updated: EnrollmentResponse = response.json();
        assert_eq!(updated.attendance, AttendanceStatus::Present);
        assert_eq!(updated.notes.as_deref(), Some("Llegó temprano"));

        let response = app
            .get(&format!("/inscripciones?attendance=present&group_id={}", group.id))
            .add_header(&h[0].0, &h[0].1)
            .await;
        let page: PaginatedResponse<EnrollmentResponse> = response.json();
        assert_eq!(page.total_count, 1);

        app.delete(&format!("/inscripciones/{}", enrollment.id))
            .add_header(&h[0].0, &h[0].1)
            .await
            .assert_status(StatusCode::NO_CONTENT);
        app.get(&format!("/inscripciones/{}", enrollment.id))
            .add_header(&h[0].0, &h[0].1)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_exports(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let viewer = create_test_user(&pool, "viewer@example.com", vec![Role::ReportViewer]).await;
        let dealer_manager = create_test_user(&pool, "dealers@example.com", vec![Role::DealerManager]).await;
        let h = add_auth_headers(&viewer);
        let course = create_test_course(&pool, "Frenos", CourseVisibility::Visible).await;
        let group = create_test_group(&pool, course.id, 10).await;
        let north = create_test_dealer(&pool, "Norte").await;
        let south = create_test_dealer(&pool, "Sur").await;

        let empty = app.get("/inscripciones/export/xlsx").add_header(&h[0].0, &h[0].1).await;
        empty.assert_status_ok();
        empty.assert_text(EMPTY_EXPORT_MESSAGE);

        insert_test_enrollment(&pool, group.id, north.id, "a@example.com").await;
        insert_test_enrollment(&pool, group.id, south.id, "b@example.com").await;

        let csv = app
            .get(&format!("/inscripciones/export/csv?dealer_id={}", south.id))
            .add_header(&h[0].0, &h[0].1)
            .await;
        csv.assert_status_ok();
        let text = csv.text();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("b@example.com"));

        let xlsx = app.get("/inscripciones/export/xlsx").add_header(&h[0].0, &h[0].1).await;
        xlsx.assert_status_ok();
        let disposition = xlsx.header(header::CONTENT_DISPOSITION);
        assert!(disposition.to_str().unwrap().ends_with(".xlsx\""));
        assert!(xlsx.as_bytes().starts_with(b"PK"));

        // Exports are a reporting permission
        let d = add_auth_headers(&dealer_manager);
        app.get("/inscripciones/export/csv")
            .add_header(&d[0].0, &d[0].1)
            .await
            .assert_status_forbidden();
    }
}
