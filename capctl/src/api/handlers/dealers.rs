use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::{
        ValidateRequest, clean_optional,
        dealers::{DealerCreate, DealerResponse, DealerUpdate, ListDealersQuery},
        pagination::PaginatedResponse,
    },
    auth::permissions::{RequiresPermission, operation, resource},
    db::{
        errors::DbError,
        handlers::{Dealers, Repository, dealers::DealerFilter},
        models::dealers::{DealerCreateDBRequest, DealerUpdateDBRequest},
    },
    errors::{ConflictKind, Error, Result},
    types::DealerId,
};

/// List dealers alphabetically. Public, as the enrollment form needs it.
#[utoipa::path(
    get,
    path = "/concesionarios",
    tag = "dealers",
    summary = "List dealers",
    params(ListDealersQuery),
    responses(
        (status = 200, description = "Page of dealers", body = PaginatedResponse<DealerResponse>),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_dealers(
    State(state): State<AppState>,
    Query(query): Query<ListDealersQuery>,
) -> Result<Json<PaginatedResponse<DealerResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = DealerFilter::new(skip, limit).with_search(clean_optional(query.search));

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Dealers::new(&mut conn);

    let dealers = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        dealers.into_iter().map(DealerResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    get,
    path = "/concesionarios/{id}",
    tag = "dealers",
    summary = "Get dealer",
    params(("id" = uuid::Uuid, Path, description = "Dealer ID")),
    responses(
        (status = 200, description = "Dealer", body = DealerResponse),
        (status = 404, description = "Dealer not found"),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_dealer(State(state): State<AppState>, Path(id): Path<DealerId>) -> Result<Json<DealerResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let dealer = Dealers::new(&mut conn)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::not_found("Dealer", id))?;

    Ok(Json(dealer.into()))
}

#[utoipa::path(
    post,
    path = "/concesionarios",
    tag = "dealers",
    summary = "Create dealer",
    request_body = DealerCreate,
    responses(
        (status = 201, description = "Dealer created", body = DealerResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "A dealer with this name already exists"),
        (status = 422, description = "Validation failed"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_dealer(
    State(state): State<AppState>,
    _: RequiresPermission<resource::Dealers, operation::CreateAll>,
    Json(create): Json<DealerCreate>,
) -> Result<(StatusCode, Json<DealerResponse>)> {
    create.validate_request()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let dealer = Dealers::new(&mut conn)
        .create(&DealerCreateDBRequest {
            name: create.name.trim().to_string(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(dealer.into())))
}

#[utoipa::path(
    patch,
    path = "/concesionarios/{id}",
    tag = "dealers",
    summary = "Update dealer",
    request_body = DealerUpdate,
    params(("id" = uuid::Uuid, Path, description = "Dealer ID")),
    responses(
        (status = 200, description = "Dealer updated", body = DealerResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Dealer not found"),
        (status = 409, description = "A dealer with this name already exists"),
        (status = 422, description = "Validation failed"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_dealer(
    State(state): State<AppState>,
    Path(id): Path<DealerId>,
    _: RequiresPermission<resource::Dealers, operation::UpdateAll>,
    Json(update): Json<DealerUpdate>,
) -> Result<Json<DealerResponse>> {
    update.validate_request()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let dealer = Dealers::new(&mut conn)
        .update(
            id,
            &DealerUpdateDBRequest {
                name: update.name.map(|n| n.trim().to_string()),
            },
        )
        .await?;

    Ok(Json(dealer.into()))
}

/// Delete a dealer that no mechanic or enrollment refers to
#[utoipa::path(
    delete,
    path = "/concesionarios/{id}",
    tag = "dealers",
    summary = "Delete dealer",
    params(("id" = uuid::Uuid, Path, description = "Dealer ID")),
    responses(
        (status = 204, description = "Dealer deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Dealer not found"),
        (status = 409, description = "Dealer still has mechanics or enrollments"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_dealer(
    State(state): State<AppState>,
    Path(id): Path<DealerId>,
    _: RequiresPermission<resource::Dealers, operation::DeleteAll>,
) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    match Dealers::new(&mut conn).delete(id).await {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(Error::not_found("Dealer", id)),
        Err(DbError::ForeignKeyViolation { .. }) => Err(Error::Conflict {
            kind: ConflictKind::InUse,
            message: "This dealer still has mechanics or enrollments".to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}
