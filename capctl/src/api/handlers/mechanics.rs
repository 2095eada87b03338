use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sqlx::PgConnection;

use crate::{
    AppState,
    api::models::{
        ValidateRequest, clean_optional,
        mechanics::{ListMechanicsQuery, MechanicCreate, MechanicResponse, MechanicUpdate},
        pagination::PaginatedResponse,
    },
    auth::permissions::{RequiresPermission, operation, resource},
    db::{
        handlers::{Dealers, Mechanics, Repository, mechanics::MechanicFilter},
        models::mechanics::{MechanicCreateDBRequest, MechanicUpdateDBRequest},
    },
    errors::{Error, Result},
    types::{DealerId, MechanicId},
};

async fn ensure_dealer_exists(conn: &mut PgConnection, dealer_id: DealerId) -> Result<()> {
    match Dealers::new(conn).get_by_id(dealer_id).await? {
        Some(_) => Ok(()),
        None => Err(Error::not_found("Dealer", dealer_id)),
    }
}

#[utoipa::path(
    get,
    path = "/mecanicos",
    tag = "mechanics",
    summary = "List mechanics",
    params(ListMechanicsQuery),
    responses(
        (status = 200, description = "Page of mechanics, newest first", body = PaginatedResponse<MechanicResponse>),
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
pub async fn list_mechanics(
    State(state): State<AppState>,
    Query(query): Query<ListMechanicsQuery>,
    _: RequiresPermission<resource::Mechanics, operation::ReadAll>,
) -> Result<Json<PaginatedResponse<MechanicResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = MechanicFilter::new(skip, limit)
        .for_dealer(query.dealer_id)
        .with_search(clean_optional(query.search));

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Mechanics::new(&mut conn);

    let mechanics = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        mechanics.into_iter().map(MechanicResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    get,
    path = "/mecanicos/{id}",
    tag = "mechanics",
    summary = "Get mechanic",
    params(("id" = uuid::Uuid, Path, description = "Mechanic ID")),
    responses(
        (status = 200, description = "Mechanic", body = MechanicResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Mechanic not found"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_mechanic(
    State(state): State<AppState>,
    Path(id): Path<MechanicId>,
    _: RequiresPermission<resource::Mechanics, operation::ReadAll>,
) -> Result<Json<MechanicResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let mechanic = Mechanics::new(&mut conn)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::not_found("Mechanic", id))?;

    Ok(Json(mechanic.into()))
}

#[utoipa::path(
    post,
    path = "/mecanicos",
    tag = "mechanics",
    summary = "Create mechanic",
    request_body = MechanicCreate,
    responses(
        (status = 201, description = "Mechanic created", body = MechanicResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Dealer not found"),
        (status = 422, description = "Validation failed"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_mechanic(
    State(state): State<AppState>,
    _: RequiresPermission<resource::Mechanics, operation::CreateAll>,
    Json(create): Json<MechanicCreate>,
) -> Result<(StatusCode, Json<MechanicResponse>)> {
    create.validate_request()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    ensure_dealer_exists(&mut conn, create.dealer_id).await?;

    let mechanic = Mechanics::new(&mut conn).create(&MechanicCreateDBRequest::from(create)).await?;

    Ok((StatusCode::CREATED, Json(mechanic.into())))
}

/// Partial update; moving a mechanic to another dealer keeps their past enrollments unchanged
#[utoipa::path(
    patch,
    path = "/mecanicos/{id}",
    tag = "mechanics",
    summary = "Update mechanic",
    request_body = MechanicUpdate,
    params(("id" = uuid::Uuid, Path, description = "Mechanic ID")),
    responses(
        (status = 200, description = "Mechanic updated", body = MechanicResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Mechanic or dealer not found"),
        (status = 422, description = "Validation failed"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_mechanic(
    State(state): State<AppState>,
    Path(id): Path<MechanicId>,
    _: RequiresPermission<resource::Mechanics, operation::UpdateAll>,
    Json(update): Json<MechanicUpdate>,
) -> Result<Json<MechanicResponse>> {
    update.validate_request()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if let Some(dealer_id) = update.dealer_id {
        ensure_dealer_exists(&mut conn, dealer_id).await?;
    }

    let mechanic = Mechanics::new(&mut conn)
        .update(id, &MechanicUpdateDBRequest::from(update))
        .await?;

    Ok(Json(mechanic.into()))
}

#[utoipa::path(
    delete,
    path = "/mecanicos/{id}",
    tag = "mechanics",
    summary = "Delete mechanic",
    params(("id" = uuid::Uuid, Path, description = "Mechanic ID")),
    responses(
        (status = 204, description = "Mechanic deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Mechanic not found"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_mechanic(
    State(state): State<AppState>,
    Path(id): Path<MechanicId>,
    _: RequiresPermission<resource::Mechanics, operation::DeleteAll>,
) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    if Mechanics::new(&mut conn).delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found("Mechanic", id))
    }
}
