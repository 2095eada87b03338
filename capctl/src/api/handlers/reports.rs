use axum::{
    Json,
    extract::{Query, State},
};

use crate::{
    AppState,
    api::models::reports::{DashboardQuery, DashboardResponse},
    auth::permissions::{RequiresPermission, operation, resource},
    db::handlers::{Reports, reports::DashboardFilter},
    errors::{Error, Result},
};

/// Dashboard figures, recomputed on every request
#[utoipa::path(
    get,
    path = "/dashboard",
    tag = "reports",
    summary = "Dashboard",
    params(DashboardQuery),
    responses(
        (status = 200, description = "Totals, attendance and rankings, narrowed by the filters", body = DashboardResponse),
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
pub async fn get_dashboard(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
    _: RequiresPermission<resource::Reports, operation::ReadAll>,
) -> Result<Json<DashboardResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let dashboard = Reports::new(&mut conn).dashboard(&DashboardFilter::from(query)).await?;

    Ok(Json(dashboard))
}
