use actix_web::{HttpResponse, web};
use sqlx::MySqlPool;

use crate::{auth::auth::AuthUser, error::AppResult, model::content_type::ContentType};

/// Content types, for the permission form
#[utoipa::path(
    get,
    path = "/api/content-types",
    responses(
        (status = 200, description = "All content types", body = [ContentType]),
        (status = 403, description = "Not staff")
    ),
    tag = "Permission",
    security(("bearer_auth" = []))
)]
pub async fn list_content_types(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> AppResult<HttpResponse> {
    auth.require_staff(pool.get_ref()).await?;

    let content_types = sqlx::query_as::<_, ContentType>(
        "SELECT id, app_label, model, name FROM content_types ORDER BY app_label, model",
    )
    .fetch_all(pool.get_ref())
    .await?;
    Ok(HttpResponse::Ok().json(content_types))
}
