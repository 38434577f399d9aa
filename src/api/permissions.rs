use std::collections::HashMap;

use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{MySql, MySqlPool};
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::{
    admin::{options::STR_COLUMN, site::{ACCOUNT_APP, AdminSite}},
    api::{Choice, change_message, logs, not_registered},
    auth::auth::AuthUser,
    config::Config,
    error::{AppError, AppResult},
    model::{
        admin_log::{ActionFlag, NewAdminLog},
        permission::{PermissionDetail, validate_permission},
    },
    utils::db_utils::{Column, ListQuery, build_list_sql, fetch_page},
};

const MODEL: &str = "mypermission";

pub const PERMISSION_SELECT: &str = r#"
    p.id, p.name, p.codename, p.content_type_id,
    ct.app_label, ct.model, ct.name AS content_type_name
"#;

const PERMISSION_FROM: &str = r#"
    FROM permissions p
    JOIN content_types ct ON ct.id = p.content_type_id
"#;

#[derive(Deserialize, ToSchema)]
pub struct PermissionForm {
    #[schema(example = "Can export user")]
    pub name: String,
    #[schema(example = 1)]
    pub content_type_id: u64,
    #[schema(example = "export_myuser")]
    pub codename: String,
}

#[derive(Serialize, ToSchema)]
pub struct PermissionView {
    #[serde(flatten)]
    pub permission: PermissionDetail,
    /// Formatted label, e.g. "Can add 职务"
    pub show_name: String,
    /// `app_label.codename`
    pub perm: String,
}

impl From<PermissionDetail> for PermissionView {
    fn from(permission: PermissionDetail) -> Self {
        Self {
            show_name: permission.label(),
            perm: permission.perm_string(),
            permission,
        }
    }
}

fn resolve_permission_column(field: &str) -> Option<Column> {
    match field {
        "id" => Column::expr("p.id"),
        "name" => Column::expr("p.name"),
        "codename" => Column::expr("p.codename"),
        "content_type" => Column::expr("p.content_type_id"),
        _ => None,
    }
}

/// Permissions reached by `join_where`, labelled for a choice widget.
///
/// `join_where` is a static JOIN/WHERE fragment with at most one `?`,
/// bound to `owner_id`.
pub async fn permission_choices(
    pool: &MySqlPool,
    join_where: &str,
    owner_id: u64,
) -> AppResult<Vec<Choice>> {
    let sql = format!(
        "SELECT {PERMISSION_SELECT} {PERMISSION_FROM} {join_where} ORDER BY ct.app_label, ct.model, p.codename"
    );
    let rows = sqlx::query_as::<_, PermissionDetail>(&sql)
        .bind(owner_id)
        .fetch_all(pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|p| Choice {
            id: p.id,
            label: p.label(),
        })
        .collect())
}

async fn fetch_permission<'e, E>(executor: E, id: u64) -> AppResult<PermissionDetail>
where
    E: sqlx::Executor<'e, Database = MySql>,
{
    sqlx::query_as::<_, PermissionDetail>(&format!(
        "SELECT {PERMISSION_SELECT} {PERMISSION_FROM} WHERE p.id = ?"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| AppError::NotFound("Permission".into()))
}

/// Log entry for a permission, named by its full display form.
fn log_entry(
    auth: &AuthUser,
    permission: &PermissionDetail,
    action_flag: ActionFlag,
    message: String,
) -> NewAdminLog {
    NewAdminLog {
        user_id: auth.user_id,
        ip_addr: auth.ip_addr.clone(),
        app_label: ACCOUNT_APP,
        model: MODEL.to_string(),
        object_id: Some(permission.id.to_string()),
        object_repr: permission.to_string(),
        action_flag,
        message,
    }
}

const CONFLICT: &str = "Permission with this Content type and Codename already exists.";

/// List permissions
#[utoipa::path(
    get,
    path = "/api/permissions",
    params(
        ("content_type", Query, description = "Filter by content type id"),
        ("q", Query, description = "Search name or codename"),
        ("p", Query, description = "Page number")
    ),
    responses((status = 200, description = "Paginated permissions", body = Object)),
    tag = "Permission",
    security(("bearer_auth" = []))
)]
#[instrument(name = "list_permissions", skip_all, fields(user_id = auth.user_id))]
pub async fn list_permissions(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    site: web::Data<AdminSite>,
    config: web::Data<Config>,
    params: web::Query<HashMap<String, String>>,
) -> AppResult<HttpResponse> {
    let admin = site.get(MODEL).ok_or_else(|| not_registered(MODEL))?;
    auth.require(pool.get_ref(), &admin.perm("view")).await?;

    let query = ListQuery::from_params(&params)?;
    let list = build_list_sql(admin, &query, config.list_per_page, resolve_permission_column)?;
    let page =
        fetch_page::<PermissionDetail>(pool.get_ref(), PERMISSION_SELECT, PERMISSION_FROM, &list)
            .await?;

    let page = page.map(|p| {
        let columns: serde_json::Map<_, _> = admin
            .list_display
            .iter()
            .map(|column| {
                let value = match column.as_str() {
                    "show_name" => json!(p.label()),
                    STR_COLUMN => json!(p.to_string()),
                    "name" => json!(p.name),
                    "codename" => json!(p.codename),
                    _ => serde_json::Value::Null,
                };
                (column.clone(), value)
            })
            .collect();
        json!({ "id": p.id, "columns": columns })
    });
    Ok(HttpResponse::Ok().json(page))
}

/// Get a permission
#[utoipa::path(
    get,
    path = "/api/permissions/{id}",
    params(("id", Path, description = "Permission id")),
    responses(
        (status = 200, description = "Permission", body = PermissionView),
        (status = 404, description = "Not found")
    ),
    tag = "Permission",
    security(("bearer_auth" = []))
)]
pub async fn get_permission(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    site: web::Data<AdminSite>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let admin = site.get(MODEL).ok_or_else(|| not_registered(MODEL))?;
    auth.require(pool.get_ref(), &admin.perm("view")).await?;

    let permission = fetch_permission(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(PermissionView::from(permission)))
}

/// Create a permission
#[utoipa::path(
    post,
    path = "/api/permissions",
    request_body = PermissionForm,
    responses(
        (status = 201, description = "Created", body = PermissionView),
        (status = 409, description = "Codename already used for this content type")
    ),
    tag = "Permission",
    security(("bearer_auth" = []))
)]
#[instrument(name = "create_permission", skip_all, fields(codename = %payload.codename))]
pub async fn create_permission(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    site: web::Data<AdminSite>,
    payload: web::Json<PermissionForm>,
) -> AppResult<HttpResponse> {
    let admin = site.get(MODEL).ok_or_else(|| not_registered(MODEL))?;
    auth.require(pool.get_ref(), &admin.perm("add")).await?;
    let (name, codename) = validate_permission(&payload.name, &payload.codename)?;

    let mut tx = pool.begin().await?;
    let id = sqlx::query("INSERT INTO permissions (name, content_type_id, codename) VALUES (?, ?, ?)")
        .bind(&name)
        .bind(payload.content_type_id)
        .bind(&codename)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::from_write(e, CONFLICT))?
        .last_insert_id();

    let permission = fetch_permission(&mut *tx, id).await?;
    logs::record(&mut tx, log_entry(&auth, &permission, ActionFlag::Create, String::new())).await?;
    tx.commit().await?;

    info!(id, "Permission created");
    Ok(HttpResponse::Created().json(PermissionView::from(permission)))
}

/// Update a permission
#[utoipa::path(
    put,
    path = "/api/permissions/{id}",
    params(("id", Path, description = "Permission id")),
    request_body = PermissionForm,
    responses(
        (status = 200, description = "Updated", body = PermissionView),
        (status = 404, description = "Not found"),
        (status = 409, description = "Codename already used for this content type")
    ),
    tag = "Permission",
    security(("bearer_auth" = []))
)]
pub async fn update_permission(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    site: web::Data<AdminSite>,
    path: web::Path<u64>,
    payload: web::Json<PermissionForm>,
) -> AppResult<HttpResponse> {
    let admin = site.get(MODEL).ok_or_else(|| not_registered(MODEL))?;
    auth.require(pool.get_ref(), &admin.perm("change")).await?;
    let id = path.into_inner();
    let (name, codename) = validate_permission(&payload.name, &payload.codename)?;
    let before = fetch_permission(pool.get_ref(), id).await?;

    let mut changed = Vec::new();
    if before.name != name {
        changed.push("name");
    }
    if before.content_type_id != payload.content_type_id {
        changed.push("content_type");
    }
    if before.codename != codename {
        changed.push("codename");
    }

    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE permissions SET name = ?, content_type_id = ?, codename = ? WHERE id = ?")
        .bind(&name)
        .bind(payload.content_type_id)
        .bind(&codename)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::from_write(e, CONFLICT))?;

    let permission = fetch_permission(&mut *tx, id).await?;
    logs::record(
        &mut tx,
        log_entry(&auth, &permission, ActionFlag::Change, change_message(&changed)),
    )
    .await?;
    tx.commit().await?;

    Ok(HttpResponse::Ok().json(PermissionView::from(permission)))
}

/// Delete a permission (also removes it from users and departments)
#[utoipa::path(
    delete,
    path = "/api/permissions/{id}",
    params(("id", Path, description = "Permission id")),
    responses((status = 200, description = "Deleted"), (status = 404, description = "Not found")),
    tag = "Permission",
    security(("bearer_auth" = []))
)]
pub async fn delete_permission(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    site: web::Data<AdminSite>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let admin = site.get(MODEL).ok_or_else(|| not_registered(MODEL))?;
    auth.require(pool.get_ref(), &admin.perm("delete")).await?;
    let id = path.into_inner();
    let before = fetch_permission(pool.get_ref(), id).await?;

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM permissions WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    logs::record(&mut tx, log_entry(&auth, &before, ActionFlag::Delete, String::new())).await?;
    tx.commit().await?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully deleted" })))
}
