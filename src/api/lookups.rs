use std::collections::HashMap;
use std::str::FromStr;

use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::{
    admin::{
        options::{ModelAdmin, STR_COLUMN},
        site::{ACCOUNT_APP, AdminSite},
    },
    api::{logs, not_registered},
    auth::auth::AuthUser,
    config::Config,
    error::{AppError, AppResult},
    model::{
        admin_log::{ActionFlag, NewAdminLog},
        lookup::{Lookup, LookupKind, validate_lookup_name},
    },
    utils::db_utils::{Column, ListQuery, build_list_sql, fetch_page},
};

#[derive(Deserialize, ToSchema)]
pub struct LookupForm {
    #[schema(example = "合同工")]
    pub name: String,
}

fn parse_kind(raw: &str) -> AppResult<LookupKind> {
    LookupKind::from_str(raw).map_err(|_| AppError::NotFound(format!("Lookup {raw}")))
}

fn admin_for<'a>(site: &'a AdminSite, kind: LookupKind) -> AppResult<&'a ModelAdmin> {
    site.get(kind.as_ref())
        .ok_or_else(|| not_registered(kind.as_ref()))
}

fn resolve_lookup_column(field: &str) -> Option<Column> {
    match field {
        "id" => Column::expr("id"),
        "name" => Column::expr("name"),
        _ => None,
    }
}

fn conflict_message(kind: LookupKind) -> String {
    format!("{} with this 名称 already exists.", kind.verbose_name())
}

async fn fetch_lookup(pool: &MySqlPool, kind: LookupKind, id: u64) -> AppResult<Lookup> {
    sqlx::query_as::<_, Lookup>(&format!("SELECT id, name FROM {} WHERE id = ?", kind.table()))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(kind.verbose_name().to_string()))
}

/// List lookup entries
#[utoipa::path(
    get,
    path = "/api/lookups/{kind}",
    params(
        ("kind", Path, description = "worktype | wagetype | attendanceshift | position | departuretype"),
        ("q", Query, description = "Search by name"),
        ("p", Query, description = "Page number")
    ),
    responses((status = 200, description = "Paginated entries", body = Object)),
    tag = "Lookup",
    security(("bearer_auth" = []))
)]
#[instrument(name = "list_lookups", skip_all, fields(kind = %path))]
pub async fn list_lookups(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    site: web::Data<AdminSite>,
    config: web::Data<Config>,
    path: web::Path<String>,
    params: web::Query<HashMap<String, String>>,
) -> AppResult<HttpResponse> {
    let kind = parse_kind(&path)?;
    let admin = admin_for(&site, kind)?;
    auth.require(pool.get_ref(), &admin.perm("view")).await?;

    let query = ListQuery::from_params(&params)?;
    let list = build_list_sql(admin, &query, config.list_per_page, resolve_lookup_column)?;
    let from = format!("FROM {}", kind.table());
    let page = fetch_page::<Lookup>(pool.get_ref(), "id, name", &from, &list).await?;

    let page = page.map(|row| {
        let columns: serde_json::Map<_, _> = admin
            .list_display
            .iter()
            .map(|column| {
                let value = match column.as_str() {
                    STR_COLUMN => json!(row.to_string()),
                    "name" => json!(row.name),
                    "id" => json!(row.id),
                    _ => serde_json::Value::Null,
                };
                (column.clone(), value)
            })
            .collect();
        json!({ "id": row.id, "columns": columns })
    });
    Ok(HttpResponse::Ok().json(page))
}

/// Get a lookup entry
#[utoipa::path(
    get,
    path = "/api/lookups/{kind}/{id}",
    params(("kind", Path, description = "Lookup kind"), ("id", Path, description = "Entry id")),
    responses(
        (status = 200, description = "Entry", body = Lookup),
        (status = 404, description = "Unknown kind or id")
    ),
    tag = "Lookup",
    security(("bearer_auth" = []))
)]
pub async fn get_lookup(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    site: web::Data<AdminSite>,
    path: web::Path<(String, u64)>,
) -> AppResult<HttpResponse> {
    let (raw_kind, id) = path.into_inner();
    let kind = parse_kind(&raw_kind)?;
    let admin = admin_for(&site, kind)?;
    auth.require(pool.get_ref(), &admin.perm("view")).await?;

    let lookup = fetch_lookup(pool.get_ref(), kind, id).await?;
    Ok(HttpResponse::Ok().json(lookup))
}

/// Create a lookup entry
#[utoipa::path(
    post,
    path = "/api/lookups/{kind}",
    params(("kind", Path, description = "Lookup kind")),
    request_body = LookupForm,
    responses(
        (status = 201, description = "Created", body = Lookup),
        (status = 409, description = "Name already exists")
    ),
    tag = "Lookup",
    security(("bearer_auth" = []))
)]
#[instrument(name = "create_lookup", skip_all, fields(kind = %path))]
pub async fn create_lookup(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    site: web::Data<AdminSite>,
    path: web::Path<String>,
    payload: web::Json<LookupForm>,
) -> AppResult<HttpResponse> {
    let kind = parse_kind(&path)?;
    let admin = admin_for(&site, kind)?;
    auth.require(pool.get_ref(), &admin.perm("add")).await?;
    let name = validate_lookup_name(&payload.name)?;

    let mut tx = pool.begin().await?;
    let id = sqlx::query(&format!("INSERT INTO {} (name) VALUES (?)", kind.table()))
        .bind(&name)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::from_write(e, &conflict_message(kind)))?
        .last_insert_id();

    logs::record(
        &mut tx,
        NewAdminLog {
            user_id: auth.user_id,
            ip_addr: auth.ip_addr.clone(),
            app_label: ACCOUNT_APP,
            model: kind.to_string(),
            object_id: Some(id.to_string()),
            object_repr: name.clone(),
            action_flag: ActionFlag::Create,
            message: String::new(),
        },
    )
    .await?;
    tx.commit().await?;

    info!(id, "Lookup entry created");
    Ok(HttpResponse::Created().json(Lookup { id, name }))
}

/// Rename a lookup entry
#[utoipa::path(
    put,
    path = "/api/lookups/{kind}/{id}",
    params(("kind", Path, description = "Lookup kind"), ("id", Path, description = "Entry id")),
    request_body = LookupForm,
    responses(
        (status = 200, description = "Updated", body = Lookup),
        (status = 404, description = "Not found"),
        (status = 409, description = "Name already exists")
    ),
    tag = "Lookup",
    security(("bearer_auth" = []))
)]
pub async fn update_lookup(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    site: web::Data<AdminSite>,
    path: web::Path<(String, u64)>,
    payload: web::Json<LookupForm>,
) -> AppResult<HttpResponse> {
    let (raw_kind, id) = path.into_inner();
    let kind = parse_kind(&raw_kind)?;
    let admin = admin_for(&site, kind)?;
    auth.require(pool.get_ref(), &admin.perm("change")).await?;
    let name = validate_lookup_name(&payload.name)?;

    let before = fetch_lookup(pool.get_ref(), kind, id).await?;

    let mut tx = pool.begin().await?;
    sqlx::query(&format!("UPDATE {} SET name = ? WHERE id = ?", kind.table()))
        .bind(&name)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::from_write(e, &conflict_message(kind)))?;

    let changed: &[&str] = if before.name == name { &[] } else { &["name"] };
    logs::record(
        &mut tx,
        NewAdminLog {
            user_id: auth.user_id,
            ip_addr: auth.ip_addr.clone(),
            app_label: ACCOUNT_APP,
            model: kind.to_string(),
            object_id: Some(id.to_string()),
            object_repr: name.clone(),
            action_flag: ActionFlag::Change,
            message: crate::api::change_message(changed),
        },
    )
    .await?;
    tx.commit().await?;

    Ok(HttpResponse::Ok().json(Lookup { id, name }))
}

/// Delete a lookup entry; users pointing at it are left without a value
#[utoipa::path(
    delete,
    path = "/api/lookups/{kind}/{id}",
    params(("kind", Path, description = "Lookup kind"), ("id", Path, description = "Entry id")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 404, description = "Not found")
    ),
    tag = "Lookup",
    security(("bearer_auth" = []))
)]
pub async fn delete_lookup(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    site: web::Data<AdminSite>,
    path: web::Path<(String, u64)>,
) -> AppResult<HttpResponse> {
    let (raw_kind, id) = path.into_inner();
    let kind = parse_kind(&raw_kind)?;
    let admin = admin_for(&site, kind)?;
    auth.require(pool.get_ref(), &admin.perm("delete")).await?;

    let before = fetch_lookup(pool.get_ref(), kind, id).await?;

    let mut tx = pool.begin().await?;
    let referencing = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM users WHERE {} = ?",
        kind.user_column()
    ))
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;
    sqlx::query(&format!("DELETE FROM {} WHERE id = ?", kind.table()))
        .bind(id)
        .execute(&mut *tx)
        .await?;
    logs::record(
        &mut tx,
        NewAdminLog {
            user_id: auth.user_id,
            ip_addr: auth.ip_addr.clone(),
            app_label: ACCOUNT_APP,
            model: kind.to_string(),
            object_id: Some(id.to_string()),
            object_repr: before.name,
            action_flag: ActionFlag::Delete,
            message: String::new(),
        },
    )
    .await?;
    tx.commit().await?;

    info!(kind = %kind, id, cleared_users = referencing, "Lookup entry deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::site::lookup_admin;

    #[test]
    fn unknown_kind_is_not_found() {
        assert!(matches!(parse_kind("salary"), Err(AppError::NotFound(_))));
        assert_eq!(parse_kind("departuretype").unwrap(), LookupKind::DepartureType);
    }

    #[test]
    fn lookup_changelist_searches_and_orders_by_name() {
        let admin = lookup_admin(LookupKind::WageType);
        let query = ListQuery {
            page: 1,
            search: Some("计件".into()),
            ..Default::default()
        };
        let sql = build_list_sql(&admin, &query, 50, resolve_lookup_column).unwrap();
        assert_eq!(sql.where_clause, "WHERE (name LIKE ?)");
        assert_eq!(sql.order_clause, "ORDER BY name ASC, id ASC");
    }

    #[test]
    fn conflict_message_names_the_table() {
        assert_eq!(
            conflict_message(LookupKind::Position),
            "职务 with this 名称 already exists."
        );
    }
}
