use std::collections::HashMap;

use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::{
    admin::{
        labels::group_label,
        options::STR_COLUMN,
        site::{ACCOUNT_APP, AdminSite},
    },
    api::{Choice, change_message, logs, not_registered, permissions::permission_choices, replace_links},
    auth::auth::AuthUser,
    config::Config,
    error::{AppError, AppResult},
    model::{
        admin_log::{ActionFlag, NewAdminLog},
        group::{MyGroup, validate_group_name},
    },
    utils::db_utils::{Column, ListQuery, build_list_sql, fetch_page},
};

const MODEL: &str = "mygroup";
const CONFLICT: &str = "部门 with this name already exists.";

#[derive(Deserialize, ToSchema)]
pub struct GroupForm {
    #[schema(example = "人事部")]
    pub name: String,
    #[serde(default)]
    #[schema(example = json!([1, 2]))]
    pub permission_ids: Vec<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct GroupDetail {
    pub id: u64,
    pub name: String,
    pub permissions: Vec<Choice>,
}

fn resolve_group_column(field: &str) -> Option<Column> {
    match field {
        "id" => Column::expr("g.id"),
        "name" => Column::expr("g.name"),
        _ => None,
    }
}

fn sorted_ids(ids: &[u64]) -> Vec<u64> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

async fn fetch_group(pool: &MySqlPool, id: u64) -> AppResult<MyGroup> {
    sqlx::query_as::<_, MyGroup>("SELECT id, name FROM departments WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("部门".into()))
}

async fn group_permission_ids(pool: &MySqlPool, id: u64) -> AppResult<Vec<u64>> {
    Ok(sqlx::query_scalar::<_, u64>(
        "SELECT permission_id FROM group_permissions WHERE group_id = ? ORDER BY permission_id",
    )
    .bind(id)
    .fetch_all(pool)
    .await?)
}

async fn group_detail(pool: &MySqlPool, id: u64) -> AppResult<GroupDetail> {
    let group = fetch_group(pool, id).await?;
    let permissions = permission_choices(
        pool,
        "JOIN group_permissions gp ON gp.permission_id = p.id WHERE gp.group_id = ?",
        id,
    )
    .await?;
    Ok(GroupDetail {
        id: group.id,
        name: group.name,
        permissions,
    })
}

/// All departments as choices, for the user form
#[utoipa::path(
    get,
    path = "/api/groups/choices",
    responses((status = 200, description = "Departments", body = [Choice])),
    tag = "Group",
    security(("bearer_auth" = []))
)]
pub async fn group_choices(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    auth.require_staff(pool.get_ref()).await?;
    let groups = sqlx::query_as::<_, MyGroup>("SELECT id, name FROM departments ORDER BY name")
        .fetch_all(pool.get_ref())
        .await?;
    let choices: Vec<Choice> = groups
        .into_iter()
        .map(|g| Choice {
            id: g.id,
            label: group_label(&g.name),
        })
        .collect();
    Ok(HttpResponse::Ok().json(choices))
}

/// List departments
#[utoipa::path(
    get,
    path = "/api/groups",
    params(("q", Query, description = "Search by name"), ("p", Query, description = "Page number")),
    responses((status = 200, description = "Paginated departments", body = Object)),
    tag = "Group",
    security(("bearer_auth" = []))
)]
#[instrument(name = "list_groups", skip_all, fields(user_id = auth.user_id))]
pub async fn list_groups(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    site: web::Data<AdminSite>,
    config: web::Data<Config>,
    params: web::Query<HashMap<String, String>>,
) -> AppResult<HttpResponse> {
    let admin = site.get(MODEL).ok_or_else(|| not_registered(MODEL))?;
    auth.require(pool.get_ref(), &admin.perm("view")).await?;

    let query = ListQuery::from_params(&params)?;
    let list = build_list_sql(admin, &query, config.list_per_page, resolve_group_column)?;
    let page = fetch_page::<MyGroup>(pool.get_ref(), "g.id, g.name", "FROM departments g", &list)
        .await?;

    let page = page.map(|g| {
        let columns: serde_json::Map<_, _> = admin
            .list_display
            .iter()
            .map(|column| {
                let value = match column.as_str() {
                    "name" | STR_COLUMN => json!(g.name),
                    _ => serde_json::Value::Null,
                };
                (column.clone(), value)
            })
            .collect();
        json!({ "id": g.id, "columns": columns })
    });
    Ok(HttpResponse::Ok().json(page))
}

/// Get a department with its permissions
#[utoipa::path(
    get,
    path = "/api/groups/{id}",
    params(("id", Path, description = "Department id")),
    responses(
        (status = 200, description = "Department", body = GroupDetail),
        (status = 404, description = "Not found")
    ),
    tag = "Group",
    security(("bearer_auth" = []))
)]
pub async fn get_group(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    site: web::Data<AdminSite>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let admin = site.get(MODEL).ok_or_else(|| not_registered(MODEL))?;
    auth.require(pool.get_ref(), &admin.perm("view")).await?;

    let detail = group_detail(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(detail))
}

/// Create a department
#[utoipa::path(
    post,
    path = "/api/groups",
    request_body = GroupForm,
    responses(
        (status = 201, description = "Created", body = GroupDetail),
        (status = 400, description = "Invalid name or unknown permission"),
        (status = 409, description = "Name already exists")
    ),
    tag = "Group",
    security(("bearer_auth" = []))
)]
#[instrument(name = "create_group", skip_all, fields(name = %payload.name))]
pub async fn create_group(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    site: web::Data<AdminSite>,
    payload: web::Json<GroupForm>,
) -> AppResult<HttpResponse> {
    let admin = site.get(MODEL).ok_or_else(|| not_registered(MODEL))?;
    auth.require(pool.get_ref(), &admin.perm("add")).await?;
    let name = validate_group_name(&payload.name)?;
    let permission_ids = sorted_ids(&payload.permission_ids);

    let mut tx = pool.begin().await?;
    let id = sqlx::query("INSERT INTO departments (name) VALUES (?)")
        .bind(&name)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::from_write(e, CONFLICT))?
        .last_insert_id();
    replace_links(&mut tx, "group_permissions", "group_id", "permission_id", id, &permission_ids)
        .await?;

    logs::record(
        &mut tx,
        NewAdminLog {
            user_id: auth.user_id,
            ip_addr: auth.ip_addr.clone(),
            app_label: ACCOUNT_APP,
            model: MODEL.to_string(),
            object_id: Some(id.to_string()),
            object_repr: name,
            action_flag: ActionFlag::Create,
            message: String::new(),
        },
    )
    .await?;
    tx.commit().await?;

    info!(id, "Department created");
    let detail = group_detail(pool.get_ref(), id).await?;
    Ok(HttpResponse::Created().json(detail))
}

/// Update a department and replace its permissions
#[utoipa::path(
    put,
    path = "/api/groups/{id}",
    params(("id", Path, description = "Department id")),
    request_body = GroupForm,
    responses(
        (status = 200, description = "Updated", body = GroupDetail),
        (status = 404, description = "Not found"),
        (status = 409, description = "Name already exists")
    ),
    tag = "Group",
    security(("bearer_auth" = []))
)]
pub async fn update_group(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    site: web::Data<AdminSite>,
    path: web::Path<u64>,
    payload: web::Json<GroupForm>,
) -> AppResult<HttpResponse> {
    let admin = site.get(MODEL).ok_or_else(|| not_registered(MODEL))?;
    auth.require(pool.get_ref(), &admin.perm("change")).await?;
    let id = path.into_inner();
    let name = validate_group_name(&payload.name)?;
    let permission_ids = sorted_ids(&payload.permission_ids);

    let before = fetch_group(pool.get_ref(), id).await?;
    let before_permissions = group_permission_ids(pool.get_ref(), id).await?;

    let mut changed = Vec::new();
    if before.name != name {
        changed.push("name");
    }
    if before_permissions != permission_ids {
        changed.push("permissions");
    }

    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE departments SET name = ? WHERE id = ?")
        .bind(&name)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::from_write(e, CONFLICT))?;
    replace_links(&mut tx, "group_permissions", "group_id", "permission_id", id, &permission_ids)
        .await?;
    logs::record(
        &mut tx,
        NewAdminLog {
            user_id: auth.user_id,
            ip_addr: auth.ip_addr.clone(),
            app_label: ACCOUNT_APP,
            model: MODEL.to_string(),
            object_id: Some(id.to_string()),
            object_repr: name,
            action_flag: ActionFlag::Change,
            message: change_message(&changed),
        },
    )
    .await?;
    tx.commit().await?;

    let detail = group_detail(pool.get_ref(), id).await?;
    Ok(HttpResponse::Ok().json(detail))
}

/// Delete a department; members lose the permissions it granted
#[utoipa::path(
    delete,
    path = "/api/groups/{id}",
    params(("id", Path, description = "Department id")),
    responses((status = 200, description = "Deleted"), (status = 404, description = "Not found")),
    tag = "Group",
    security(("bearer_auth" = []))
)]
pub async fn delete_group(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    site: web::Data<AdminSite>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let admin = site.get(MODEL).ok_or_else(|| not_registered(MODEL))?;
    auth.require(pool.get_ref(), &admin.perm("delete")).await?;
    let id = path.into_inner();
    let before = fetch_group(pool.get_ref(), id).await?;

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM departments WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    logs::record(
        &mut tx,
        NewAdminLog {
            user_id: auth.user_id,
            ip_addr: auth.ip_addr.clone(),
            app_label: ACCOUNT_APP,
            model: MODEL.to_string(),
            object_id: Some(id.to_string()),
            object_repr: before.to_string(),
            action_flag: ActionFlag::Delete,
            message: String::new(),
        },
    )
    .await?;
    tx.commit().await?;

    info!(id, "Department deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully deleted" })))
}
