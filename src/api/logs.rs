use std::collections::HashMap;

use actix_web::{HttpResponse, web};
use serde::Serialize;
use serde_json::{Map, Value, json};
use sqlx::{MySql, MySqlPool, Transaction};
use tracing::{debug, instrument};
use utoipa::ToSchema;

use crate::{
    admin::{options::STR_COLUMN, site::AdminSite},
    api::not_registered,
    auth::auth::AuthUser,
    config::Config,
    error::AppResult,
    model::admin_log::{AdminLog, NewAdminLog},
    utils::db_utils::{Column, ListQuery, build_list_sql, fetch_page},
};

/// Column widths of `admin_logs.object_repr` and `admin_logs.ip_addr`.
const OBJECT_REPR_MAX: usize = 200;
const IP_ADDR_MAX: usize = 45;

/// Cuts `value` to at most `max` characters.
fn clip(mut value: String, max: usize) -> String {
    if let Some((end, _)) = value.char_indices().nth(max) {
        value.truncate(end);
    }
    value
}

/// Writes one admin log entry as part of the caller's transaction.
pub async fn record(tx: &mut Transaction<'_, MySql>, entry: NewAdminLog) -> AppResult<()> {
    debug!(
        model = %entry.model,
        object_id = ?entry.object_id,
        action = %entry.action_flag,
        "Recording admin action"
    );
    sqlx::query(
        r#"
        INSERT INTO admin_logs
            (action_time, user_id, ip_addr, content_type_id, object_id, object_repr, action_flag, message)
        VALUES
            (NOW(), ?, ?,
             (SELECT id FROM content_types WHERE app_label = ? AND model = ?),
             ?, ?, ?, ?)
        "#,
    )
    .bind(entry.user_id)
    .bind(entry.ip_addr.map(|ip| clip(ip, IP_ADDR_MAX)))
    .bind(entry.app_label)
    .bind(entry.model)
    .bind(entry.object_id)
    .bind(clip(entry.object_repr, OBJECT_REPR_MAX))
    .bind(entry.action_flag.as_ref())
    .bind(entry.message)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

const LOG_SELECT: &str = r#"
    l.id, l.action_time, l.user_id, u.name AS user_name, l.ip_addr,
    l.content_type_id, ct.app_label, ct.model,
    l.object_id, l.object_repr, l.action_flag, l.message
"#;

const LOG_FROM: &str = r#"
    FROM admin_logs l
    LEFT JOIN users u ON u.id = l.user_id
    LEFT JOIN content_types ct ON ct.id = l.content_type_id
"#;

fn resolve_log_column(field: &str) -> Option<Column> {
    match field {
        "id" => Column::expr("l.id"),
        "action_time" => Column::day("l.action_time"),
        "user" => Column::expr("l.user_id"),
        "ip_addr" => Column::expr("l.ip_addr"),
        "message" => Column::expr("l.message"),
        "object_repr" => Column::expr("l.object_repr"),
        _ => None,
    }
}

#[derive(Serialize, ToSchema)]
pub struct LogRow {
    pub id: u64,
    /// One entry per `list_display` column
    #[schema(value_type = Object)]
    pub columns: Map<String, Value>,
}

fn display_row(log: &AdminLog, list_display: &[String], api_prefix: &str) -> LogRow {
    let columns = list_display
        .iter()
        .map(|column| {
            let value = match column.as_str() {
                "action_time" => json!(log.action_time),
                "user" => json!(log.user_name.clone().unwrap_or_default()),
                "ip_addr" => json!(log.ip_addr.clone().unwrap_or_default()),
                STR_COLUMN => json!(log.to_string()),
                "link" => json!(log.link(api_prefix)),
                _ => Value::Null,
            };
            (column.clone(), value)
        })
        .collect();
    LogRow { id: log.id, columns }
}

/// List admin actions
#[utoipa::path(
    get,
    path = "/api/logs",
    params(
        ("q", Query, description = "Search ip address and message"),
        ("user", Query, description = "Filter by acting user id"),
        ("action_time", Query, description = "Filter by day, YYYY-MM-DD"),
        ("o", Query, description = "Ordering, e.g. -action_time"),
        ("p", Query, description = "Page number")
    ),
    responses(
        (status = 200, description = "Paginated log entries", body = Object),
        (status = 403, description = "Missing xadmin.view_log")
    ),
    tag = "Log",
    security(("bearer_auth" = []))
)]
#[instrument(name = "list_logs", skip_all, fields(user_id = auth.user_id))]
pub async fn list_logs(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    site: web::Data<AdminSite>,
    config: web::Data<Config>,
    params: web::Query<HashMap<String, String>>,
) -> AppResult<HttpResponse> {
    let admin = site.get("log").ok_or_else(|| not_registered("log"))?;
    auth.require(pool.get_ref(), &admin.perm("view")).await?;

    let query = ListQuery::from_params(&params)?;
    let list = build_list_sql(admin, &query, config.list_per_page, resolve_log_column)?;

    let page = fetch_page::<AdminLog>(pool.get_ref(), LOG_SELECT, LOG_FROM, &list).await?;
    let page = page.map(|log| display_row(&log, &admin.list_display, &config.api_prefix));
    Ok(HttpResponse::Ok().json(page))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::site::log_admin;

    #[test]
    fn log_rows_follow_list_display() {
        let log = AdminLog {
            id: 4,
            action_time: chrono::NaiveDate::from_ymd_opt(2024, 5, 2)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            user_id: Some(1),
            user_name: None,
            ip_addr: Some("192.168.1.9".into()),
            content_type_id: Some(4),
            app_label: Some("account".into()),
            model: Some("position".into()),
            object_id: Some("2".into()),
            object_repr: "主管".into(),
            action_flag: "create".into(),
            message: String::new(),
        };
        let row = display_row(&log, &log_admin().list_display, "/api");
        let keys: Vec<_> = row.columns.keys().cloned().collect();
        assert_eq!(keys.len(), 5);
        assert_eq!(row.columns["__str__"], "Added \"主管\".");
        assert_eq!(row.columns["link"], "/api/lookups/position/2");
        assert_eq!(row.columns["user"], "");
    }

    #[test]
    fn long_values_are_cut_to_column_width() {
        let repr = format!("account | 权限 | {}", "x".repeat(255));
        let clipped = clip(repr, OBJECT_REPR_MAX);
        assert_eq!(clipped.chars().count(), OBJECT_REPR_MAX);
        assert!(clipped.starts_with("account | 权限 | x"));

        assert_eq!(clip("职务".into(), OBJECT_REPR_MAX), "职务");
        assert_eq!(clip("1.2.3.4, ".repeat(10), IP_ADDR_MAX).len(), IP_ADDR_MAX);
    }

    #[test]
    fn day_filter_and_timestamp_ordering() {
        let admin = log_admin();
        let query = ListQuery {
            page: 1,
            filters: vec![("action_time".into(), "2024-05-02".into())],
            ..Default::default()
        };
        let filtered = build_list_sql(&admin, &query, 50, resolve_log_column).unwrap();
        assert_eq!(filtered.where_clause, "WHERE DATE(l.action_time) = ?");

        assert_eq!(filtered.order_clause, "ORDER BY l.action_time DESC, l.id ASC");
    }
}
