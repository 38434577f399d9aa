use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::MySqlPool;
use sqlx::mysql::MySqlRow;
use tracing::debug;

use crate::admin::options::ModelAdmin;
use crate::error::{AppError, AppResult, FieldErrors};

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    Bool(bool),
    Date(NaiveDate),
}

impl SqlValue {
    /// Reads a query-string value: booleans, ISO dates and integers are
    /// typed, anything else stays a string.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "true" | "True" => return SqlValue::Bool(true),
            "false" | "False" => return SqlValue::Bool(false),
            _ => {}
        }
        if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return SqlValue::Date(d);
        }
        if let Ok(i) = raw.parse::<i64>() {
            return SqlValue::I64(i);
        }
        SqlValue::String(raw.to_string())
    }
}

macro_rules! bind_all {
    ($query:expr, $values:expr) => {{
        let mut query = $query;
        for value in $values {
            query = match value {
                SqlValue::String(v) => query.bind(v.clone()),
                SqlValue::I64(v) => query.bind(*v),
                SqlValue::Bool(v) => query.bind(*v),
                SqlValue::Date(v) => query.bind(*v),
            };
        }
        query
    }};
}

/// How an admin field name maps onto SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// A plain expression, usable in WHERE and ORDER BY
    Expr(String),
    /// An `EXISTS (...)` subquery with a single `?` for the filter value,
    /// used for many-to-many filters
    Exists(String),
    /// A timestamp: filtered by calendar day, ordered by the full value
    Day(String),
}

impl Column {
    pub fn expr(sql: &str) -> Option<Self> {
        Some(Column::Expr(sql.to_string()))
    }

    pub fn exists(sql: &str) -> Option<Self> {
        Some(Column::Exists(sql.to_string()))
    }

    pub fn day(sql: &str) -> Option<Self> {
        Some(Column::Day(sql.to_string()))
    }
}

const PAGE_PARAM: &str = "p";
const PER_PAGE_PARAM: &str = "per_page";
const SEARCH_PARAM: &str = "q";
const ORDER_PARAM: &str = "o";

/// Changelist query parameters: `p`, `per_page`, `q` (search), `o`
/// (comma separated ordering, `-` for descending) and one entry per filter.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub page: u32,
    pub per_page: Option<u32>,
    pub search: Option<String>,
    pub ordering: Vec<String>,
    pub filters: Vec<(String, String)>,
}

impl ListQuery {
    pub fn from_params(params: &HashMap<String, String>) -> AppResult<Self> {
        let number = |key: &str| -> AppResult<Option<u32>> {
            params
                .get(key)
                .map(|raw| {
                    raw.parse::<u32>()
                        .map_err(|_| AppError::field(key, "Enter a whole number."))
                })
                .transpose()
        };

        let mut filters: Vec<(String, String)> = params
            .iter()
            .filter(|(k, _)| {
                ![PAGE_PARAM, PER_PAGE_PARAM, SEARCH_PARAM, ORDER_PARAM].contains(&k.as_str())
            })
            .map(|(k, v)| {
                let field = k.strip_suffix("__exact").unwrap_or(k);
                (field.to_string(), v.clone())
            })
            .collect();
        filters.sort();

        Ok(Self {
            page: number(PAGE_PARAM)?.unwrap_or(1).max(1),
            per_page: number(PER_PAGE_PARAM)?,
            search: params
                .get(SEARCH_PARAM)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            ordering: params
                .get(ORDER_PARAM)
                .map(|o| {
                    o.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            filters,
        })
    }
}

/// ===============================
/// Changelist SQL fragments
/// ===============================
#[derive(Debug, Clone)]
pub struct ListSql {
    pub where_clause: String,
    pub order_clause: String,
    pub values: Vec<SqlValue>,
    pub page: u32,
    pub per_page: u32,
    pub offset: u64,
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Builds WHERE / ORDER BY / paging for a changelist.
///
/// Only the admin's `list_filter`, `search_fields` and sortable columns
/// are accepted; `resolve` turns those names into SQL. Names it cannot
/// resolve are rejected the same way as names the admin does not allow.
pub fn build_list_sql(
    admin: &ModelAdmin,
    query: &ListQuery,
    default_per_page: u32,
    resolve: impl Fn(&str) -> Option<Column>,
) -> AppResult<ListSql> {
    let mut conditions: Vec<String> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();
    let mut errors = FieldErrors::new();

    for (field, raw) in &query.filters {
        let column = admin
            .can_filter_by(field)
            .then(|| resolve(field))
            .flatten();
        match column {
            Some(Column::Expr(expr)) if raw.is_empty() || raw == "null" => {
                conditions.push(format!("{expr} IS NULL"));
            }
            Some(Column::Expr(expr)) => {
                conditions.push(format!("{expr} = ?"));
                values.push(SqlValue::parse(raw));
            }
            Some(Column::Exists(subquery)) => {
                conditions.push(format!("EXISTS ({subquery})"));
                values.push(SqlValue::parse(raw));
            }
            Some(Column::Day(expr)) => {
                conditions.push(format!("DATE({expr}) = ?"));
                values.push(SqlValue::parse(raw));
            }
            None => errors
                .entry(field.clone())
                .or_default()
                .push("Unknown filter.".into()),
        }
    }

    if let Some(search) = &query.search {
        let columns: Vec<String> = admin
            .search_fields
            .iter()
            .filter_map(|f| match resolve(f) {
                Some(Column::Expr(expr)) => Some(expr),
                _ => None,
            })
            .collect();

        if !columns.is_empty() {
            for term in search.split_whitespace() {
                let like = escape_like(term);
                let any = columns
                    .iter()
                    .map(|c| format!("{c} LIKE ?"))
                    .collect::<Vec<_>>()
                    .join(" OR ");
                conditions.push(format!("({any})"));
                values.extend(columns.iter().map(|_| SqlValue::String(like.clone())));
            }
        }
    }

    let requested: Vec<&str> = if query.ordering.is_empty() {
        admin.ordering.iter().map(String::as_str).collect()
    } else {
        query.ordering.iter().map(String::as_str).collect()
    };

    let mut order_terms = Vec::new();
    for term in requested {
        let (field, direction) = match term.strip_prefix('-') {
            Some(field) => (field, "DESC"),
            None => (term, "ASC"),
        };
        let allowed = query.ordering.is_empty() || admin.can_order_by(field);
        match (allowed, resolve(field)) {
            (true, Some(Column::Expr(expr) | Column::Day(expr))) => {
                order_terms.push(format!("{expr} {direction}"))
            }
            _ => errors
                .entry(ORDER_PARAM.to_string())
                .or_default()
                .push(format!("Cannot order by {field}.")),
        }
    }
    if let Some(Column::Expr(pk)) = resolve("id") {
        order_terms.push(format!("{pk} ASC"));
    }

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let per_page = query
        .per_page
        .or(admin.list_per_page)
        .unwrap_or(default_per_page)
        .clamp(1, 500);
    let page = query.page.max(1);
    let offset = u64::from(page - 1) * u64::from(per_page);

    Ok(ListSql {
        where_clause: if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        },
        order_clause: if order_terms.is_empty() {
            String::new()
        } else {
            format!("ORDER BY {}", order_terms.join(", "))
        },
        values,
        page,
        per_page,
        offset,
    })
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
        }
    }
}

/// Runs the count and the page query for `SELECT {select} {from} ...`.
pub async fn fetch_page<T>(
    pool: &MySqlPool,
    select: &str,
    from: &str,
    list: &ListSql,
) -> AppResult<Page<T>>
where
    T: for<'r> sqlx::FromRow<'r, MySqlRow> + Send + Unpin,
{
    let count_sql = format!("SELECT COUNT(*) {from} {}", list.where_clause);
    debug!(sql = %count_sql, bindings = ?list.values, "Counting rows");
    let total = bind_all!(sqlx::query_scalar::<_, i64>(&count_sql), &list.values)
        .fetch_one(pool)
        .await?;

    let data_sql = format!(
        "SELECT {select} {from} {} {} LIMIT ? OFFSET ?",
        list.where_clause, list.order_clause
    );
    debug!(sql = %data_sql, page = list.page, per_page = list.per_page, "Fetching rows");
    let data = bind_all!(sqlx::query_as::<_, T>(&data_sql), &list.values)
        .bind(i64::from(list.per_page))
        .bind(list.offset as i64)
        .fetch_all(pool)
        .await?;

    Ok(Page {
        data,
        page: list.page,
        per_page: list.per_page,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::site::user_admin;

    fn resolve_user(field: &str) -> Option<Column> {
        match field {
            "id" => Column::expr("u.id"),
            "username" => Column::expr("u.username"),
            "email" => Column::expr("u.email"),
            "name" => Column::expr("u.name"),
            "is_staff" => Column::expr("u.is_staff"),
            "gender" => Column::expr("u.gender"),
            "departure_type" => Column::expr("u.departure_type_id"),
            "groups" => Column::exists(
                "SELECT 1 FROM user_groups ug WHERE ug.user_id = u.id AND ug.group_id = ?",
            ),
            _ => None,
        }
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn query_params_split_into_paging_search_order_and_filters() {
        let q = ListQuery::from_params(&params(&[
            ("p", "3"),
            ("q", "  zhang  "),
            ("o", "-name,username"),
            ("is_staff__exact", "true"),
        ]))
        .unwrap();
        assert_eq!(q.page, 3);
        assert_eq!(q.search.as_deref(), Some("zhang"));
        assert_eq!(q.ordering, vec!["-name", "username"]);
        assert_eq!(q.filters, vec![("is_staff".to_string(), "true".to_string())]);
    }

    #[test]
    fn bad_page_number_is_a_validation_error() {
        assert!(ListQuery::from_params(&params(&[("p", "two")])).is_err());
    }

    #[test]
    fn default_ordering_comes_from_admin() {
        let sql = build_list_sql(&user_admin(), &ListQuery::default(), 50, resolve_user).unwrap();
        assert_eq!(sql.where_clause, "");
        assert_eq!(sql.order_clause, "ORDER BY u.username ASC, u.id ASC");
        assert_eq!(sql.per_page, 50);
        assert_eq!(sql.offset, 0);
    }

    #[test]
    fn filters_and_search_become_bound_conditions() {
        let q = ListQuery {
            page: 2,
            search: Some("li 50%".into()),
            filters: vec![
                ("groups".into(), "4".into()),
                ("is_staff".into(), "false".into()),
            ],
            ..Default::default()
        };
        let sql = build_list_sql(&user_admin(), &q, 20, resolve_user).unwrap();
        assert_eq!(
            sql.where_clause,
            "WHERE EXISTS (SELECT 1 FROM user_groups ug WHERE ug.user_id = u.id AND ug.group_id = ?) \
             AND u.is_staff = ? \
             AND (u.username LIKE ? OR u.email LIKE ? OR u.name LIKE ?) \
             AND (u.username LIKE ? OR u.email LIKE ? OR u.name LIKE ?)"
        );
        assert_eq!(sql.values[0], SqlValue::I64(4));
        assert_eq!(sql.values[1], SqlValue::Bool(false));
        assert_eq!(sql.values[2], SqlValue::String("%li%".into()));
        assert_eq!(sql.values[5], SqlValue::String("%50\\%%".into()));
        assert_eq!(sql.offset, 20);
    }

    #[test]
    fn empty_filter_value_means_null() {
        let q = ListQuery {
            page: 1,
            filters: vec![("departure_type".into(), "".into())],
            ..Default::default()
        };
        let sql = build_list_sql(&user_admin(), &q, 20, resolve_user).unwrap();
        assert_eq!(sql.where_clause, "WHERE u.departure_type_id IS NULL");
        assert!(sql.values.is_empty());
    }

    #[test]
    fn filters_outside_list_filter_are_rejected() {
        let q = ListQuery {
            page: 1,
            filters: vec![("password".into(), "x".into())],
            ..Default::default()
        };
        match build_list_sql(&user_admin(), &q, 20, resolve_user) {
            Err(AppError::Validation(errors)) => assert!(errors.contains_key("password")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn ordering_by_hidden_column_is_rejected() {
        let q = ListQuery {
            page: 1,
            ordering: vec!["-email".into()],
            ..Default::default()
        };
        assert!(build_list_sql(&user_admin(), &q, 20, resolve_user).is_err());

        let q = ListQuery {
            page: 1,
            ordering: vec!["-name".into()],
            ..Default::default()
        };
        let sql = build_list_sql(&user_admin(), &q, 20, resolve_user).unwrap();
        assert_eq!(sql.order_clause, "ORDER BY u.name DESC, u.id ASC");
    }

    #[test]
    fn values_parse_to_types() {
        assert_eq!(SqlValue::parse("true"), SqlValue::Bool(true));
        assert_eq!(SqlValue::parse("12"), SqlValue::I64(12));
        assert_eq!(
            SqlValue::parse("2024-03-01"),
            SqlValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert_eq!(SqlValue::parse("M"), SqlValue::String("M".into()));
    }
}
