pub mod admin_meta;
pub mod content_types;
pub mod groups;
pub mod logs;
pub mod lookups;
pub mod permissions;
pub mod users;

use serde::Serialize;
use sqlx::{MySql, Transaction};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

pub fn not_registered(model: &str) -> AppError {
    AppError::NotFound(format!("Admin for {model}"))
}

/// An option in a relation widget: the stored id plus its display label.
#[derive(Debug, Clone, Serialize, ToSchema, sqlx::FromRow)]
pub struct Choice {
    pub id: u64,
    pub label: String,
}

/// Replaces the rows of a many-to-many junction table for one owner.
///
/// `table`, `owner_column` and `target_column` come from code, never from
/// request data.
pub async fn replace_links(
    tx: &mut Transaction<'_, MySql>,
    table: &str,
    owner_column: &str,
    target_column: &str,
    owner_id: u64,
    target_ids: &[u64],
) -> AppResult<()> {
    sqlx::query(&format!("DELETE FROM {table} WHERE {owner_column} = ?"))
        .bind(owner_id)
        .execute(&mut **tx)
        .await?;

    if target_ids.is_empty() {
        return Ok(());
    }

    let placeholders = vec!["(?, ?)"; target_ids.len()].join(", ");
    let sql = format!("INSERT INTO {table} ({owner_column}, {target_column}) VALUES {placeholders}");
    let mut query = sqlx::query(&sql);
    for target_id in target_ids {
        query = query.bind(owner_id).bind(*target_id);
    }
    query
        .execute(&mut **tx)
        .await
        .map_err(|e| AppError::from_write(e, "Duplicate relation"))?;
    Ok(())
}

/// Comma-separated changed fields; the log prefixes it with the object.
pub fn change_message(changed: &[&str]) -> String {
    if changed.is_empty() {
        "No fields changed.".to_string()
    } else {
        changed.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_message_lists_fields() {
        assert_eq!(change_message(&["name", "mobile"]), "name, mobile");
        assert_eq!(change_message(&[]), "No fields changed.");
    }
}
