use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::admin::labels::permission_label;
use crate::error::{AppError, AppResult};

pub const PERMISSION_NAME_MAX: usize = 255;
pub const CODENAME_MAX: usize = 100;

/// CRUD actions that get a permission per model.
pub const DEFAULT_ACTIONS: [&str; 4] = ["add", "change", "delete", "view"];

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct MyPermission {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "Can add user")]
    pub name: String,
    #[schema(example = 1)]
    pub content_type_id: u64,
    #[schema(example = "add_myuser")]
    pub codename: String,
}

/// A permission joined with its content type.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct PermissionDetail {
    pub id: u64,
    pub name: String,
    pub codename: String,
    pub content_type_id: u64,
    #[schema(example = "account")]
    pub app_label: String,
    #[schema(example = "myuser")]
    pub model: String,
    #[schema(example = "user")]
    pub content_type_name: String,
}

impl PermissionDetail {
    /// `"<app_label>.<codename>"`, the form `has_perm` checks against.
    pub fn perm_string(&self) -> String {
        format!("{}.{}", self.app_label, self.codename)
    }

    /// Label shown in choice widgets and the permission changelist.
    pub fn label(&self) -> String {
        permission_label(&self.codename, &self.content_type_name, &self.name)
    }

    pub fn natural_key(&self) -> (&str, &str, &str) {
        (&self.codename, &self.app_label, &self.model)
    }
}

impl std::fmt::Display for PermissionDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} | {} | {}",
            self.app_label, self.content_type_name, self.name
        )
    }
}

/// Codenames every model gets by default, e.g. `add_myuser`.
pub fn default_codenames(model: &str) -> Vec<String> {
    DEFAULT_ACTIONS
        .iter()
        .map(|action| format!("{action}_{model}"))
        .collect()
}

pub fn validate_permission(name: &str, codename: &str) -> AppResult<(String, String)> {
    let name = name.trim();
    let codename = codename.trim();
    let mut errors = crate::error::FieldErrors::new();

    if name.is_empty() {
        errors.entry("name".into()).or_default().push("This field is required.".into());
    } else if name.chars().count() > PERMISSION_NAME_MAX {
        errors.entry("name".into()).or_default().push(format!(
            "Ensure this value has at most {PERMISSION_NAME_MAX} characters."
        ));
    }

    if codename.is_empty() {
        errors.entry("codename".into()).or_default().push("This field is required.".into());
    } else if codename.chars().count() > CODENAME_MAX {
        errors.entry("codename".into()).or_default().push(format!(
            "Ensure this value has at most {CODENAME_MAX} characters."
        ));
    }

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }
    Ok((name.to_string(), codename.to_string()))
}
