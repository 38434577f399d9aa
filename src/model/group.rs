use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

pub const GROUP_NAME_MAX: usize = 80;

/// A department. Doubles as an authorization group: members inherit its permissions.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct MyGroup {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "财务部")]
    pub name: String,
}

impl MyGroup {
    pub fn natural_key(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for MyGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

pub fn validate_group_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::field("name", "This field is required."));
    }
    if name.chars().count() > GROUP_NAME_MAX {
        return Err(AppError::field(
            "name",
            format!("Ensure this value has at most {GROUP_NAME_MAX} characters."),
        ));
    }
    Ok(name.to_string())
}
