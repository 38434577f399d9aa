use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A model known to the admin site; permissions hang off it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct ContentType {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "account")]
    pub app_label: String,
    #[schema(example = "myuser")]
    pub model: String,
    /// Human label, used when formatting permission names
    #[schema(example = "user")]
    pub name: String,
}

impl ContentType {
    pub fn natural_key(&self) -> (&str, &str) {
        (&self.app_label, &self.model)
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
