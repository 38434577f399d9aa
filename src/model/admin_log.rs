use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::model::lookup::LookupKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ActionFlag {
    Create,
    Change,
    Delete,
}

/// One admin action, joined with its user and content type for display.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct AdminLog {
    pub id: u64,
    #[schema(value_type = String, format = "date-time")]
    pub action_time: NaiveDateTime,
    pub user_id: Option<u64>,
    /// Display name of the acting user
    pub user_name: Option<String>,
    pub ip_addr: Option<String>,
    pub content_type_id: Option<u64>,
    pub app_label: Option<String>,
    pub model: Option<String>,
    pub object_id: Option<String>,
    pub object_repr: String,
    #[schema(example = "change")]
    pub action_flag: String,
    pub message: String,
}

impl AdminLog {
    pub fn flag(&self) -> Option<ActionFlag> {
        self.action_flag.parse().ok()
    }

    /// Changelist link to the logged object. Empty for deletions or
    /// entries without a target.
    pub fn link(&self, api_prefix: &str) -> String {
        match (&self.model, &self.object_id, self.flag()) {
            (Some(model), Some(object_id), Some(flag))
                if flag != ActionFlag::Delete && !object_id.is_empty() =>
            {
                admin_object_url(api_prefix, model, object_id).unwrap_or_default()
            }
            _ => String::new(),
        }
    }
}

/// Where the admin API serves a single object of `model`, if it serves one.
pub fn admin_object_url(api_prefix: &str, model: &str, object_id: &str) -> Option<String> {
    let collection = match model {
        "myuser" => "users".to_string(),
        "mygroup" => "groups".to_string(),
        "mypermission" => "permissions".to_string(),
        other => format!("lookups/{}", LookupKind::from_str(other).ok()?),
    };
    Some(format!("{api_prefix}/{collection}/{object_id}"))
}

impl std::fmt::Display for AdminLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.flag() {
            Some(ActionFlag::Create) => write!(f, "Added \"{}\".", self.object_repr),
            Some(ActionFlag::Change) => {
                write!(f, "Changed \"{}\" - {}", self.object_repr, self.message)
            }
            Some(ActionFlag::Delete) => write!(f, "Deleted \"{}.\"", self.object_repr),
            None => f.write_str(&self.message),
        }
    }
}

/// A log entry about to be written.
#[derive(Debug, Clone)]
pub struct NewAdminLog {
    pub user_id: u64,
    pub ip_addr: Option<String>,
    pub app_label: &'static str,
    pub model: String,
    pub object_id: Option<String>,
    pub object_repr: String,
    pub action_flag: ActionFlag,
    pub message: String,
}
