use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

pub const LOOKUP_NAME_MAX: usize = 80;

/// The reference tables a user's employment attributes point into.
///
/// The string form is the model name used in URLs, content types and
/// permission codenames (`/lookups/worktype`, `add_worktype`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr,
    Serialize, Deserialize, ToSchema,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LookupKind {
    /// 用工形式: contract or temporary staff
    WorkType,
    /// 用工类型: how wages are computed
    WageType,
    /// 考勤班次
    AttendanceShift,
    /// 职务
    Position,
    /// 离职类型
    DepartureType,
}

impl LookupKind {
    pub fn table(&self) -> &'static str {
        match self {
            LookupKind::WorkType => "work_types",
            LookupKind::WageType => "wage_types",
            LookupKind::AttendanceShift => "attendance_shifts",
            LookupKind::Position => "positions",
            LookupKind::DepartureType => "departure_types",
        }
    }

    pub fn verbose_name(&self) -> &'static str {
        match self {
            LookupKind::WorkType => "用工形式",
            LookupKind::WageType => "用工类型",
            LookupKind::AttendanceShift => "考勤班次",
            LookupKind::Position => "职务",
            LookupKind::DepartureType => "离职类型",
        }
    }

    /// Column on `users` that references this table.
    pub fn user_column(&self) -> &'static str {
        match self {
            LookupKind::WorkType => "work_type_id",
            LookupKind::WageType => "wage_type_id",
            LookupKind::AttendanceShift => "attendance_shift_id",
            LookupKind::Position => "position_id",
            LookupKind::DepartureType => "departure_type_id",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Lookup {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "合同工")]
    pub name: String,
}

impl std::fmt::Display for Lookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

pub fn validate_lookup_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::field("name", "This field is required."));
    }
    if name.chars().count() > LOOKUP_NAME_MAX {
        return Err(AppError::field(
            "name",
            format!("Ensure this value has at most {LOOKUP_NAME_MAX} characters."),
        ));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn kinds_parse_from_model_names() {
        assert_eq!(LookupKind::from_str("worktype").unwrap(), LookupKind::WorkType);
        assert_eq!(
            LookupKind::from_str("attendanceshift").unwrap(),
            LookupKind::AttendanceShift
        );
        assert!(LookupKind::from_str("salary").is_err());
    }

    #[test]
    fn every_kind_has_distinct_table_and_user_column() {
        let tables: std::collections::HashSet<_> = LookupKind::iter().map(|k| k.table()).collect();
        let columns: std::collections::HashSet<_> =
            LookupKind::iter().map(|k| k.user_column()).collect();
        assert_eq!(tables.len(), 5);
        assert_eq!(columns.len(), 5);
    }

    #[test]
    fn lookup_name_must_be_present() {
        assert!(validate_lookup_name("").is_err());
        assert_eq!(validate_lookup_name(" 临时工 ").unwrap(), "临时工");
    }
}
