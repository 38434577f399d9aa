use chrono::{Local, NaiveDate, NaiveDateTime};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::password::hash_password;
use crate::error::{AppError, AppResult, FieldErrors};

pub const USERNAME_MAX: usize = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize, ToSchema)]
pub enum Gender {
    #[display(fmt = "男")]
    M,
    #[display(fmt = "女")]
    F,
}

impl Gender {
    pub fn code(&self) -> &'static str {
        match self {
            Gender::M => "M",
            Gender::F => "F",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "M" => Some(Gender::M),
            "F" => Some(Gender::F),
            _ => None,
        }
    }
}

/// An employee account, as stored in `users`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct MyUser {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "zhangsan")]
    pub username: String,
    /// argon2 PHC string
    #[serde(skip_serializing)]
    pub password: String,
    pub card_number: Option<String>,
    pub card_number_attendance: Option<String>,
    #[schema(example = "张三")]
    pub name: Option<String>,
    pub idcard: Option<String>,
    pub bank_card: Option<String>,
    pub mobile: Option<String>,
    pub email: Option<String>,
    #[schema(value_type = Option<String>, format = "date")]
    pub birth: Option<NaiveDate>,
    #[schema(example = "M")]
    pub gender: Option<String>,
    pub remark: Option<String>,
    pub wage_type_id: Option<u64>,
    pub work_type_id: Option<u64>,
    pub attendance_shift_id: Option<u64>,
    pub position_id: Option<u64>,
    pub departure_type_id: Option<u64>,
    pub operator_id: Option<u64>,
    pub operator_last_id: Option<u64>,
    #[schema(value_type = Option<String>, format = "date")]
    pub date_joined_company: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub operator_time: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub operator_last_time: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_login: Option<NaiveDateTime>,
    pub is_staff: bool,
    pub is_active: bool,
    pub is_superuser: bool,
}

impl MyUser {
    pub fn full_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn short_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn gender_label(&self) -> Option<String> {
        self.gender
            .as_deref()
            .and_then(Gender::from_code)
            .map(|g| g.to_string())
    }
}

impl std::fmt::Display for MyUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name.as_deref().unwrap_or(""))
    }
}

/// Editable profile fields shared by the add and change forms.
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
#[serde(default)]
pub struct UserFields {
    pub name: Option<String>,
    pub card_number: Option<String>,
    pub card_number_attendance: Option<String>,
    pub idcard: Option<String>,
    pub bank_card: Option<String>,
    pub mobile: Option<String>,
    pub email: Option<String>,
    #[schema(value_type = Option<String>, format = "date")]
    pub birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub remark: Option<String>,
    pub wage_type_id: Option<u64>,
    pub work_type_id: Option<u64>,
    pub attendance_shift_id: Option<u64>,
    pub position_id: Option<u64>,
    pub departure_type_id: Option<u64>,
    #[schema(value_type = Option<String>, format = "date")]
    pub date_joined_company: Option<NaiveDate>,
    pub is_staff: Option<bool>,
    pub is_active: Option<bool>,
    pub is_superuser: Option<bool>,
    /// Departments
    pub group_ids: Vec<u64>,
    pub permission_ids: Vec<u64>,
}

/// The user being saved from an admin form, before it hits the database.
#[derive(Debug, Clone)]
pub struct UserDraft {
    /// `None` (or non-positive) for a record that does not exist yet
    pub id: Option<i64>,
    pub username: String,
    /// Already hashed; `None` keeps the stored hash on change
    pub password_hash: Option<String>,
    pub fields: UserFields,
    pub operator_id: Option<u64>,
    pub operator_last_id: Option<u64>,
}

impl UserDraft {
    pub fn is_new(&self) -> bool {
        self.id.is_none_or(|id| id <= 0)
    }

    /// Records who performed this write. A new record also gets its
    /// creating operator; `operator_last` always follows the acting user.
    pub fn stamp_operator(&mut self, acting_user_id: u64) {
        if self.is_new() {
            self.operator_id = Some(acting_user_id);
        }
        self.operator_last_id = Some(acting_user_id);
    }

    pub fn is_staff(&self) -> bool {
        self.fields.is_staff.unwrap_or(false)
    }

    pub fn is_active(&self) -> bool {
        self.fields.is_active.unwrap_or(true)
    }

    pub fn is_superuser(&self) -> bool {
        self.fields.is_superuser.unwrap_or(false)
    }

    /// A new record defaults to today; an existing one keeps what it has,
    /// including no date at all.
    pub fn date_joined_company(&self) -> Option<NaiveDate> {
        match self.fields.date_joined_company {
            None if self.is_new() => Some(Local::now().date_naive()),
            date => date,
        }
    }
}

/// Letters, digits and `@ . + - _` only, at most 150 characters.
pub fn validate_username(username: &str) -> AppResult<String> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AppError::field("username", "The given username must be set"));
    }
    if username.chars().count() > USERNAME_MAX {
        return Err(AppError::field(
            "username",
            format!("Ensure this value has at most {USERNAME_MAX} characters."),
        ));
    }
    let valid = username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-'));
    if !valid {
        return Err(AppError::field(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        ));
    }
    Ok(username.to_string())
}

/// Lowercases the domain part of an address; blank becomes `None`.
pub fn normalize_email(email: Option<&str>) -> Option<String> {
    let email = email?.trim();
    if email.is_empty() {
        return None;
    }
    match email.rsplit_once('@') {
        Some((local, domain)) => Some(format!("{local}@{}", domain.to_lowercase())),
        None => Some(email.to_string()),
    }
}

fn validate_email(email: Option<&str>) -> AppResult<()> {
    if let Some(email) = email {
        let ok = email
            .rsplit_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !ok {
            return Err(AppError::field("email", "Enter a valid email address."));
        }
    }
    Ok(())
}

fn check_max(errors: &mut FieldErrors, field: &str, value: &Option<String>, max: usize) {
    if value.as_deref().is_some_and(|v| v.chars().count() > max) {
        errors
            .entry(field.to_string())
            .or_default()
            .push(format!("Ensure this value has at most {max} characters."));
    }
}

/// Length limits and email normalization applied to every user save.
pub fn clean_fields(mut fields: UserFields) -> AppResult<UserFields> {
    let mut errors = FieldErrors::new();
    check_max(&mut errors, "card_number", &fields.card_number, 30);
    check_max(&mut errors, "card_number_attendance", &fields.card_number_attendance, 30);
    check_max(&mut errors, "name", &fields.name, 100);
    check_max(&mut errors, "idcard", &fields.idcard, 20);
    check_max(&mut errors, "bank_card", &fields.bank_card, 30);
    check_max(&mut errors, "mobile", &fields.mobile, 20);
    check_max(&mut errors, "remark", &fields.remark, 500);
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    fields.email = normalize_email(fields.email.as_deref());
    validate_email(fields.email.as_deref())?;
    fields.group_ids.sort_unstable();
    fields.group_ids.dedup();
    fields.permission_ids.sort_unstable();
    fields.permission_ids.dedup();
    Ok(fields)
}

/// The admin "add user" form: two password entries that must agree.
pub fn check_password_pair(password1: &str, password2: &str) -> AppResult<()> {
    if password1.is_empty() {
        return Err(AppError::field("password1", "This field is required."));
    }
    if password1 != password2 {
        return Err(AppError::field(
            "password2",
            "The two password fields didn't match.",
        ));
    }
    Ok(())
}

/// Builds a new, hashed user. Staff and superuser default to false.
pub fn create_user(
    username: &str,
    email: Option<&str>,
    password: &str,
    mut fields: UserFields,
) -> AppResult<UserDraft> {
    fields.is_staff.get_or_insert(false);
    fields.is_superuser.get_or_insert(false);
    build_user(username, email, password, fields)
}

/// Like [`create_user`], but staff and superuser default to true and may
/// not be switched off.
pub fn create_superuser(
    username: &str,
    email: Option<&str>,
    password: &str,
    mut fields: UserFields,
) -> AppResult<UserDraft> {
    if !*fields.is_staff.get_or_insert(true) {
        return Err(AppError::field("is_staff", "Superuser must have is_staff=True."));
    }
    if !*fields.is_superuser.get_or_insert(true) {
        return Err(AppError::field(
            "is_superuser",
            "Superuser must have is_superuser=True.",
        ));
    }
    build_user(username, email, password, fields)
}

fn build_user(
    username: &str,
    email: Option<&str>,
    password: &str,
    mut fields: UserFields,
) -> AppResult<UserDraft> {
    let username = validate_username(username)?;
    if email.is_some() {
        fields.email = email.map(str::to_string);
    }
    let fields = clean_fields(fields)?;
    let password_hash = hash_password(password)?;

    Ok(UserDraft {
        id: None,
        username,
        password_hash: Some(password_hash),
        fields,
        operator_id: None,
        operator_last_id: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;

    fn draft(id: Option<i64>) -> UserDraft {
        UserDraft {
            id,
            username: "lisi".into(),
            password_hash: None,
            fields: UserFields::default(),
            operator_id: None,
            operator_last_id: None,
        }
    }

    #[test]
    fn new_user_gets_both_operator_fields() {
        let mut user = draft(None);
        user.stamp_operator(9);
        assert_eq!(user.operator_id, Some(9));
        assert_eq!(user.operator_last_id, Some(9));
    }

    #[test]
    fn non_positive_id_counts_as_new() {
        let mut user = draft(Some(0));
        user.stamp_operator(4);
        assert_eq!(user.operator_id, Some(4));
    }

    #[test]
    fn existing_user_keeps_original_operator() {
        let mut user = draft(Some(12));
        user.operator_id = Some(1);
        user.stamp_operator(5);
        assert_eq!(user.operator_id, Some(1));
        assert_eq!(user.operator_last_id, Some(5));
    }

    #[test]
    fn join_date_defaults_only_for_new_users() {
        assert_eq!(draft(None).date_joined_company(), Some(Local::now().date_naive()));
        assert_eq!(draft(Some(12)).date_joined_company(), None);

        let mut existing = draft(Some(12));
        existing.fields.date_joined_company = NaiveDate::from_ymd_opt(2019, 3, 1);
        assert_eq!(existing.date_joined_company(), NaiveDate::from_ymd_opt(2019, 3, 1));
    }

    #[test]
    fn username_accepts_unicode_and_symbols() {
        assert_eq!(validate_username("张三.li+hr@x-1_a").unwrap(), "张三.li+hr@x-1_a");
    }

    #[test]
    fn username_rejects_spaces_and_length() {
        assert!(validate_username("zhang san").is_err());
        assert!(validate_username("").is_err());
        assert!(validate_username(&"a".repeat(151)).is_err());
        assert!(validate_username(&"a".repeat(150)).is_ok());
    }

    #[test]
    fn email_domain_is_lowercased() {
        assert_eq!(
            normalize_email(Some(" Wang.Wu@Example.COM ")).as_deref(),
            Some("Wang.Wu@example.com")
        );
        assert_eq!(normalize_email(Some("   ")), None);
        assert_eq!(normalize_email(None), None);
    }

    #[test]
    fn mismatched_passwords_fail_on_second_field() {
        match check_password_pair("secret-1", "secret-2") {
            Err(AppError::Validation(errors)) => assert!(errors.contains_key("password2")),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(check_password_pair("same", "same").is_ok());
    }

    #[test]
    fn create_user_defaults_flags_and_hashes() {
        let user = create_user("zhaoliu", Some("z@Corp.cn"), "pa55word", UserFields::default())
            .unwrap();
        assert!(!user.is_staff());
        assert!(!user.is_superuser());
        assert!(user.is_active());
        assert_eq!(user.fields.email.as_deref(), Some("z@corp.cn"));
        let hash = user.password_hash.unwrap();
        assert_ne!(hash, "pa55word");
        assert!(verify_password("pa55word", &hash).is_ok());
    }

    #[test]
    fn create_user_requires_username() {
        assert!(create_user("  ", None, "pw", UserFields::default()).is_err());
    }

    #[test]
    fn create_superuser_defaults_to_staff_superuser() {
        let user = create_superuser("root", None, "pw", UserFields::default()).unwrap();
        assert!(user.is_staff());
        assert!(user.is_superuser());
    }

    #[test]
    fn create_superuser_rejects_explicit_false_flags() {
        let fields = UserFields {
            is_staff: Some(false),
            ..Default::default()
        };
        assert!(create_superuser("root", None, "pw", fields).is_err());

        let fields = UserFields {
            is_superuser: Some(false),
            ..Default::default()
        };
        assert!(create_superuser("root", None, "pw", fields).is_err());
    }

    #[test]
    fn clean_fields_enforces_lengths_and_dedups_relations() {
        let fields = UserFields {
            mobile: Some("1".repeat(21)),
            ..Default::default()
        };
        assert!(clean_fields(fields).is_err());

        let fields = UserFields {
            group_ids: vec![3, 1, 3],
            ..Default::default()
        };
        assert_eq!(clean_fields(fields).unwrap().group_ids, vec![1, 3]);
    }

    #[test]
    fn invalid_email_is_rejected() {
        let fields = UserFields {
            email: Some("not-an-address".into()),
            ..Default::default()
        };
        assert!(clean_fields(fields).is_err());
    }

    #[test]
    fn display_and_gender_label() {
        let user = MyUser {
            id: 1,
            username: "u".into(),
            password: String::new(),
            card_number: None,
            card_number_attendance: None,
            name: Some("王五".into()),
            idcard: None,
            bank_card: None,
            mobile: None,
            email: None,
            birth: None,
            gender: Some("F".into()),
            remark: None,
            wage_type_id: None,
            work_type_id: None,
            attendance_shift_id: None,
            position_id: None,
            departure_type_id: None,
            operator_id: None,
            operator_last_id: None,
            date_joined_company: None,
            operator_time: None,
            operator_last_time: None,
            last_login: None,
            is_staff: false,
            is_active: true,
            is_superuser: false,
        };
        assert_eq!(user.to_string(), "王五");
        assert_eq!(user.full_name(), Some("王五"));
        assert_eq!(user.gender_label().as_deref(), Some("女"));
    }
}
