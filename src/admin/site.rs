use serde::Serialize;
use strum::IntoEnumIterator;
use thiserror::Error;
use utoipa::ToSchema;

use super::layout::{Fieldset, FormLayout};
use super::options::ModelAdmin;
use crate::model::lookup::LookupKind;

pub const ACCOUNT_APP: &str = "account";
pub const LOG_APP: &str = "xadmin";

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("model {0} is already registered")]
    AlreadyRegistered(String),
    #[error("model {0} is not registered")]
    NotRegistered(String),
    #[error("model {model} references unknown fields: {fields:?}")]
    UnknownFields { model: String, fields: Vec<String> },
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GlobalSettings {
    pub site_title: String,
    pub site_footer: String,
    /// `accordion` collapses menu groups
    pub menu_style: String,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            site_title: "后台管理系统".to_string(),
            site_footer: "Copyright @2016-2017 后台管理系统 All Rights Reserved".to_string(),
            menu_style: "accordion".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MenuEntry {
    pub app_label: String,
    pub model: String,
    pub title: String,
    pub icon: String,
}

/// Registry of the models the admin exposes, in registration order.
#[derive(Debug, Clone, Default)]
pub struct AdminSite {
    pub settings: GlobalSettings,
    registry: Vec<ModelAdmin>,
}

impl AdminSite {
    pub fn new(settings: GlobalSettings) -> Self {
        Self {
            settings,
            registry: Vec::new(),
        }
    }

    pub fn register(&mut self, admin: ModelAdmin) -> Result<(), RegistryError> {
        if self.is_registered(&admin.model) {
            return Err(RegistryError::AlreadyRegistered(admin.model));
        }
        let unknown = admin.unknown_fields();
        if !unknown.is_empty() {
            return Err(RegistryError::UnknownFields {
                model: admin.model,
                fields: unknown,
            });
        }
        self.registry.push(admin);
        Ok(())
    }

    pub fn unregister(&mut self, model: &str) -> Result<ModelAdmin, RegistryError> {
        let index = self
            .registry
            .iter()
            .position(|a| a.model == model)
            .ok_or_else(|| RegistryError::NotRegistered(model.to_string()))?;
        Ok(self.registry.remove(index))
    }

    pub fn is_registered(&self, model: &str) -> bool {
        self.registry.iter().any(|a| a.model == model)
    }

    pub fn get(&self, model: &str) -> Option<&ModelAdmin> {
        self.registry.iter().find(|a| a.model == model)
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelAdmin> {
        self.registry.iter()
    }

    pub fn menu(&self) -> Vec<MenuEntry> {
        self.registry
            .iter()
            .map(|a| MenuEntry {
                app_label: a.app_label.clone(),
                model: a.model.clone(),
                title: a.verbose_name_plural.clone(),
                icon: a.model_icon.clone(),
            })
            .collect()
    }
}

pub const USER_FIELDS: [&str; 28] = [
    "username",
    "password",
    "name",
    "card_number",
    "card_number_attendance",
    "idcard",
    "bank_card",
    "mobile",
    "email",
    "birth",
    "gender",
    "remark",
    "wage_type",
    "work_type",
    "attendance_shift",
    "position",
    "departure_type",
    "operator",
    "operator_last",
    "date_joined_company",
    "operator_time",
    "operator_last_time",
    "last_login",
    "is_staff",
    "is_active",
    "is_superuser",
    "groups",
    "user_permissions",
];

pub fn user_admin() -> ModelAdmin {
    ModelAdmin::new(ACCOUNT_APP, "myuser", "用户")
        .fields(&USER_FIELDS)
        .list_display(&[
            "username",
            "name",
            "card_number",
            "card_number_attendance",
            "groups",
            "position",
            "gender",
            "wage_type",
            "attendance_shift",
            "is_staff",
        ])
        .list_filter(&[
            "is_staff",
            "is_superuser",
            "is_active",
            "gender",
            "departure_type",
            "wage_type",
            "groups",
        ])
        .search_fields(&["username", "email", "name"])
        .ordering(&["username"])
        .style_field("user_permissions", "m2m_transfer")
        .style_field("groups", "m2m_transfer")
        .model_icon("fa fa-user")
        .relfield_style("fk-ajax")
        .readonly_fields(&[
            "operator_time",
            "operator_last_time",
            "last_login",
            "operator",
            "operator_last",
        ])
        .empty_value_display("")
        .add_form_fields(&["username", "password1", "password2"])
        .computed_columns(&["password1", "password2"])
        .form_layout(user_change_layout())
}

fn user_change_layout() -> FormLayout {
    FormLayout::default()
        .main(Fieldset::new("", &["username", "password"]).css_class("unsort no_title"))
        .main(Fieldset::new(
            "个人信息",
            &[
                "name",
                "mobile",
                "email",
                "card_number",
                "card_number_attendance",
                "wage_type",
                "work_type",
                "attendance_shift",
                "position",
            ],
        ))
        .main(Fieldset::new("权限", &["groups", "user_permissions"]))
        .main(Fieldset::new(
            "重要日期",
            &[
                "operator",
                "operator_time",
                "operator_last",
                "operator_last_time",
                "date_joined_company",
                "last_login",
            ],
        ))
        .side(Fieldset::new("状态", &["is_active", "is_staff", "is_superuser"]))
}

pub fn group_admin() -> ModelAdmin {
    ModelAdmin::new(ACCOUNT_APP, "mygroup", "部门")
        .fields(&["name", "permissions"])
        .list_display(&["name"])
        .search_fields(&["name"])
        .ordering(&["name"])
        .style_field("permissions", "m2m_transfer")
        .model_icon("fa fa-cog")
}

pub fn permission_admin() -> ModelAdmin {
    ModelAdmin::new(ACCOUNT_APP, "mypermission", "权限")
        .fields(&["name", "content_type", "codename"])
        .computed_columns(&["show_name"])
        .list_display(&["show_name"])
        .list_filter(&["content_type"])
        .search_fields(&["name", "codename"])
        .ordering(&["content_type", "codename"])
        .model_icon("fa fa-cog")
}

pub fn lookup_admin(kind: LookupKind) -> ModelAdmin {
    ModelAdmin::new(ACCOUNT_APP, kind.as_ref(), kind.verbose_name())
        .fields(&["name"])
        .list_display(&["__str__", "name"])
        .search_fields(&["name"])
        .ordering(&["name"])
}

pub fn log_admin() -> ModelAdmin {
    ModelAdmin::new(LOG_APP, "log", "日志记录")
        .fields(&[
            "action_time",
            "user",
            "ip_addr",
            "content_type",
            "object_id",
            "object_repr",
            "action_flag",
            "message",
        ])
        .computed_columns(&["link"])
        .list_display(&["action_time", "user", "ip_addr", "__str__", "link"])
        .list_filter(&["user", "action_time"])
        .search_fields(&["ip_addr", "message"])
        .ordering(&["-action_time"])
        .model_icon("fa fa-cog")
}

/// The site with every account model and the action log registered.
pub fn build_site() -> Result<AdminSite, RegistryError> {
    let mut site = AdminSite::new(GlobalSettings::default());
    site.register(user_admin())?;
    site.register(group_admin())?;
    site.register(permission_admin())?;
    for kind in LookupKind::iter() {
        site.register(lookup_admin(kind))?;
    }
    site.register(log_admin())?;
    Ok(site)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_site_registers_all_models() {
        let site = build_site().unwrap();
        let models: Vec<_> = site.models().map(|a| a.model.as_str()).collect();
        assert_eq!(
            models,
            vec![
                "myuser",
                "mygroup",
                "mypermission",
                "worktype",
                "wagetype",
                "attendanceshift",
                "position",
                "departuretype",
                "log"
            ]
        );
        assert_eq!(site.settings.menu_style, "accordion");
    }

    #[test]
    fn registering_twice_is_rejected() {
        let mut site = build_site().unwrap();
        assert_eq!(
            site.register(group_admin()),
            Err(RegistryError::AlreadyRegistered("mygroup".into()))
        );
    }

    #[test]
    fn unregister_then_register_replaces_options() {
        let mut site = build_site().unwrap();
        site.unregister("mygroup").unwrap();
        assert!(!site.is_registered("mygroup"));
        site.register(group_admin().model_icon("fa fa-group")).unwrap();
        assert_eq!(site.get("mygroup").unwrap().model_icon, "fa fa-group");
        assert!(matches!(
            site.unregister("nope"),
            Err(RegistryError::NotRegistered(_))
        ));
    }

    #[test]
    fn user_admin_changelist_options() {
        let admin = user_admin();
        assert_eq!(admin.list_display.len(), 10);
        assert_eq!(admin.list_display[0], "username");
        assert!(admin.can_filter_by("departure_type"));
        assert!(!admin.can_filter_by("mobile"));
        assert_eq!(admin.search_fields, vec!["username", "email", "name"]);
        assert_eq!(admin.ordering, vec!["username"]);
        assert_eq!(admin.style_fields["groups"], "m2m_transfer");
        assert_eq!(admin.relfield_style.as_deref(), Some("fk-ajax"));
        assert!(admin.is_readonly("operator_last"));
        assert!(!admin.is_readonly("name"));
        assert_eq!(admin.empty_value_display, "");
    }

    #[test]
    fn user_change_layout_groups_fields() {
        let layout = user_admin().form_layout.unwrap();
        let legends: Vec<_> = layout.main.iter().map(|f| f.legend.as_str()).collect();
        assert_eq!(legends, vec!["", "个人信息", "权限", "重要日期"]);
        assert_eq!(layout.side[0].legend, "状态");
        assert!(layout.field_names().contains(&"user_permissions"));
    }

    #[test]
    fn options_with_unknown_fields_cannot_register() {
        let mut site = AdminSite::default();
        let bad = lookup_admin(LookupKind::Position).list_filter(&["colour"]);
        assert!(matches!(
            site.register(bad),
            Err(RegistryError::UnknownFields { .. })
        ));
    }

    #[test]
    fn menu_uses_plural_names_and_icons() {
        let site = build_site().unwrap();
        let menu = site.menu();
        assert_eq!(menu[0].icon, "fa fa-user");
        assert_eq!(menu[3].title, "用工形式");
    }
}
