//! Per-model admin options.
//!
//! A [`ModelAdmin`] describes the changelist (columns, filters, search,
//! ordering) and the forms (read-only fields, widget styles, layout) of one
//! registered model. Handlers consult it to whitelist query parameters.

use std::collections::BTreeMap;

use serde::Serialize;
use utoipa::ToSchema;

use super::layout::FormLayout;

/// Column that renders the object's display string.
pub const STR_COLUMN: &str = "__str__";

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ModelAdmin {
    pub app_label: String,
    pub model: String,
    pub verbose_name: String,
    pub verbose_name_plural: String,
    /// Model fields, in declaration order
    pub fields: Vec<String>,
    /// Display-only columns computed by the admin (e.g. a formatted label)
    pub computed_columns: Vec<String>,
    pub list_display: Vec<String>,
    pub list_filter: Vec<String>,
    pub search_fields: Vec<String>,
    /// Prefix with `-` for descending
    pub ordering: Vec<String>,
    pub readonly_fields: Vec<String>,
    /// Widget per field, e.g. `m2m_transfer`
    pub style_fields: BTreeMap<String, String>,
    /// Widget for every foreign key, e.g. `fk-ajax`
    pub relfield_style: Option<String>,
    pub model_icon: String,
    /// Rendered in the changelist for empty values
    pub empty_value_display: String,
    /// Fields of the add form, when it differs from the change form
    pub add_form_fields: Option<Vec<String>>,
    pub form_layout: Option<FormLayout>,
    pub list_per_page: Option<u32>,
}

impl ModelAdmin {
    pub fn new(app_label: &str, model: &str, verbose_name: &str) -> Self {
        Self {
            app_label: app_label.to_string(),
            model: model.to_string(),
            verbose_name: verbose_name.to_string(),
            verbose_name_plural: verbose_name.to_string(),
            fields: vec!["id".to_string()],
            computed_columns: vec![],
            list_display: vec![STR_COLUMN.to_string()],
            list_filter: vec![],
            search_fields: vec![],
            ordering: vec![],
            readonly_fields: vec![],
            style_fields: BTreeMap::new(),
            relfield_style: None,
            model_icon: "fa fa-circle".to_string(),
            empty_value_display: "-".to_string(),
            add_form_fields: None,
            form_layout: None,
            list_per_page: None,
        }
    }

    pub fn verbose_name_plural(mut self, name: &str) -> Self {
        self.verbose_name_plural = name.to_string();
        self
    }

    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = std::iter::once("id")
            .chain(fields.iter().copied())
            .map(str::to_string)
            .collect();
        self
    }

    pub fn computed_columns(mut self, columns: &[&str]) -> Self {
        self.computed_columns = to_strings(columns);
        self
    }

    /// Repeated columns are shown once.
    pub fn list_display(mut self, columns: &[&str]) -> Self {
        let mut seen = Vec::with_capacity(columns.len());
        for column in columns {
            if !seen.contains(column) {
                seen.push(*column);
            }
        }
        self.list_display = to_strings(&seen);
        self
    }

    pub fn list_filter(mut self, fields: &[&str]) -> Self {
        self.list_filter = to_strings(fields);
        self
    }

    pub fn search_fields(mut self, fields: &[&str]) -> Self {
        self.search_fields = to_strings(fields);
        self
    }

    pub fn ordering(mut self, fields: &[&str]) -> Self {
        self.ordering = to_strings(fields);
        self
    }

    pub fn readonly_fields(mut self, fields: &[&str]) -> Self {
        self.readonly_fields = to_strings(fields);
        self
    }

    pub fn style_field(mut self, field: &str, style: &str) -> Self {
        self.style_fields.insert(field.to_string(), style.to_string());
        self
    }

    pub fn relfield_style(mut self, style: &str) -> Self {
        self.relfield_style = Some(style.to_string());
        self
    }

    pub fn model_icon(mut self, icon: &str) -> Self {
        self.model_icon = icon.to_string();
        self
    }

    pub fn empty_value_display(mut self, value: &str) -> Self {
        self.empty_value_display = value.to_string();
        self
    }

    pub fn add_form_fields(mut self, fields: &[&str]) -> Self {
        self.add_form_fields = Some(to_strings(fields));
        self
    }

    pub fn form_layout(mut self, layout: FormLayout) -> Self {
        self.form_layout = Some(layout);
        self
    }

    /// Permission string for a CRUD action on this model, e.g. `account.view_myuser`.
    pub fn perm(&self, action: &str) -> String {
        format!("{}.{}_{}", self.app_label, action, self.model)
    }

    pub fn is_readonly(&self, field: &str) -> bool {
        self.readonly_fields.iter().any(|f| f == field)
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    pub fn can_filter_by(&self, field: &str) -> bool {
        self.list_filter.iter().any(|f| f == field)
    }

    /// Changelist columns a client may sort by.
    pub fn can_order_by(&self, field: &str) -> bool {
        self.has_field(field)
            && (self.list_display.iter().any(|f| f == field)
                || self
                    .ordering
                    .iter()
                    .any(|f| f.trim_start_matches('-') == field))
    }

    /// Names referenced by the options that are neither fields nor
    /// computed columns.
    pub fn unknown_fields(&self) -> Vec<String> {
        let known = |name: &str| {
            name == STR_COLUMN
                || self.has_field(name)
                || self.computed_columns.iter().any(|c| c == name)
        };

        let layout_fields = self
            .form_layout
            .as_ref()
            .map(|l| l.field_names())
            .unwrap_or_default();

        let mut unknown: Vec<String> = self
            .list_display
            .iter()
            .map(String::as_str)
            .chain(self.list_filter.iter().map(String::as_str))
            .chain(self.search_fields.iter().map(String::as_str))
            .chain(self.ordering.iter().map(|f| f.trim_start_matches('-')))
            .chain(self.readonly_fields.iter().map(String::as_str))
            .chain(self.style_fields.keys().map(String::as_str))
            .chain(layout_fields)
            .filter(|name| !known(name))
            .map(str::to_string)
            .collect();
        unknown.sort();
        unknown.dedup();
        unknown
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::layout::Fieldset;

    fn position_admin() -> ModelAdmin {
        ModelAdmin::new("account", "position", "职务")
            .fields(&["name"])
            .list_display(&["name", "name", "id"])
            .search_fields(&["name"])
            .ordering(&["-name"])
    }

    #[test]
    fn duplicate_columns_collapse() {
        assert_eq!(position_admin().list_display, vec!["name", "id"]);
    }

    #[test]
    fn perm_uses_app_label_action_and_model() {
        assert_eq!(position_admin().perm("change"), "account.change_position");
    }

    #[test]
    fn ordering_is_limited_to_displayed_or_default_columns() {
        let admin = position_admin();
        assert!(admin.can_order_by("name"));
        assert!(admin.can_order_by("id"));
        assert!(!admin.can_order_by("secret"));
    }

    #[test]
    fn unknown_fields_are_reported() {
        let admin = position_admin()
            .list_filter(&["colour"])
            .form_layout(FormLayout::default().main(Fieldset::new("", &["name", "size"])));
        assert_eq!(admin.unknown_fields(), vec!["colour", "size"]);
    }

    #[test]
    fn str_and_computed_columns_are_known() {
        let admin = ModelAdmin::new("account", "mypermission", "permission")
            .fields(&["name", "codename"])
            .computed_columns(&["show_name"])
            .list_display(&["show_name", "__str__"]);
        assert!(admin.unknown_fields().is_empty());
    }
}
