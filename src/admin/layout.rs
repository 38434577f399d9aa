use serde::Serialize;
use utoipa::ToSchema;

/// A field slot inside a fieldset: a single field, or several side by side.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayoutItem {
    Field { name: String },
    Row { fields: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Fieldset {
    pub legend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub css_class: Option<String>,
    pub items: Vec<LayoutItem>,
}

impl Fieldset {
    pub fn new(legend: &str, fields: &[&str]) -> Self {
        Self {
            legend: legend.to_string(),
            css_class: None,
            items: fields
                .iter()
                .map(|f| LayoutItem::Field { name: f.to_string() })
                .collect(),
        }
    }

    pub fn css_class(mut self, class: &str) -> Self {
        self.css_class = Some(class.to_string());
        self
    }

    pub fn row(mut self, fields: &[&str]) -> Self {
        self.items.push(LayoutItem::Row {
            fields: fields.iter().map(|f| f.to_string()).collect(),
        });
        self
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().flat_map(|item| match item {
            LayoutItem::Field { name } => vec![name.as_str()],
            LayoutItem::Row { fields } => fields.iter().map(String::as_str).collect(),
        })
    }
}

/// A two-column change form: the wide main column and a side column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct FormLayout {
    pub main: Vec<Fieldset>,
    pub side: Vec<Fieldset>,
}

impl FormLayout {
    pub fn main(mut self, fieldset: Fieldset) -> Self {
        self.main.push(fieldset);
        self
    }

    pub fn side(mut self, fieldset: Fieldset) -> Self {
        self.side.push(fieldset);
        self
    }

    /// Every field placed anywhere in the layout, in reading order.
    pub fn field_names(&self) -> Vec<&str> {
        self.main
            .iter()
            .chain(self.side.iter())
            .flat_map(Fieldset::field_names)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_walk_main_then_side() {
        let layout = FormLayout::default()
            .main(Fieldset::new("", &["username", "password"]).css_class("unsort no_title"))
            .main(Fieldset::new("个人信息", &["name"]).row(&["mobile", "email"]))
            .side(Fieldset::new("状态", &["is_active"]));

        assert_eq!(
            layout.field_names(),
            vec!["username", "password", "name", "mobile", "email", "is_active"]
        );
        assert_eq!(layout.main[0].css_class.as_deref(), Some("unsort no_title"));
    }

    #[test]
    fn serializes_items_with_type_tag() {
        let fs = Fieldset::new("权限", &["groups"]).row(&["a", "b"]);
        let json = serde_json::to_value(&fs).unwrap();
        assert_eq!(json["items"][0]["type"], "field");
        assert_eq!(json["items"][1]["type"], "row");
        assert!(json.get("css_class").is_none());
    }
}
