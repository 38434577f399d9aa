/// Localized templates for the CRUD action prefixes of a codename.
const ACTION_NAME: [(&str, &str); 5] = [
    ("add", "Can add %s"),
    ("change", "Can change %s"),
    ("edit", "Can edit %s"),
    ("delete", "Can delete %s"),
    ("view", "Can view %s"),
];

fn action_template(action: &str) -> Option<&'static str> {
    ACTION_NAME
        .iter()
        .find(|(prefix, _)| *prefix == action)
        .map(|(_, template)| *template)
}

/// Human label for a permission.
///
/// The action is the codename up to its first `_`. Known actions render
/// through their template with the content type's name substituted;
/// anything else falls back to the permission's stored `name`.
pub fn permission_label(codename: &str, content_type_name: &str, name: &str) -> String {
    let action = codename.split('_').next().unwrap_or(codename);
    match action_template(action) {
        Some(template) => template.replacen("%s", content_type_name, 1),
        None => name.to_string(),
    }
}

/// Departments are labelled by their name alone.
pub fn group_label(name: &str) -> String {
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_actions_use_template() {
        assert_eq!(permission_label("add_myuser", "user", "ignored"), "Can add user");
        assert_eq!(permission_label("change_position", "职务", "x"), "Can change 职务");
        assert_eq!(permission_label("edit_wagetype", "用工类型", "x"), "Can edit 用工类型");
        assert_eq!(permission_label("delete_mygroup", "部门", "x"), "Can delete 部门");
        assert_eq!(permission_label("view_log", "log entry", "x"), "Can view log entry");
    }

    #[test]
    fn unknown_action_falls_back_to_name() {
        assert_eq!(
            permission_label("export_payroll", "payroll", "Can export payroll"),
            "Can export payroll"
        );
    }

    #[test]
    fn codename_without_underscore_is_its_own_action() {
        assert_eq!(permission_label("view", "user", "fallback"), "Can view user");
        assert_eq!(permission_label("approve", "user", "fallback"), "fallback");
    }

    #[test]
    fn action_match_is_exact_prefix() {
        // "adder" is not "add"
        assert_eq!(permission_label("adder_x", "thing", "Adder"), "Adder");
    }

    #[test]
    fn groups_are_labelled_by_name() {
        assert_eq!(group_label("财务部"), "财务部");
    }
}
