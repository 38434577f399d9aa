use std::collections::HashSet;

use sqlx::MySqlPool;
use tracing::debug;

use crate::error::{AppError, AppResult};

/// Everything needed to answer permission questions about one user.
///
/// Permissions are `"<app_label>.<codename>"` strings.
#[derive(Debug, Clone, Default)]
pub struct UserPerms {
    pub user_id: Option<u64>,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub direct: HashSet<String>,
    pub via_groups: HashSet<String>,
}

impl UserPerms {
    /// No identity, no permissions.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none()
    }

    /// Permissions granted through the user's departments.
    pub fn group_permissions(&self) -> HashSet<String> {
        if !self.is_active || self.is_anonymous() {
            return HashSet::new();
        }
        self.via_groups.clone()
    }

    pub fn all_permissions(&self) -> HashSet<String> {
        if !self.is_active || self.is_anonymous() {
            return HashSet::new();
        }
        self.direct.union(&self.via_groups).cloned().collect()
    }

    /// Active superusers hold every permission.
    pub fn has_perm(&self, perm: &str) -> bool {
        if self.is_active && self.is_superuser {
            return true;
        }
        self.is_active && (self.direct.contains(perm) || self.via_groups.contains(perm))
    }

    pub fn has_perms<S: AsRef<str>>(&self, perms: &[S]) -> bool {
        perms.iter().all(|p| self.has_perm(p.as_ref()))
    }

    /// Whether the user holds any permission in `app_label`.
    pub fn has_module_perms(&self, app_label: &str) -> bool {
        if self.is_active && self.is_superuser {
            return true;
        }
        let prefix = format!("{app_label}.");
        self.all_permissions().iter().any(|p| p.starts_with(&prefix))
    }

    /// Admin access needs an active staff account plus `perm`.
    pub fn require(&self, perm: &str) -> AppResult<()> {
        if !self.is_active || !self.is_staff {
            return Err(AppError::PermissionDenied("Staff only".into()));
        }
        if !self.has_perm(perm) {
            return Err(AppError::PermissionDenied(format!("Missing permission {perm}")));
        }
        Ok(())
    }

    pub fn require_staff(&self) -> AppResult<()> {
        if self.is_active && self.is_staff {
            Ok(())
        } else {
            Err(AppError::PermissionDenied("Staff only".into()))
        }
    }
}

/// Loads flags, direct permissions and department permissions of a user.
/// A user that no longer exists resolves to the anonymous set.
pub async fn load_user_perms(pool: &MySqlPool, user_id: u64) -> AppResult<UserPerms> {
    let flags = sqlx::query_as::<_, (bool, bool, bool)>(
        "SELECT is_active, is_staff, is_superuser FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    let Some((is_active, is_staff, is_superuser)) = flags else {
        return Ok(UserPerms::anonymous());
    };

    let direct = sqlx::query_as::<_, (String, String)>(
        r#"
        SELECT ct.app_label, p.codename
        FROM user_permissions up
        JOIN permissions p ON p.id = up.permission_id
        JOIN content_types ct ON ct.id = p.content_type_id
        WHERE up.user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let via_groups = sqlx::query_as::<_, (String, String)>(
        r#"
        SELECT DISTINCT ct.app_label, p.codename
        FROM user_groups ug
        JOIN group_permissions gp ON gp.group_id = ug.group_id
        JOIN permissions p ON p.id = gp.permission_id
        JOIN content_types ct ON ct.id = p.content_type_id
        WHERE ug.user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    debug!(
        user_id,
        direct = direct.len(),
        via_groups = via_groups.len(),
        "Loaded user permissions"
    );

    let join = |(app, codename): (String, String)| format!("{app}.{codename}");
    Ok(UserPerms {
        user_id: Some(user_id),
        is_active,
        is_staff,
        is_superuser,
        direct: direct.into_iter().map(join).collect(),
        via_groups: via_groups.into_iter().map(join).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staff(direct: &[&str], via_groups: &[&str]) -> UserPerms {
        UserPerms {
            user_id: Some(3),
            is_active: true,
            is_staff: true,
            is_superuser: false,
            direct: direct.iter().map(|s| s.to_string()).collect(),
            via_groups: via_groups.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn active_superuser_has_everything() {
        let mut user = staff(&[], &[]);
        user.is_superuser = true;
        assert!(user.has_perm("account.delete_myuser"));
        assert!(user.has_module_perms("anything"));
    }

    #[test]
    fn inactive_superuser_has_nothing() {
        let mut user = staff(&["account.view_myuser"], &[]);
        user.is_superuser = true;
        user.is_active = false;
        assert!(!user.has_perm("account.view_myuser"));
        assert!(user.all_permissions().is_empty());
        assert!(user.require("account.view_myuser").is_err());
    }

    #[test]
    fn department_permissions_are_inherited() {
        let user = staff(&["account.view_myuser"], &["account.change_myuser"]);
        assert!(user.has_perm("account.change_myuser"));
        assert!(user.has_perms(&["account.view_myuser", "account.change_myuser"]));
        assert!(!user.has_perms(&["account.view_myuser", "account.delete_myuser"]));
        assert_eq!(user.all_permissions().len(), 2);
        assert_eq!(user.group_permissions().len(), 1);
    }

    #[test]
    fn module_perms_match_app_label_prefix() {
        let user = staff(&["xadmin.view_log"], &[]);
        assert!(user.has_module_perms("xadmin"));
        assert!(!user.has_module_perms("account"));
        assert!(!user.has_module_perms("xadm"));
    }

    #[test]
    fn anonymous_user_is_denied() {
        let anon = UserPerms::anonymous();
        assert!(anon.is_anonymous());
        assert!(!anon.has_perm("account.view_myuser"));
        assert!(anon.group_permissions().is_empty());
        assert!(anon.require_staff().is_err());
    }

    #[test]
    fn non_staff_cannot_use_admin_even_with_perm() {
        let mut user = staff(&["account.view_myuser"], &[]);
        user.is_staff = false;
        assert!(matches!(
            user.require("account.view_myuser"),
            Err(AppError::PermissionDenied(_))
        ));
    }
}
