use actix_web::{HttpResponse, web};
use serde::Serialize;
use sqlx::MySqlPool;
use tracing::instrument;
use utoipa::ToSchema;

use crate::{
    admin::{
        options::ModelAdmin,
        site::{AdminSite, GlobalSettings, MenuEntry},
    },
    api::not_registered,
    auth::{auth::AuthUser, permissions::UserPerms},
    error::AppResult,
};

#[derive(Serialize, ToSchema)]
pub struct SiteInfo {
    pub settings: GlobalSettings,
    /// Only the models the caller may view
    pub menu: Vec<MenuEntry>,
    /// App labels the caller holds any permission in
    pub apps: Vec<String>,
    pub username: String,
}

fn visible_apps(site: &AdminSite, perms: &UserPerms) -> Vec<String> {
    let mut apps: Vec<String> = Vec::new();
    for admin in site.models() {
        if !apps.contains(&admin.app_label) && perms.has_module_perms(&admin.app_label) {
            apps.push(admin.app_label.clone());
        }
    }
    apps
}

fn visible_menu(site: &AdminSite, perms: &UserPerms) -> Vec<MenuEntry> {
    site.models()
        .zip(site.menu())
        .filter(|(admin, _)| perms.has_perm(&admin.perm("view")))
        .map(|(_, entry)| entry)
        .collect()
}

/// Site settings and menu
#[utoipa::path(
    get,
    path = "/api/admin/site",
    responses(
        (status = 200, description = "Site title, footer and menu", body = SiteInfo),
        (status = 403, description = "Not staff")
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
#[instrument(name = "admin_site", skip_all, fields(user_id = auth.user_id))]
pub async fn site_info(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    site: web::Data<AdminSite>,
) -> AppResult<HttpResponse> {
    let perms = auth.require_staff(pool.get_ref()).await?;
    Ok(HttpResponse::Ok().json(SiteInfo {
        settings: site.settings.clone(),
        menu: visible_menu(&site, &perms),
        apps: visible_apps(&site, &perms),
        username: auth.username,
    }))
}

/// Admin options of one model: columns, filters, search, layout
#[utoipa::path(
    get,
    path = "/api/admin/models/{model}",
    params(("model", Path, description = "e.g. myuser, mygroup, position, log")),
    responses(
        (status = 200, description = "Model admin options", body = ModelAdmin),
        (status = 403, description = "Missing view permission"),
        (status = 404, description = "Model not registered")
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn model_options(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    site: web::Data<AdminSite>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let model = path.into_inner();
    let admin = site.get(&model).ok_or_else(|| not_registered(&model))?;
    auth.require(pool.get_ref(), &admin.perm("view")).await?;
    Ok(HttpResponse::Ok().json(admin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::site::build_site;
    use std::collections::HashSet;

    fn staff_with(perms: &[&str]) -> UserPerms {
        UserPerms {
            user_id: Some(3),
            is_active: true,
            is_staff: true,
            is_superuser: false,
            direct: perms.iter().map(|p| p.to_string()).collect(),
            via_groups: HashSet::new(),
        }
    }

    #[test]
    fn menu_only_lists_viewable_models() {
        let site = build_site().unwrap();
        let perms = staff_with(&["account.view_position", "xadmin.view_log"]);
        let models: Vec<_> = visible_menu(&site, &perms)
            .into_iter()
            .map(|e| e.model)
            .collect();
        assert_eq!(models, vec!["position", "log"]);
        assert_eq!(visible_apps(&site, &perms), vec!["account", "xadmin"]);
    }

    #[test]
    fn apps_without_permissions_are_hidden() {
        let site = build_site().unwrap();
        let perms = staff_with(&["account.change_myuser"]);
        assert_eq!(visible_apps(&site, &perms), vec!["account"]);
        assert!(visible_menu(&site, &perms).is_empty());
    }

    #[test]
    fn superuser_sees_every_model() {
        let site = build_site().unwrap();
        let mut perms = staff_with(&[]);
        perms.is_superuser = true;
        assert_eq!(visible_menu(&site, &perms).len(), site.models().count());
    }
}
