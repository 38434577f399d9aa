use crate::admin::{
    layout::{Fieldset, FormLayout, LayoutItem},
    options::ModelAdmin,
    site::{GlobalSettings, MenuEntry},
};
use crate::api::{
    Choice,
    admin_meta::SiteInfo,
    groups::{GroupDetail, GroupForm},
    logs::LogRow,
    lookups::LookupForm,
    permissions::{PermissionForm, PermissionView},
    users::{CreateUserForm, PasswordForm, UpdateUserForm, UserDetail},
};
use crate::auth::handlers::LoginResponse;
use crate::model::{
    content_type::ContentType,
    group::MyGroup,
    lookup::Lookup,
    permission::{MyPermission, PermissionDetail},
    user::{Gender, MyUser, UserFields},
};
use crate::models::LoginReqDto;
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HR Admin API",
        version = "1.0.0",
        description = r#"
## HR / Attendance Admin Backend

JSON admin panel for an HR and attendance system.

### Key Features
- **Users**: employee accounts with departments, permissions and operator stamping
- **Departments**: groups whose permissions their members inherit
- **Permissions**: per content type, labelled "Can add/change/delete/view ..."
- **Lookups**: work type, wage type, attendance shift, position, departure type
- **Admin metadata**: list columns, filters, search fields and form layouts per model
- **Action log**: every admin write is recorded

### Security
Endpoints under `/api` need a **JWT Bearer** access token of a staff account,
plus the model permission the route names.

### List endpoints
`p` page, `per_page`, `q` search, `o` ordering (`-` for descending);
any other parameter is a filter from the model's `list_filter`.
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,

        crate::api::admin_meta::site_info,
        crate::api::admin_meta::model_options,

        crate::api::users::list_users,
        crate::api::users::get_user,
        crate::api::users::create_user_handler,
        crate::api::users::update_user,
        crate::api::users::set_password,
        crate::api::users::delete_user,

        crate::api::groups::group_choices,
        crate::api::groups::list_groups,
        crate::api::groups::get_group,
        crate::api::groups::create_group,
        crate::api::groups::update_group,
        crate::api::groups::delete_group,

        crate::api::permissions::list_permissions,
        crate::api::permissions::get_permission,
        crate::api::permissions::create_permission,
        crate::api::permissions::update_permission,
        crate::api::permissions::delete_permission,
        crate::api::content_types::list_content_types,

        crate::api::lookups::list_lookups,
        crate::api::lookups::get_lookup,
        crate::api::lookups::create_lookup,
        crate::api::lookups::update_lookup,
        crate::api::lookups::delete_lookup,

        crate::api::logs::list_logs
    ),
    components(
        schemas(
            LoginReqDto,
            LoginResponse,
            SiteInfo,
            GlobalSettings,
            MenuEntry,
            ModelAdmin,
            FormLayout,
            Fieldset,
            LayoutItem,
            MyUser,
            UserFields,
            Gender,
            UserDetail,
            CreateUserForm,
            UpdateUserForm,
            PasswordForm,
            MyGroup,
            GroupForm,
            GroupDetail,
            MyPermission,
            PermissionDetail,
            PermissionForm,
            PermissionView,
            ContentType,
            Lookup,
            LookupForm,
            LogRow,
            Choice
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login, token refresh and logout"),
        (name = "Admin", description = "Site settings and per-model admin options"),
        (name = "User", description = "Employee accounts"),
        (name = "Group", description = "Departments"),
        (name = "Permission", description = "Permissions and content types"),
        (name = "Lookup", description = "Work type, wage type, attendance shift, position, departure type"),
        (name = "Log", description = "Admin action log"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_admin_routes_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/users/{id}/password"));
        assert!(doc.paths.paths.contains_key("/api/lookups/{kind}/{id}"));
        assert!(doc.paths.paths.contains_key("/auth/login"));
        let components = doc.components.unwrap();
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(components.schemas.contains_key("ModelAdmin"));
    }
}
