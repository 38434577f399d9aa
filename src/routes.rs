use crate::{
    api::{admin_meta, content_types, groups, logs, lookups, permissions, users},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

// Per-route limiter; a zero rate still lets one request through per minute.
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond((60_000 / u64::from(requests_per_min)).max(1))
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_default();
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .configure(admin_routes),
    );
}

/// Everything behind the bearer token, relative to the API prefix.
pub fn admin_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .service(web::resource("/site").route(web::get().to(admin_meta::site_info)))
            .service(
                web::resource("/models/{model}").route(web::get().to(admin_meta::model_options)),
            ),
    )
    .service(
        web::scope("/users")
            // /users
            .service(
                web::resource("")
                    .route(web::get().to(users::list_users))
                    .route(web::post().to(users::create_user_handler)),
            )
            // /users/{id}
            .service(
                web::resource("/{id}")
                    .route(web::get().to(users::get_user))
                    .route(web::put().to(users::update_user))
                    .route(web::delete().to(users::delete_user)),
            )
            // /users/{id}/password
            .service(web::resource("/{id}/password").route(web::put().to(users::set_password))),
    )
    .service(
        web::scope("/groups")
            .service(
                web::resource("")
                    .route(web::get().to(groups::list_groups))
                    .route(web::post().to(groups::create_group)),
            )
            // registered ahead of /{id} so "choices" is not taken as an id
            .service(web::resource("/choices").route(web::get().to(groups::group_choices)))
            .service(
                web::resource("/{id}")
                    .route(web::get().to(groups::get_group))
                    .route(web::put().to(groups::update_group))
                    .route(web::delete().to(groups::delete_group)),
            ),
    )
    .service(
        web::scope("/permissions")
            .service(
                web::resource("")
                    .route(web::get().to(permissions::list_permissions))
                    .route(web::post().to(permissions::create_permission)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(permissions::get_permission))
                    .route(web::put().to(permissions::update_permission))
                    .route(web::delete().to(permissions::delete_permission)),
            ),
    )
    .service(
        web::resource("/content-types").route(web::get().to(content_types::list_content_types)),
    )
    .service(
        web::scope("/lookups/{kind}")
            .service(
                web::resource("")
                    .route(web::get().to(lookups::list_lookups))
                    .route(web::post().to(lookups::create_lookup)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(lookups::get_lookup))
                    .route(web::put().to(lookups::update_lookup))
                    .route(web::delete().to(lookups::delete_lookup)),
            ),
    )
    .service(web::resource("/logs").route(web::get().to(logs::list_logs)));
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ returns a new token pair, old refresh token revoked
