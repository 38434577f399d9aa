use crate::{
    auth::{
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        password::verify_password,
    },
    config::Config,
    error::{AppError, AppResult},
    models::{Claims, LoginReqDto, TokenType, UserSql},
};
use actix_web::{HttpRequest, HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;

#[derive(Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    access_token: String,
    refresh_token: String,
}

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

fn token_error(e: jsonwebtoken::errors::Error) -> AppError {
    AppError::Internal(format!("token encoding failed: {e}"))
}

/// Issues a token pair and records the refresh token's jti.
async fn issue_tokens(
    pool: &MySqlPool,
    config: &Config,
    user_id: u64,
    username: &str,
) -> AppResult<LoginResponse> {
    debug!("Generating access token");
    let access_token = generate_access_token(
        user_id,
        username.to_string(),
        &config.jwt_secret,
        config.access_token_ttl,
    )
    .map_err(token_error)?;

    debug!("Generating refresh token");
    let (refresh_token, refresh_claims) = generate_refresh_token(
        user_id,
        username.to_string(),
        &config.jwt_secret,
        config.refresh_token_ttl,
    )
    .map_err(token_error)?;

    debug!(user_id, jti = %refresh_claims.jti, "Storing refresh token");
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(user_id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as i64)
    .execute(pool)
    .await?;

    Ok(LoginResponse {
        access_token,
        refresh_token,
    })
}

/// Log in
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Token pair issued", body = LoginResponse),
        (status = 400, description = "Username or password missing"),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(username = %user.username)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    info!("Login request received");

    if user.username.trim().is_empty() || user.password.is_empty() {
        info!("Validation failed: empty username or password");
        return Err(AppError::field("username", "Username or password required"));
    }

    debug!("Fetching user from database");
    let db_user = sqlx::query_as::<_, UserSql>(
        r#"
        SELECT id, username, password, is_staff, is_active
        FROM users
        WHERE username = ?
        "#,
    )
    .bind(user.username.trim())
    .fetch_optional(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, "Database error while fetching user");
        AppError::Database(e)
    })?;

    let Some(db_user) = db_user else {
        info!("Invalid credentials: user not found");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    };

    debug!("Verifying password");
    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    if !db_user.is_active {
        info!(user_id = db_user.id, "Login refused: account inactive");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }
    if !db_user.is_staff {
        info!(user_id = db_user.id, "Login refused: not staff");
        return Err(AppError::PermissionDenied(
            "This account cannot log into the admin site".into(),
        ));
    }

    let tokens = issue_tokens(pool.get_ref(), &config, db_user.id, &db_user.username).await?;

    debug!("Updating last_login");
    if let Err(e) = sqlx::query("UPDATE users SET last_login = NOW() WHERE id = ?")
        .bind(db_user.id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login");
        // intentionally not failing login
    }

    info!("Login successful");
    Ok(HttpResponse::Ok().json(tokens))
}

fn refresh_claims(req: &HttpRequest, config: &Config) -> Option<Claims> {
    let claims = verify_token(bearer(req)?, &config.jwt_secret).ok()?;
    (claims.token_type == TokenType::Refresh).then_some(claims)
}

/// Rotate the refresh token
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = LoginResponse),
        (status = 401, description = "Refresh token invalid, revoked or expired")
    ),
    tag = "Auth",
    security(("bearer_auth" = []))
)]
#[instrument(name = "auth_refresh", skip_all)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let claims = refresh_claims(&req, &config)
        .ok_or_else(|| AppError::Unauthorized("Invalid token".into()))?;

    let record = sqlx::query_as::<_, (u64, u64, bool)>(
        r#"
        SELECT id, user_id, revoked
        FROM refresh_tokens
        WHERE jti = ?
        "#,
    )
    .bind(&claims.jti)
    .fetch_optional(pool.get_ref())
    .await?;

    let (record_id, user_id) = match record {
        Some((id, user_id, false)) => (id, user_id),
        _ => return Err(AppError::Unauthorized("Invalid token".into())),
    };

    // Accounts switched off since login lose their session.
    let active = sqlx::query_scalar::<_, bool>("SELECT is_active FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool.get_ref())
        .await?
        .unwrap_or(false);
    if !active {
        return Err(AppError::Unauthorized("Invalid token".into()));
    }

    sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = ?")
        .bind(record_id)
        .execute(pool.get_ref())
        .await?;

    let tokens = issue_tokens(pool.get_ref(), &config, user_id, &claims.sub).await?;
    info!(user_id, "Refresh token rotated");
    Ok(HttpResponse::Ok().json(tokens))
}

/// Log out (revokes the refresh token; always 204)
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Logged out")),
    tag = "Auth",
    security(("bearer_auth" = []))
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> HttpResponse {
    let Some(claims) = refresh_claims(&req, &config) else {
        return HttpResponse::NoContent().finish();
    };

    // idempotent: unknown jti is fine
    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token");
    }

    HttpResponse::NoContent().finish()
}
