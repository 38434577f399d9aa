use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload};
use futures::future::{Ready, ready};
use sqlx::MySqlPool;

use crate::auth::permissions::{UserPerms, load_user_perms};
use crate::error::{AppError, AppResult};

/// The session user acting on this request, set by the auth middleware.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    /// Client address, recorded in the admin log
    pub ip_addr: Option<String>,
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or_else(|| AppError::Unauthorized("Missing token".into())),
        )
    }
}

impl AuthUser {
    pub async fn perms(&self, pool: &MySqlPool) -> AppResult<UserPerms> {
        load_user_perms(pool, self.user_id).await
    }

    /// Loads the user's permissions and fails unless they are active staff
    /// holding `perm`.
    pub async fn require(&self, pool: &MySqlPool, perm: &str) -> AppResult<UserPerms> {
        let perms = self.perms(pool).await?;
        perms.require(perm)?;
        Ok(perms)
    }

    pub async fn require_staff(&self, pool: &MySqlPool) -> AppResult<UserPerms> {
        let perms = self.perms(pool).await?;
        perms.require_staff()?;
        Ok(perms)
    }
}
