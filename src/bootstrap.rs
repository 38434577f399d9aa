//! Startup data: default permissions for every registered model, and
//! `hradmin createsuperuser` so the first staff user can log in.

use std::env;

use anyhow::{Context, Result, bail};
use sqlx::MySqlPool;
use tracing::info;

use crate::admin::site::AdminSite;
use crate::api::users::{insert_user, is_username_available};
use crate::model::permission::{DEFAULT_ACTIONS, default_codenames};
use crate::model::user::{UserFields, create_superuser};
use crate::utils::{username_cache, username_filter};

pub const COMMAND: &str = "createsuperuser";

pub struct SuperuserArgs {
    pub username: String,
    pub email: Option<String>,
    pub password: String,
}

impl SuperuserArgs {
    /// Reads `SUPERUSER_USERNAME`, `SUPERUSER_PASSWORD` and the optional
    /// `SUPERUSER_EMAIL`.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            username: env::var("SUPERUSER_USERNAME").context("SUPERUSER_USERNAME must be set")?,
            email: env::var("SUPERUSER_EMAIL").ok().filter(|e| !e.trim().is_empty()),
            password: env::var("SUPERUSER_PASSWORD").context("SUPERUSER_PASSWORD must be set")?,
        })
    }
}

pub async fn create_superuser_account(pool: &MySqlPool, args: &SuperuserArgs) -> Result<u64> {
    if args.password.is_empty() {
        bail!("SUPERUSER_PASSWORD must not be empty");
    }
    if !is_username_available(pool, args.username.trim()).await? {
        bail!("username {} is already taken", args.username.trim());
    }

    let draft = create_superuser(
        &args.username,
        args.email.as_deref(),
        &args.password,
        UserFields::default(),
    )?;

    let mut tx = pool.begin().await?;
    let id = insert_user(&mut tx, &draft).await?;
    tx.commit().await?;

    username_filter::insert(&draft.username);
    username_cache::mark_taken(&draft.username).await;

    info!(id, username = %draft.username, "Superuser created");
    Ok(id)
}

/// Ensures every registered model has a content type and its
/// add/change/delete/view permissions. Existing rows are left alone.
pub async fn sync_permissions(pool: &MySqlPool, site: &AdminSite) -> Result<u64> {
    let mut created = 0;
    let mut tx = pool.begin().await?;
    for admin in site.models() {
        sqlx::query("INSERT IGNORE INTO content_types (app_label, model, name) VALUES (?, ?, ?)")
            .bind(&admin.app_label)
            .bind(&admin.model)
            .bind(&admin.verbose_name)
            .execute(&mut *tx)
            .await?;

        for (action, codename) in DEFAULT_ACTIONS.iter().zip(default_codenames(&admin.model)) {
            created += sqlx::query(
                r#"
                INSERT IGNORE INTO permissions (name, content_type_id, codename)
                SELECT ?, id, ? FROM content_types WHERE app_label = ? AND model = ?
                "#,
            )
            .bind(format!("Can {action} {}", admin.verbose_name))
            .bind(codename)
            .bind(&admin.app_label)
            .bind(&admin.model)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
    }
    tx.commit().await?;

    log::info!("Permission sync complete: {} new permissions", created);
    Ok(created)
}
