//! Configuration resolution for gleaner-acq
//!
//! - Acquisition parameters: TOML `[acquisition]` table, then environment
//!   overrides for the two most commonly tuned values.
//! - Surface credentials: Database → ENV → TOML priority.

use crate::models::AcquisitionParameters;
use crate::surface::Credentials;
use gleaner_common::config::TomlConfig;
use gleaner_common::db::{get_setting, set_setting};
use gleaner_common::{Error, Result};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

pub const MIN_IMAGES_ENV: &str = "GLEANER_MIN_IMAGES_PER_ITEM";
pub const ITEMS_PER_LOCATION_ENV: &str = "GLEANER_ITEMS_PER_LOCATION";
pub const USERNAME_ENV: &str = "GLEANER_SURFACE_USERNAME";
pub const PASSWORD_ENV: &str = "GLEANER_SURFACE_PASSWORD";

pub const SETTING_USERNAME: &str = "surface_username";
pub const SETTING_PASSWORD: &str = "surface_password";

/// Resolve acquisition parameters from TOML and environment
pub fn resolve_parameters(toml_config: &TomlConfig) -> Result<AcquisitionParameters> {
    let mut params = match &toml_config.acquisition {
        Some(table) => AcquisitionParameters::deserialize(table.clone())
            .map_err(|e| Error::Config(format!("Invalid [acquisition] section: {}", e)))?,
        None => AcquisitionParameters::default(),
    };

    if let Some(value) = env_number(MIN_IMAGES_ENV)? {
        params.min_images_per_item = value as usize;
    }
    if let Some(value) = env_number(ITEMS_PER_LOCATION_ENV)? {
        params.items_per_location = value;
    }

    params.validate().map_err(Error::Config)?;
    Ok(params)
}

fn env_number(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} must be a non-negative integer, got {:?}", name, raw))),
        _ => Ok(None),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Resolve surface credentials from 3-tier configuration
///
/// **Priority:** Database → ENV → TOML. Each tier must supply both username
/// and password to count. Returns `None` when no tier is complete.
pub async fn resolve_credentials(
    db: &SqlitePool,
    toml_config: &TomlConfig,
) -> Result<Option<Credentials>> {
    let db_creds = match (
        non_blank(get_setting(db, SETTING_USERNAME).await?),
        non_blank(get_setting(db, SETTING_PASSWORD).await?),
    ) {
        (Some(u), Some(p)) => Some(Credentials::new(u, p)),
        _ => None,
    };

    let env_creds = match (
        non_blank(std::env::var(USERNAME_ENV).ok()),
        non_blank(std::env::var(PASSWORD_ENV).ok()),
    ) {
        (Some(u), Some(p)) => Some(Credentials::new(u, p)),
        _ => None,
    };

    let toml_creds = toml_config.credentials.as_ref().and_then(|c| {
        match (non_blank(c.username.clone()), non_blank(c.password.clone())) {
            (Some(u), Some(p)) => Some(Credentials::new(u, p)),
            _ => None,
        }
    });

    let sources: Vec<&str> = [
        ("database", db_creds.is_some()),
        ("environment", env_creds.is_some()),
        ("TOML", toml_creds.is_some()),
    ]
    .into_iter()
    .filter_map(|(name, present)| present.then_some(name))
    .collect();

    if sources.len() > 1 {
        warn!(
            "Surface credentials found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    if let Some(source) = sources.first() {
        info!("Surface credentials loaded from {}", source);
    }

    Ok(db_creds.or(env_creds).or(toml_creds))
}

/// Store credentials in the database (highest-priority tier)
pub async fn store_credentials(db: &SqlitePool, credentials: &Credentials) -> Result<()> {
    set_setting(db, SETTING_USERNAME, &credentials.username).await?;
    set_setting(db, SETTING_PASSWORD, &credentials.password).await?;
    info!("Surface credentials stored in database");
    Ok(())
}
