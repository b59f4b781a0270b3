//! Parameter and credential resolution

use gleaner_acq::config::{
    resolve_credentials, resolve_parameters, store_credentials, ITEMS_PER_LOCATION_ENV,
    MIN_IMAGES_ENV, PASSWORD_ENV, USERNAME_ENV,
};
use gleaner_acq::models::{DedupScope, RotationStrategy};
use gleaner_acq::surface::Credentials;
use gleaner_common::config::{CredentialsConfig, TomlConfig};
use gleaner_common::db::init_database;
use serial_test::serial;
use tempfile::TempDir;

fn toml_with(acquisition: &str) -> TomlConfig {
    toml::from_str(&format!("[acquisition]\n{}", acquisition)).unwrap()
}

fn clear_env() {
    for name in [MIN_IMAGES_ENV, ITEMS_PER_LOCATION_ENV, USERNAME_ENV, PASSWORD_ENV] {
        std::env::remove_var(name);
    }
}

#[test]
#[serial]
fn test_defaults_without_acquisition_section() {
    clear_env();
    let params = resolve_parameters(&TomlConfig::default()).unwrap();
    assert_eq!(params.min_images_per_item, 5);
    assert_eq!(params.items_per_location, 20);
    assert_eq!(params.rotation, RotationStrategy::RoundRobin);
    assert_eq!(params.dedup, DedupScope::PerRun);
}

#[test]
#[serial]
fn test_toml_section_parsed() {
    clear_env();
    let config = toml_with(
        r#"
min_images_per_item = 3
items_per_location = 7
rotation = "least_used"
dedup = "persistent"
seed = 42

[acquisition.intake]
max_width = 800
"#,
    );

    let params = resolve_parameters(&config).unwrap();
    assert_eq!(params.min_images_per_item, 3);
    assert_eq!(params.items_per_location, 7);
    assert_eq!(params.rotation, RotationStrategy::LeastUsed);
    assert_eq!(params.dedup, DedupScope::Persistent);
    assert_eq!(params.seed, Some(42));
    assert_eq!(params.intake.max_width, 800);
    assert_eq!(params.intake.min_dimension, 100);
}

#[test]
#[serial]
fn test_env_overrides_toml() {
    clear_env();
    std::env::set_var(MIN_IMAGES_ENV, "2");
    std::env::set_var(ITEMS_PER_LOCATION_ENV, "9");

    let params = resolve_parameters(&toml_with("min_images_per_item = 3")).unwrap();
    assert_eq!(params.min_images_per_item, 2);
    assert_eq!(params.items_per_location, 9);
    clear_env();
}

#[test]
#[serial]
fn test_invalid_values_rejected() {
    clear_env();
    assert!(resolve_parameters(&toml_with("items_per_location = 0")).is_err());
    assert!(resolve_parameters(&toml_with("rotation = \"sideways\"")).is_err());

    std::env::set_var(MIN_IMAGES_ENV, "many");
    assert!(resolve_parameters(&TomlConfig::default()).is_err());
    clear_env();
}

#[tokio::test]
#[serial]
async fn test_credentials_priority() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let db = init_database(&dir.path().join("gleaner.db")).await.unwrap();
    let toml = TomlConfig {
        credentials: Some(CredentialsConfig {
            username: Some("toml-user".to_string()),
            password: Some("toml-pass".to_string()),
        }),
        ..Default::default()
    };

    let creds = resolve_credentials(&db, &toml).await.unwrap().unwrap();
    assert_eq!(creds.username, "toml-user");

    std::env::set_var(USERNAME_ENV, "env-user");
    std::env::set_var(PASSWORD_ENV, "env-pass");
    let creds = resolve_credentials(&db, &toml).await.unwrap().unwrap();
    assert_eq!(creds.username, "env-user");

    store_credentials(&db, &Credentials::new("db-user", "db-pass"))
        .await
        .unwrap();
    let creds = resolve_credentials(&db, &toml).await.unwrap().unwrap();
    assert_eq!(creds.username, "db-user");
    assert_eq!(creds.password, "db-pass");
    clear_env();
}

#[tokio::test]
#[serial]
async fn test_incomplete_credentials_ignored() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let db = init_database(&dir.path().join("gleaner.db")).await.unwrap();

    std::env::set_var(USERNAME_ENV, "env-user");
    let toml = TomlConfig {
        credentials: Some(CredentialsConfig {
            username: Some("toml-user".to_string()),
            password: Some("  ".to_string()),
        }),
        ..Default::default()
    };

    assert!(resolve_credentials(&db, &toml).await.unwrap().is_none());
    clear_env();
}
