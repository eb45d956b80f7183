//! Shared helpers for integration tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use curie_sync::config::AppConfig;
use curie_sync::crypto::{CryptoKey, Keyring, encrypt_bytes};
use curie_sync::models::{patient, wearable_connection};
use curie_sync::server::AppState;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use uuid::Uuid;

// Not every test binary uses every helper.
#[allow(dead_code)]
pub const TEST_CRON_SECRET: &str = "test-cron-secret";

/// Creates a migrated in-memory database
pub async fn setup_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("create in-memory db");
    Migrator::up(&db, None).await.expect("apply migrations");
    db
}

/// Keyring with versions 1 and 2; version 2 is current
#[allow(dead_code)]
pub fn two_version_keyring() -> Keyring {
    let mut keys = BTreeMap::new();
    keys.insert(1, CryptoKey::new(vec![0x11; 32]).expect("valid key"));
    keys.insert(2, CryptoKey::new(vec![0x22; 32]).expect("valid key"));
    Keyring::new(keys, 2).expect("valid keyring")
}

/// Keyring holding only version 1
#[allow(dead_code)]
pub fn single_version_keyring() -> Keyring {
    Keyring::single(CryptoKey::new(vec![0x11; 32]).expect("valid key"))
}

/// Base test configuration with the cron secret set
#[allow(dead_code)]
pub fn test_config() -> AppConfig {
    AppConfig {
        cron_secret: Some(TEST_CRON_SECRET.to_string()),
        ..AppConfig::default()
    }
}

/// Builds application state over a migrated in-memory database
pub async fn test_state(config: AppConfig, keyring: Keyring) -> AppState {
    let db = setup_db().await;
    AppState::new(Arc::new(config), db, keyring)
}

pub async fn seed_patient(db: &DatabaseConnection) -> Uuid {
    let id = Uuid::new_v4();
    patient::ActiveModel {
        id: Set(id),
        display_name: Set("Integration Patient".to_string()),
        created_at: Set(Utc::now().into()),
        updated_at: Set(Utc::now().into()),
    }
    .insert(db)
    .await
    .expect("insert patient");
    id
}

/// Seeds an active connection whose access token is encrypted under keyring
/// version 1
pub async fn seed_connection(
    db: &DatabaseConnection,
    patient_id: Uuid,
    provider: &str,
    external_user_id: &str,
) -> wearable_connection::Model {
    let id = Uuid::new_v4();
    let aad = format!("{}|{}|{}", patient_id, provider, external_user_id);
    let ciphertext = encrypt_bytes(
        &CryptoKey::new(vec![0x11; 32]).expect("valid key"),
        aad.as_bytes(),
        b"provider-access-token",
    )
    .expect("encrypt");

    wearable_connection::ActiveModel {
        id: Set(id),
        patient_id: Set(patient_id),
        provider: Set(provider.to_string()),
        external_user_id: Set(external_user_id.to_string()),
        is_active: Set(true),
        access_token_ciphertext: Set(ciphertext),
        refresh_token_ciphertext: Set(None),
        token_expires_at: Set(None),
        token_version: Set(1),
        last_rotated_at: Set(None),
        last_sync_at: Set(None),
        last_successful_sync_at: Set(None),
        sync_error: Set(None),
        created_at: Set(Utc::now().into()),
        updated_at: Set(Utc::now().into()),
    }
    .insert(db)
    .await
    .expect("insert connection")
}
