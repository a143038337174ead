//! Tests for database initialization and schema creation
//!
//! Covers automatic database creation, idempotent re-initialization,
//! default settings, and connection pragmas.

use std::path::PathBuf;
use waxchart_core::db::init::init_database;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let test_db = format!("/tmp/waxchart-test-db-{}.db", std::process::id());
    let db_path = PathBuf::from(&test_db);

    // Ensure database doesn't exist
    let _ = std::fs::remove_file(&db_path);

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");

    // Cleanup
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_database_opens_existing() {
    let test_db = format!("/tmp/waxchart-test-db-existing-{}.db", std::process::id());
    let db_path = PathBuf::from(&test_db);

    let _ = std::fs::remove_file(&db_path);

    let pool1 = init_database(&db_path).await;
    assert!(pool1.is_ok());

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());

    // Cleanup
    drop(pool1);
    drop(pool2);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_all_ledger_tables_created() {
    let test_db = format!("/tmp/waxchart-test-db-tables-{}.db", std::process::id());
    let db_path = PathBuf::from(&test_db);

    let _ = std::fs::remove_file(&db_path);

    let pool = init_database(&db_path).await.unwrap();

    let tables = vec![
        "subjects",
        "accounts",
        "contributions",
        "achievement_badges",
        "ledger_entries",
        "notifications",
        "daily_claims",
        "settings",
    ];

    for table in tables {
        let exists: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();

        assert_eq!(exists, 1, "Table '{}' not created", table);
    }

    // Cleanup
    drop(pool);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_default_settings_initialized() {
    let test_db = format!("/tmp/waxchart-test-db-settings-{}.db", std::process::id());
    let db_path = PathBuf::from(&test_db);

    let _ = std::fs::remove_file(&db_path);

    let pool = init_database(&db_path).await.unwrap();

    let test_cases = vec![
        ("database_busy_timeout_ms", "5000"),
        ("daily_claim_amount", "10"),
    ];

    for (key, expected_value) in test_cases {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&pool)
            .await
            .unwrap();

        assert!(value.is_some(), "Setting '{}' not initialized", key);
        assert_eq!(
            value.unwrap(),
            expected_value,
            "Setting '{}' has wrong default value",
            key
        );
    }

    // Cleanup
    drop(pool);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_idempotent_initialization() {
    let test_db = format!("/tmp/waxchart-test-db-idempotent-{}.db", std::process::id());
    let db_path = PathBuf::from(&test_db);

    let _ = std::fs::remove_file(&db_path);

    let pool1 = init_database(&db_path).await.unwrap();

    let count1: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings")
        .fetch_one(&pool1)
        .await
        .unwrap();

    drop(pool1);

    let pool2 = init_database(&db_path).await.unwrap();

    let count2: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings")
        .fetch_one(&pool2)
        .await
        .unwrap();

    assert_eq!(count1, count2, "Settings count changed on second initialization");

    // Cleanup
    drop(pool2);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_null_value_handling() {
    let test_db = format!("/tmp/waxchart-test-db-null-{}.db", std::process::id());
    let db_path = PathBuf::from(&test_db);

    let _ = std::fs::remove_file(&db_path);

    let pool = init_database(&db_path).await.unwrap();

    // Manually set a setting to NULL
    sqlx::query("UPDATE settings SET value = NULL WHERE key = 'daily_claim_amount'")
        .execute(&pool)
        .await
        .unwrap();

    let value: Option<String> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'daily_claim_amount'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(value.is_none(), "Value should be NULL before re-initialization");

    drop(pool);

    // Re-initialize database (should reset NULL to default)
    let pool2 = init_database(&db_path).await.unwrap();

    let value2: Option<String> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'daily_claim_amount'")
            .fetch_one(&pool2)
            .await
            .unwrap();

    assert!(value2.is_some(), "NULL value was not reset to default");
    assert_eq!(value2.unwrap(), "10", "NULL value was not reset to correct default");

    // Cleanup
    drop(pool2);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_foreign_keys_enabled() {
    let test_db = format!("/tmp/waxchart-test-db-fk-{}.db", std::process::id());
    let db_path = PathBuf::from(&test_db);

    let _ = std::fs::remove_file(&db_path);

    let pool = init_database(&db_path).await.unwrap();

    let fk_enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
        .fetch_one(&pool)
        .await
        .unwrap();

    assert_eq!(fk_enabled, 1, "Foreign keys should be enabled");

    // Cleanup
    drop(pool);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_busy_timeout_set() {
    let test_db = format!("/tmp/waxchart-test-db-timeout-{}.db", std::process::id());
    let db_path = PathBuf::from(&test_db);

    let _ = std::fs::remove_file(&db_path);

    let pool = init_database(&db_path).await.unwrap();

    let timeout: i64 = sqlx::query_scalar("PRAGMA busy_timeout")
        .fetch_one(&pool)
        .await
        .unwrap();

    assert_eq!(timeout, 5000, "Busy timeout should be 5000ms");

    // Cleanup
    drop(pool);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_unique_position_constraint_enforced() {
    let test_db = format!("/tmp/waxchart-test-db-unique-{}.db", std::process::id());
    let db_path = PathBuf::from(&test_db);

    let _ = std::fs::remove_file(&db_path);

    let pool = init_database(&db_path).await.unwrap();

    sqlx::query("INSERT INTO subjects (id, title) VALUES ('s1', 'album')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO accounts (id, display_name) VALUES ('a1', 'user')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO contributions (id, subject_id, account_id, position, submitted_at) \
         VALUES ('c1', 's1', 'a1', 1, CURRENT_TIMESTAMP)",
    )
    .execute(&pool)
    .await
    .unwrap();

    // Same subject and position must be rejected
    let duplicate = sqlx::query(
        "INSERT INTO contributions (id, subject_id, account_id, position, submitted_at) \
         VALUES ('c2', 's1', 'a1', 1, CURRENT_TIMESTAMP)",
    )
    .execute(&pool)
    .await;

    assert!(duplicate.is_err(), "Duplicate (subject, position) should be rejected");

    // Cleanup
    drop(pool);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_concurrent_initialization() {
    let test_db = format!("/tmp/waxchart-test-db-concurrent-{}.db", std::process::id());
    let db_path = PathBuf::from(&test_db);

    let _ = std::fs::remove_file(&db_path);

    // Spawn multiple concurrent initialization tasks
    let mut handles = vec![];

    for _ in 0..5 {
        let db_path_clone = db_path.clone();
        let handle = tokio::spawn(async move { init_database(&db_path_clone).await });
        handles.push(handle);
    }

    let mut results = vec![];
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    for result in &results {
        assert!(result.is_ok(), "Concurrent initialization failed: {:?}", result);
    }

    // Verify database is in consistent state
    let pool = results[0].as_ref().unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings")
        .fetch_one(pool)
        .await
        .unwrap();

    assert!(count >= 2, "Settings not properly initialized after concurrent access");

    // Cleanup
    for result in results {
        drop(result);
    }
    let _ = std::fs::remove_file(&db_path);
}
