//! Contract tests against the sqlite adapter.
//!
//! These exercise the whole driver surface end to end on throwaway archive
//! files: database lifecycle, taxonomy guarantees, cursor behavior, schema
//! introspection and transaction visibility. The same contract holds for
//! the server backends; sqlite is the backend a test run can always reach.

use seriesdb::{Connection, DbConfig, ErrorKind, SqlValue, Transaction};
use tempfile::TempDir;

/// A configuration pointing into a fresh temp directory. The directory
/// guard must stay alive for the duration of the test.
fn temp_config(dir: &TempDir) -> DbConfig {
    init_logging();
    let path = dir.path().join("archive.sdb");
    DbConfig::new("sqlite", path.to_str().unwrap())
}

/// Surface driver tracing when a test run sets RUST_LOG.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Create the database and open a connection to it.
async fn setup(dir: &TempDir) -> Box<dyn Connection> {
    let config = temp_config(dir);
    seriesdb::create_database(&config).await.unwrap();
    seriesdb::connect(&config).await.unwrap()
}

/// Create the canonical two-column test table.
async fn create_test_table(conn: &mut dyn Connection) {
    let mut cursor = conn.cursor().unwrap();
    cursor
        .execute(
            "CREATE TABLE `records` (`id` INTEGER PRIMARY KEY, `name` TEXT)",
            &[],
        )
        .await
        .unwrap();
}

// ============================================================================
// Database lifecycle
// ============================================================================

#[tokio::test]
async fn create_connect_drop_round_trip() {
    let dir = TempDir::new().unwrap();
    let config = temp_config(&dir);

    seriesdb::create_database(&config).await.unwrap();
    let mut conn = seriesdb::connect(&config).await.unwrap();
    assert!(conn.is_open());
    assert_eq!(conn.database_name(), config.database);
    conn.close().await.unwrap();

    seriesdb::drop_database(&config).await.unwrap();
    assert!(!std::path::Path::new(&config.database).exists());
}

#[tokio::test]
async fn create_twice_fails_with_database_exists() {
    let dir = TempDir::new().unwrap();
    let config = temp_config(&dir);

    seriesdb::create_database(&config).await.unwrap();
    let err = seriesdb::create_database(&config).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DatabaseExists);
}

#[tokio::test]
async fn connect_to_missing_database_fails_with_no_database() {
    let dir = TempDir::new().unwrap();
    let config = temp_config(&dir);

    let err = seriesdb::connect(&config).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoDatabase);
}

#[tokio::test]
async fn drop_missing_database_fails_with_no_database() {
    let dir = TempDir::new().unwrap();
    let config = temp_config(&dir);

    let err = seriesdb::drop_database(&config).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoDatabase);
}

#[tokio::test]
async fn in_memory_database_needs_no_create() {
    let config = DbConfig::new("sqlite", ":memory:");
    let mut conn = seriesdb::connect(&config).await.unwrap();
    create_test_table(conn.as_mut()).await;
    assert_eq!(conn.tables().await.unwrap(), vec!["records".to_string()]);
}

#[tokio::test]
async fn unknown_driver_fails_with_programming_error() {
    let config = DbConfig::new("oracle", "whatever");
    let err = seriesdb::connect(&config).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Programming);
}

// ============================================================================
// Cursor behavior
// ============================================================================

#[tokio::test]
async fn select_one_yields_one_row_then_end() {
    let dir = TempDir::new().unwrap();
    let mut conn = setup(&dir).await;

    let mut cursor = conn.cursor().unwrap();
    cursor.execute("select 1", &[]).await.unwrap();
    assert_eq!(cursor.fetchone(), Some(vec![SqlValue::Int(1)]));
    assert_eq!(cursor.fetchone(), None);
    assert_eq!(cursor.fetchone(), None);
}

#[tokio::test]
async fn iteration_is_lazy_single_pass() {
    let dir = TempDir::new().unwrap();
    let mut conn = setup(&dir).await;
    create_test_table(conn.as_mut()).await;

    let mut cursor = conn.cursor().unwrap();
    cursor
        .execute("INSERT INTO `records` (`id`, `name`) VALUES (?, ?)", &[
            SqlValue::Int(1),
            SqlValue::Text("first".into()),
        ])
        .await
        .unwrap();
    cursor
        .execute("INSERT INTO `records` (`id`, `name`) VALUES (?, ?)", &[
            SqlValue::Int(2),
            SqlValue::Text("second".into()),
        ])
        .await
        .unwrap();

    cursor
        .execute("SELECT `id`, `name` FROM `records` ORDER BY `id`", &[])
        .await
        .unwrap();
    let rows: Vec<_> = cursor.by_ref().collect();
    assert_eq!(rows, vec![
        vec![SqlValue::Int(1), SqlValue::Text("first".into())],
        vec![SqlValue::Int(2), SqlValue::Text("second".into())],
    ]);
    // Exhausted for good; a fresh pass needs a fresh execute.
    assert_eq!(cursor.fetchone(), None);
}

#[tokio::test]
async fn parameter_values_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut conn = setup(&dir).await;

    {
        let mut cursor = conn.cursor().unwrap();
        cursor
            .execute(
                "CREATE TABLE `samples` (`i` INTEGER, `f` REAL, `t` TEXT, `b` BLOB)",
                &[],
            )
            .await
            .unwrap();
        cursor
            .execute("INSERT INTO `samples` VALUES (?, ?, ?, ?)", &[
                SqlValue::Int(42),
                SqlValue::Float(17.25),
                SqlValue::Text("dew point".into()),
                SqlValue::Bytes(vec![0xde, 0xad]),
            ])
            .await
            .unwrap();
        cursor
            .execute("INSERT INTO `samples` VALUES (?, ?, ?, ?)", &[
                SqlValue::Null,
                SqlValue::Null,
                SqlValue::Null,
                SqlValue::Null,
            ])
            .await
            .unwrap();
    }

    let mut cursor = conn.cursor().unwrap();
    cursor
        .execute("SELECT `i`, `f`, `t`, `b` FROM `samples` ORDER BY `i` IS NULL", &[])
        .await
        .unwrap();
    assert_eq!(
        cursor.fetchone(),
        Some(vec![
            SqlValue::Int(42),
            SqlValue::Float(17.25),
            SqlValue::Text("dew point".into()),
            SqlValue::Bytes(vec![0xde, 0xad]),
        ])
    );
    assert_eq!(
        cursor.fetchone(),
        Some(vec![
            SqlValue::Null,
            SqlValue::Null,
            SqlValue::Null,
            SqlValue::Null,
        ])
    );
    assert_eq!(cursor.fetchone(), None);
}

#[tokio::test]
async fn closed_cursor_rejects_execute() {
    let dir = TempDir::new().unwrap();
    let mut conn = setup(&dir).await;

    let mut cursor = conn.cursor().unwrap();
    cursor.execute("select 1", &[]).await.unwrap();
    cursor.close();
    assert_eq!(cursor.fetchone(), None);
    let err = cursor.execute("select 1", &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Operational);
}

#[tokio::test]
async fn bad_sql_fails_with_programming_error() {
    let dir = TempDir::new().unwrap();
    let mut conn = setup(&dir).await;

    let mut cursor = conn.cursor().unwrap();
    let err = cursor.execute("SELEC wrong", &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Programming);

    let err = cursor
        .execute("SELECT * FROM `no_such_table`", &[])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Programming);
}

// ============================================================================
// Schema introspection
// ============================================================================

#[tokio::test]
async fn schema_of_yields_descriptors_in_declared_order() {
    let dir = TempDir::new().unwrap();
    let mut conn = setup(&dir).await;
    create_test_table(conn.as_mut()).await;

    let descriptors: Vec<_> = conn.schema_of("records").await.unwrap().collect();
    assert_eq!(descriptors.len(), 2);

    assert_eq!(descriptors[0].ordinal, 0);
    assert_eq!(descriptors[0].name, "id");
    assert_eq!(descriptors[0].declared_type, "INTEGER");
    assert!(descriptors[0].is_primary);
    assert!(!descriptors[0].nullable);

    assert_eq!(descriptors[1].ordinal, 1);
    assert_eq!(descriptors[1].name, "name");
    assert_eq!(descriptors[1].declared_type, "TEXT");
    assert!(!descriptors[1].is_primary);
    assert!(descriptors[1].nullable);
}

#[tokio::test]
async fn columns_of_matches_schema_names() {
    let dir = TempDir::new().unwrap();
    let mut conn = setup(&dir).await;
    create_test_table(conn.as_mut()).await;

    let names: Vec<String> = conn
        .schema_of("records")
        .await
        .unwrap()
        .map(|col| col.name)
        .collect();
    assert_eq!(conn.columns_of("records").await.unwrap(), names);
    assert_eq!(names, vec!["id".to_string(), "name".to_string()]);
}

#[tokio::test]
async fn schema_of_missing_table_fails_with_programming_error() {
    let dir = TempDir::new().unwrap();
    let mut conn = setup(&dir).await;

    let err = conn.schema_of("nowhere").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Programming);
}

#[tokio::test]
async fn tables_tracks_creation_and_drop() {
    let dir = TempDir::new().unwrap();
    let mut conn = setup(&dir).await;

    assert!(conn.tables().await.unwrap().is_empty());
    create_test_table(conn.as_mut()).await;
    assert_eq!(conn.tables().await.unwrap(), vec!["records".to_string()]);

    {
        let mut cursor = conn.cursor().unwrap();
        cursor.execute("DROP TABLE `records`", &[]).await.unwrap();
    }
    assert!(conn.tables().await.unwrap().is_empty());
}

#[tokio::test]
async fn get_variable_returns_pragma_pairs() {
    let dir = TempDir::new().unwrap();
    let mut conn = setup(&dir).await;

    let (name, value) = conn.get_variable("journal_mode").await.unwrap().unwrap();
    assert_eq!(name, "journal_mode");
    assert!(!value.is_empty());

    assert!(conn
        .get_variable("definitely_not_a_pragma")
        .await
        .unwrap()
        .is_none());
    assert!(conn.get_variable("no such name").await.unwrap().is_none());
}

// ============================================================================
// Transactions
// ============================================================================

#[tokio::test]
async fn commit_persists_within_the_connection() {
    let dir = TempDir::new().unwrap();
    let mut conn = setup(&dir).await;
    create_test_table(conn.as_mut()).await;

    conn.begin().await.unwrap();
    {
        let mut cursor = conn.cursor().unwrap();
        cursor
            .execute("INSERT INTO `records` (`id`, `name`) VALUES (?, ?)", &[
                SqlValue::Int(1),
                SqlValue::Text("kept".into()),
            ])
            .await
            .unwrap();
    }
    conn.commit().await.unwrap();
    assert_eq!(
        conn.transaction_state(),
        seriesdb::TransactionState::Idle
    );

    let mut cursor = conn.cursor().unwrap();
    cursor
        .execute("SELECT COUNT(*) FROM `records`", &[])
        .await
        .unwrap();
    assert_eq!(cursor.fetchone(), Some(vec![SqlValue::Int(1)]));
}

#[tokio::test]
async fn rollback_discards_within_the_connection() {
    let dir = TempDir::new().unwrap();
    let mut conn = setup(&dir).await;
    create_test_table(conn.as_mut()).await;

    conn.begin().await.unwrap();
    {
        let mut cursor = conn.cursor().unwrap();
        cursor
            .execute("INSERT INTO `records` (`id`, `name`) VALUES (?, ?)", &[
                SqlValue::Int(1),
                SqlValue::Text("discarded".into()),
            ])
            .await
            .unwrap();
    }
    conn.rollback().await.unwrap();

    let mut cursor = conn.cursor().unwrap();
    cursor
        .execute("SELECT COUNT(*) FROM `records`", &[])
        .await
        .unwrap();
    assert_eq!(cursor.fetchone(), Some(vec![SqlValue::Int(0)]));
}

#[tokio::test]
async fn commit_and_rollback_without_begin_are_no_ops() {
    let dir = TempDir::new().unwrap();
    let mut conn = setup(&dir).await;

    conn.commit().await.unwrap();
    conn.rollback().await.unwrap();
}

#[tokio::test]
async fn transaction_scope_commits_and_rolls_back() {
    let dir = TempDir::new().unwrap();
    let mut conn = setup(&dir).await;
    create_test_table(conn.as_mut()).await;

    let mut tx = Transaction::begin(conn.as_mut()).await.unwrap();
    tx.cursor()
        .unwrap()
        .execute("INSERT INTO `records` (`id`, `name`) VALUES (?, ?)", &[
            SqlValue::Int(1),
            SqlValue::Text("scoped".into()),
        ])
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let mut tx = Transaction::begin(conn.as_mut()).await.unwrap();
    tx.cursor()
        .unwrap()
        .execute("DELETE FROM `records`", &[])
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    let mut cursor = conn.cursor().unwrap();
    cursor
        .execute("SELECT COUNT(*) FROM `records`", &[])
        .await
        .unwrap();
    assert_eq!(cursor.fetchone(), Some(vec![SqlValue::Int(1)]));
}

// ============================================================================
// Closed-connection behavior
// ============================================================================

#[tokio::test]
async fn operations_after_close_fail_with_operational_error() {
    let dir = TempDir::new().unwrap();
    let mut conn = setup(&dir).await;
    create_test_table(conn.as_mut()).await;

    conn.close().await.unwrap();
    assert!(!conn.is_open());

    assert_eq!(conn.cursor().unwrap_err().kind(), ErrorKind::Operational);
    assert_eq!(conn.tables().await.unwrap_err().kind(), ErrorKind::Operational);
    assert_eq!(
        conn.schema_of("records").await.unwrap_err().kind(),
        ErrorKind::Operational
    );
    assert_eq!(
        conn.get_variable("journal_mode").await.unwrap_err().kind(),
        ErrorKind::Operational
    );
    assert_eq!(conn.begin().await.unwrap_err().kind(), ErrorKind::Operational);
    assert_eq!(
        conn.execute("select 1", &[]).await.unwrap_err().kind(),
        ErrorKind::Operational
    );

    // Close is idempotent.
    conn.close().await.unwrap();
}

#[tokio::test]
async fn passthrough_options_apply_as_pragmas() {
    let dir = TempDir::new().unwrap();
    let config = temp_config(&dir).with_option("cache_size", -2000);
    seriesdb::create_database(&config).await.unwrap();

    let mut conn = seriesdb::connect(&config).await.unwrap();
    let (_, value) = conn.get_variable("cache_size").await.unwrap().unwrap();
    assert_eq!(value, "-2000");
}
