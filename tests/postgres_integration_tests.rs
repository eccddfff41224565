/// PostgreSQL integration tests
///
/// Runs the migration protocol against a real server. Skipped unless
/// TEST_DATABASE_URL points at a database the tests may create tables in.
/// Run with: TEST_DATABASE_URL=postgres://... cargo test --test postgres_integration_tests

use std::time::Duration;

use column_migrator::core::{DataType, ValueCount};
use column_migrator::{
    ColumnPresence, ColumnSpec, MigrationRunner, MigratorConfig, PgDatabase, RollbackStatus,
    SchemaError, Step, TableRef, Value,
};
use tokio_postgres::{Client, NoTls};

fn database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL").ok().filter(|url| !url.is_empty())
}

async fn admin(url: &str) -> Client {
    let (client, connection) = tokio_postgres::connect(url, NoTls)
        .await
        .expect("Failed to connect");

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("Connection error: {}", e);
        }
    });

    client
}

/// Fresh `<name>(id, title)` table with `rows` rows in the public schema.
async fn seed(client: &Client, name: &str, rows: i64) -> TableRef {
    client
        .batch_execute(&format!(
            "DROP TABLE IF EXISTS public.{name}; \
             CREATE TABLE public.{name} (id BIGINT PRIMARY KEY, title TEXT)"
        ))
        .await
        .unwrap();

    for id in 1..=rows {
        client
            .execute(
                &format!("INSERT INTO public.{name} VALUES ($1, $2)"),
                &[&id, &format!("listing {}", id)],
            )
            .await
            .unwrap();
    }
    TableRef::new("public", name)
}

fn status_spec() -> ColumnSpec {
    ColumnSpec::new("status", DataType::Text)
        .default_value("거래중")
        .allowed(["거래중", "거래완료"])
}

async fn connect(url: &str) -> PgDatabase {
    let config = MigratorConfig::new(url).connect_timeout(Duration::from_secs(5));
    PgDatabase::connect(&config).await.unwrap()
}

#[tokio::test]
async fn test_pg_migrate_verify_and_repeat() {
    let Some(url) = database_url() else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };
    let client = admin(&url).await;
    let table = seed(&client, "cm_properties_apply", 10).await;
    let mut db = connect(&url).await;
    let runner = MigrationRunner::new(Duration::from_secs(10));

    let outcome = runner
        .run(&mut db, &table, &status_spec(), &Value::from("거래중"))
        .await
        .unwrap();
    assert!(outcome.applied);
    assert_eq!(outcome.rows_normalized, 10);

    let snapshot = outcome.verification.unwrap();
    assert_eq!(snapshot.histogram, vec![ValueCount::new("거래중", 10)]);
    assert_eq!(snapshot.total_rows, 10);
    assert_eq!(snapshot.constraints.len(), 1);
    assert_eq!(snapshot.constraints[0].name, "cm_properties_apply_status_check");

    let again = runner
        .migrate(&mut db, &table, &status_spec(), &Value::from("거래중"))
        .await
        .unwrap();
    assert!(again.already_present);
    assert!(!again.applied);

    client
        .batch_execute("DROP TABLE public.cm_properties_apply")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_pg_failed_step_rolls_back() {
    let Some(url) = database_url() else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };
    let client = admin(&url).await;
    let table = seed(&client, "cm_properties_conflict", 3).await;

    // A constraint with the name the migration will pick makes its last step fail.
    client
        .batch_execute(
            "ALTER TABLE public.cm_properties_conflict \
             ADD CONSTRAINT cm_properties_conflict_status_check CHECK (id > 0)",
        )
        .await
        .unwrap();

    let mut db = connect(&url).await;
    let runner = MigrationRunner::new(Duration::from_secs(10));

    let err = runner
        .migrate(&mut db, &table, &status_spec(), &Value::from("거래중"))
        .await
        .unwrap_err();
    assert_eq!(err.step, Step::AddConstraint);
    assert!(matches!(err.source, SchemaError::SchemaConflict(_)));
    assert_eq!(err.rollback, RollbackStatus::RolledBack);

    let presence = runner.inspect(&db, &table, "status").await.unwrap();
    assert_eq!(presence, ColumnPresence::Absent);

    client
        .batch_execute("DROP TABLE public.cm_properties_conflict")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_pg_missing_table() {
    let Some(url) = database_url() else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };
    let db = connect(&url).await;

    let err = MigrationRunner::default()
        .inspect(&db, &TableRef::new("public", "cm_no_such_table"), "status")
        .await
        .unwrap_err();
    assert!(matches!(err.source, SchemaError::TableNotFound(_)));
}
