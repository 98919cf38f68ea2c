//! End-to-end playground tests against a real Postgres server.
//!
//! Skipped unless `SQLPAD_TEST_PG=1`. Connection settings come from the
//! `DB_*` / `SANDBOX_*` variables (a `.env` file is honoured):
//!
//!   SQLPAD_TEST_PG=1 DB_HOST=localhost cargo test -p sqlpad-core --test live_playground

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use sqlx::Connection;

use sqlpad_core::{
    Catalog, Curriculum, ExecutorConfig, FailureKind, LearnerId, PgConfig, Playground,
    SqlPolicy, SubmitOutcome, ValidationRule,
};
use sqlpad_state::quote_ident;

const CHEFS_DDL: &str = "CREATE TABLE chefs (id UUID PRIMARY KEY, name VARCHAR(100) NOT NULL)";

fn live_config() -> Option<PgConfig> {
    dotenvy::dotenv().ok();
    if std::env::var("SQLPAD_TEST_PG").ok().as_deref() != Some("1") {
        eprintln!("SQLPAD_TEST_PG not set; skipping live Postgres test");
        return None;
    }
    Some(
        PgConfig::from_env()
            .expect("valid DB_* environment")
            .with_prefix("sqlpad_test_"),
    )
}

fn playground(config: &PgConfig) -> Playground {
    Playground::connect(
        config.clone(),
        ExecutorConfig {
            statement_timeout_ms: 500,
        },
        Curriculum::kitchen().unwrap(),
    )
    .unwrap()
}

fn unique_learner(tag: &str) -> LearnerId {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    LearnerId::new(format!("{tag}_{}_{nanos}", std::process::id())).unwrap()
}

async fn teardown(playground: &Playground, config: &PgConfig, learners: &[&LearnerId]) {
    let databases: Vec<String> = learners
        .iter()
        .map(|l| playground.registry().database_name(l))
        .collect();
    playground.shutdown().await;

    let mut admin = sqlx::PgConnection::connect_with(&config.admin_options())
        .await
        .unwrap();
    for database in databases {
        sqlx::raw_sql(&format!(
            "DROP DATABASE IF EXISTS {} WITH (FORCE)",
            quote_ident(&database)
        ))
        .execute(&mut admin)
        .await
        .unwrap();
    }
    admin.close().await.unwrap();
}

fn insert_chef(n: u32) -> String {
    format!("INSERT INTO chefs (id, name) VALUES ('550e8400-e29b-41d4-a716-44665544000{n}', 'Chef {n}')")
}

#[tokio::test]
async fn live_blocked_statements_leave_schema_untouched() {
    let Some(config) = live_config() else { return };
    let playground = playground(&config);
    let ada = unique_learner("blocked");

    let before = playground.status(&ada).await.unwrap();
    for sql in [
        "DROP DATABASE postgres",
        "DROP SCHEMA public CASCADE",
        "ALTER SYSTEM SET work_mem = '1GB'",
        "CREATE TABLE sneaky (id int); CREATE ROLE sneaky",
        "COPY (SELECT 1) TO PROGRAM 'true'",
        "SELECT pg_read_file('postgresql.conf')",
    ] {
        let outcome = playground.execute(&ada, sql).await.unwrap();
        assert_eq!(outcome.failure, Some(FailureKind::PolicyViolation), "{sql}");
    }
    assert_eq!(playground.status(&ada).await.unwrap(), before);

    teardown(&playground, &config, &[&ada]).await;
}

#[tokio::test]
async fn live_table_lifecycle_and_validation() {
    let Some(config) = live_config() else { return };
    let playground = playground(&config);
    let ada = unique_learner("chefs");
    let catalog = playground.catalog(&ada).await.unwrap();

    assert!(!catalog.table_exists("chefs").await.unwrap());
    let created = playground.execute(&ada, CHEFS_DDL).await.unwrap();
    assert!(created.success, "{:?}", created.error);
    assert!(catalog.table_exists("chefs").await.unwrap());
    assert_eq!(catalog.columns_of("chefs").await.unwrap(), vec!["id", "name"]);

    let with_bio = ValidationRule::table_exists("chefs", &["id", "name", "bio"]);
    let missing = playground.check(&ada, &with_bio).await.unwrap();
    assert!(!missing.is_correct);
    assert!(missing.message.contains("bio"));
    assert_eq!(missing.actual, Some(serde_json::json!(["id", "name"])));

    let submitted = playground
        .submit(&ada, "task-3-1", "ALTER TABLE chefs ADD COLUMN bio TEXT")
        .await
        .unwrap();
    assert!(submitted.is_correct(), "{}", submitted.message());

    teardown(&playground, &config, &[&ada]).await;
}

#[tokio::test]
async fn live_query_result_counts_rows() {
    let Some(config) = live_config() else { return };
    let playground = playground(&config);
    let ada = unique_learner("count");

    playground.execute(&ada, CHEFS_DDL).await.unwrap();
    let two = format!("{}; {}", insert_chef(1), insert_chef(2));
    let inserted = playground.execute(&ada, &two).await.unwrap();
    assert!(inserted.success, "{:?}", inserted.error);
    assert_eq!(inserted.rows_affected, 2);

    let rule = ValidationRule::query_result("SELECT * FROM chefs", Some(3));
    let short = playground.check(&ada, &rule).await.unwrap();
    assert!(!short.is_correct);
    assert_eq!(short.actual, Some(serde_json::json!(2)));

    let outcome = playground
        .submit(&ada, "task-8-2", &insert_chef(3))
        .await
        .unwrap();
    assert!(outcome.is_correct(), "{}", outcome.message());

    let rows = playground.execute(&ada, "SELECT id, name FROM chefs ORDER BY name").await.unwrap();
    assert_eq!(rows.row_count, 3);
    assert_eq!(rows.rows.len(), rows.row_count);
    assert_eq!(rows.rows[0]["name"], "Chef 1");

    teardown(&playground, &config, &[&ada]).await;
}

#[tokio::test]
async fn live_driver_errors_are_classified() {
    let Some(config) = live_config() else { return };
    let playground = playground(&config);
    let ada = unique_learner("errors");

    let missing = playground.execute(&ada, "SELECT * FROM nowhere").await.unwrap();
    assert_eq!(missing.failure, Some(FailureKind::Driver));
    assert!(missing.error.as_deref().unwrap().starts_with("Table does not exist."));

    let slow = playground.execute(&ada, "SELECT pg_sleep(5)").await.unwrap();
    assert_eq!(slow.failure, Some(FailureKind::Timeout));

    // The connection that timed out went back to the pool in working order.
    let after = playground.execute(&ada, "SELECT 1 AS one").await.unwrap();
    assert!(after.success);
    assert_eq!(after.rows[0]["one"], 1);

    let failed = playground
        .submit(&ada, "task-2-1", "CREATE TABLE chefs (id UUID PRIMARY KEY,)")
        .await
        .unwrap();
    assert!(matches!(failed, SubmitOutcome::ExecutionFailed(_)));

    teardown(&playground, &config, &[&ada]).await;
}

#[tokio::test]
async fn live_reset_keeps_extensions() {
    let Some(config) = live_config() else { return };
    let playground = playground(&config);
    let ada = unique_learner("reset");

    let setup = [
        "CREATE EXTENSION IF NOT EXISTS \"uuid-ossp\"",
        "CREATE EXTENSION IF NOT EXISTS citext",
        "CREATE TYPE course_type AS ENUM ('appetizer', 'main', 'dessert', 'side')",
        CHEFS_DDL,
    ];
    for sql in setup {
        let outcome = playground.execute(&ada, sql).await.unwrap();
        assert!(outcome.success, "{sql}: {:?}", outcome.error);
    }
    let status = playground.status(&ada).await.unwrap();
    assert_eq!(status.tables, vec!["chefs"]);
    assert_eq!(status.types, vec!["course_type"]);
    assert_eq!(status.extensions, vec!["citext", "uuid-ossp"]);

    playground.reset(&ada).await.unwrap();
    let status = playground.status(&ada).await.unwrap();
    assert!(status.tables.is_empty());
    assert!(status.types.is_empty());
    assert_eq!(status.extensions, vec!["citext", "uuid-ossp"]);

    teardown(&playground, &config, &[&ada]).await;
}

#[tokio::test]
async fn live_learners_are_isolated() {
    let Some(config) = live_config() else { return };
    let playground = Arc::new(playground(&config));
    let ada = unique_learner("ada");
    let grace = unique_learner("grace");

    let tasks: Vec<_> = [(ada.clone(), "ada_notes"), (grace.clone(), "grace_notes")]
        .into_iter()
        .map(|(learner, table)| {
            let playground = Arc::clone(&playground);
            tokio::spawn(async move {
                let sql = format!("CREATE TABLE {table} (id int)");
                playground.execute(&learner, &sql).await
            })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().unwrap().success);
    }

    assert_eq!(playground.status(&ada).await.unwrap().tables, vec!["ada_notes"]);
    assert_eq!(playground.status(&grace).await.unwrap().tables, vec!["grace_notes"]);

    teardown(&playground, &config, &[&ada, &grace]).await;
}

#[tokio::test]
async fn live_learner_cannot_lift_the_timeout() {
    let Some(config) = live_config() else { return };
    let ada = unique_learner("lift");
    let lift = "SET statement_timeout = 0; SELECT pg_sleep(2)";

    let guarded = playground(&config);
    let blocked = guarded.execute(&ada, lift).await.unwrap();
    assert_eq!(blocked.failure, Some(FailureKind::PolicyViolation));

    // Without the blocklist the client-side deadline still ends the run.
    let open = playground(&config).with_policy(SqlPolicy::empty());
    let slow = open.execute(&ada, lift).await.unwrap();
    assert_eq!(slow.failure, Some(FailureKind::Timeout));
    assert!(slow.elapsed_ms < 2_000, "took {} ms", slow.elapsed_ms);

    let after = open.execute(&ada, "SELECT 1 AS one").await.unwrap();
    assert!(after.success, "{:?}", after.error);

    guarded.shutdown().await;
    teardown(&open, &config, &[&ada]).await;
}

#[tokio::test]
async fn live_open_transactions_end_with_the_run() {
    let Some(config) = live_config() else { return };
    let playground = playground(&config);
    let ada = unique_learner("txn");

    let opened = playground
        .execute(&ada, "BEGIN; CREATE TABLE leaked (id int)")
        .await
        .unwrap();
    assert!(opened.success, "{:?}", opened.error);
    for _ in 0..3 {
        let lookup = playground.execute(&ada, "SELECT count(*) FROM leaked").await.unwrap();
        assert_eq!(lookup.failure, Some(FailureKind::Driver));
    }
    assert!(playground.status(&ada).await.unwrap().tables.is_empty());

    let failed = playground.execute(&ada, "BEGIN; SELECT 1 / 0").await.unwrap();
    assert_eq!(failed.failure, Some(FailureKind::Driver));
    for _ in 0..3 {
        let next = playground.execute(&ada, "SELECT 1 AS one").await.unwrap();
        assert!(next.success, "{:?}", next.error);
    }

    teardown(&playground, &config, &[&ada]).await;
}

#[tokio::test]
async fn live_rows_come_from_the_final_statement() {
    let Some(config) = live_config() else { return };
    let playground = playground(&config);
    let ada = unique_learner("final");

    playground.execute(&ada, CHEFS_DDL).await.unwrap();
    let outcome = playground
        .execute(&ada, "SELECT 1 AS a; SELECT * FROM chefs WHERE false")
        .await
        .unwrap();
    assert!(outcome.success, "{:?}", outcome.error);
    assert!(outcome.rows.is_empty());
    assert_eq!(outcome.row_count, 0);

    let last = playground
        .execute(&ada, "SELECT 1 AS a; SELECT 2 AS b")
        .await
        .unwrap();
    assert_eq!(last.rows.len(), 1);
    assert_eq!(last.rows[0]["b"], 2);

    teardown(&playground, &config, &[&ada]).await;
}
