#![allow(dead_code)]

//! PostgreSQL test infrastructure module.
//!
//! This module provides shared infrastructure for the crate's live tests: one container for the
//! whole test run and a fresh database per test.

use std::sync::OnceLock;

use uuid::Uuid;

use crate::postgres::{Postgres, PostgresOpts};
use crate::testing::postgres::{ReadinessProbe, TestPostgres};

/// Connection options of the shared container, set once it is ready
static SHARED_OPTS: OnceLock<PostgresOpts> = OnceLock::new();

const PG_USER: &str = "pgkit";
const PG_PASSWORD: &str = "pgkit";
const PG_DB: &str = "pgkit";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Connection options for the shared container's default database.
///
/// The container is started on first use and kept alive for the rest of the test run.
pub fn test_opts() -> PostgresOpts {
    SHARED_OPTS
        .get_or_init(|| {
            init_tracing();
            let opts = PostgresOpts::default()
                .with_user(PG_USER)
                .with_password(PG_PASSWORD)
                .with_name(PG_DB)
                .with_sslmode("disable");
            let test_db = TestPostgres::start(opts, ReadinessProbe::default())
                .expect("failed to start postgres container");
            let opts = test_db.db().opts().clone();

            // Leak the container (and its runtime) to keep it alive for the test duration
            std::mem::forget(test_db);

            opts
        })
        .clone()
}

/// Create a fresh PostgreSQL database with a unique name for isolated testing.
///
/// Returns an open handle to the new database and its name.
pub fn fresh_postgres_db() -> (Postgres, String) {
    let mut admin = Postgres::connect(test_opts()).expect("failed to connect as admin");

    let db_name = format!("test_{}", Uuid::new_v4().simple());
    admin
        .query(&format!("CREATE DATABASE \"{}\"", db_name), &[])
        .expect("failed to create test database");
    admin.close().expect("failed to close admin connection");

    let db = Postgres::connect(test_opts().with_name(&db_name))
        .expect("failed to connect to test database");
    (db, db_name)
}

/// An open handle to a fresh, isolated database.
pub fn get_test_db() -> Postgres {
    let (db, _db_name) = fresh_postgres_db();
    db
}
