#![cfg_attr(docsrs, feature(doc_cfg))]
//! `pgkit` is a small toolkit for applications that keep their schema as plain SQL files and talk to
//! PostgreSQL through a thin handle.
//!
//! It has two independent parts:
//! - A [migration loader](migration) that reads `*up.sql` / `*down.sql` files from a directory.
//! - A [PostgreSQL handle](postgres) that formats connection strings, opens, pings and closes a
//!   connection, and decodes query results into generic column-name to [Value] maps.
//!
//! Applying migrations is left to the caller: load the files, then run each one through
//! [Postgres::query](postgres::Postgres::query) in the order you need.
//!
//! ```no_run
//! use pgkit::postgres::{Postgres, PostgresOpts};
//!
//! let mut db = Postgres::connect(
//!     PostgresOpts::default()
//!         .with_user("app")
//!         .with_password("secret")
//!         .with_name("app"),
//! )?;
//! for migration in pgkit::load_migrations("migrations", "up")? {
//!     db.query(migration.content(), &[])?;
//! }
//! db.close()?;
//! # Ok::<(), pgkit::Error>(())
//! ```
//!
//! # Feature flags
//!
//! - `tracing` (default): emit log events through [tracing](https://crates.io/crates/tracing).
//! - `pool`: build a [deadpool-postgres](https://crates.io/crates/deadpool-postgres) pool from the same options.
//! - `testing`: disposable PostgreSQL containers for integration tests.

mod error;
pub use error::Error;

pub mod migration;
pub use migration::{load_migrations, Direction, Migration};

mod value;
pub use value::{RowMap, Value};

pub mod postgres;

#[cfg(feature = "testing")]
#[cfg_attr(docsrs, doc(cfg(feature = "testing")))]
pub mod testing;

#[cfg(all(test, feature = "testing"))]
pub(crate) mod test_postgres;
