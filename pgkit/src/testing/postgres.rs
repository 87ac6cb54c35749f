//! Disposable PostgreSQL containers for integration tests: [TestPostgres]
//!
//! A container is started with [testcontainers](https://crates.io/crates/testcontainers), configured
//! from the same [PostgresOpts] a real deployment would use, and returned together with an open
//! [Postgres] handle pointed at its mapped host and port.
//!
//! # Example
//!
//! ```ignore
//! use pgkit::postgres::PostgresOpts;
//! use pgkit::testing::postgres::{ReadinessProbe, TestPostgres};
//!
//! #[test]
//! fn users_table() -> Result<(), pgkit::Error> {
//!     let opts = PostgresOpts::default()
//!         .with_user("mypostgresuser")
//!         .with_password("mysecretpassword")
//!         .with_name("mydatabase")
//!         .with_sslmode("disable");
//!     let mut test_db = TestPostgres::start(opts, ReadinessProbe::default())?;
//!
//!     test_db.db_mut().query("CREATE TABLE users (id SERIAL PRIMARY KEY)", &[])?;
//!     test_db.assert_table_exists("users")?;
//!
//!     test_db.teardown()
//! }
//! ```
//!
//! The container is driven by a runtime owned by [TestPostgres], so it must be used from
//! synchronous code (plain `#[test]`), not from inside another tokio runtime.

use crate::postgres::{Postgres, PostgresOpts};
use crate::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use testcontainers::core::logs::LogFrame;
use testcontainers::core::IntoContainerPort;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

/// Log line postgres prints once it accepts connections.
///
/// The official image prints it twice: once for the temporary init server and once for the real one.
pub const READY_MESSAGE: &str = "database system is ready to accept connections";

const IMAGE_NAME: &str = "postgres";
const IMAGE_TAG: &str = "16-alpine";
const POSTGRES_PORT: u16 = 5432;
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How to decide that a freshly started container is ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessProbe {
    message: String,
    occurrences: usize,
    timeout: Duration,
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self {
            message: READY_MESSAGE.to_string(),
            occurrences: 2,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ReadinessProbe {
    /// Set the log line to wait for. Defaults to [READY_MESSAGE].
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Set how many times the log line must appear. Defaults to 2.
    pub fn with_occurrences(mut self, occurrences: usize) -> Self {
        self.occurrences = occurrences;
        self
    }

    /// Set how long to wait for the log line. Defaults to 30 seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn occurrences(&self) -> usize {
        self.occurrences
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// A running PostgreSQL container and an open handle to it.
///
/// Call [TestPostgres::teardown] to close the handle and remove the container. Dropping a
/// `TestPostgres` removes the container as well, ignoring errors.
pub struct TestPostgres {
    db: Postgres,
    container: Option<ContainerAsync<GenericImage>>,
    runtime: tokio::runtime::Runtime,
}

impl TestPostgres {
    /// Start a container configured from `opts` and open a handle to it.
    ///
    /// `opts.name`, `opts.user` and `opts.password` become the container's database, user and
    /// password. `host` and `port` are replaced with the container's mapped address.
    ///
    /// # Errors
    ///
    /// - [Error::InvalidArgument] if `opts.password` is empty.
    /// - [Error::Container] if the container fails to start, does not become ready within the
    ///   probe's timeout, or its address cannot be discovered.
    /// - Any error from [Postgres::open].
    pub fn start(opts: PostgresOpts, probe: ReadinessProbe) -> Result<Self, Error> {
        if opts.password.is_empty() {
            return Err(Error::InvalidArgument("password required".to_string()));
        }

        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| Error::Container(format!("unable to create runtime: {}", e)))?;

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let message = probe.message.clone();
        let log_consumer = move |log: &LogFrame| {
            let msg = format!("{:?}", log);
            let count = msg.matches(message.as_str()).count();
            if count > 0 {
                seen_clone.fetch_add(count, Ordering::SeqCst);
            }
        };

        let image = GenericImage::new(IMAGE_NAME, IMAGE_TAG)
            .with_exposed_port(POSTGRES_PORT.tcp())
            .with_log_consumer(log_consumer)
            .with_env_var("POSTGRES_DB", &opts.name)
            .with_env_var("POSTGRES_USER", &opts.user)
            .with_env_var("POSTGRES_PASSWORD", &opts.password);

        #[cfg(feature = "tracing")]
        tracing::info!(image = %format!("{}:{}", IMAGE_NAME, IMAGE_TAG), "starting postgres container");

        let container = runtime
            .block_on(image.start())
            .map_err(|e| Error::Container(format!("run failed: {}", e)))?;

        // From here on, Drop removes the container if anything fails
        let mut test_db = Self {
            db: Postgres::new(opts),
            container: Some(container),
            runtime,
        };

        let ready = test_db.runtime.block_on(async {
            tokio::time::timeout(probe.timeout, async {
                while seen.load(Ordering::SeqCst) < probe.occurrences {
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            })
            .await
        });
        if ready.is_err() {
            return Err(Error::Container(format!(
                "container not ready after {:?}: saw '{}' {} of {} time(s)",
                probe.timeout,
                probe.message,
                seen.load(Ordering::SeqCst),
                probe.occurrences
            )));
        }

        let (host, port) = {
            let Some(container) = test_db.container.as_ref() else {
                return Err(Error::Container("container already removed".to_string()));
            };
            test_db.runtime.block_on(async {
                let host = container
                    .get_host()
                    .await
                    .map_err(|e| Error::Container(format!("unable to get host: {}", e)))?;
                let port = container
                    .get_host_port_ipv4(POSTGRES_PORT)
                    .await
                    .map_err(|e| Error::Container(format!("unable to get port: {}", e)))?;
                Ok::<_, Error>((host.to_string(), port.to_string()))
            })?
        };

        #[cfg(feature = "tracing")]
        tracing::info!(host = %host, port = %port, "postgres container is ready");

        let opts = test_db.db.opts_mut();
        opts.host = host;
        opts.port = port;
        test_db.db.open()?;

        Ok(test_db)
    }

    pub fn db(&self) -> &Postgres {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut Postgres {
        &mut self.db
    }

    /// Assert that a table exists in the `public` schema.
    pub fn assert_table_exists(&mut self, table_name: &str) -> Result<(), Error> {
        let rows = self.db.query(
            "SELECT EXISTS (SELECT FROM information_schema.tables WHERE table_schema = 'public' AND table_name = $1) AS present",
            &[&table_name],
        )?;
        let exists = rows
            .first()
            .and_then(|row| row.get("present"))
            .and_then(|value| value.as_bool())
            .unwrap_or(false);

        if !exists {
            return Err(Error::InvalidArgument(format!(
                "Table '{}' does not exist",
                table_name
            )));
        }
        Ok(())
    }

    /// Close the handle and remove the container.
    ///
    /// The container is removed even if closing the handle fails; the close error is returned
    /// afterwards.
    pub fn teardown(mut self) -> Result<(), Error> {
        let closed = self.db.close();
        if let Some(container) = self.container.take() {
            self.runtime
                .block_on(container.rm())
                .map_err(|e| Error::Container(format!("failed to terminate container: {}", e)))?;

            #[cfg(feature = "tracing")]
            tracing::info!("postgres container removed");
        }
        closed
    }
}

impl Drop for TestPostgres {
    fn drop(&mut self) {
        let _ = self.db.close();
        if let Some(container) = self.container.take() {
            let _ = self.runtime.block_on(container.rm());
        }
    }
}

/// Start a container with the default [ReadinessProbe]. See [TestPostgres::start].
pub fn new_test_db(opts: PostgresOpts) -> Result<TestPostgres, Error> {
    TestPostgres::start(opts, ReadinessProbe::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn params() -> PostgresOpts {
        PostgresOpts::default()
            .with_host("localhost")
            .with_user("mypostgresuser")
            .with_password("mysecretpassword")
            .with_name("mydatabase")
            .with_sslmode("disable")
    }

    #[test]
    fn readiness_probe_defaults() {
        let probe = ReadinessProbe::default();
        assert_eq!(probe.message(), READY_MESSAGE);
        assert_eq!(probe.occurrences(), 2);
        assert_eq!(probe.timeout(), Duration::from_secs(30));

        let probe = probe
            .with_occurrences(1)
            .with_timeout(Duration::from_secs(5))
            .with_message("ready");
        assert_eq!(probe.occurrences(), 1);
        assert_eq!(probe.timeout(), Duration::from_secs(5));
        assert_eq!(probe.message(), "ready");
    }

    #[test]
    fn start_requires_password() {
        let result = TestPostgres::start(params().with_password(""), ReadinessProbe::default());
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn start_ping_query_teardown() {
        let mut test_db = new_test_db(params()).unwrap();
        assert_ne!(test_db.db().port(), "");
        assert!(test_db.db().is_open());

        test_db.db_mut().ping().unwrap();

        let rows = test_db
            .db_mut()
            .query("SELECT current_user AS who, current_database() AS db", &[])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["who"].as_str(), Some("mypostgresuser"));
        assert_eq!(rows[0]["db"].as_str(), Some("mydatabase"));

        test_db
            .db_mut()
            .query("CREATE TABLE widgets (id SERIAL PRIMARY KEY)", &[])
            .unwrap();
        test_db.assert_table_exists("widgets").unwrap();
        assert!(test_db.assert_table_exists("gadgets").is_err());

        let rows = test_db
            .db_mut()
            .query("SELECT count(*) AS n FROM widgets", &[])
            .unwrap();
        assert_eq!(rows[0]["n"], Value::Int(0));

        test_db.teardown().unwrap();
    }

    #[test]
    fn unreachable_readiness_times_out() {
        let probe = ReadinessProbe::default()
            .with_message("this line is never logged")
            .with_occurrences(1)
            .with_timeout(Duration::from_secs(2));
        let result = TestPostgres::start(params(), probe);
        match result {
            Err(Error::Container(msg)) => assert!(msg.contains("not ready"), "{msg}"),
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("expected readiness timeout"),
        }
    }
}
