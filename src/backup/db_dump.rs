// tablevault/src/backup/db_dump.rs
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::errors::{DbToolError, Result};
use crate::orchestrator::task::validate_table_name;
use crate::orchestrator::{Outcome, Task};
use crate::utils::database::{ConnectionParams, Database};
use crate::utils::find_executable;
use crate::utils::process::ProcessOutput;
use crate::utils::retry::RetryPolicy;

const DUMP_PROGRAM: &str = "mysqldump";

/// External dump client. Writes one table's dump into `output_file`.
#[async_trait]
pub trait DumpClient: Send + Sync {
    async fn dump(&self, table: &str, output_file: &Path) -> Result<ProcessOutput>;
}

/// `mysqldump` with its standard output redirected to the dump file.
pub struct MysqlDumpClient {
    executable: PathBuf,
    working_dir: Option<PathBuf>,
    connection: ConnectionParams,
    character_set: String,
    extra_options: Vec<String>,
}

impl MysqlDumpClient {
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let executable = find_executable(DUMP_PROGRAM, config.client_dir.as_deref())?;
        debug!("Found {} executable at: {}", DUMP_PROGRAM, executable.display());
        Ok(Self {
            executable,
            working_dir: config.client_dir.clone(),
            connection: config.connection.clone(),
            character_set: config.character_set.clone(),
            extra_options: config.extra_dump_options.clone(),
        })
    }
}

#[async_trait]
impl DumpClient for MysqlDumpClient {
    async fn dump(&self, table: &str, output_file: &Path) -> Result<ProcessOutput> {
        let file = tokio::fs::File::create(output_file).await?.into_std().await;

        let mut cmd = Command::new(&self.executable);
        // Password via environment: on the command line mysqldump warns on stderr.
        cmd.env("MYSQL_PWD", &self.connection.password)
            .arg(format!("--default-character-set={}", self.character_set))
            .arg("-h")
            .arg(&self.connection.host)
            .arg("-P")
            .arg(self.connection.port.to_string())
            .arg("-u")
            .arg(&self.connection.user)
            .args(&self.extra_options)
            .arg(&self.connection.database)
            .arg(table)
            .stdin(Stdio::null())
            .stdout(Stdio::from(file))
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        // `output()` would re-pipe stdout, so wait on the spawned child instead.
        let output = cmd.spawn()?.wait_with_output().await?;
        Ok(ProcessOutput::from(output))
    }
}

/// Backs up one table: waits for a connection, runs the dump client, and
/// releases the connection whatever the result.
pub struct DumpRunner {
    database: Arc<dyn Database>,
    client: Arc<dyn DumpClient>,
    connection_retry: RetryPolicy,
}

impl DumpRunner {
    pub fn new(
        database: Arc<dyn Database>,
        client: Arc<dyn DumpClient>,
        connection_retry: RetryPolicy,
    ) -> Self {
        Self {
            database,
            client,
            connection_retry,
        }
    }

    pub async fn dump(&self, task: &Task) -> Outcome {
        let table = task.id();
        if let Err(err) = validate_table_name(table) {
            return Outcome::failed(table, err.to_string());
        }

        let label = format!("connect for {}", table);
        let connection = match self
            .connection_retry
            .run(&label, |_attempt| self.database.connect())
            .await
        {
            Ok(connection) => connection,
            Err(err) => return Outcome::failed(table, err.to_string()),
        };

        let result = self.run_client(table, task.path()).await;

        if let Err(err) = connection.close().await {
            warn!(table, "Failed to close probe connection: {}", err);
        }

        match result {
            Ok(()) => Outcome::succeeded(table, task.path().display().to_string()),
            Err(err) => {
                // A partial dump must not be picked up by a later restore.
                if let Err(rm_err) = tokio::fs::remove_file(task.path()).await {
                    if rm_err.kind() != std::io::ErrorKind::NotFound {
                        warn!(table, "Failed to remove partial dump {}: {}", task.path().display(), rm_err);
                    }
                }
                Outcome::failed(table, err.to_string())
            }
        }
    }

    async fn run_client(&self, table: &str, output_file: &Path) -> Result<()> {
        let output = self.client.dump(table, output_file).await?;
        if !output.success() {
            return Err(output.into_command_error(DUMP_PROGRAM));
        }
        // stdout goes to the file, so anything captured here is unexpected.
        if !output.stdout.is_empty() {
            return Err(DbToolError::UnexpectedOutput {
                program: DUMP_PROGRAM.to_string(),
                output: output.stdout.trim().to_string(),
            });
        }
        if !output.stderr.is_empty() {
            return Err(DbToolError::UnexpectedOutput {
                program: DUMP_PROGRAM.to_string(),
                output: output.stderr.trim().to_string(),
            });
        }
        debug!(table, "✓ dumped to {}", output_file.display());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::utils::database::DbConnection;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts opened and closed connections; fails the first `fail_first` connects.
    #[derive(Default)]
    pub(crate) struct FakeDatabase {
        pub tables: Vec<String>,
        pub fail_first: usize,
        pub connects: AtomicUsize,
        pub opened: Arc<AtomicUsize>,
        pub closed: Arc<AtomicUsize>,
    }

    struct FakeConnection(Arc<AtomicUsize>);

    #[async_trait]
    impl DbConnection for FakeConnection {
        async fn close(self: Box<Self>) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl Database for FakeDatabase {
        async fn list_tables(&self) -> Result<Vec<String>> {
            Ok(self.tables.clone())
        }

        async fn connect(&self) -> Result<Box<dyn DbConnection>> {
            let n = self.connects.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(DbToolError::Connection("Can't connect to MySQL server".to_string()));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeConnection(Arc::clone(&self.closed))))
        }
    }

    /// Scripted dump client: writes a stub dump and returns the scripted output.
    #[derive(Default)]
    pub(crate) struct FakeDumpClient {
        pub scripted: HashMap<String, ProcessOutput>,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeDumpClient {
        pub fn failing(table: &str, status: i32, stderr: &str) -> Self {
            let mut client = Self::default();
            client.scripted.insert(
                table.to_string(),
                ProcessOutput {
                    status: Some(status),
                    stdout: String::new(),
                    stderr: stderr.to_string(),
                },
            );
            client
        }
    }

    #[async_trait]
    impl DumpClient for FakeDumpClient {
        async fn dump(&self, table: &str, output_file: &Path) -> Result<ProcessOutput> {
            self.calls.lock().unwrap().push(table.to_string());
            tokio::fs::write(output_file, format!("-- dump of {}\n", table)).await?;
            Ok(self.scripted.get(table).cloned().unwrap_or(ProcessOutput {
                status: Some(0),
                ..Default::default()
            }))
        }
    }

    fn runner(database: FakeDatabase, client: FakeDumpClient) -> (DumpRunner, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let opened = Arc::clone(&database.opened);
        let closed = Arc::clone(&database.closed);
        let runner = DumpRunner::new(
            Arc::new(database),
            Arc::new(client),
            RetryPolicy::bounded(5, Duration::from_secs(2)),
        );
        (runner, opened, closed)
    }

    #[tokio::test]
    async fn test_clean_dump_succeeds_and_releases_connection() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let (runner, opened, closed) = runner(FakeDatabase::default(), FakeDumpClient::default());

        let task = Task::dump("users", dir.path());
        let outcome = runner.dump(&task).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.detail(), task.path().display().to_string());
        assert!(task.path().is_file());
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_mysqldump_writes_into_dump_file() -> anyhow::Result<()> {
        use crate::config::tests::session_with_clients;
        use crate::utils::process::tests::write_script;

        let clients = tempfile::tempdir()?;
        let out = tempfile::tempdir()?;
        write_script(
            clients.path(),
            "mysqldump",
            "echo \"-- args: $*\"\necho \"-- password: $MYSQL_PWD\"",
        )?;
        let client = MysqlDumpClient::new(&session_with_clients(clients.path()))?;

        let target = out.path().join("users.sql");
        let output = client.dump("users", &target).await?;

        assert!(output.success());
        assert_eq!(output.stdout, "");
        assert_eq!(output.stderr, "");
        let dump = std::fs::read_to_string(&target)?;
        let mut lines = dump.lines();
        let args = lines.next().unwrap_or_default();
        assert_eq!(
            args,
            "-- args: --default-character-set=utf8mb4 -h db.internal -P 3307 -u backup \
             --single-transaction shop users"
        );
        assert!(!args.contains("s3cret"));
        assert_eq!(lines.next(), Some("-- password: s3cret"));
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runner_with_mysqldump_keeps_dump_and_rejects_stderr() -> anyhow::Result<()> {
        use crate::config::tests::session_with_clients;
        use crate::utils::process::tests::write_script;

        let clients = tempfile::tempdir()?;
        let out = tempfile::tempdir()?;
        write_script(
            clients.path(),
            "mysqldump",
            "if [ \"$3\" = warn ]; then echo 'mysqldump: [Warning] skipped' >&2; fi\necho \"CREATE TABLE $9;\"",
        )?;
        let mut session = session_with_clients(clients.path());
        session.extra_dump_options.clear();
        let database: Arc<dyn Database> = Arc::new(FakeDatabase::default());
        let ok_runner = DumpRunner::new(
            Arc::clone(&database),
            Arc::new(MysqlDumpClient::new(&session)?),
            RetryPolicy::bounded(1, Duration::ZERO),
        );

        let task = Task::dump("users", out.path());
        let outcome = ok_runner.dump(&task).await;
        assert!(outcome.is_success(), "{}", outcome.detail());
        assert_eq!(std::fs::read_to_string(task.path())?, "CREATE TABLE users;\n");

        session.connection.host = "warn".to_string();
        let warn_runner = DumpRunner::new(
            database,
            Arc::new(MysqlDumpClient::new(&session)?),
            RetryPolicy::bounded(1, Duration::ZERO),
        );
        let task = Task::dump("orders", out.path());
        let outcome = warn_runner.dump(&task).await;
        assert!(!outcome.is_success());
        assert!(outcome.detail().contains("[Warning] skipped"));
        assert!(!task.path().exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_client_failure_carries_stderr_and_releases_connection() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let client = FakeDumpClient::failing("orders", 1, "mysqldump: Got error: 1045: Access denied for user");
        let (runner, _opened, closed) = runner(FakeDatabase::default(), client);

        let task = Task::dump("orders", dir.path());
        let outcome = runner.dump(&task).await;

        assert!(!outcome.is_success());
        assert!(outcome.detail().contains("Access denied"));
        assert!(!task.path().exists(), "partial dump should be removed");
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_stderr_on_zero_exit_is_a_failure() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let client = FakeDumpClient::failing("logs", 0, "Warning: table is marked as crashed");
        let (runner, _, _) = runner(FakeDatabase::default(), client);

        let outcome = runner.dump(&Task::dump("logs", dir.path())).await;
        assert!(!outcome.is_success());
        assert!(outcome.detail().contains("marked as crashed"));
        Ok(())
    }

    #[tokio::test]
    async fn test_stray_stdout_is_a_failure() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut client = FakeDumpClient::default();
        client.scripted.insert(
            "users".to_string(),
            ProcessOutput {
                status: Some(0),
                stdout: "CREATE TABLE users".to_string(),
                stderr: String::new(),
            },
        );
        let (runner, _, _) = runner(FakeDatabase::default(), client);

        let outcome = runner.dump(&Task::dump("users", dir.path())).await;
        assert!(!outcome.is_success());
        assert!(outcome.detail().contains("unexpected output"));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_connection_then_dumps() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let database = FakeDatabase {
            fail_first: 3,
            ..Default::default()
        };
        let (runner, opened, closed) = runner(database, FakeDumpClient::default());

        let outcome = runner.dump(&Task::dump("users", dir.path())).await;
        assert!(outcome.is_success());
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_gate_exhaustion_skips_client() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let database = FakeDatabase {
            fail_first: usize::MAX,
            ..Default::default()
        };
        let client = Arc::new(FakeDumpClient::default());
        let runner = DumpRunner::new(
            Arc::new(database),
            client.clone(),
            RetryPolicy::bounded(3, Duration::from_secs(2)),
        );

        let outcome = runner.dump(&Task::dump("users", dir.path())).await;
        assert!(!outcome.is_success());
        assert!(outcome.detail().contains("Gave up after 3 attempt(s)"));
        assert!(client.calls.lock().unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_table_name_fails_without_connecting() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let (runner, opened, _) = runner(FakeDatabase::default(), FakeDumpClient::default());

        let outcome = runner.dump(&Task::dump("../escape", dir.path())).await;
        assert!(!outcome.is_success());
        assert_eq!(opened.load(Ordering::SeqCst), 0);
        Ok(())
    }
}
