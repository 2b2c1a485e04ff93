// tablevault/src/utils/database.rs
use async_trait::async_trait;
use sqlx::{Connection, MySqlConnection, Row};
use std::fmt;
use tracing::{debug, info};
use url::Url;

use crate::errors::{DbToolError, Result};

/// Connection parameters shared by the driver and the external clients.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl ConnectionParams {
    /// Builds a `mysql://` URL with user and password percent-encoded.
    pub fn to_url(&self) -> Result<Url> {
        let mut url = Url::parse(&format!("mysql://{}:{}", self.host, self.port))?;
        url.set_username(&self.user)
            .map_err(|_| DbToolError::Config(format!("Invalid database user: {}", self.user)))?;
        url.set_password(Some(&self.password).filter(|p| !p.is_empty()).map(|p| p.as_str()))
            .map_err(|_| DbToolError::Config("Invalid database password".to_string()))?;
        url.set_path(&self.database);
        Ok(url)
    }
}

// Keeps the password out of logs.
impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}

/// An open connection held for the duration of one table's dump.
#[async_trait]
pub trait DbConnection: Send {
    async fn close(self: Box<Self>) -> Result<()>;
}

/// The database driver as seen by the sessions: table listing and liveness.
///
/// Implementations must allow many independent connections at once, one per
/// running dump worker.
#[async_trait]
pub trait Database: Send + Sync {
    async fn list_tables(&self) -> Result<Vec<String>>;

    async fn connect(&self) -> Result<Box<dyn DbConnection>>;
}

pub struct MySqlDatabase {
    params: ConnectionParams,
}

impl MySqlDatabase {
    pub fn new(params: ConnectionParams) -> Self {
        Self { params }
    }

    async fn open(&self) -> Result<MySqlConnection> {
        let url = self.params.to_url()?;
        MySqlConnection::connect(url.as_str())
            .await
            .map_err(|e| {
                DbToolError::Connection(format!(
                    "{}@{}:{}/{}: {}",
                    self.params.user, self.params.host, self.params.port, self.params.database, e
                ))
            })
    }
}

struct MySqlProbe(MySqlConnection);

#[async_trait]
impl DbConnection for MySqlProbe {
    async fn close(self: Box<Self>) -> Result<()> {
        let MySqlProbe(conn) = *self;
        conn.close().await?;
        Ok(())
    }
}

#[async_trait]
impl Database for MySqlDatabase {
    async fn list_tables(&self) -> Result<Vec<String>> {
        info!(database = %self.params.database, "Fetching list of tables...");
        let mut conn = self.open().await.map_err(|e| DbToolError::Enumeration {
            what: "tables".to_string(),
            reason: e.to_string(),
        })?;

        // Same set as SHOW TABLES (base tables and views), decoded as text.
        let rows = sqlx::query(
            "SELECT CAST(table_name AS CHAR) AS table_name
             FROM information_schema.tables
             WHERE table_schema = DATABASE()
             ORDER BY table_name",
        )
        .fetch_all(&mut conn)
        .await
        .map_err(|e| DbToolError::Enumeration {
            what: "tables".to_string(),
            reason: e.to_string(),
        })?;

        let tables = rows
            .iter()
            .map(|row| row.try_get::<String, _>("table_name"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        conn.close().await?;

        debug!(count = tables.len(), "Found tables: {:?}", tables);
        Ok(tables)
    }

    async fn connect(&self) -> Result<Box<dyn DbConnection>> {
        Ok(Box::new(MySqlProbe(self.open().await?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConnectionParams {
        ConnectionParams {
            host: "db.internal".to_string(),
            port: 3307,
            user: "backup".to_string(),
            password: "p@ss:w/rd".to_string(),
            database: "shop".to_string(),
        }
    }

    #[test]
    fn test_url_encodes_credentials() -> anyhow::Result<()> {
        let url = params().to_url()?;
        assert_eq!(url.scheme(), "mysql");
        assert_eq!(url.host_str(), Some("db.internal"));
        assert_eq!(url.port(), Some(3307));
        assert_eq!(url.username(), "backup");
        assert_eq!(url.password(), Some("p%40ss%3Aw%2Frd"));
        assert_eq!(url.path(), "/shop");
        Ok(())
    }

    #[test]
    fn test_empty_password_is_omitted() -> anyhow::Result<()> {
        let mut p = params();
        p.password.clear();
        assert_eq!(p.to_url()?.password(), None);
        Ok(())
    }

    #[test]
    fn test_debug_hides_password() {
        let rendered = format!("{:?}", params());
        assert!(!rendered.contains("p@ss"));
        assert!(rendered.contains("***"));
    }
}
