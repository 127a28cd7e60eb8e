//! Connection pooling for the Redis store.

use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError};
use tracing::trace;

use crate::error::Error;

/// [`bb8`] connection manager dialing one Redis endpoint.
///
/// Each pooled connection is a dedicated multiplexed connection, so a
/// borrower owns it exclusively for the length of an operation. That is
/// what makes `WATCH`/`MULTI`/`EXEC` sequences safe to issue on it.
///
/// Dialing authenticates with `AUTH` when a password is configured (or
/// checks the link with `PING` otherwise) and issues `SELECT` for a
/// non-default database. Checkouts are validated with `PING`.
#[derive(Debug, Clone)]
pub struct RedisConnectionManager {
    client: Client,
    password: Option<String>,
    database: i64,
}

impl RedisConnectionManager {
    /// Creates a manager for `server` (`host:port` or a `redis://` URL).
    pub fn new(
        server: &str,
        password: Option<String>,
        database: i64,
    ) -> Result<Self, Error> {
        if server.is_empty() {
            return Err(Error::InvalidConfig("empty server address".to_owned()));
        }
        let url = if server.contains("://") {
            server.to_owned()
        } else {
            format!("redis://{server}/")
        };
        Ok(Self {
            client: Client::open(url)?,
            password,
            database,
        })
    }
}

impl bb8::ManageConnection for RedisConnectionManager {
    type Connection = MultiplexedConnection;
    type Error = RedisError;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        trace!("Dial new redis connection");
        let mut con = self.client.get_multiplexed_async_connection().await?;
        match &self.password {
            Some(password) => {
                redis::cmd("AUTH")
                    .arg(password)
                    .query_async::<()>(&mut con)
                    .await?
            }
            None => redis::cmd("PING").query_async::<()>(&mut con).await?,
        }
        if self.database != 0 {
            trace!(database = self.database, "Select logical database");
            redis::cmd("SELECT")
                .arg(self.database)
                .query_async::<()>(&mut con)
                .await?;
        }
        Ok(con)
    }

    /// Clears any WATCH a previous borrower left behind, then pings.
    ///
    /// A borrower dropped between WATCH and EXEC returns its connection
    /// still watching; the next transaction on it would abort for no reason.
    async fn is_valid(&self, con: &mut Self::Connection) -> Result<(), Self::Error> {
        redis::pipe()
            .cmd("UNWATCH")
            .ignore()
            .cmd("PING")
            .ignore()
            .query_async::<()>(con)
            .await
    }

    fn has_broken(&self, _con: &mut Self::Connection) -> bool {
        false
    }
}
