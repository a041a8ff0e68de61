//! Redis client implementation with connection management

use crate::Result;
use redis::{aio::ConnectionManager, AsyncCommands, ConnectionInfo, IntoConnectionInfo};
use tracing::info;

/// Redis client with automatic reconnection
#[derive(Clone)]
pub struct RedisClient {
    conn: ConnectionManager,
}

impl RedisClient {
    /// Connect to Redis and verify the connection with PING.
    ///
    /// `uri` is either a plain "host:port" address or a redis:// / rediss://
    /// URL. Credentials, when given, override any found in the URL. The
    /// default database (0) is always selected.
    pub async fn connect(uri: &str, username: Option<&str>, password: Option<&str>) -> Result<Self> {
        let info = connection_info(uri, username, password)?;
        let client = redis::Client::open(info)?;
        let mut conn = ConnectionManager::new(client).await?;

        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(reply = %pong, "Connected to Redis");

        Ok(Self { conn })
    }

    /// PING - round trip to the server
    pub async fn ping(&mut self) -> Result<()> {
        let _: String = redis::cmd("PING").query_async(&mut self.conn).await?;
        Ok(())
    }

    // ============================================================================
    // Key-Value Operations
    // ============================================================================

    /// GET - Get value by key
    pub async fn get<T: redis::FromRedisValue>(&mut self, key: &str) -> Result<Option<T>> {
        self.conn.get(key).await
    }

    /// SET - Set key to value
    pub async fn set<V>(&mut self, key: &str, value: V) -> Result<()>
    where
        V: redis::ToRedisArgs + Send + Sync,
    {
        self.conn.set(key, value).await
    }

    /// SETEX - Set key with expiry in seconds
    pub async fn set_ex<V>(&mut self, key: &str, value: V, seconds: u64) -> Result<()>
    where
        V: redis::ToRedisArgs + Send + Sync,
    {
        self.conn.set_ex(key, value, seconds).await
    }

    /// DEL - Delete one or more keys
    pub async fn del<K>(&mut self, keys: K) -> Result<i64>
    where
        K: redis::ToRedisArgs + Send + Sync,
    {
        self.conn.del(keys).await
    }

    /// EXISTS - Check if key exists
    pub async fn exists(&mut self, key: &str) -> Result<bool> {
        self.conn.exists(key).await
    }
}

/// Builds the connection info for `uri`, applying credentials and DB 0.
pub(crate) fn connection_info(
    uri: &str,
    username: Option<&str>,
    password: Option<&str>,
) -> Result<ConnectionInfo> {
    let url = if uri.contains("://") {
        uri.to_string()
    } else {
        format!("redis://{}", uri)
    };

    let mut info = url.as_str().into_connection_info()?;
    info.redis.db = 0;
    if let Some(username) = username {
        info.redis.username = Some(username.to_string());
    }
    if let Some(password) = password {
        info.redis.password = Some(password.to_string());
    }
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_plain_address_gets_scheme_and_default_db() {
        let info = connection_info("cache:6380", None, None).unwrap();
        match &info.addr {
            redis::ConnectionAddr::Tcp(host, port) => {
                assert_eq!(host, "cache");
                assert_eq!(*port, 6380);
            }
            other => panic!("unexpected address: {:?}", other),
        }
        assert_eq!(info.redis.db, 0);
        assert!(info.redis.username.is_none());
        assert!(info.redis.password.is_none());
    }

    #[test]
    fn test_credentials_override_url() {
        let info =
            connection_info("redis://old:pw@cache:6379/3", Some("fiber"), Some("secret")).unwrap();
        assert_eq!(info.redis.db, 0);
        assert_eq!(info.redis.username.as_deref(), Some("fiber"));
        assert_eq!(info.redis.password.as_deref(), Some("secret"));
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn test_roundtrip_against_local_redis() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "127.0.0.1:6379".to_string());
        let mut client = RedisClient::connect(&url, None, None)
            .await
            .expect("Redis must be running for this test");

        client.set_ex("fiber:test:key", "value", 30).await.unwrap();
        let value: Option<String> = client.get("fiber:test:key").await.unwrap();
        assert_eq!(value.as_deref(), Some("value"));
        assert!(client.exists("fiber:test:key").await.unwrap());

        client.del("fiber:test:key").await.unwrap();
        assert!(!client.exists("fiber:test:key").await.unwrap());
        client.ping().await.unwrap();
    }
}
