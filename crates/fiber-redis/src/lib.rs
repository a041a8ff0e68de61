//! # Fiber Redis
//!
//! Thin cache client for Fiber services.
//!
//! ## Example
//!
//! ```rust,no_run
//! use fiber_redis::RedisClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = RedisClient::connect("localhost:6379", None, None).await?;
//!
//!     client.set_ex("key", "value", 3600).await?;
//!     let value: Option<String> = client.get("key").await?;
//!
//!     Ok(())
//! }
//! ```

mod client;

pub use client::RedisClient;

// Re-export commonly used types
pub use redis::RedisError;

/// Result type for Redis operations
pub type Result<T> = std::result::Result<T, RedisError>;
