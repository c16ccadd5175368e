//! Provider driver trait and retry policy

use crate::error::{CloudError, Result};
use crate::reference::{Address, Attributes};
use crate::state::ResourceState;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// A graph node with every reference already resolved
#[derive(Debug, Clone)]
pub struct ResolvedResource {
    pub address: Address,
    pub config: serde_json::Value,
}

impl ResolvedResource {
    pub fn resource_type(&self) -> &str {
        self.address.resource_type()
    }

    /// Get a configuration value as a specific type
    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.config
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Like [`ResolvedResource::get`], but a missing key is a configuration error
    pub fn require<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.get(key).ok_or_else(|| {
            CloudError::Configuration(format!("{} is missing '{}'", self.address, key))
        })
    }
}

/// Maps graph nodes onto provider API calls
///
/// Implementations return the attributes a resource exports; those
/// attributes are what later references resolve against.
#[async_trait]
pub trait ResourceDriver: Send + Sync {
    /// Read a data source
    async fn read(&self, resource: &ResolvedResource) -> Result<Attributes>;

    /// Create a resource
    async fn create(&self, resource: &ResolvedResource) -> Result<ResourceState>;

    /// Bring an existing resource in line with its configuration
    async fn update(
        &self,
        resource: &ResolvedResource,
        current: &ResourceState,
    ) -> Result<ResourceState>;

    /// Delete a resource recorded in state
    async fn delete(&self, address: &Address, current: &ResourceState) -> Result<()>;
}

/// Retry configuration for provider operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Polling policy for certificate validation (DNS propagation + CA checks)
    pub fn certificate_validation() -> Self {
        Self {
            max_attempts: 60,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 1.5,
        }
    }

    /// No waiting at all, for tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay before attempt `attempt + 1` (0-based), capped at `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }

    /// Run `op`, retrying transient provider errors with exponential backoff
    pub async fn retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        "{} failed ({}), retrying in {:?} ({}/{})",
                        what,
                        e,
                        delay,
                        attempt + 1,
                        self.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
