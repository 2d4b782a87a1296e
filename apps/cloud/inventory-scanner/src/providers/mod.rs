//! Cloud inventory providers
//!
//! This module contains implementations for discovering compute resources,
//! hosted DNS zones, and daily cost data from AWS, Azure, and GCP.

pub mod aws;
pub mod azure;
pub mod gcp;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use domain_inventory::{CloudProvider, InstanceStatus};
use thiserror::Error;

use crate::credentials::AccountCredentials;

pub use aws::AwsInventoryProvider;
pub use azure::AzureInventoryProvider;
pub use gcp::GcpInventoryProvider;

/// Error type for inventory provider operations
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// A compute instance as reported by a provider's list call, before tag
/// resolution and domain validation.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredInstance {
    pub instance_id: String,
    pub instance_type: String,
    pub availability_zone: String,
    pub state: InstanceStatus,
    pub launch_time: Option<DateTime<Utc>>,
    /// Key-value pairs in the order the API returned them.
    pub tags: Vec<(String, String)>,
}

/// A DNS hosted zone reachable by the account's credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedZone {
    pub id: String,
    pub name: String,
}

/// One daily bucket from the cost API. Amount and period start are kept as
/// the raw strings the API returned; parsing them is reconciliation logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostBucket {
    pub period_start: String,
    pub amount: String,
}

/// Inclusive-start, exclusive-end day range for a cost query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl CostWindow {
    /// The trailing `days`-day window ending at `end` (exclusive of `end`
    /// plus one, i.e. covering `end - days .. end`).
    pub fn trailing(end: NaiveDate, days: i64) -> Self {
        Self {
            start: end - Duration::days(days),
            end,
        }
    }
}

/// An authenticated, provider-specific connection for one account.
///
/// Sessions are handed out by [`InventoryProvider::connect`] and expose the
/// three cloud APIs the scan consumes: compute discovery, hosted DNS zones,
/// and daily cost queries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderSession: Send + Sync {
    /// All regions visible to the account's credentials.
    async fn list_regions(&self) -> ProviderResult<Vec<String>>;

    /// Running, stopped, and terminated instances in one region.
    async fn list_instances(&self, region: &str) -> ProviderResult<Vec<DiscoveredInstance>>;

    /// All hosted DNS zones reachable by the connection.
    async fn list_hosted_zones(&self) -> ProviderResult<Vec<HostedZone>>;

    /// Tags attached to one hosted zone resource.
    async fn list_zone_tags(&self, zone_id: &str) -> ProviderResult<Vec<(String, String)>>;

    /// Record names in one hosted zone (paginated internally).
    async fn list_zone_records(&self, zone_id: &str) -> ProviderResult<Vec<String>>;

    /// Daily unblended cost buckets for one resource id.
    async fn query_daily_costs(
        &self,
        resource_id: &str,
        window: CostWindow,
    ) -> ProviderResult<Vec<CostBucket>>;
}

/// Trait for cloud inventory providers
#[async_trait]
pub trait InventoryProvider: Send + Sync {
    /// Get the cloud provider type
    fn provider(&self) -> CloudProvider;

    /// Get the provider name
    fn name(&self) -> &'static str;

    /// Check if the provider is configured and ready
    fn is_configured(&self) -> bool;

    /// Resolve account credentials into an authenticated session. Failure
    /// here is fatal for the account's scan.
    async fn connect(
        &self,
        credentials: &AccountCredentials,
    ) -> ProviderResult<Box<dyn ProviderSession>>;

    /// Health check - verify API connectivity
    async fn health_check(&self) -> ProviderResult<bool>;

    /// Get supported regions for this provider
    fn supported_regions(&self) -> Vec<String>;
}

/// Map a provider-reported instance state onto the three states the
/// inventory tracks. Transitional states map to the side they are heading
/// for; unrecognized states map to `Stopped`.
pub fn map_instance_state(state: &str) -> InstanceStatus {
    match state.to_ascii_lowercase().as_str() {
        "running" | "pending" | "starting" | "provisioning" | "staging" => InstanceStatus::Running,
        "terminated" | "shutting-down" | "deleting" => InstanceStatus::Terminated,
        _ => InstanceStatus::Stopped,
    }
}

/// Registry of all inventory providers
pub struct ProviderRegistry {
    providers: Vec<Box<dyn InventoryProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    pub fn register(&mut self, provider: Box<dyn InventoryProvider>) {
        self.providers.push(provider);
    }

    pub fn get_provider(&self, cloud_provider: CloudProvider) -> Option<&dyn InventoryProvider> {
        self.providers
            .iter()
            .find(|p| p.provider() == cloud_provider)
            .map(|p| p.as_ref())
    }

    pub fn all_providers(&self) -> &[Box<dyn InventoryProvider>] {
        &self.providers
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
