//! Configuration for the inventory scanner

use core_config::{env_list_or, env_or_default};
use eyre::Result;

/// Days of daily cost history fetched per billing-refresh candidate.
pub const DEFAULT_BILLING_WINDOW_DAYS: i64 = 14;

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    /// Path of the account credentials file.
    pub credentials_file: String,
    pub billing: BillingConfig,
    pub aws: AwsConfig,
    pub azure: AzureConfig,
    pub gcp: GcpConfig,
}

#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// Attach cost history during scans
    pub enabled: bool,
    /// Trailing window queried per refresh candidate
    pub window_days: i64,
}

#[derive(Debug, Clone, Default)]
pub struct AwsConfig {
    /// Home region for the cost-explorer endpoint
    pub region: String,

    /// Regions used when the region-list call cannot be made
    pub regions: Vec<String>,

    /// Enable AWS account scanning
    pub enabled: bool,
}

fn default_aws_region() -> String {
    "us-east-1".to_string()
}

const DEFAULT_AWS_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "eu-central-1",
];

#[derive(Debug, Clone, Default)]
pub struct AzureConfig {
    /// Azure subscription ID scanned by default
    pub subscription_id: Option<String>,

    /// Regions used when the region-list call cannot be made
    pub regions: Vec<String>,

    /// Enable Azure account scanning
    pub enabled: bool,
}

const DEFAULT_AZURE_REGIONS: &[&str] = &[
    "eastus",
    "eastus2",
    "westus",
    "westus2",
    "westeurope",
    "northeurope",
];

#[derive(Debug, Clone, Default)]
pub struct GcpConfig {
    /// GCP project ID scanned by default
    pub project_id: Option<String>,

    /// Regions used when the region-list call cannot be made
    pub regions: Vec<String>,

    /// Enable GCP account scanning
    pub enabled: bool,
}

const DEFAULT_GCP_REGIONS: &[&str] = &[
    "us-central1",
    "us-east1",
    "us-west1",
    "europe-west1",
    "europe-west2",
];

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|s| s.parse().unwrap_or(default))
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config = Config {
            environment: env_or_default("ENVIRONMENT", "development"),
            credentials_file: env_or_default("SCAN_CREDENTIALS_FILE", "credentials.json"),
            billing: BillingConfig {
                enabled: env_flag("BILLING_ENABLED", true),
                window_days: std::env::var("BILLING_WINDOW_DAYS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_BILLING_WINDOW_DAYS),
            },
            aws: AwsConfig {
                region: env_or_default("AWS_REGION", &default_aws_region()),
                regions: env_list_or("AWS_REGIONS", DEFAULT_AWS_REGIONS),
                enabled: env_flag("AWS_ENABLED", true),
            },
            azure: AzureConfig {
                subscription_id: std::env::var("AZURE_SUBSCRIPTION_ID").ok(),
                regions: env_list_or("AZURE_REGIONS", DEFAULT_AZURE_REGIONS),
                enabled: env_flag("AZURE_ENABLED", true),
            },
            gcp: GcpConfig {
                project_id: std::env::var("GCP_PROJECT_ID").ok(),
                regions: env_list_or("GCP_REGIONS", DEFAULT_GCP_REGIONS),
                enabled: env_flag("GCP_ENABLED", true),
            },
        };

        Ok(config)
    }
}
