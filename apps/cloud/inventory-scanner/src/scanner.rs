//! Inventory Scanner Service
//!
//! Orchestrates one full discovery run: for every account entry, open a
//! provider session, walk its regions, resolve tags and aggregate clusters,
//! attach console links, reconcile billing, and hand the finished snapshot
//! to the inventory store.
//!
//! Failure isolation follows three levels: a connection/auth failure aborts
//! that account only; a failed region is logged and skipped; a failed
//! console or billing lookup costs one resource its refresh. Only a run
//! with no usable account entries at all, or a store failure, errors out.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use domain_inventory::{tags, Account, Instance, Inventory, InventoryStore, Tag};
use eyre::{eyre, Result};
use observability::InventoryMetrics;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::billing::BillingReconciler;
use crate::config::Config;
use crate::console;
use crate::credentials::AccountCredentials;
use crate::providers::{
    AwsInventoryProvider, AzureInventoryProvider, GcpInventoryProvider, InventoryProvider,
    ProviderError, ProviderRegistry,
};

/// Result of one inventory scan run
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub accounts_scanned: usize,
    pub accounts_failed: usize,
    pub clusters_discovered: usize,
    pub instances_discovered: usize,
    pub regions_skipped: usize,
    pub expenses_recorded: usize,
    pub console_links_resolved: usize,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Status of the scanner service
#[derive(Debug, Clone, Serialize)]
pub struct ScannerStatus {
    pub providers: Vec<ProviderStatus>,
    pub is_healthy: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub provider: String,
    pub enabled: bool,
    pub is_healthy: bool,
    pub supported_regions: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy)]
struct AccountScanStats {
    clusters: usize,
    instances: usize,
    regions_skipped: usize,
    expenses_recorded: usize,
    console_links_resolved: usize,
}

/// Main inventory scanner service
pub struct InventoryScanner {
    store: Arc<dyn InventoryStore>,
    config: Config,
    registry: ProviderRegistry,
}

impl InventoryScanner {
    pub fn new(store: Arc<dyn InventoryStore>, config: Config) -> Self {
        let mut registry = ProviderRegistry::new();

        // Register all providers
        registry.register(Box::new(AwsInventoryProvider::new(config.aws.clone())));
        registry.register(Box::new(AzureInventoryProvider::new(config.azure.clone())));
        registry.register(Box::new(GcpInventoryProvider::new(config.gcp.clone())));

        Self::with_registry(store, config, registry)
    }

    /// Construct against an explicit provider registry.
    pub fn with_registry(
        store: Arc<dyn InventoryStore>,
        config: Config,
        registry: ProviderRegistry,
    ) -> Self {
        Self {
            store,
            config,
            registry,
        }
    }

    /// Run one full scan over the given account entries.
    ///
    /// `account_filter` restricts the run to the named accounts;
    /// `skip_billing` leaves cost history untouched.
    pub async fn scan(
        &self,
        credentials: &[AccountCredentials],
        account_filter: Option<&[String]>,
        skip_billing: bool,
    ) -> Result<ScanReport> {
        let start = std::time::Instant::now();

        let selected: Vec<&AccountCredentials> = credentials
            .iter()
            .filter(|c| {
                account_filter
                    .map(|names| names.iter().any(|n| n == &c.name))
                    .unwrap_or(true)
            })
            .collect();

        if selected.is_empty() {
            return Err(eyre!("no accounts configured for this scan"));
        }

        let mut inventory = Inventory::new();
        let mut accounts_scanned = 0;
        let mut accounts_failed = 0;
        let mut regions_skipped = 0;
        let mut expenses_recorded = 0;
        let mut console_links_resolved = 0;

        for creds in selected {
            let Some(provider) = self.registry.get_provider(creds.provider) else {
                warn!(account = %creds.name, provider = %creds.provider, "No provider registered, skipping account");
                accounts_failed += 1;
                continue;
            };
            if !provider.is_configured() {
                info!(account = %creds.name, provider = provider.name(), "Provider disabled, skipping account");
                continue;
            }

            info!(account = %creds.name, provider = provider.name(), "Scanning account");

            match self.scan_account(provider, creds, skip_billing).await {
                Ok((account, stats)) => {
                    regions_skipped += stats.regions_skipped;
                    expenses_recorded += stats.expenses_recorded;
                    console_links_resolved += stats.console_links_resolved;

                    info!(
                        account = %creds.name,
                        clusters = stats.clusters,
                        instances = stats.instances,
                        "Account scan complete"
                    );
                    InventoryMetrics::record_account_scanned(provider.name());

                    match inventory.add_account(account) {
                        Ok(()) => accounts_scanned += 1,
                        Err(e) => {
                            error!(account = %creds.name, error = %e, "Dropping account result");
                            accounts_failed += 1;
                        }
                    }
                }
                Err(e) => {
                    // Fatal for this account only; the run moves on.
                    error!(account = %creds.name, error = %e, "Account scan aborted");
                    InventoryMetrics::record_account_failed(provider.name());
                    accounts_failed += 1;
                }
            }
        }

        let clusters_discovered = inventory.cluster_count();
        let instances_discovered = inventory.instance_count();

        let summary = self
            .store
            .persist_snapshot(&inventory)
            .await
            .map_err(|e| eyre!("failed to persist inventory snapshot: {e}"))?;
        debug!(?summary, "Snapshot persisted");

        let duration = start.elapsed();
        InventoryMetrics::record_scan_complete(
            accounts_scanned,
            accounts_failed,
            clusters_discovered,
            instances_discovered,
            duration.as_millis() as u64,
        );

        Ok(ScanReport {
            accounts_scanned,
            accounts_failed,
            clusters_discovered,
            instances_discovered,
            regions_skipped,
            expenses_recorded,
            console_links_resolved,
            duration_ms: duration.as_millis() as u64,
            timestamp: Utc::now(),
        })
    }

    /// Scan one account: connect, walk regions, aggregate, then attach
    /// console links and billing. Connection failure is the only error that
    /// escapes.
    async fn scan_account(
        &self,
        provider: &dyn InventoryProvider,
        creds: &AccountCredentials,
        skip_billing: bool,
    ) -> Result<(Account, AccountScanStats), ProviderError> {
        let session = provider.connect(creds).await?;
        let mut account = Account::new(creds.account_id(), &creds.name, creds.provider);
        let mut stats = AccountScanStats::default();

        let regions = match session.list_regions().await {
            Ok(regions) => regions,
            Err(e) => {
                // Recoverable: the account result stays, just empty.
                warn!(account = %creds.name, error = %e, "Region listing failed, nothing to scan");
                Vec::new()
            }
        };

        for region in &regions {
            let discovered = match session.list_instances(region).await {
                Ok(instances) => instances,
                Err(e) => {
                    warn!(region = %region, error = %e, "Instance discovery failed, skipping region");
                    InventoryMetrics::record_region_skipped(provider.name(), region);
                    stats.regions_skipped += 1;
                    continue;
                }
            };

            debug!(region = %region, count = discovered.len(), "Discovered instances");

            for found in discovered {
                let tag_set: Vec<Tag> = found
                    .tags
                    .iter()
                    .map(|(k, v)| Tag::new(k, v, &found.instance_id))
                    .collect();
                let resolution = tags::resolve(&tag_set);

                let name = if resolution.display_name.is_empty() {
                    found.instance_id.clone()
                } else {
                    resolution.display_name.clone()
                };

                let mut instance = match Instance::new(
                    &found.instance_id,
                    name,
                    creds.provider,
                    &found.instance_type,
                    &found.availability_zone,
                    found.state,
                    &resolution.cluster_id,
                    Instance::age_from(found.launch_time, Utc::now()),
                ) {
                    Ok(instance) => instance,
                    Err(e) => {
                        warn!(region = %region, error = %e, "Skipping invalid instance");
                        continue;
                    }
                };

                for (key, value) in &found.tags {
                    if let Err(e) = instance.add_tag(key, value) {
                        debug!(instance = %instance.id, error = %e, "Skipping invalid tag");
                    }
                }

                account.add_instance(instance, &resolution, region);
            }
        }

        stats.clusters = account.cluster_count();
        stats.instances = account.instance_count();

        // One console-link pass across everything discovered in the account.
        stats.console_links_resolved = console::attach(session.as_ref(), &mut account).await;
        InventoryMetrics::record_console_links_resolved(
            provider.name(),
            stats.console_links_resolved,
        );

        if self.config.billing.enabled && !skip_billing {
            let reconciler = BillingReconciler::new(self.config.billing.window_days);
            let outcome = reconciler.attach(session.as_ref(), &mut account).await;
            stats.expenses_recorded = outcome.expenses_recorded;
            InventoryMetrics::record_expenses_recorded(provider.name(), outcome.expenses_recorded);
            for _ in 0..outcome.instances_failed {
                InventoryMetrics::record_billing_failure(provider.name());
            }
            info!(
                account = %creds.name,
                candidates = outcome.candidates,
                recorded = outcome.expenses_recorded,
                failed = outcome.instances_failed,
                "Billing reconciliation complete"
            );
        }

        Ok((account, stats))
    }

    /// Get scanner status
    pub async fn get_status(&self) -> Result<ScannerStatus> {
        let mut provider_statuses = Vec::new();

        for provider in self.registry.all_providers() {
            let is_healthy = provider.health_check().await.unwrap_or(false);

            provider_statuses.push(ProviderStatus {
                name: provider.name().to_string(),
                provider: provider.provider().to_string(),
                enabled: provider.is_configured(),
                is_healthy,
                supported_regions: provider.supported_regions(),
            });
        }

        let is_healthy = provider_statuses.iter().any(|p| p.enabled && p.is_healthy);

        Ok(ScannerStatus {
            providers: provider_statuses,
            is_healthy,
        })
    }
}
