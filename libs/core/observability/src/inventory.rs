//! Scan-specific metrics for the discovery and reconciliation pipeline.

use metrics::{counter, gauge, histogram};

/// Inventory metrics recorder
pub struct InventoryMetrics;

impl InventoryMetrics {
    // =========================================================================
    // Scan Metrics
    // =========================================================================

    /// Record a completed scan run
    pub fn record_scan_complete(
        accounts_scanned: usize,
        accounts_failed: usize,
        clusters: usize,
        instances: usize,
        duration_ms: u64,
    ) {
        counter!("inventory_scans_total", "outcome" => "completed").increment(1);
        histogram!("inventory_scan_duration_seconds").record(duration_ms as f64 / 1000.0);
        gauge!("inventory_clusters_last_scan").set(clusters as f64);
        gauge!("inventory_instances_last_scan").set(instances as f64);

        tracing::debug!(
            accounts_scanned = accounts_scanned,
            accounts_failed = accounts_failed,
            clusters = clusters,
            instances = instances,
            duration_ms = duration_ms,
            "Recorded scan metrics"
        );
    }

    /// Record one account scanned successfully
    pub fn record_account_scanned(provider: &str) {
        counter!(
            "inventory_accounts_scanned_total",
            "provider" => provider.to_string(),
            "outcome" => "success"
        )
        .increment(1);
    }

    /// Record one account whose scan aborted (connection/auth failure)
    pub fn record_account_failed(provider: &str) {
        counter!(
            "inventory_accounts_scanned_total",
            "provider" => provider.to_string(),
            "outcome" => "failure"
        )
        .increment(1);
    }

    /// Record a region skipped because discovery failed there
    pub fn record_region_skipped(provider: &str, region: &str) {
        counter!(
            "inventory_regions_skipped_total",
            "provider" => provider.to_string(),
            "region" => region.to_string()
        )
        .increment(1);
    }

    // =========================================================================
    // Billing Metrics
    // =========================================================================

    /// Record daily expense rows attached to instances
    pub fn record_expenses_recorded(provider: &str, count: usize) {
        counter!(
            "inventory_expenses_recorded_total",
            "provider" => provider.to_string()
        )
        .increment(count as u64);
    }

    /// Record a billing lookup skipped for one instance
    pub fn record_billing_failure(provider: &str) {
        counter!(
            "inventory_billing_failures_total",
            "provider" => provider.to_string()
        )
        .increment(1);
    }

    // =========================================================================
    // Console Link Metrics
    // =========================================================================

    /// Record console links resolved through hosted zone records
    pub fn record_console_links_resolved(provider: &str, count: usize) {
        counter!(
            "inventory_console_links_resolved_total",
            "provider" => provider.to_string()
        )
        .increment(count as u64);
    }
}
