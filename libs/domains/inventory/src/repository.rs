use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::InventoryResult;
use crate::models::{Account, Cluster, Instance, Inventory};

/// Counts of entities applied by one snapshot write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PersistSummary {
    pub accounts: usize,
    pub clusters: usize,
    pub instances: usize,
    pub tags: usize,
    pub expenses: usize,
}

/// Write contract between the scan core and the persistence layer.
///
/// Implementations upsert idempotently, keyed by account name, cluster id,
/// instance id, (instance id, date) for expenses and (key, instance id) for
/// tags: re-applying an unchanged snapshot must not duplicate anything.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Apply a finished scan snapshot.
    async fn persist_snapshot(&self, inventory: &Inventory) -> InventoryResult<PersistSummary>;

    /// The most recently applied snapshot, if any.
    async fn latest_snapshot(&self) -> InventoryResult<Option<Inventory>>;
}

/// In-memory implementation of [`InventoryStore`] (for development/testing).
#[derive(Debug, Default, Clone)]
pub struct InMemoryInventoryStore {
    state: Arc<RwLock<StoreState>>,
}

#[derive(Debug, Default)]
struct StoreState {
    accounts: HashMap<String, Account>,
    last_scan: Option<(Uuid, DateTime<Utc>)>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn persist_snapshot(&self, inventory: &Inventory) -> InventoryResult<PersistSummary> {
        let mut state = self.state.write().await;
        let mut summary = PersistSummary::default();

        for account in inventory.accounts() {
            summary.accounts += 1;
            let stored = state
                .accounts
                .entry(account.name.clone())
                .or_insert_with(|| Account::new(&account.id, &account.name, account.provider));
            merge_account(stored, account, &mut summary);
        }

        state.last_scan = Some((inventory.scan_id, inventory.created_at));
        tracing::info!(
            scan_id = %inventory.scan_id,
            accounts = summary.accounts,
            clusters = summary.clusters,
            instances = summary.instances,
            "Applied inventory snapshot"
        );
        Ok(summary)
    }

    async fn latest_snapshot(&self) -> InventoryResult<Option<Inventory>> {
        let state = self.state.read().await;
        Ok(state.last_scan.map(|(scan_id, created_at)| {
            Inventory::from_parts(scan_id, created_at, state.accounts.clone())
        }))
    }
}

fn merge_account(stored: &mut Account, scanned: &Account, summary: &mut PersistSummary) {
    stored.id = scanned.id.clone();
    stored.provider = scanned.provider;

    for cluster in scanned.clusters() {
        summary.clusters += 1;
        summary.instances += cluster.instance_count();
        for instance in cluster.instances() {
            summary.tags += instance.tags().len();
            summary.expenses += instance.expenses().len();
        }

        match stored.clusters_mut().entry(cluster.id.clone()) {
            Entry::Occupied(mut existing) => merge_cluster(existing.get_mut(), cluster),
            Entry::Vacant(slot) => {
                slot.insert(cluster.clone());
            }
        }
    }
}

fn merge_cluster(stored: &mut Cluster, scanned: &Cluster) {
    stored.console_link = scanned.console_link.clone();
    stored.owner = scanned.owner.clone();
    stored.region = scanned.region.clone();

    for instance in scanned.instances() {
        upsert_instance(stored, instance.clone());
    }
    stored.rederive_status();
}

/// Upsert one instance by id: scalar fields are replaced, tags merge by key,
/// expenses merge by date.
fn upsert_instance(cluster: &mut Cluster, incoming: Instance) {
    match cluster
        .instances_mut()
        .iter_mut()
        .find(|i| i.id == incoming.id)
    {
        Some(existing) => {
            existing.name = incoming.name.clone();
            existing.instance_type = incoming.instance_type.clone();
            existing.availability_zone = incoming.availability_zone.clone();
            existing.status = incoming.status;
            existing.cluster_id = incoming.cluster_id.clone();
            existing.age_days = incoming.age_days;
            for tag in incoming.tags() {
                let _ = existing.add_tag(&tag.key, &tag.value);
            }
            for expense in incoming.expenses() {
                let _ = existing.add_expense(expense.clone());
            }
        }
        None => cluster.instances_mut().push(incoming),
    }
}
