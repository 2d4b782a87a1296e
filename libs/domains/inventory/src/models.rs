use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::error::{InventoryError, InventoryResult};
use crate::tags::{TagResolution, UNKNOWN_CLUSTER_ID};

/// Cloud provider an account belongs to
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CloudProvider {
    Aws,
    Gcp,
    Azure,
    #[default]
    Unknown,
}

/// Instance power state as reported by the compute API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InstanceStatus {
    Running,
    Stopped,
    Terminated,
}

/// Aggregate cluster state, derived from member instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ClusterStatus {
    #[default]
    Unknown,
    Running,
    Stopped,
    Terminated,
}

/// Minimum number of running members for a cluster to be considered serving
/// traffic (a minimum viable control plane).
pub const STATUS_QUORUM: usize = 3;

/// Console link value until DNS resolution finds a real one.
pub const UNKNOWN_CONSOLE: &str = "UNKNOWN-CONSOLE";

/// Key-value tag attached to an instance.
///
/// The `instance_id` is a back-reference for persistence keying, not
/// ownership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
    pub instance_id: String,
}

impl Tag {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            instance_id: instance_id.into(),
        }
    }
}

/// One day of unblended cost for an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub instance_id: String,
    pub amount: f64,
    pub date: NaiveDate,
}

impl Expense {
    /// Create an expense record. Negative amounts are rejected, never
    /// clamped.
    pub fn new(
        instance_id: impl Into<String>,
        amount: f64,
        date: NaiveDate,
    ) -> InventoryResult<Self> {
        let instance_id = instance_id.into();
        if amount < 0.0 {
            return Err(InventoryError::NegativeExpense {
                instance_id,
                amount,
            });
        }
        Ok(Self {
            instance_id,
            amount,
            date,
        })
    }
}

/// A discovered compute instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub provider: CloudProvider,
    pub instance_type: String,
    pub availability_zone: String,
    pub status: InstanceStatus,
    pub cluster_id: String,
    /// Days since launch, floored at 1.
    pub age_days: i64,
    tags: Vec<Tag>,
    expenses: Vec<Expense>,
}

impl Instance {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        provider: CloudProvider,
        instance_type: impl Into<String>,
        availability_zone: impl Into<String>,
        status: InstanceStatus,
        cluster_id: impl Into<String>,
        age_days: i64,
    ) -> InventoryResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(InventoryError::EmptyInstanceId);
        }
        Ok(Self {
            id,
            name: name.into(),
            provider,
            instance_type: instance_type.into(),
            availability_zone: availability_zone.into(),
            status,
            cluster_id: cluster_id.into(),
            age_days: age_days.max(1),
            tags: Vec::new(),
            expenses: Vec::new(),
        })
    }

    /// Days between launch and `now`, floored at 1. A missing launch time
    /// reports the floor.
    pub fn age_from(launch_time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
        match launch_time {
            Some(launched) => (now - launched).num_days().max(1),
            None => 1,
        }
    }

    /// Attach a tag. Empty keys are rejected; re-adding an existing key
    /// updates the value in place, keeping keys unique and insertion order
    /// stable.
    pub fn add_tag(&mut self, key: impl Into<String>, value: impl Into<String>) -> InventoryResult<()> {
        let key = key.into();
        if key.is_empty() {
            return Err(InventoryError::EmptyTagKey(self.id.clone()));
        }
        let value = value.into();
        match self.tags.iter_mut().find(|t| t.key == key) {
            Some(existing) => existing.value = value,
            None => self.tags.push(Tag::new(key, value, self.id.clone())),
        }
        Ok(())
    }

    /// Attach a daily cost record. Negative amounts are rejected without
    /// mutation; a record for an already-known date replaces the amount, so
    /// re-applying a cost window never duplicates.
    pub fn add_expense(&mut self, expense: Expense) -> InventoryResult<()> {
        if expense.amount < 0.0 {
            return Err(InventoryError::NegativeExpense {
                instance_id: self.id.clone(),
                amount: expense.amount,
            });
        }
        match self.expenses.iter_mut().find(|e| e.date == expense.date) {
            Some(existing) => existing.amount = expense.amount,
            None => self.expenses.push(expense),
        }
        Ok(())
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn expenses(&self) -> &[Expense] {
        &self.expenses
    }

    pub fn last_expense_date(&self) -> Option<NaiveDate> {
        self.expenses.iter().map(|e| e.date).max()
    }

    /// A billing-refresh candidate has no cost record dated `today`.
    pub fn needs_expense_refresh(&self, today: NaiveDate) -> bool {
        match self.last_expense_date() {
            Some(latest) => latest < today,
            None => true,
        }
    }

    /// Sum of all attached daily costs.
    pub fn total_cost(&self) -> f64 {
        self.expenses.iter().map(|e| e.amount).sum()
    }
}

/// Power-control request data for one cluster, consumed by the external
/// power-management path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerTarget {
    pub account_name: String,
    pub region: String,
    pub cluster_id: String,
    pub instance_ids: Vec<String>,
}

/// A logical application cluster inside one account.
///
/// `status` is derived from membership and never set by callers; membership
/// changes only through [`Cluster::add_instance`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    pub infra_id: String,
    pub provider: CloudProvider,
    pub region: String,
    pub account_name: String,
    pub console_link: String,
    pub owner: String,
    status: ClusterStatus,
    instances: Vec<Instance>,
}

impl Cluster {
    pub fn new(
        resolution: &TagResolution,
        provider: CloudProvider,
        region: impl Into<String>,
        account_name: impl Into<String>,
    ) -> Self {
        Self {
            id: resolution.cluster_id.clone(),
            name: resolution.cluster_name.clone(),
            infra_id: resolution.infra_id.clone(),
            provider,
            region: region.into(),
            account_name: account_name.into(),
            console_link: UNKNOWN_CONSOLE.to_string(),
            owner: resolution.owner.clone(),
            status: ClusterStatus::Unknown,
            instances: Vec::new(),
        }
    }

    /// Sole mutator of membership. Recomputes the aggregate status over the
    /// full member set on every call; cost is O(members), fine at the tens
    /// of nodes clusters actually have.
    pub fn add_instance(&mut self, instance: Instance) {
        self.instances.push(instance);
        self.recompute_status();
    }

    /// Quorum vote over current membership:
    /// fewer than [`STATUS_QUORUM`] members is `Unknown`; a quorum of
    /// running members is `Running`; a fully terminated set is `Terminated`;
    /// anything else is `Stopped`.
    fn recompute_status(&mut self) {
        let n = self.instances.len();
        if n < STATUS_QUORUM {
            self.status = ClusterStatus::Unknown;
            return;
        }

        let running = self
            .instances
            .iter()
            .filter(|i| i.status == InstanceStatus::Running)
            .count();
        let terminated = self
            .instances
            .iter()
            .filter(|i| i.status == InstanceStatus::Terminated)
            .count();

        self.status = if running >= STATUS_QUORUM {
            ClusterStatus::Running
        } else if terminated == n {
            ClusterStatus::Terminated
        } else {
            ClusterStatus::Stopped
        };
    }

    pub fn status(&self) -> ClusterStatus {
        self.status
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// True for the bucket holding resources without a cluster marker tag.
    pub fn is_unknown_bucket(&self) -> bool {
        self.id == UNKNOWN_CLUSTER_ID
    }

    pub fn set_console_link(&mut self, link: impl Into<String>) {
        self.console_link = link.into();
    }

    /// Attach a cost record to a member instance.
    pub fn record_expense(&mut self, instance_id: &str, expense: Expense) -> InventoryResult<()> {
        let instance = self
            .instances
            .iter_mut()
            .find(|i| i.id == instance_id)
            .ok_or_else(|| InventoryError::InstanceNotFound(instance_id.to_string()))?;
        instance.add_expense(expense)
    }

    /// Data the external power-control protocol consumes for this cluster.
    pub fn power_target(&self) -> PowerTarget {
        PowerTarget {
            account_name: self.account_name.clone(),
            region: self.region.clone(),
            cluster_id: self.id.clone(),
            instance_ids: self.instances.iter().map(|i| i.id.clone()).collect(),
        }
    }

    pub fn total_cost(&self) -> f64 {
        self.instances.iter().map(|i| i.total_cost()).sum()
    }

    // Store-side access for the persistence merge; not part of the scanning
    // mutation surface.
    pub(crate) fn instances_mut(&mut self) -> &mut Vec<Instance> {
        &mut self.instances
    }

    pub(crate) fn rederive_status(&mut self) {
        self.recompute_status();
    }

    #[cfg(test)]
    pub(crate) fn with_id(id: &str, account_name: &str) -> Self {
        let resolution = TagResolution {
            cluster_name: id.rsplit_once('-').map(|(n, _)| n.to_string()).unwrap_or_else(|| id.to_string()),
            infra_id: id.rsplit_once('-').map(|(_, s)| s.to_string()).unwrap_or_default(),
            cluster_id: id.to_string(),
            owner: String::new(),
            display_name: String::new(),
        };
        Self::new(&resolution, CloudProvider::Aws, "us-east-1", account_name)
    }
}

/// One scanned cloud account and the clusters discovered in it.
///
/// Clusters are held by value in an owned map; mutation goes through the
/// explicit methods below, no raw reference to a map entry escapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub provider: CloudProvider,
    clusters: HashMap<String, Cluster>,
}

impl Account {
    pub fn new(id: impl Into<String>, name: impl Into<String>, provider: CloudProvider) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            provider,
            clusters: HashMap::new(),
        }
    }

    /// Route a discovered instance into its cluster. A new derived cluster
    /// id creates the cluster; an existing one only appends.
    pub fn add_instance(&mut self, instance: Instance, resolution: &TagResolution, region: &str) {
        let cluster = self
            .clusters
            .entry(resolution.cluster_id.clone())
            .or_insert_with(|| Cluster::new(resolution, self.provider, region, self.name.clone()));
        cluster.add_instance(instance);
    }

    pub fn get_cluster(&self, cluster_id: &str) -> Option<&Cluster> {
        self.clusters.get(cluster_id)
    }

    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.values()
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn instance_count(&self) -> usize {
        self.clusters.values().map(|c| c.instance_count()).sum()
    }

    pub fn set_console_link(&mut self, cluster_id: &str, link: impl Into<String>) -> InventoryResult<()> {
        let cluster = self
            .clusters
            .get_mut(cluster_id)
            .ok_or_else(|| InventoryError::ClusterNotFound(cluster_id.to_string()))?;
        cluster.set_console_link(link);
        Ok(())
    }

    pub fn record_expense(
        &mut self,
        cluster_id: &str,
        instance_id: &str,
        expense: Expense,
    ) -> InventoryResult<()> {
        let cluster = self
            .clusters
            .get_mut(cluster_id)
            .ok_or_else(|| InventoryError::ClusterNotFound(cluster_id.to_string()))?;
        cluster.record_expense(instance_id, expense)
    }

    pub(crate) fn clusters_mut(&mut self) -> &mut HashMap<String, Cluster> {
        &mut self.clusters
    }
}

/// The canonical snapshot handed to persistence: every scanned account with
/// its clusters and instances. Add-only during a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    pub scan_id: Uuid,
    pub created_at: DateTime<Utc>,
    accounts: HashMap<String, Account>,
}

impl Inventory {
    pub fn new() -> Self {
        Self {
            scan_id: Uuid::now_v7(),
            created_at: Utc::now(),
            accounts: HashMap::new(),
        }
    }

    /// Add a scanned account. An account with the same name already being
    /// present is a hard error.
    pub fn add_account(&mut self, account: Account) -> InventoryResult<()> {
        if self.accounts.contains_key(&account.name) {
            return Err(InventoryError::DuplicateAccount(account.name));
        }
        self.accounts.insert(account.name.clone(), account);
        Ok(())
    }

    pub fn get_account(&self, name: &str) -> Option<&Account> {
        self.accounts.get(name)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn cluster_count(&self) -> usize {
        self.accounts.values().map(|a| a.cluster_count()).sum()
    }

    pub fn instance_count(&self) -> usize {
        self.accounts.values().map(|a| a.instance_count()).sum()
    }

    /// Deep equality of scanned content, ignoring the per-run scan id and
    /// timestamp. Two scans of an unchanged provider compare equal here.
    pub fn content_eq(&self, other: &Inventory) -> bool {
        self.accounts == other.accounts
    }

    pub(crate) fn from_parts(
        scan_id: Uuid,
        created_at: DateTime<Utc>,
        accounts: HashMap<String, Account>,
    ) -> Self {
        Self {
            scan_id,
            created_at,
            accounts,
        }
    }
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags;

    fn instance(id: &str, status: InstanceStatus) -> Instance {
        Instance::new(
            id,
            format!("node-{id}"),
            CloudProvider::Aws,
            "m5.large",
            "us-east-1a",
            status,
            "foo-ABCDE",
            3,
        )
        .unwrap()
    }

    fn cluster_with(statuses: &[InstanceStatus]) -> Cluster {
        let mut cluster = Cluster::with_id("foo-ABCDE", "dev-account");
        for (i, status) in statuses.iter().enumerate() {
            cluster.add_instance(instance(&format!("i-{i}"), *status));
        }
        cluster
    }

    #[test]
    fn test_empty_cluster_is_unknown() {
        let cluster = cluster_with(&[]);
        assert_eq!(cluster.status(), ClusterStatus::Unknown);
    }

    #[test]
    fn test_below_quorum_is_unknown_regardless_of_statuses() {
        use InstanceStatus::*;
        for statuses in [
            vec![Running],
            vec![Running, Running],
            vec![Stopped, Stopped],
            vec![Terminated, Terminated],
            vec![Running, Terminated],
        ] {
            let cluster = cluster_with(&statuses);
            assert_eq!(
                cluster.status(),
                ClusterStatus::Unknown,
                "statuses: {statuses:?}"
            );
        }
    }

    #[test]
    fn test_quorum_of_running_members_is_running() {
        use InstanceStatus::*;
        let cluster = cluster_with(&[Running, Running, Running]);
        assert_eq!(cluster.status(), ClusterStatus::Running);

        // The states of the remaining members don't matter.
        let cluster = cluster_with(&[Running, Running, Running, Stopped, Terminated]);
        assert_eq!(cluster.status(), ClusterStatus::Running);
    }

    #[test]
    fn test_all_terminated_is_terminated() {
        use InstanceStatus::*;
        let cluster = cluster_with(&[Terminated, Terminated, Terminated]);
        assert_eq!(cluster.status(), ClusterStatus::Terminated);
    }

    #[test]
    fn test_partial_degradation_is_stopped() {
        use InstanceStatus::*;
        let cluster = cluster_with(&[Running, Stopped, Stopped]);
        assert_eq!(cluster.status(), ClusterStatus::Stopped);

        let cluster = cluster_with(&[Running, Running, Terminated, Terminated]);
        assert_eq!(cluster.status(), ClusterStatus::Stopped);
    }

    #[test]
    fn test_terminated_cluster_recovers_when_running_members_appear() {
        use InstanceStatus::*;
        let mut cluster = cluster_with(&[Terminated, Terminated, Terminated]);
        assert_eq!(cluster.status(), ClusterStatus::Terminated);

        cluster.add_instance(instance("i-new-0", Running));
        cluster.add_instance(instance("i-new-1", Running));
        cluster.add_instance(instance("i-new-2", Running));
        assert_eq!(cluster.status(), ClusterStatus::Running);
    }

    #[test]
    fn test_instance_requires_non_empty_id() {
        let result = Instance::new(
            "",
            "node",
            CloudProvider::Aws,
            "m5.large",
            "us-east-1a",
            InstanceStatus::Running,
            "foo-ABCDE",
            1,
        );
        assert!(matches!(result, Err(InventoryError::EmptyInstanceId)));
    }

    #[test]
    fn test_age_floors_at_one_day() {
        let now = Utc::now();
        assert_eq!(Instance::age_from(Some(now), now), 1);
        assert_eq!(Instance::age_from(None, now), 1);
        assert_eq!(
            Instance::age_from(Some(now - chrono::Duration::days(10)), now),
            10
        );
    }

    #[test]
    fn test_add_tag_rejects_empty_key() {
        let mut inst = instance("i-1", InstanceStatus::Running);
        let before = inst.tags().len();

        let result = inst.add_tag("", "value");
        assert!(matches!(result, Err(InventoryError::EmptyTagKey(_))));
        assert_eq!(inst.tags().len(), before);
    }

    #[test]
    fn test_add_tag_updates_existing_key_in_place() {
        let mut inst = instance("i-1", InstanceStatus::Running);
        inst.add_tag("team", "old").unwrap();
        inst.add_tag("team", "new").unwrap();

        assert_eq!(inst.tags().len(), 1);
        assert_eq!(inst.tags()[0].value, "new");
        assert_eq!(inst.tags()[0].instance_id, "i-1");
    }

    #[test]
    fn test_add_expense_rejects_negative_amount() {
        let mut inst = instance("i-1", InstanceStatus::Running);
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();

        let result = Expense::new("i-1", -4.2, date);
        assert!(matches!(
            result,
            Err(InventoryError::NegativeExpense { .. })
        ));

        // A deserialized negative record is still rejected at attach time.
        let bad = Expense {
            instance_id: "i-1".to_string(),
            amount: -1.0,
            date,
        };
        let before = inst.expenses().len();
        assert!(inst.add_expense(bad).is_err());
        assert_eq!(inst.expenses().len(), before);
    }

    #[test]
    fn test_add_expense_upserts_by_date() {
        let mut inst = instance("i-1", InstanceStatus::Running);
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();

        inst.add_expense(Expense::new("i-1", 4.5, date).unwrap()).unwrap();
        inst.add_expense(Expense::new("i-1", 5.0, date).unwrap()).unwrap();

        assert_eq!(inst.expenses().len(), 1);
        assert_eq!(inst.expenses()[0].amount, 5.0);
    }

    #[test]
    fn test_needs_expense_refresh() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let mut inst = instance("i-1", InstanceStatus::Running);
        assert!(inst.needs_expense_refresh(today));

        inst.add_expense(Expense::new("i-1", 1.0, today - chrono::Duration::days(1)).unwrap())
            .unwrap();
        assert!(inst.needs_expense_refresh(today));

        inst.add_expense(Expense::new("i-1", 1.0, today).unwrap()).unwrap();
        assert!(!inst.needs_expense_refresh(today));
    }

    #[test]
    fn test_account_routes_instances_into_clusters() {
        let mut account = Account::new("123", "dev-account", CloudProvider::Aws);
        let resolution = tags::resolve(&[Tag::new(
            "kubernetes.io/cluster/foo-ABCDE",
            "owned",
            "i-1",
        )]);

        account.add_instance(instance("i-1", InstanceStatus::Running), &resolution, "us-east-1");
        account.add_instance(instance("i-2", InstanceStatus::Running), &resolution, "us-east-1");

        assert_eq!(account.cluster_count(), 1);
        let cluster = account.get_cluster("foo-ABCDE").unwrap();
        assert_eq!(cluster.instance_count(), 2);
        assert_eq!(cluster.name, "foo");
        assert_eq!(cluster.console_link, UNKNOWN_CONSOLE);
    }

    #[test]
    fn test_untagged_instances_group_under_unknown_bucket() {
        let mut account = Account::new("123", "dev-account", CloudProvider::Aws);
        let resolution = tags::resolve(&[]);

        account.add_instance(instance("i-1", InstanceStatus::Running), &resolution, "us-east-1");

        assert_eq!(account.cluster_count(), 1);
        let bucket = account.get_cluster(tags::UNKNOWN_CLUSTER_ID).unwrap();
        assert!(bucket.is_unknown_bucket());
        assert_eq!(bucket.instance_count(), 1);
    }

    #[test]
    fn test_inventory_rejects_duplicate_account() {
        let mut inventory = Inventory::new();
        inventory
            .add_account(Account::new("1", "dev-account", CloudProvider::Aws))
            .unwrap();

        let result = inventory.add_account(Account::new("2", "dev-account", CloudProvider::Gcp));
        assert!(matches!(result, Err(InventoryError::DuplicateAccount(_))));
        assert_eq!(inventory.account_count(), 1);
    }

    #[test]
    fn test_power_target_carries_member_ids() {
        let cluster = cluster_with(&[InstanceStatus::Running, InstanceStatus::Stopped]);
        let target = cluster.power_target();

        assert_eq!(target.cluster_id, "foo-ABCDE");
        assert_eq!(target.account_name, "dev-account");
        assert_eq!(target.instance_ids, vec!["i-0", "i-1"]);
    }
}
