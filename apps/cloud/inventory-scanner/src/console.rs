//! Console link resolution.
//!
//! Clusters expose their web console under a predictable name inside the
//! hosted zone their installer created. Resolution walks every zone the
//! account can see, matches zones to clusters by name or zone tag values,
//! and searches the matching zone's record set for a record carrying the
//! cluster name. Everything here is best-effort: a zone that cannot be
//! read is skipped and the scan never fails because of it.

use domain_inventory::{Account, UNKNOWN_CONSOLE};
use tracing::{debug, warn};

use crate::providers::{HostedZone, ProviderSession};

/// Prefix of every resolved console URL; the matched DNS record completes it.
pub const CONSOLE_LINK_PREFIX: &str = "https://console-openshift-console.apps.";

/// Attach console links to every cluster in the account that still carries
/// the sentinel. Returns the number of links resolved.
pub async fn attach(session: &dyn ProviderSession, account: &mut Account) -> usize {
    let zones = match session.list_hosted_zones().await {
        Ok(zones) => zones,
        Err(e) => {
            warn!(account = %account.name, error = %e, "Could not list hosted zones, console links unresolved");
            return 0;
        }
    };
    if zones.is_empty() {
        return 0;
    }

    let targets: Vec<(String, String)> = account
        .clusters()
        .filter(|c| !c.is_unknown_bucket() && c.console_link == UNKNOWN_CONSOLE)
        .map(|c| (c.id.clone(), c.name.clone()))
        .collect();

    let mut resolved = 0;
    for (cluster_id, cluster_name) in targets {
        for zone in &zones {
            if !zone_matches(session, zone, &cluster_name).await {
                continue;
            }

            let records = match session.list_zone_records(&zone.id).await {
                Ok(records) => records,
                Err(e) => {
                    debug!(zone = %zone.name, error = %e, "Could not read zone records, trying next zone");
                    continue;
                }
            };

            if let Some(record) = records.iter().find(|r| r.contains(&cluster_name)) {
                let link = format!("{CONSOLE_LINK_PREFIX}{}", record.trim_end_matches('.'));
                debug!(cluster = %cluster_id, link = %link, "Resolved console link");
                let _ = account.set_console_link(&cluster_id, link);
                resolved += 1;
                break;
            }
        }
    }
    resolved
}

/// A zone serves a cluster when its name contains the cluster's short name,
/// or (provider-dependent) one of its tag values does. Tag read failures
/// count as no match.
async fn zone_matches(
    session: &dyn ProviderSession,
    zone: &HostedZone,
    cluster_name: &str,
) -> bool {
    if zone.name.contains(cluster_name) {
        return true;
    }

    match session.list_zone_tags(&zone.id).await {
        Ok(tags) => tags.iter().any(|(_, value)| value.contains(cluster_name)),
        Err(e) => {
            debug!(zone = %zone.name, error = %e, "Could not read zone tags");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{MockProviderSession, ProviderError};
    use domain_inventory::{
        tags, CloudProvider, Instance, InstanceStatus, Tag,
    };
    use mockall::predicate::eq;

    fn account_with_cluster(cluster_tag_key: &str) -> Account {
        let mut account = Account::new("123", "dev-account", CloudProvider::Aws);
        let resolution = tags::resolve(&[Tag::new(cluster_tag_key, "owned", "i-1")]);
        let instance = Instance::new(
            "i-1",
            "node",
            CloudProvider::Aws,
            "m5.large",
            "us-east-1a",
            InstanceStatus::Running,
            &resolution.cluster_id,
            1,
        )
        .unwrap();
        account.add_instance(instance, &resolution, "us-east-1");
        account
    }

    #[tokio::test]
    async fn test_resolves_link_through_zone_name_match() {
        let mut account = account_with_cluster("kubernetes.io/cluster/foo-ABCDE");
        let mut session = MockProviderSession::new();

        session.expect_list_hosted_zones().returning(|| {
            Ok(vec![HostedZone {
                id: "Z1".to_string(),
                name: "foo.example.com.".to_string(),
            }])
        });
        session
            .expect_list_zone_records()
            .with(eq("Z1"))
            .returning(|_| Ok(vec!["api.foo.example.com.".to_string()]));

        let resolved = attach(&session, &mut account).await;

        assert_eq!(resolved, 1);
        assert_eq!(
            account.get_cluster("foo-ABCDE").unwrap().console_link,
            "https://console-openshift-console.apps.api.foo.example.com"
        );
    }

    #[tokio::test]
    async fn test_resolves_link_through_zone_tag_values() {
        let mut account = account_with_cluster("kubernetes.io/cluster/foo-ABCDE");
        let mut session = MockProviderSession::new();

        session.expect_list_hosted_zones().returning(|| {
            Ok(vec![HostedZone {
                id: "Z1".to_string(),
                name: "apps.example.com.".to_string(),
            }])
        });
        session
            .expect_list_zone_tags()
            .with(eq("Z1"))
            .returning(|_| Ok(vec![("cluster".to_string(), "foo".to_string())]));
        session
            .expect_list_zone_records()
            .with(eq("Z1"))
            .returning(|_| Ok(vec!["foo.apps.example.com.".to_string()]));

        let resolved = attach(&session, &mut account).await;
        assert_eq!(resolved, 1);
    }

    #[tokio::test]
    async fn test_zone_errors_are_swallowed_and_next_zone_is_tried() {
        let mut account = account_with_cluster("kubernetes.io/cluster/foo-ABCDE");
        let mut session = MockProviderSession::new();

        session.expect_list_hosted_zones().returning(|| {
            Ok(vec![
                HostedZone {
                    id: "Z-broken".to_string(),
                    name: "foo.broken.example.com.".to_string(),
                },
                HostedZone {
                    id: "Z-good".to_string(),
                    name: "foo.example.com.".to_string(),
                },
            ])
        });
        session
            .expect_list_zone_records()
            .with(eq("Z-broken"))
            .returning(|_| Err(ProviderError::ApiError("throttled".to_string())));
        session
            .expect_list_zone_records()
            .with(eq("Z-good"))
            .returning(|_| Ok(vec!["foo.example.com.".to_string()]));

        let resolved = attach(&session, &mut account).await;
        assert_eq!(resolved, 1);
        assert_eq!(
            account.get_cluster("foo-ABCDE").unwrap().console_link,
            "https://console-openshift-console.apps.foo.example.com"
        );
    }

    #[tokio::test]
    async fn test_no_match_keeps_sentinel() {
        let mut account = account_with_cluster("kubernetes.io/cluster/foo-ABCDE");
        let mut session = MockProviderSession::new();

        session.expect_list_hosted_zones().returning(|| {
            Ok(vec![HostedZone {
                id: "Z1".to_string(),
                name: "unrelated.example.com.".to_string(),
            }])
        });
        session
            .expect_list_zone_tags()
            .returning(|_| Ok(Vec::new()));

        let resolved = attach(&session, &mut account).await;

        assert_eq!(resolved, 0);
        assert_eq!(
            account.get_cluster("foo-ABCDE").unwrap().console_link,
            UNKNOWN_CONSOLE
        );
    }

    #[tokio::test]
    async fn test_zone_listing_failure_never_fails_the_scan() {
        let mut account = account_with_cluster("kubernetes.io/cluster/foo-ABCDE");
        let mut session = MockProviderSession::new();

        session
            .expect_list_hosted_zones()
            .returning(|| Err(ProviderError::AuthError("denied".to_string())));

        let resolved = attach(&session, &mut account).await;
        assert_eq!(resolved, 0);
        assert_eq!(
            account.get_cluster("foo-ABCDE").unwrap().console_link,
            UNKNOWN_CONSOLE
        );
    }

    #[tokio::test]
    async fn test_unknown_bucket_is_not_resolved() {
        let mut account = account_with_cluster("no-cluster-marker");
        let mut session = MockProviderSession::new();

        session.expect_list_hosted_zones().returning(|| {
            Ok(vec![HostedZone {
                id: "Z1".to_string(),
                name: "foo.example.com.".to_string(),
            }])
        });

        let resolved = attach(&session, &mut account).await;
        assert_eq!(resolved, 0);
    }
}
