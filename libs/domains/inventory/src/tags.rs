//! Tag-grammar resolution for cluster membership.
//!
//! Cluster installers stamp every resource they create with a tag whose key
//! contains `kubernetes.io/cluster/` followed by `<clusterName>-<infraID>`,
//! where the infra id is a 5-character alphanumeric suffix. Resolution
//! derives the cluster identity from that tag; resources without it are
//! still first-class and group under the unknown-cluster bucket.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::Tag;

/// Substring that marks a cluster-membership tag key.
pub const CLUSTER_TAG_MARKER: &str = "kubernetes.io/cluster/";

/// Tag key carrying the resource owner.
pub const OWNER_TAG_KEY: &str = "Owner";

/// Tag key carrying the human-readable resource name.
pub const NAME_TAG_KEY: &str = "Name";

/// Cluster name reported for resources without a membership tag.
pub const UNKNOWN_CLUSTER_NAME: &str = "UNKNOWN-CLUSTER";

/// Cluster id bucket for resources without a membership tag.
pub const UNKNOWN_CLUSTER_ID: &str = "UNKNOWN-CLUSTER";

/// Infra id reported when the suffix is absent or malformed.
pub const UNKNOWN_INFRA_ID: &str = "UNKNOWN";

// Trailing `-XXXXX` infra-id suffix, exactly 5 alphanumeric characters.
static INFRA_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"-[0-9A-Za-z]{5}$").unwrap());

/// Identity fields derived from a resource's tag set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagResolution {
    pub cluster_name: String,
    pub infra_id: String,
    pub cluster_id: String,
    pub owner: String,
    pub display_name: String,
}

impl TagResolution {
    fn unknown() -> Self {
        Self {
            cluster_name: UNKNOWN_CLUSTER_NAME.to_string(),
            infra_id: UNKNOWN_INFRA_ID.to_string(),
            cluster_id: UNKNOWN_CLUSTER_ID.to_string(),
            owner: String::new(),
            display_name: String::new(),
        }
    }

    /// True when no membership tag matched.
    pub fn is_unknown_cluster(&self) -> bool {
        self.cluster_id == UNKNOWN_CLUSTER_ID
    }
}

/// Derive cluster identity, owner, and display name from an ordered tag set.
///
/// Never fails: a tag set without a cluster marker resolves to the unknown
/// sentinels. When several tags carry the marker, the first one in insertion
/// order wins.
pub fn resolve(tags: &[Tag]) -> TagResolution {
    let mut resolution = TagResolution::unknown();
    let mut marker_matched = false;

    for tag in tags {
        if !marker_matched {
            if let Some(pos) = tag.key.find(CLUSTER_TAG_MARKER) {
                let cluster_id = &tag.key[pos + CLUSTER_TAG_MARKER.len()..];
                if !cluster_id.is_empty() {
                    marker_matched = true;
                    resolution.cluster_id = cluster_id.to_string();
                    match INFRA_SUFFIX.find(cluster_id) {
                        Some(suffix) => {
                            resolution.cluster_name = cluster_id[..suffix.start()].to_string();
                            resolution.infra_id = cluster_id[suffix.start() + 1..].to_string();
                        }
                        None => {
                            // No well-formed infra suffix: the whole id doubles
                            // as the name.
                            resolution.cluster_name = cluster_id.to_string();
                        }
                    }
                }
            }
        }

        if tag.key == OWNER_TAG_KEY && resolution.owner.is_empty() {
            resolution.owner = tag.value.clone();
        }
        if tag.key == NAME_TAG_KEY && resolution.display_name.is_empty() {
            resolution.display_name = tag.value.clone();
        }
    }

    resolution
}
