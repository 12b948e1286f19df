//! Well-known topology label keys, their two generations and the zone set encoding some label
//! providers use for volumes spanning multiple zones.
use std::collections::{BTreeMap, BTreeSet};

use snafu::{Snafu, ensure};

/// The GA zone label.
pub const LABEL_TOPOLOGY_ZONE: &str = "topology.kubernetes.io/zone";

/// The GA region label.
pub const LABEL_TOPOLOGY_REGION: &str = "topology.kubernetes.io/region";

/// The deprecated (beta) zone label.
pub const LABEL_FAILURE_DOMAIN_BETA_ZONE: &str = "failure-domain.beta.kubernetes.io/zone";

/// The deprecated (beta) region label.
pub const LABEL_FAILURE_DOMAIN_BETA_REGION: &str = "failure-domain.beta.kubernetes.io/region";

/// Set by external provisioners on every PersistentVolume they create.
pub const ANNOTATION_DYNAMICALLY_PROVISIONED: &str = "pv.kubernetes.io/provisioned-by";

/// Separates the members of a zone set label value, e.g. `us-east-1a__us-east-1b`.
pub const LABEL_MULTI_ZONE_DELIMITER: &str = "__";

/// Label keys owned by this webhook. Their values on a volume are replaced without asking.
pub const RESERVED_LABEL_KEYS: [&str; 4] = [
    LABEL_TOPOLOGY_ZONE,
    LABEL_TOPOLOGY_REGION,
    LABEL_FAILURE_DOMAIN_BETA_ZONE,
    LABEL_FAILURE_DOMAIN_BETA_REGION,
];

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum ZoneSetError {
    #[snafu(display(
        "{LABEL_MULTI_ZONE_DELIMITER:?} separated list {value:?} must not contain an empty zone"
    ))]
    EmptyZone { value: String },
}

/// One of the two naming schemes for the zone and region labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LabelGeneration {
    /// `topology.kubernetes.io/*`
    Current,

    /// `failure-domain.beta.kubernetes.io/*`
    Legacy,
}

impl LabelGeneration {
    pub const fn zone_key(self) -> &'static str {
        match self {
            Self::Current => LABEL_TOPOLOGY_ZONE,
            Self::Legacy => LABEL_FAILURE_DOMAIN_BETA_ZONE,
        }
    }

    pub const fn region_key(self) -> &'static str {
        match self {
            Self::Current => LABEL_TOPOLOGY_REGION,
            Self::Legacy => LABEL_FAILURE_DOMAIN_BETA_REGION,
        }
    }
}

/// A complete zone and region pair of a single [`LabelGeneration`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopologyLabels {
    pub generation: LabelGeneration,
    pub zone: String,
    pub region: String,
}

impl TopologyLabels {
    /// Looks for a complete pair in `labels`, preferring the current generation over the legacy
    /// one. Returns [`None`] if neither generation has both the zone and the region.
    pub fn from_labels(labels: &BTreeMap<String, String>) -> Option<Self> {
        [LabelGeneration::Current, LabelGeneration::Legacy]
            .into_iter()
            .find_map(|generation| {
                let zone = labels.get(generation.zone_key())?;
                let region = labels.get(generation.region_key())?;

                Some(Self {
                    generation,
                    zone: zone.clone(),
                    region: region.clone(),
                })
            })
    }

    /// Returns the pair as labels, keyed by the keys of its own generation only.
    pub fn into_labels(self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (self.generation.zone_key().to_owned(), self.zone),
            (self.generation.region_key().to_owned(), self.region),
        ])
    }
}

/// Whether the label value of `key` is a zone set rather than a single value.
pub fn is_zone_key(key: &str) -> bool {
    key == LABEL_TOPOLOGY_ZONE || key == LABEL_FAILURE_DOMAIN_BETA_ZONE
}

pub fn is_reserved_label_key(key: &str) -> bool {
    RESERVED_LABEL_KEYS.contains(&key)
}

/// Decodes a zone set label value into its (trimmed) members. The returned set iterates in
/// ascending order.
pub fn decode_zone_set(value: &str) -> Result<BTreeSet<String>, ZoneSetError> {
    value
        .split(LABEL_MULTI_ZONE_DELIMITER)
        .map(|zone| {
            let zone = zone.trim();
            ensure!(!zone.is_empty(), EmptyZoneSnafu { value });
            Ok(zone.to_owned())
        })
        .collect()
}
