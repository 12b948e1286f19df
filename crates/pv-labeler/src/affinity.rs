//! Applies resolved topology labels to a volume: the labels themselves and the equivalent required
//! node affinity, so that pods using the volume are only scheduled onto matching nodes.
use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    NodeSelector, NodeSelectorRequirement, NodeSelectorTerm, PersistentVolume, VolumeNodeAffinity,
};
use snafu::{ResultExt, Snafu};

use crate::topology::{ZoneSetError, decode_zone_set, is_reserved_label_key, is_zone_key};

/// The node selector operator used for all generated requirements.
pub const NODE_SELECTOR_OP_IN: &str = "In";

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum MergeError {
    #[snafu(display("failed to decode zone set of label {key:?}"))]
    DecodeZoneSet { source: ZoneSetError, key: String },
}

/// What happened to the node affinity of a mutated volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum MergeOutcome {
    /// The requirements were appended to every node selector term.
    RequirementsAdded,

    /// An existing match expression already uses one of the keys, so no requirement was added.
    SkippedOnConflict,
}

/// Builds one `In` requirement per label, in the (sorted) key order of `labels`.
///
/// Zone labels carry a zone set, their values are the decoded, sorted zones.
pub fn node_selector_requirements(
    labels: &BTreeMap<String, String>,
) -> Result<Vec<NodeSelectorRequirement>, MergeError> {
    labels
        .iter()
        .map(|(key, value)| {
            let values = if is_zone_key(key) {
                decode_zone_set(value)
                    .context(DecodeZoneSetSnafu { key })?
                    .into_iter()
                    .collect()
            } else {
                vec![value.clone()]
            };

            Ok(NodeSelectorRequirement {
                key: key.clone(),
                operator: NODE_SELECTOR_OP_IN.to_owned(),
                values: Some(values),
            })
        })
        .collect()
}

/// Returns `existing` with every `derived` label set, replacing present values.
///
/// Replacing the value of a key outside of the reserved topology keys is logged as a warning.
pub fn merge_reserved_labels(
    existing: &BTreeMap<String, String>,
    derived: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = existing.clone();

    for (key, value) in derived {
        match merged.insert(key.clone(), value.clone()) {
            Some(previous) if previous != *value && !is_reserved_label_key(key) => {
                tracing::warn!(
                    label.key = %key,
                    label.previous = %previous,
                    label.value = %value,
                    "label provider replaced a label outside of the topology labels"
                );
            }
            Some(previous) if previous != *value => {
                tracing::debug!(
                    label.key = %key,
                    label.previous = %previous,
                    label.value = %value,
                    "replaced topology label"
                );
            }
            _ => {}
        }
    }

    merged
}

/// Applies `labels` to `volume`.
///
/// The labels are always set. The equivalent node selector requirements are appended to every
/// required node selector term (an empty term is created if there is none), unless any term
/// already has a match expression for one of the label keys.
///
/// All zone sets are decoded before anything is changed, so an error leaves `volume` untouched.
pub fn mutate_persistent_volume(
    volume: &mut PersistentVolume,
    labels: &BTreeMap<String, String>,
) -> Result<MergeOutcome, MergeError> {
    let requirements = node_selector_requirements(labels)?;

    if !labels.is_empty() {
        let existing = volume.metadata.labels.take().unwrap_or_default();
        volume.metadata.labels = Some(merge_reserved_labels(&existing, labels));
    }

    let spec = volume.spec.get_or_insert_with(Default::default);
    let required = spec
        .node_affinity
        .get_or_insert_with(VolumeNodeAffinity::default)
        .required
        .get_or_insert_with(NodeSelector::default);
    if required.node_selector_terms.is_empty() {
        required.node_selector_terms.push(NodeSelectorTerm::default());
    }

    let conflicting_key = required
        .node_selector_terms
        .iter()
        .flat_map(|term| term.match_expressions.iter().flatten())
        .find(|expression| labels.contains_key(&expression.key))
        .map(|expression| expression.key.as_str());
    if let Some(key) = conflicting_key {
        tracing::info!(
            key,
            "volume already has a node affinity for a topology label, not adding requirements"
        );
        return Ok(MergeOutcome::SkippedOnConflict);
    }

    if !requirements.is_empty() {
        for term in &mut required.node_selector_terms {
            term.match_expressions
                .get_or_insert_with(Vec::new)
                .extend(requirements.iter().cloned());
        }
    }

    Ok(MergeOutcome::RequirementsAdded)
}
