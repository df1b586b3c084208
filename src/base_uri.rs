use std::collections::{BTreeMap, BTreeSet};

use serde_sarif::sarif::ArtifactLocation;
use tracing::warn;

use crate::paths::join_uri;

/// Why a base id could not be expanded.
#[derive(Debug, Eq, PartialEq)]
enum ExpandError {
    Cycle(String),
    UnknownParent { id: String, parent: String },
}

/// Expand a run's `originalUriBaseIds` into fully joined prefixes.
///
/// Returns `None` when the run declares no base ids. Ids that reference
/// themselves (directly or through a chain) are reported once and skipped.
pub(crate) fn expand_base_uris(
    declared: Option<&BTreeMap<String, ArtifactLocation>>,
) -> Option<BTreeMap<String, String>> {
    let declared = declared?;
    let mut expanded = BTreeMap::new();
    let mut reported = BTreeSet::new();
    for id in declared.keys() {
        let mut visiting = Vec::new();
        match expand_one(id, declared, &mut expanded, &mut visiting) {
            Ok(_) => {}
            Err(ExpandError::Cycle(cycle_id)) => {
                if reported.insert(cycle_id.clone()) {
                    warn!("uriBaseId {cycle_id} refers to itself; ignoring it");
                }
            }
            Err(ExpandError::UnknownParent { id, parent }) => {
                if reported.insert(id.clone()) {
                    warn!("uriBaseId {id} refers to undeclared base {parent}; ignoring it");
                }
            }
        }
    }
    Some(expanded)
}

fn expand_one(
    id: &str,
    declared: &BTreeMap<String, ArtifactLocation>,
    expanded: &mut BTreeMap<String, String>,
    visiting: &mut Vec<String>,
) -> Result<String, ExpandError> {
    if let Some(done) = expanded.get(id) {
        return Ok(done.clone());
    }
    if visiting.iter().any(|seen| seen == id) {
        return Err(ExpandError::Cycle(id.to_string()));
    }
    let Some(location) = declared.get(id) else {
        let referrer = visiting.last().cloned().unwrap_or_default();
        return Err(ExpandError::UnknownParent {
            id: referrer,
            parent: id.to_string(),
        });
    };
    visiting.push(id.to_string());
    let own = location.uri.as_deref().unwrap_or(id);
    let value = match location.uri_base_id.as_deref() {
        Some(parent) => {
            let prefix = expand_one(parent, declared, expanded, visiting)?;
            join_uri(&prefix, own)
        }
        None => join_uri("", own),
    };
    visiting.pop();
    expanded.insert(id.to_string(), value.clone());
    Ok(value)
}
