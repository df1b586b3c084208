use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::DateTime;
use serde::Serialize;
use serde_sarif::sarif::{ArtifactLocation, ReportingDescriptor, Run, ThreadFlowLocation};

use crate::base_uri::expand_base_uris;

/// Run-level metadata extracted from one SARIF run.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RunInfo {
    pub(crate) id: u32,
    pub(crate) tool_name: String,
    pub(crate) tool_full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) tool_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) command_line: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) executable_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) working_directory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) start_utc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) end_utc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) execution_successful: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) automation_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) automation_identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) uri_base_ids: Option<BTreeMap<String, String>>,
    pub(crate) sarif_file_full_path: PathBuf,
    pub(crate) sarif_file_name: String,
    /// Index of the run inside its SARIF document.
    pub(crate) run_index: usize,
    #[serde(skip)]
    pub(crate) thread_flow_locations: Vec<ThreadFlowLocation>,
    #[serde(skip)]
    pub(crate) rules: Vec<ReportingDescriptor>,
    #[serde(skip)]
    pub(crate) artifact_locations: Vec<Option<ArtifactLocation>>,
}

impl RunInfo {
    /// Build run metadata. Only the first invocation is consulted.
    pub(crate) fn create(run: &Run, id: u32, run_index: usize, sarif_path: &Path) -> Self {
        let driver = &run.tool.driver;
        let tool_name = driver.name.clone();
        let base_name = driver.full_name.clone().unwrap_or_else(|| tool_name.clone());
        let tool_full_name = match driver.semantic_version.as_deref() {
            Some(version) => format!("{base_name} ({version})"),
            None => base_name,
        };
        let tool_version = driver
            .semantic_version
            .clone()
            .or_else(|| driver.version.clone());

        let invocation = run
            .invocations
            .as_ref()
            .and_then(|invocations| invocations.first());
        let command_line = invocation.and_then(|inv| inv.command_line.clone());
        let executable_path = invocation
            .and_then(|inv| inv.executable_location.as_ref())
            .and_then(|location| location.uri.clone());
        let working_directory = invocation
            .and_then(|inv| inv.working_directory.as_ref())
            .and_then(|location| location.uri.clone());
        let start_utc = invocation.and_then(|inv| inv.start_time_utc.clone());
        let end_utc = invocation.and_then(|inv| inv.end_time_utc.clone());
        let duration = match (start_utc.as_deref(), end_utc.as_deref()) {
            (Some(start), Some(end)) => calc_duration(start, end),
            _ => None,
        };
        let execution_successful = invocation.map(|inv| inv.execution_successful);

        let (automation_category, automation_identifier) = run
            .automation_details
            .as_ref()
            .and_then(|details| details.id.as_deref())
            .map(split_automation_id)
            .unwrap_or((None, None));

        let declared_bases: Option<BTreeMap<String, ArtifactLocation>> =
            run.original_uri_base_ids.as_ref().map(|bases| {
                bases
                    .iter()
                    .map(|(id, location)| (id.clone(), location.clone()))
                    .collect()
            });

        Self {
            id,
            tool_name,
            tool_full_name,
            tool_version,
            command_line,
            executable_path,
            working_directory,
            start_utc,
            end_utc,
            duration,
            execution_successful,
            automation_category,
            automation_identifier,
            uri_base_ids: expand_base_uris(declared_bases.as_ref()),
            sarif_file_full_path: sarif_path.to_path_buf(),
            sarif_file_name: sarif_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            run_index,
            thread_flow_locations: run.thread_flow_locations.clone().unwrap_or_default(),
            rules: driver.rules.clone().unwrap_or_default(),
            artifact_locations: run
                .artifacts
                .as_ref()
                .map(|artifacts| {
                    artifacts
                        .iter()
                        .map(|artifact| artifact.location.clone())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Directory of the SARIF file, used to anchor relative artifact URIs.
    pub(crate) fn sarif_dir(&self) -> Option<&Path> {
        self.sarif_file_full_path.parent()
    }

    /// Look up a rule by index first, then by id.
    pub(crate) fn rule(&self, index: Option<i64>, id: Option<&str>) -> Option<&ReportingDescriptor> {
        let by_index = index
            .and_then(|index| usize::try_from(index).ok())
            .and_then(|index| self.rules.get(index));
        by_index.or_else(|| {
            let id = id?;
            self.rules.iter().find(|rule| rule.id == id)
        })
    }
}

/// Split an automation id into `(category, identifier)`.
///
/// The trailing segment is the identifier; everything before it is the
/// category. A trailing `/` leaves both undefined.
pub(crate) fn split_automation_id(id: &str) -> (Option<String>, Option<String>) {
    let segments: Vec<&str> = id.split('/').collect();
    let Some((identifier, category)) = segments.split_last() else {
        return (None, None);
    };
    if identifier.is_empty() {
        return (None, None);
    }
    let category = category.join("/");
    let category = if category.is_empty() {
        None
    } else {
        Some(category)
    };
    (category, Some((*identifier).to_string()))
}

/// Human-readable duration between two RFC 3339 timestamps.
pub(crate) fn calc_duration(start: &str, end: &str) -> Option<String> {
    let start = DateTime::parse_from_rfc3339(start).ok()?;
    let end = DateTime::parse_from_rfc3339(end).ok()?;
    let millis = end.signed_duration_since(start).num_milliseconds();
    if millis < 0 {
        return None;
    }
    Some(format_duration(millis))
}

fn format_duration(millis: i64) -> String {
    if millis < 1000 {
        return format!("{millis}ms");
    }
    let total_seconds = millis / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{seconds}s"));
    }
    parts.join(" ")
}
