use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_sarif::sarif::Sarif;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::SarifError;
use crate::json_map::{self, JsonMapping};
use crate::location::{LocationFactory, map_to_sarif_file_location};
use crate::logging::with_span;
use crate::mapper::{ArtifactMapper, FilePicker, ResolveMode};
use crate::model::{Range, Severity};
use crate::result_info::ResultInfo;
use crate::run_info::RunInfo;
use crate::session::Session;

const SARIF_VERSION: &str = "2.1.0";

/// One entry of the displayed diagnostic set.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Diagnostic {
    pub(crate) range: Range,
    pub(crate) severity: Severity,
    pub(crate) message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) run_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) result_id: Option<usize>,
}

impl Diagnostic {
    fn more_results(hidden: usize) -> Self {
        Self {
            range: Range::default(),
            severity: Severity::Information,
            message: format!("{hidden} more results not shown"),
            code: None,
            source: None,
            run_id: None,
            result_id: None,
        }
    }
}

/// Outcome of loading one SARIF document.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoadSummary {
    pub(crate) run_ids: Vec<u32>,
    pub(crate) results: usize,
    pub(crate) unmapped: usize,
    pub(crate) skipped: usize,
}

/// Batched notification for runs dropped when a document closes.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Removal {
    pub(crate) run_ids: Vec<u32>,
    pub(crate) results: usize,
}

/// Serializable view of the whole collection.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Snapshot<'a> {
    pub(crate) runs: Vec<&'a RunInfo>,
    pub(crate) results: Vec<&'a ResultInfo>,
    pub(crate) diagnostics: &'a BTreeMap<String, Vec<Diagnostic>>,
    pub(crate) unmapped: usize,
}

/// A loaded SARIF document, kept for remapping.
struct Document {
    path: PathBuf,
    log: Sarif,
    run_ids: Vec<u32>,
}

/// Owns every loaded run and result, the artifact mapper, and the
/// displayed diagnostic set.
pub(crate) struct DiagnosticCollection {
    mapper: ArtifactMapper,
    documents: Vec<Document>,
    runs: BTreeMap<u32, RunInfo>,
    results: BTreeMap<u32, Vec<ResultInfo>>,
    displayed: BTreeMap<String, Vec<Diagnostic>>,
    unmapped: usize,
    max_per_file: usize,
    next_run_id: u32,
}

impl DiagnosticCollection {
    pub(crate) fn new(picker: Option<Box<dyn FilePicker>>, max_per_file: usize) -> Self {
        Self {
            mapper: ArtifactMapper::new(picker),
            documents: Vec::new(),
            runs: BTreeMap::new(),
            results: BTreeMap::new(),
            displayed: BTreeMap::new(),
            unmapped: 0,
            max_per_file: max_per_file.max(1),
            next_run_id: 0,
        }
    }

    /// Load a SARIF document. Loading the same path again replaces its runs.
    pub(crate) fn add_document(
        &mut self,
        session: &Session,
        path: &Path,
        text: &str,
    ) -> Result<LoadSummary, SarifError> {
        let path = &full_path(path);
        let doc_name = path.display().to_string();
        let mapping = with_span("parse", &doc_name, || json_map::parse(text))?;
        check_header(&mapping)?;
        let log: Sarif = serde_path_to_error::deserialize(&mapping.data)?;

        if self.documents.iter().any(|document| document.path == *path) {
            self.remove_runs(path);
        }

        let mode = if session.settings.interactive {
            ResolveMode::Interactive
        } else {
            ResolveMode::Silent
        };
        let sarif_uri = Url::from_file_path(path).ok();

        let mut summary = LoadSummary::default();
        with_span("read", &doc_name, || {
            for (run_index, run) in log.runs.iter().enumerate() {
                let run_id = self.next_run_id;
                self.next_run_id += 1;
                let run_info = RunInfo::create(run, run_id, run_index, path);
                let mut factory = LocationFactory::new(&mut self.mapper, &run_info, mode);
                let mut infos = Vec::new();
                let raw_results = run.results.as_deref().unwrap_or_default();
                for (result_index, result) in raw_results.iter().enumerate() {
                    let in_sarif = sarif_uri.as_ref().and_then(|uri| {
                        map_to_sarif_file_location(&mapping, uri, run_index, result_index, false)
                    });
                    match ResultInfo::create(&mut factory, result, result_index, in_sarif) {
                        Ok(info) => infos.push(info),
                        Err(err) => {
                            warn!("{doc_name}: skipping result: {err}");
                            summary.skipped += 1;
                        }
                    }
                }
                let message = format!(
                    "run {run_index} ({}) loaded {} results",
                    run_info.tool_name,
                    infos.len()
                );
                session.progress.report(&doc_name, &message);
                summary.results += infos.len();
                summary.run_ids.push(run_id);
                self.results.insert(run_id, infos);
                self.runs.insert(run_id, run_info);
            }
        });

        self.documents.push(Document {
            path: path.to_path_buf(),
            log,
            run_ids: summary.run_ids.clone(),
        });

        if self.mapper.take_mapping_changed() {
            debug!("mappings learned while reading {doc_name}; retrying unmapped results");
            self.mapping_changed(session);
        } else {
            self.sync();
        }
        summary.unmapped = summary
            .run_ids
            .iter()
            .filter_map(|run_id| self.results.get(run_id))
            .flatten()
            .filter(|info| !info.is_mapped())
            .count();
        info!(
            "{doc_name}: {} runs, {} results ({} unmapped, {} skipped)",
            summary.run_ids.len(),
            summary.results,
            summary.unmapped,
            summary.skipped
        );
        Ok(summary)
    }

    /// Drop every run that came from `path`, in one pass.
    pub(crate) fn remove_runs(&mut self, path: &Path) -> Removal {
        let path = &full_path(path);
        let mut removal = Removal::default();
        let (removed, kept): (Vec<Document>, Vec<Document>) = std::mem::take(&mut self.documents)
            .into_iter()
            .partition(|document| document.path == *path);
        self.documents = kept;
        for document in removed {
            for run_id in document.run_ids {
                self.runs.remove(&run_id);
                removal.results += self.results.remove(&run_id).map_or(0, |infos| infos.len());
                self.mapper.forget_run(run_id);
                removal.run_ids.push(run_id);
            }
        }
        if !removal.run_ids.is_empty() {
            info!(
                "{}: removed {} runs and {} results",
                path.display(),
                removal.run_ids.len(),
                removal.results
            );
            self.sync();
        }
        removal
    }

    /// Forget every document. Run ids are not reused afterwards.
    pub(crate) fn clear(&mut self) {
        self.documents.clear();
        self.runs.clear();
        self.results.clear();
        self.mapper.clear();
        self.sync();
    }

    /// Register a user-supplied prefix rewrite.
    pub(crate) fn register_rewrite(&mut self, original: &Url, local: &Url) {
        self.mapper.register_rewrite(original, local);
    }

    /// Retry every result after the mapper learned something new, then
    /// rebuild the displayed set. Returns how many results became mapped.
    pub(crate) fn mapping_changed(&mut self, session: &Session) -> usize {
        self.mapper.take_mapping_changed();
        let mut promoted = 0;
        let Self {
            mapper,
            documents,
            runs,
            results,
            ..
        } = self;
        with_span("remap", "all documents", || {
            for document in documents.iter() {
                for (run_index, run_id) in document.run_ids.iter().enumerate() {
                    let (Some(run_info), Some(infos), Some(raw_run)) = (
                        runs.get(run_id),
                        results.get_mut(run_id),
                        document.log.runs.get(run_index),
                    ) else {
                        continue;
                    };
                    let raw_results = raw_run.results.as_deref().unwrap_or_default();
                    let mut factory = LocationFactory::new(&mut *mapper, run_info, ResolveMode::Silent);
                    for info in infos.iter_mut() {
                        let Some(raw) = raw_results.get(info.id) else {
                            continue;
                        };
                        if info.remap(&mut factory, raw) {
                            promoted += 1;
                        }
                    }
                }
            }
        });
        // Silent retries cannot learn anything new.
        self.mapper.take_mapping_changed();
        if promoted > 0 {
            session
                .progress
                .report("remap", &format!("{promoted} results mapped"));
        }
        self.sync();
        promoted
    }

    /// Rebuild the displayed diagnostics from scratch.
    fn sync(&mut self) {
        let mut grouped: BTreeMap<String, Vec<Diagnostic>> = BTreeMap::new();
        let mut unmapped = 0;
        for (run_id, infos) in &self.results {
            let Some(run) = self.runs.get(run_id) else {
                continue;
            };
            for info in infos {
                let (file, range) = match info.assigned_location() {
                    Some(location) if location.mapped => {
                        let Some(uri) = location.uri.as_ref() else {
                            continue;
                        };
                        (uri.to_string(), location.range)
                    }
                    _ => {
                        unmapped += 1;
                        let in_sarif = info.location_in_sarif_file.as_ref();
                        let range = in_sarif.map(|location| location.range).unwrap_or_default();
                        let file = in_sarif
                            .and_then(|location| location.uri.clone())
                            .or_else(|| Url::from_file_path(&run.sarif_file_full_path).ok())
                            .map_or_else(
                                || run.sarif_file_full_path.display().to_string(),
                                |uri| uri.to_string(),
                            );
                        (file, range)
                    }
                };
                grouped.entry(file).or_default().push(Diagnostic {
                    range,
                    severity: info.severity,
                    message: info.message().text.clone(),
                    code: info.rule_id.clone(),
                    source: Some(run.tool_name.clone()),
                    run_id: Some(info.run_id),
                    result_id: Some(info.id),
                });
            }
        }

        let cap = self.max_per_file;
        for diagnostics in grouped.values_mut() {
            if diagnostics.len() > cap {
                let hidden = diagnostics.len() - cap;
                diagnostics.truncate(cap);
                diagnostics.push(Diagnostic::more_results(hidden));
            }
        }
        self.displayed = grouped;
        self.unmapped = unmapped;
    }

    pub(crate) fn diagnostics(&self) -> &BTreeMap<String, Vec<Diagnostic>> {
        &self.displayed
    }

    pub(crate) fn runs(&self) -> impl Iterator<Item = &RunInfo> {
        self.runs.values()
    }

    pub(crate) fn results(&self) -> impl Iterator<Item = &ResultInfo> {
        self.results.values().flatten()
    }

    pub(crate) fn unmapped_count(&self) -> usize {
        self.unmapped
    }

    pub(crate) fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            runs: self.runs().collect(),
            results: self.results().collect(),
            diagnostics: &self.displayed,
            unmapped: self.unmapped,
        }
    }
}

fn full_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Reject documents that are not SARIF 2.1.0 logs.
fn check_header(mapping: &JsonMapping) -> Result<(), SarifError> {
    if mapping.data.get("$schema").is_none() {
        return Err(SarifError::MissingSchema);
    }
    match mapping.data.get("version").and_then(|version| version.as_str()) {
        Some(SARIF_VERSION) => Ok(()),
        Some(other) => Err(SarifError::UnsupportedVersion(other.to_string())),
        None => Err(SarifError::UnsupportedVersion("<missing>".to_string())),
    }
}
