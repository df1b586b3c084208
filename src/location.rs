use serde::Serialize;
use serde_sarif::sarif::{
    ArtifactLocation, Location as SarifLocation, LogicalLocation, Message as SarifMessage, Region,
};
use url::Url;

use crate::code_flow::TraversalId;
use crate::json_map::{JsonMapping, PointerSpan};
use crate::mapper::{ArtifactMapper, ArtifactRequest, ResolveMode};
use crate::message::render_message;
use crate::model::{Message, Range};
use crate::paths::file_name_of;
use crate::region::parse_region;
use crate::run_info::RunInfo;

/// One resolved physical or logical place.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) uri: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) uri_base_id: Option<String>,
    pub(crate) range: Range,
    pub(crate) end_of_line: bool,
    /// `uri` names a file that existed when this location was resolved.
    pub(crate) mapped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) file_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) logical_locations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<Message>,
}

/// Builds [`Location`]s for one run, resolving artifacts through the mapper.
pub(crate) struct LocationFactory<'a> {
    mapper: &'a mut ArtifactMapper,
    run: &'a RunInfo,
    mode: ResolveMode,
}

impl<'a> LocationFactory<'a> {
    pub(crate) fn new(mapper: &'a mut ArtifactMapper, run: &'a RunInfo, mode: ResolveMode) -> Self {
        Self { mapper, run, mode }
    }

    pub(crate) fn run(&self) -> &'a RunInfo {
        self.run
    }

    pub(crate) fn create(&mut self, location: &SarifLocation) -> Location {
        let physical = location.physical_location.as_ref();
        let artifact = physical.and_then(|physical| physical.artifact_location.as_ref());
        let region = physical.and_then(|physical| physical.region.as_ref());
        let message = location
            .message
            .as_ref()
            .or_else(|| region.and_then(|region| region.message.as_ref()));

        let mut resolved = self.build(artifact, region, message);
        resolved.id = location.id;
        resolved.logical_locations = logical_names(location.logical_locations.as_deref());
        resolved
    }

    /// Build a location from a bare artifact reference, as found on
    /// attachments and analysis targets.
    pub(crate) fn create_from_artifact(
        &mut self,
        artifact: &ArtifactLocation,
        region: Option<&Region>,
    ) -> Location {
        let message = region.and_then(|region| region.message.as_ref());
        self.build(Some(artifact), region, message)
    }

    /// Retry resolution of a location that did not map earlier.
    ///
    /// Returns the input unchanged when it is already mapped and `None` when
    /// the raw location carries no artifact URI to retry with.
    pub(crate) fn get_or_remap(&mut self, existing: &Location, raw: &SarifLocation) -> Option<Location> {
        if existing.mapped {
            return Some(existing.clone());
        }
        let artifact = raw
            .physical_location
            .as_ref()
            .and_then(|physical| physical.artifact_location.as_ref())?;
        effective_artifact(self.run, artifact).0?;
        Some(self.create(raw))
    }

    fn build(
        &mut self,
        artifact: Option<&ArtifactLocation>,
        region: Option<&Region>,
        message: Option<&SarifMessage>,
    ) -> Location {
        let parsed = parse_region(region);
        let mut location = Location {
            range: parsed.range,
            end_of_line: parsed.end_of_line,
            message: message
                .map(|message| render_message(message, None))
                .filter(|message| !message.is_empty()),
            ..Location::default()
        };
        let Some(artifact) = artifact else {
            return location;
        };
        let run = self.run;
        let (uri, uri_base_id) = effective_artifact(run, artifact);
        location.uri_base_id = uri_base_id.map(str::to_string);
        let Some(uri) = uri else {
            return location;
        };

        let mapping = self.mapper.resolve(
            ArtifactRequest {
                run_id: run.id,
                uri,
                uri_base_id,
                base_uris: run.uri_base_ids.as_ref(),
                anchor_dir: run.sarif_dir(),
            },
            self.mode,
        );
        location.file_name = mapping
            .uri
            .as_ref()
            .and_then(|resolved| file_name_of(resolved.path()))
            .or_else(|| file_name_of(uri));
        location.mapped = mapping.mapped;
        location.uri = mapping.uri;
        location
    }
}

/// URI and base id of an artifact, following `index` into the run's
/// artifact table when the URI is missing.
fn effective_artifact<'b>(
    run: &'b RunInfo,
    artifact: &'b ArtifactLocation,
) -> (Option<&'b str>, Option<&'b str>) {
    if let Some(uri) = artifact.uri.as_deref() {
        return (Some(uri), artifact.uri_base_id.as_deref());
    }
    let indexed = artifact
        .index
        .and_then(|index| usize::try_from(index).ok())
        .and_then(|index| run.artifact_locations.get(index))
        .and_then(Option::as_ref);
    match indexed {
        Some(indexed) => (
            indexed.uri.as_deref(),
            artifact
                .uri_base_id
                .as_deref()
                .or(indexed.uri_base_id.as_deref()),
        ),
        None => (None, artifact.uri_base_id.as_deref()),
    }
}

fn logical_names(logical: Option<&[LogicalLocation]>) -> Vec<String> {
    logical
        .unwrap_or_default()
        .iter()
        .filter_map(|logical| {
            logical
                .fully_qualified_name
                .clone()
                .or_else(|| logical.name.clone())
        })
        .collect()
}

/// Pointer to a result inside a SARIF log.
pub(crate) fn result_pointer(run_index: usize, result_index: usize) -> String {
    format!("/runs/{run_index}/results/{result_index}")
}

/// Location inside the raw SARIF text of a result's first physical location,
/// falling back to its analysis target and then to the result object.
pub(crate) fn map_to_sarif_file_location(
    mapping: &JsonMapping,
    sarif_uri: &Url,
    run_index: usize,
    result_index: usize,
    insertion: bool,
) -> Option<Location> {
    let result = result_pointer(run_index, result_index);
    let span = [
        format!("{result}/locations/0/physicalLocation"),
        format!("{result}/analysisTarget"),
        result,
    ]
    .iter()
    .find_map(|pointer| mapping.span(pointer))?;
    Some(sarif_file_location(span, sarif_uri, insertion))
}

/// Location inside the raw SARIF text of the whole result object.
pub(crate) fn map_to_sarif_file_result(
    mapping: &JsonMapping,
    sarif_uri: &Url,
    run_index: usize,
    result_index: usize,
    insertion: bool,
) -> Option<Location> {
    let span = mapping.span(&result_pointer(run_index, result_index))?;
    Some(sarif_file_location(span, sarif_uri, insertion))
}

/// Location inside the raw SARIF text of one code-flow step.
pub(crate) fn map_to_sarif_file_step(
    mapping: &JsonMapping,
    sarif_uri: &Url,
    run_index: usize,
    result_index: usize,
    step: TraversalId,
    insertion: bool,
) -> Option<Location> {
    let pointer = format!(
        "{}/codeFlows/{}/threadFlows/{}/locations/{}",
        result_pointer(run_index, result_index),
        step.code_flow,
        step.thread_flow,
        step.step
    );
    let span = mapping.span(&pointer)?;
    Some(sarif_file_location(span, sarif_uri, insertion))
}

fn sarif_file_location(span: &PointerSpan, sarif_uri: &Url, insertion: bool) -> Location {
    let range = Range::new(span.value, span.value_end);
    Location {
        uri: Some(sarif_uri.clone()),
        range: if insertion {
            range.collapse_to_start()
        } else {
            range
        },
        mapped: false,
        file_name: file_name_of(sarif_uri.path()),
        ..Location::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json_map;
    use crate::model::Position;
    use serde_json::json;
    use serde_sarif::sarif::Run;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn run_info(run: serde_json::Value, sarif_path: &Path) -> RunInfo {
        let run: Run = serde_json::from_value(run).expect("run");
        RunInfo::create(&run, 0, 0, sarif_path)
    }

    fn sarif_location(value: serde_json::Value) -> SarifLocation {
        serde_json::from_value(value).expect("location")
    }

    #[test]
    fn resolves_relative_uri_next_to_sarif_file() {
        let dir = tempdir().expect("temp dir");
        fs::create_dir_all(dir.path().join("src")).expect("create src");
        fs::write(dir.path().join("src").join("Main.java"), "class Main {}").expect("write");
        let run = run_info(json!({"tool": {"driver": {"name": "t"}}}), &dir.path().join("out.sarif"));
        let mut mapper = ArtifactMapper::new(None);
        let mut factory = LocationFactory::new(&mut mapper, &run, ResolveMode::Interactive);

        let location = factory.create(&sarif_location(json!({
            "id": 2,
            "physicalLocation": {
                "artifactLocation": {"uri": "src/Main.java"},
                "region": {"startLine": 5, "startColumn": 3, "endLine": 5, "endColumn": 10}
            },
            "logicalLocations": [{"name": "run", "fullyQualifiedName": "Main.run"}, {"name": "other"}],
            "message": {"text": "here"}
        })));

        assert!(location.mapped);
        assert_eq!(location.id, Some(2));
        assert_eq!(location.file_name.as_deref(), Some("Main.java"));
        assert_eq!(location.range, Range::from_coords(4, 2, 4, 9));
        assert_eq!(location.logical_locations, vec!["Main.run", "other"]);
        assert_eq!(location.message.map(|message| message.text).as_deref(), Some("here"));
    }

    #[test]
    fn region_message_is_used_when_location_has_none() {
        let dir = tempdir().expect("temp dir");
        let run = run_info(json!({"tool": {"driver": {"name": "t"}}}), &dir.path().join("out.sarif"));
        let mut mapper = ArtifactMapper::new(None);
        let mut factory = LocationFactory::new(&mut mapper, &run, ResolveMode::Silent);

        let location = factory.create(&sarif_location(json!({
            "physicalLocation": {
                "artifactLocation": {"uri": "gone.c"},
                "region": {"startLine": 1, "message": {"text": "from region"}}
            }
        })));

        assert!(!location.mapped);
        assert_eq!(location.file_name.as_deref(), Some("gone.c"));
        assert_eq!(location.message.map(|message| message.text).as_deref(), Some("from region"));
    }

    #[test]
    fn artifact_index_is_followed_into_run_artifacts() {
        let dir = tempdir().expect("temp dir");
        fs::write(dir.path().join("lib.rs"), "").expect("write");
        let base = Url::from_directory_path(dir.path()).expect("dir url").to_string();
        let run = run_info(
            json!({
                "tool": {"driver": {"name": "t"}},
                "originalUriBaseIds": {"ROOT": {"uri": base}},
                "artifacts": [{"location": {"uri": "lib.rs", "uriBaseId": "ROOT"}}]
            }),
            &dir.path().join("out.sarif"),
        );
        let mut mapper = ArtifactMapper::new(None);
        let mut factory = LocationFactory::new(&mut mapper, &run, ResolveMode::Interactive);

        let location = factory.create(&sarif_location(json!({
            "physicalLocation": {"artifactLocation": {"index": 0}}
        })));

        assert!(location.mapped);
        assert_eq!(location.uri_base_id.as_deref(), Some("ROOT"));
        assert_eq!(location.uri, Url::from_file_path(dir.path().join("lib.rs")).ok());
    }

    #[test]
    fn get_or_remap_keeps_mapped_and_skips_missing_uri() {
        let dir = tempdir().expect("temp dir");
        let run = run_info(json!({"tool": {"driver": {"name": "t"}}}), &dir.path().join("out.sarif"));
        let mut mapper = ArtifactMapper::new(None);
        let mut factory = LocationFactory::new(&mut mapper, &run, ResolveMode::Silent);
        let mapped = Location {
            mapped: true,
            uri: Url::parse("file:///kept.c").ok(),
            ..Location::default()
        };
        let raw = sarif_location(json!({"physicalLocation": {"artifactLocation": {"uri": "x.c"}}}));

        assert_eq!(factory.get_or_remap(&mapped, &raw), Some(mapped.clone()));
        assert_eq!(
            factory.get_or_remap(&Location::default(), &sarif_location(json!({"message": {"text": "m"}}))),
            None
        );

        fs::write(dir.path().join("x.c"), "").expect("write");
        let mut fresh = ArtifactMapper::new(None);
        let mut factory = LocationFactory::new(&mut fresh, &run, ResolveMode::Silent);
        let remapped = factory.get_or_remap(&Location::default(), &raw).expect("remapped");
        assert!(remapped.mapped);
    }

    const SARIF: &str = r#"{
  "version": "2.1.0",
  "runs": [
    {
      "results": [
        {
          "message": {"text": "a"},
          "locations": [
            {"physicalLocation": {"artifactLocation": {"uri": "a.c"}}}
          ]
        },
        {
          "message": {"text": "b"},
          "analysisTarget": {"uri": "b.c"}
        }
      ]
    }
  ]
}"#;

    #[test]
    fn sarif_file_location_points_at_physical_location() {
        let mapping = json_map::parse(SARIF).expect("parse");
        let uri = Url::parse("file:///logs/out.sarif").expect("url");

        let location = map_to_sarif_file_location(&mapping, &uri, 0, 0, false).expect("location");

        assert!(!location.mapped);
        assert_eq!(location.uri.as_ref(), Some(&uri));
        assert_eq!(location.file_name.as_deref(), Some("out.sarif"));
        assert_eq!(location.range.start, Position::new(8, 33));
        assert_eq!(location.range.end, Position::new(8, 69));
    }

    #[test]
    fn sarif_file_location_falls_back_to_analysis_target() {
        let mapping = json_map::parse(SARIF).expect("parse");
        let uri = Url::parse("file:///logs/out.sarif").expect("url");

        let location = map_to_sarif_file_location(&mapping, &uri, 0, 1, true).expect("location");

        assert_eq!(location.range.start, Position::new(13, 28));
        assert_eq!(location.range.start, location.range.end);
    }

    #[test]
    fn sarif_file_result_spans_the_result_object() {
        let mapping = json_map::parse(SARIF).expect("parse");
        let uri = Url::parse("file:///logs/out.sarif").expect("url");

        let location = map_to_sarif_file_result(&mapping, &uri, 0, 1, false).expect("location");

        assert_eq!(location.range.start, Position::new(11, 8));
        assert_eq!(location.range.end, Position::new(14, 9));
        assert!(map_to_sarif_file_result(&mapping, &uri, 0, 5, false).is_none());
    }

    #[test]
    fn sarif_file_step_follows_traversal_id() {
        let text = json!({
            "version": "2.1.0",
            "runs": [{"results": [{"codeFlows": [{"threadFlows": [{"locations": [
                {"nestingLevel": 0},
                {"nestingLevel": 1}
            ]}]}]}]}]
        })
        .to_string();
        let mapping = json_map::parse(&text).expect("parse");
        let uri = Url::parse("file:///logs/out.sarif").expect("url");
        let second = TraversalId {
            code_flow: 0,
            thread_flow: 0,
            step: 1,
        };

        let location =
            map_to_sarif_file_step(&mapping, &uri, 0, 0, second, false).expect("step location");

        let start = location.range.start.character as usize;
        let end = location.range.end.character as usize;
        assert_eq!(&text[start..end], r#"{"nestingLevel":1}"#);
        let missing = TraversalId { step: 2, ..second };
        assert!(map_to_sarif_file_step(&mapping, &uri, 0, 0, missing, true).is_none());
    }
}
