use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use url::Url;

use crate::paths::{
    common_suffix_len, join_uri, match_disk_casing, normal_components, parse_absolute_uri,
    percent_decode, trim_trailing_slash,
};

/// Collaborator asked to locate a file that could not be found on disk.
pub(crate) trait FilePicker {
    /// Return the local file standing in for `original`, or `None` to skip it.
    fn pick_replacement_file(&mut self, original: &Url, current_base: Option<&str>)
    -> Option<PathBuf>;
}

/// Whether a resolution may prompt the picker.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ResolveMode {
    Interactive,
    Silent,
}

/// Outcome of resolving one artifact location.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct Mapping {
    pub(crate) mapped: bool,
    pub(crate) uri: Option<Url>,
}

impl Mapping {
    fn mapped(uri: Url) -> Self {
        Self {
            mapped: true,
            uri: Some(uri),
        }
    }

    fn unmapped(uri: Option<Url>) -> Self {
        Self { mapped: false, uri }
    }
}

/// Everything the mapper needs to know about one artifact reference.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ArtifactRequest<'a> {
    pub(crate) run_id: u32,
    pub(crate) uri: &'a str,
    pub(crate) uri_base_id: Option<&'a str>,
    pub(crate) base_uris: Option<&'a BTreeMap<String, String>>,
    /// Directory relative URIs without a base are anchored to.
    pub(crate) anchor_dir: Option<&'a Path>,
}

impl ArtifactRequest<'_> {
    fn base(&self) -> Option<&str> {
        let id = self.uri_base_id?;
        self.base_uris?.get(id).map(String::as_str)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
struct MappingKey {
    run_id: u32,
    uri_base_id: Option<String>,
    original_uri: String,
}

/// Learned rewrite from a declared URI prefix to a local one.
#[derive(Clone, Debug, Eq, PartialEq)]
struct PrefixRewrite {
    original: String,
    local: String,
}

/// Maps SARIF artifact URIs onto local files and remembers the answers.
pub(crate) struct ArtifactMapper {
    cache: BTreeMap<MappingKey, Mapping>,
    rewrites: Vec<PrefixRewrite>,
    picker: Option<Box<dyn FilePicker>>,
    mapping_changed: bool,
}

impl ArtifactMapper {
    pub(crate) fn new(picker: Option<Box<dyn FilePicker>>) -> Self {
        Self {
            cache: BTreeMap::new(),
            rewrites: Vec::new(),
            picker,
            mapping_changed: false,
        }
    }

    /// Resolve an artifact to a local file URI.
    pub(crate) fn resolve(&mut self, request: ArtifactRequest<'_>, mode: ResolveMode) -> Mapping {
        let key = MappingKey {
            run_id: request.run_id,
            uri_base_id: request.uri_base_id.map(str::to_string),
            original_uri: request.uri.to_string(),
        };
        if let Some(hit) = self.cache.get(&key) {
            debug!("artifact cache hit for {}", request.uri);
            return hit.clone();
        }

        let Some(candidate) = candidate_uri(&request) else {
            debug!("artifact {} has no usable URI", request.uri);
            return self.remember(key, Mapping::unmapped(None));
        };
        if let Some(found) = existing_file(&candidate) {
            return self.remember(key, Mapping::mapped(found));
        }
        if let Some(found) = self.apply_rewrites(&candidate) {
            debug!("artifact {candidate} found through learned prefix at {found}");
            return self.remember(key, Mapping::mapped(found));
        }
        if mode == ResolveMode::Silent {
            return self.remember(key, Mapping::unmapped(Some(candidate)));
        }
        let Some(picker) = self.picker.as_mut() else {
            return self.remember(key, Mapping::unmapped(Some(candidate)));
        };

        let Some(chosen) = picker.pick_replacement_file(&candidate, request.base()) else {
            info!("mapping for {candidate} skipped");
            return self.remember(key, Mapping::unmapped(Some(candidate)));
        };
        let chosen = std::path::absolute(&chosen).unwrap_or(chosen);
        if !chosen.is_file() {
            warn!("chosen file {} does not exist", chosen.display());
            return self.remember(key, Mapping::unmapped(Some(candidate)));
        }
        let chosen = match_disk_casing(&chosen);
        let Ok(chosen_uri) = Url::from_file_path(&chosen) else {
            return self.remember(key, Mapping::unmapped(Some(candidate)));
        };
        self.learn_from_choice(&candidate, &chosen);
        self.remember(key, Mapping::mapped(chosen_uri))
    }

    /// Register a prefix rewrite and signal that mappings changed.
    pub(crate) fn register_rewrite(&mut self, original: &Url, local: &Url) {
        let original = trim_trailing_slash(original.as_str()).to_string();
        let local = trim_trailing_slash(local.as_str()).to_string();
        info!("mapping {original} to {local}");
        self.rewrites.retain(|rewrite| rewrite.original != original);
        self.rewrites.push(PrefixRewrite { original, local });
        self.rewrites
            .sort_by(|left, right| right.original.len().cmp(&left.original.len()));
        // Unmapped answers may now resolve; they are recomputed on the next lookup.
        self.cache.retain(|_, mapping| mapping.mapped);
        self.mapping_changed = true;
    }

    /// Drain the pending mapping-changed notification.
    pub(crate) fn take_mapping_changed(&mut self) -> bool {
        std::mem::take(&mut self.mapping_changed)
    }

    /// Drop cached answers for a run that is going away.
    pub(crate) fn forget_run(&mut self, run_id: u32) {
        self.cache.retain(|key, _| key.run_id != run_id);
    }

    pub(crate) fn clear(&mut self) {
        self.cache.clear();
    }

    fn remember(&mut self, key: MappingKey, mapping: Mapping) -> Mapping {
        self.cache.insert(key, mapping.clone());
        mapping
    }

    fn apply_rewrites(&self, candidate: &Url) -> Option<Url> {
        let text = candidate.as_str();
        for rewrite in &self.rewrites {
            let Some(rest) = strip_segment_prefix(text, &rewrite.original) else {
                continue;
            };
            let Ok(rewritten) = Url::parse(&join_uri(&rewrite.local, rest)) else {
                continue;
            };
            if let Some(found) = existing_file(&rewritten) {
                return Some(found);
            }
        }
        None
    }

    /// Derive a prefix rewrite from the longest common path suffix of the
    /// declared file and the file the user chose.
    fn learn_from_choice(&mut self, candidate: &Url, chosen: &Path) {
        let declared: Vec<String> = candidate
            .path_segments()
            .map(|segments| {
                segments
                    .filter(|segment| !segment.is_empty())
                    .map(percent_decode)
                    .collect()
            })
            .unwrap_or_default();
        let local = normal_components(chosen);
        // With nothing in common, the two parent directories stand in for each other.
        let shared = common_suffix_len(&declared, &local).max(1);

        let mut original_prefix = candidate.clone();
        original_prefix.set_fragment(None);
        original_prefix.set_query(None);
        if let Ok(mut segments) = original_prefix.path_segments_mut() {
            segments.pop_if_empty();
            for _ in 0..shared {
                segments.pop();
            }
        }
        let Some(local_dir) = chosen.ancestors().nth(shared) else {
            return;
        };
        let Ok(local_prefix) = Url::from_file_path(local_dir) else {
            return;
        };
        self.register_rewrite(&original_prefix, &local_prefix);
    }
}

/// Strip `prefix` from `text` only at a path-segment boundary.
fn strip_segment_prefix<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Combine an artifact URI with its declared base into an absolute URI.
fn candidate_uri(request: &ArtifactRequest<'_>) -> Option<Url> {
    if let Some(mut absolute) = parse_absolute_uri(request.uri) {
        absolute.set_fragment(None);
        return Some(absolute);
    }
    match request.base() {
        Some(base) => combine_with_base(base, request.uri, request.anchor_dir),
        None => anchored_file_uri(request.uri, request.anchor_dir),
    }
}

fn combine_with_base(base: &str, relative: &str, anchor_dir: Option<&Path>) -> Option<Url> {
    match parse_absolute_uri(base) {
        Some(base_url) if base_url.scheme() == "file" => {
            let base_path = base_url.to_file_path().ok()?;
            Url::from_file_path(join_relative_path(&base_path, relative)).ok()
        }
        Some(mut base_url) => {
            let path = join_uri(base_url.path(), relative);
            base_url.set_path(&path);
            base_url.set_query(None);
            // SARIF forbids fragments on artifact URIs.
            base_url.set_fragment(None);
            Some(base_url)
        }
        None => {
            let joined = join_uri(base, relative);
            anchored_file_uri(&joined, anchor_dir)
        }
    }
}

fn anchored_file_uri(uri: &str, anchor_dir: Option<&Path>) -> Option<Url> {
    let path = Path::new(uri);
    if path.is_absolute() {
        return Url::from_file_path(join_relative_path(Path::new("/"), uri)).ok();
    }
    let anchor = anchor_dir?;
    Url::from_file_path(join_relative_path(anchor, uri)).ok()
}

fn join_relative_path(base: &Path, relative: &str) -> PathBuf {
    let mut joined = base.to_path_buf();
    for segment in relative.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                joined.pop();
            }
            segment => joined.push(percent_decode(segment)),
        }
    }
    joined
}

/// The on-disk file behind a `file:` URI, with casing taken from disk.
fn existing_file(uri: &Url) -> Option<Url> {
    if uri.scheme() != "file" {
        return None;
    }
    let path = uri.to_file_path().ok()?;
    if !path.is_file() {
        return None;
    }
    Url::from_file_path(match_disk_casing(&path)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;
    use std::rc::Rc;
    use tempfile::tempdir;

    /// Picker that replays scripted answers and records every prompt.
    struct ScriptedPicker {
        answers: RefCell<Vec<Option<PathBuf>>>,
        prompts: Rc<RefCell<Vec<String>>>,
    }

    impl FilePicker for ScriptedPicker {
        fn pick_replacement_file(
            &mut self,
            original: &Url,
            _current_base: Option<&str>,
        ) -> Option<PathBuf> {
            self.prompts.borrow_mut().push(original.to_string());
            let mut answers = self.answers.borrow_mut();
            if answers.is_empty() {
                return None;
            }
            answers.remove(0)
        }
    }

    fn scripted(answers: Vec<Option<PathBuf>>) -> (ArtifactMapper, Rc<RefCell<Vec<String>>>) {
        let prompts = Rc::new(RefCell::new(Vec::new()));
        let picker = ScriptedPicker {
            answers: RefCell::new(answers),
            prompts: Rc::clone(&prompts),
        };
        (ArtifactMapper::new(Some(Box::new(picker))), prompts)
    }

    fn request<'a>(uri: &'a str, anchor: Option<&'a Path>) -> ArtifactRequest<'a> {
        ArtifactRequest {
            run_id: 0,
            uri,
            uri_base_id: None,
            base_uris: None,
            anchor_dir: anchor,
        }
    }

    fn under_base<'a>(uri: &'a str, bases: &'a BTreeMap<String, String>) -> ArtifactRequest<'a> {
        ArtifactRequest {
            run_id: 0,
            uri,
            uri_base_id: Some("BUILD"),
            base_uris: Some(bases),
            anchor_dir: None,
        }
    }

    fn write_file(path: &Path) {
        fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
        fs::write(path, "x").expect("write file");
    }

    #[test]
    fn existing_file_maps_without_prompting() {
        let dir = tempdir().expect("temp dir");
        let file = dir.path().join("src").join("a.c");
        write_file(&file);
        let (mut mapper, prompts) = scripted(Vec::new());

        let mapping = mapper.resolve(request("src/a.c", Some(dir.path())), ResolveMode::Interactive);

        assert!(mapping.mapped);
        assert_eq!(mapping.uri, Url::from_file_path(&file).ok());
        assert!(prompts.borrow().is_empty());
    }

    #[test]
    fn batch_mode_caches_unmapped() {
        let dir = tempdir().expect("temp dir");
        let mut mapper = ArtifactMapper::new(None);

        let mapping = mapper.resolve(request("missing.c", Some(dir.path())), ResolveMode::Interactive);

        assert!(!mapping.mapped);
        assert!(mapping.uri.is_some());
        assert_eq!(mapper.cache.len(), 1);
        assert!(!mapper.take_mapping_changed());
    }

    #[test]
    fn base_uri_file_scheme_joins_as_path() {
        let dir = tempdir().expect("temp dir");
        let file = dir.path().join("lib").join("b.c");
        write_file(&file);
        let base = Url::from_directory_path(dir.path()).expect("dir url").to_string();
        let bases = BTreeMap::from([("SRCROOT".to_string(), base)]);
        let mut mapper = ArtifactMapper::new(None);

        let mapping = mapper.resolve(
            ArtifactRequest {
                run_id: 1,
                uri: "lib/b.c",
                uri_base_id: Some("SRCROOT"),
                base_uris: Some(&bases),
                anchor_dir: None,
            },
            ResolveMode::Interactive,
        );

        assert!(mapping.mapped);
        assert_eq!(mapping.uri, Url::from_file_path(&file).ok());
    }

    #[test]
    fn absolute_path_base_resolves_outside_the_sarif_directory() {
        let root = tempdir().expect("temp dir");
        let sarif_dir = tempdir().expect("temp dir");
        let file = root.path().join("a.c");
        write_file(&file);
        let declared: BTreeMap<String, serde_sarif::sarif::ArtifactLocation> =
            serde_json::from_value(serde_json::json!({
                "ROOT": {"uri": format!("{}/", root.path().display())}
            }))
            .expect("base ids");
        let bases = crate::base_uri::expand_base_uris(Some(&declared)).expect("expanded");
        let mut mapper = ArtifactMapper::new(None);

        let mapping = mapper.resolve(
            ArtifactRequest {
                run_id: 0,
                uri: "a.c",
                uri_base_id: Some("ROOT"),
                base_uris: Some(&bases),
                anchor_dir: Some(sarif_dir.path()),
            },
            ResolveMode::Silent,
        );

        assert!(mapping.mapped);
        assert_eq!(mapping.uri, Url::from_file_path(&file).ok());
    }

    #[test]
    fn non_file_base_joins_segments_and_drops_fragment() {
        let bases = BTreeMap::from([("WEB".to_string(), "https://example.com/repo/".to_string())]);
        let request = ArtifactRequest {
            run_id: 0,
            uri: "src/a.c",
            uri_base_id: Some("WEB"),
            base_uris: Some(&bases),
            anchor_dir: None,
        };

        let candidate = candidate_uri(&request).expect("candidate");

        assert_eq!(candidate.as_str(), "https://example.com/repo/src/a.c");
        let absolute = candidate_uri(&ArtifactRequest {
            uri: "https://example.com/x.c#frag",
            ..request
        })
        .expect("absolute");
        assert_eq!(absolute.fragment(), None);
    }

    #[test]
    fn interactive_choice_is_learned_for_sibling_files() {
        let dir = tempdir().expect("temp dir");
        let local = dir.path().join("local");
        write_file(&local.join("a.c"));
        write_file(&local.join("sub").join("b.c"));
        let (mut mapper, prompts) = scripted(vec![Some(local.join("a.c"))]);

        let first = mapper.resolve(request("file:///orig/a.c", None), ResolveMode::Interactive);
        let second = mapper.resolve(request("file:///orig/sub/b.c", None), ResolveMode::Interactive);

        assert!(first.mapped);
        assert!(second.mapped);
        assert_eq!(
            second.uri,
            Url::from_file_path(local.join("sub").join("b.c")).ok()
        );
        assert_eq!(prompts.borrow().len(), 1);
        assert!(mapper.take_mapping_changed());
        assert!(!mapper.take_mapping_changed());
    }

    #[test]
    fn interactive_choice_is_learned_under_a_declared_base() {
        let dir = tempdir().expect("temp dir");
        let local = dir.path().join("local");
        write_file(&local.join("a.c"));
        write_file(&local.join("sub").join("b.c"));
        let bases = BTreeMap::from([("BUILD".to_string(), "file:///orig/".to_string())]);
        let (mut mapper, prompts) = scripted(vec![Some(local.join("a.c"))]);
        let first = mapper.resolve(under_base("a.c", &bases), ResolveMode::Interactive);
        let second = mapper.resolve(under_base("sub/b.c", &bases), ResolveMode::Interactive);
        let again = mapper.resolve(under_base("sub/b.c", &bases), ResolveMode::Interactive);

        assert!(first.mapped);
        assert_eq!(
            second.uri,
            Url::from_file_path(local.join("sub").join("b.c")).ok()
        );
        assert_eq!(again, second);
        assert_eq!(prompts.borrow().as_slice(), ["file:///orig/a.c"]);
    }

    #[test]
    fn unparsable_rewrite_does_not_hide_shorter_prefixes() {
        let dir = tempdir().expect("temp dir");
        let local = dir.path().join("checkout");
        write_file(&local.join("sub").join("a.c"));
        let mut mapper = ArtifactMapper::new(None);
        mapper.register_rewrite(
            &Url::parse("file:///orig").expect("url"),
            &Url::from_directory_path(&local).expect("dir url"),
        );
        mapper.rewrites.insert(
            0,
            PrefixRewrite {
                original: "file:///orig/sub".to_string(),
                local: "::not a uri".to_string(),
            },
        );

        let mapping = mapper.resolve(request("file:///orig/sub/a.c", None), ResolveMode::Silent);

        assert!(mapping.mapped);
        assert_eq!(mapping.uri, Url::from_file_path(local.join("sub").join("a.c")).ok());
    }

    #[test]
    fn cancelled_prompt_does_not_poison_later_rewrites() {
        let dir = tempdir().expect("temp dir");
        let local = dir.path().join("checkout");
        write_file(&local.join("one.c"));
        write_file(&local.join("two.c"));
        let (mut mapper, prompts) = scripted(vec![None, Some(local.join("one.c"))]);

        let skipped = mapper.resolve(request("file:///build/two.c", None), ResolveMode::Interactive);
        assert!(!skipped.mapped);

        let picked = mapper.resolve(request("file:///build/one.c", None), ResolveMode::Interactive);
        assert!(picked.mapped);

        let retried = mapper.resolve(request("file:///build/two.c", None), ResolveMode::Silent);
        assert!(retried.mapped);
        assert_eq!(retried.uri, Url::from_file_path(local.join("two.c")).ok());
        assert_eq!(prompts.borrow().len(), 2);
    }

    #[test]
    fn unrelated_choice_falls_back_to_parent_directories() {
        let dir = tempdir().expect("temp dir");
        let local = dir.path().join("elsewhere");
        write_file(&local.join("renamed.c"));
        write_file(&local.join("other.c"));
        let (mut mapper, _prompts) = scripted(vec![Some(local.join("renamed.c"))]);

        let picked = mapper.resolve(request("file:///orig/old.c", None), ResolveMode::Interactive);
        let sibling = mapper.resolve(request("file:///orig/other.c", None), ResolveMode::Silent);

        assert_eq!(picked.uri, Url::from_file_path(local.join("renamed.c")).ok());
        assert!(sibling.mapped);
        assert_eq!(sibling.uri, Url::from_file_path(local.join("other.c")).ok());
    }

    #[test]
    fn silent_mode_never_prompts() {
        let (mut mapper, prompts) = scripted(vec![Some(PathBuf::from("/nowhere"))]);

        let mapping = mapper.resolve(request("file:///orig/a.c", None), ResolveMode::Silent);

        assert!(!mapping.mapped);
        assert!(prompts.borrow().is_empty());
    }

    #[test]
    fn cache_is_keyed_by_run() {
        let (mut mapper, prompts) = scripted(Vec::new());

        mapper.resolve(request("file:///orig/a.c", None), ResolveMode::Interactive);
        mapper.resolve(request("file:///orig/a.c", None), ResolveMode::Interactive);
        mapper.resolve(
            ArtifactRequest {
                run_id: 7,
                ..request("file:///orig/a.c", None)
            },
            ResolveMode::Interactive,
        );

        assert_eq!(prompts.borrow().len(), 2);
        mapper.forget_run(7);
        assert_eq!(mapper.cache.len(), 1);
    }

    #[test]
    fn segment_prefix_requires_boundary() {
        assert_eq!(strip_segment_prefix("file:///orig/a.c", "file:///orig"), Some("/a.c"));
        assert_eq!(strip_segment_prefix("file:///original/a.c", "file:///orig"), None);
        assert_eq!(strip_segment_prefix("file:///a.c", "file:///"), Some("a.c"));
    }

    #[test]
    fn relative_path_join_handles_dot_segments() {
        assert_eq!(
            join_relative_path(Path::new("/work/src"), "./lib/../inc/a%20b.h"),
            PathBuf::from("/work/src/inc/a b.h")
        );
    }
}
