use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_sarif::sarif::Region;

use crate::model::{Position, Range};

/// Canonical zero-based range derived from a SARIF region.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct ParsedRegion {
    pub(crate) range: Range,
    /// The range runs to the end of the start line instead of a fixed column.
    pub(crate) end_of_line: bool,
}

impl Default for ParsedRegion {
    fn default() -> Self {
        Self {
            range: Range::from_coords(0, 0, 0, 1),
            end_of_line: false,
        }
    }
}

/// The shapes a SARIF region can take.
#[derive(Debug)]
enum RegionForm<'a> {
    Lines {
        start_line: i64,
        start_column: Option<i64>,
        end_line: Option<i64>,
        end_column: Option<i64>,
        snippet_text: Option<&'a str>,
        snippet_binary: Option<&'a str>,
    },
    Offsets {
        char_offset: i64,
        char_length: Option<i64>,
    },
    Empty,
}

fn classify(region: &Region) -> RegionForm<'_> {
    if let Some(start_line) = region.start_line {
        let snippet = region.snippet.as_ref();
        return RegionForm::Lines {
            start_line,
            start_column: region.start_column,
            end_line: region.end_line,
            end_column: region.end_column,
            snippet_text: snippet.and_then(|content| content.text.as_deref()),
            snippet_binary: snippet.and_then(|content| content.binary.as_deref()),
        };
    }
    if let Some(char_offset) = region.char_offset {
        return RegionForm::Offsets {
            char_offset,
            char_length: region.char_length,
        };
    }
    RegionForm::Empty
}

/// Convert an optional 1-based SARIF region into a 0-based half-open range.
pub(crate) fn parse_region(region: Option<&Region>) -> ParsedRegion {
    let Some(region) = region else {
        return ParsedRegion::default();
    };
    match classify(region) {
        RegionForm::Empty => ParsedRegion::default(),
        RegionForm::Offsets {
            char_offset,
            char_length,
        } => {
            let start_column = char_offset;
            let end_column = match char_length {
                Some(length) => char_offset.saturating_add(length),
                None => start_column,
            };
            ParsedRegion {
                range: Range::new(
                    Position::clamped(0, start_column),
                    Position::clamped(0, end_column),
                ),
                end_of_line: false,
            }
        }
        RegionForm::Lines {
            start_line,
            start_column,
            end_line,
            end_column,
            snippet_text,
            snippet_binary,
        } => {
            let start_line = start_line.saturating_sub(1);
            let start_column = start_column.map_or(0, |column| column.saturating_sub(1));
            let mut end_line = end_line.map_or(start_line, |line| line.saturating_sub(1));
            let mut end_of_line = false;
            let end_column = if let Some(column) = end_column {
                column.saturating_sub(1)
            } else if let Some(text) = snippet_text {
                // Snippet text carries the line terminator convention of the tool.
                // Columns count UTF-16 code units.
                (text.encode_utf16().count() as i64).saturating_sub(2)
            } else if let Some(length) = snippet_binary.and_then(decoded_length) {
                length
            } else {
                end_line = end_line.saturating_add(1);
                end_of_line = true;
                0
            };
            ParsedRegion {
                range: Range::new(
                    Position::clamped(start_line, start_column),
                    Position::clamped(end_line, end_column),
                ),
                end_of_line,
            }
        }
    }
}

fn decoded_length(binary: &str) -> Option<i64> {
    STANDARD
        .decode(binary)
        .ok()
        .map(|bytes| bytes.len() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn region(value: serde_json::Value) -> Region {
        serde_json::from_value(value).expect("region")
    }

    #[test]
    fn line_region_is_converted_to_zero_based_range() {
        let parsed = parse_region(Some(&region(
            json!({"startLine": 5, "startColumn": 3, "endLine": 5, "endColumn": 10}),
        )));

        assert_eq!(parsed.range, Range::from_coords(4, 2, 4, 9));
        assert!(!parsed.end_of_line);
    }

    #[test]
    fn line_region_without_end_runs_to_end_of_line() {
        let parsed = parse_region(Some(&region(json!({"startLine": 5}))));

        assert_eq!(parsed.range, Range::from_coords(4, 0, 5, 0));
        assert!(parsed.end_of_line);
    }

    #[test]
    fn parsing_is_idempotent() {
        let value = region(json!({"startLine": 7, "startColumn": 1, "endColumn": 4}));

        assert_eq!(parse_region(Some(&value)), parse_region(Some(&value)));
    }

    #[test]
    fn missing_end_line_reuses_start_line() {
        let parsed = parse_region(Some(&region(
            json!({"startLine": 3, "startColumn": 2, "endColumn": 6}),
        )));

        assert_eq!(parsed.range, Range::from_coords(2, 1, 2, 5));
    }

    #[test]
    fn snippet_text_length_sets_end_column() {
        let parsed = parse_region(Some(&region(json!({
            "startLine": 2,
            "snippet": {"text": "let x = 1;\r\n"}
        }))));

        assert_eq!(parsed.range, Range::from_coords(1, 0, 1, 10));
        assert!(!parsed.end_of_line);
    }

    #[test]
    fn snippet_binary_length_sets_end_column() {
        let parsed = parse_region(Some(&region(json!({
            "startLine": 1,
            "snippet": {"binary": "aGVsbG8="}
        }))));

        assert_eq!(parsed.range, Range::from_coords(0, 0, 0, 5));
    }

    #[test]
    fn char_offset_region_stays_on_first_line() {
        let parsed = parse_region(Some(&region(json!({"charOffset": 12, "charLength": 4}))));

        assert_eq!(parsed.range, Range::from_coords(0, 12, 0, 16));
        assert!(!parsed.end_of_line);
    }

    #[test]
    fn char_offset_without_length_is_empty_range() {
        let parsed = parse_region(Some(&region(json!({"charOffset": 12}))));

        assert_eq!(parsed.range, Range::from_coords(0, 12, 0, 12));
    }

    #[test]
    fn absent_or_empty_region_uses_default_range() {
        assert_eq!(parse_region(None), ParsedRegion::default());
        assert_eq!(
            parse_region(Some(&region(json!({"byteOffset": 3})))),
            ParsedRegion {
                range: Range::from_coords(0, 0, 0, 1),
                end_of_line: false,
            }
        );
    }

    #[test]
    fn snippet_length_counts_utf16_units() {
        let parsed = parse_region(Some(&region(json!({
            "startLine": 1,
            "snippet": {"text": "a\u{1F600}\r\n"}
        }))));

        assert_eq!(parsed.range, Range::from_coords(0, 0, 0, 3));
    }

    #[test]
    fn extreme_numbers_are_clamped_instead_of_overflowing() {
        let offsets = parse_region(Some(&region(
            json!({"charOffset": i64::MAX, "charLength": 10}),
        )));
        let lines = parse_region(Some(&region(json!({
            "startLine": i64::MIN,
            "startColumn": i64::MIN,
            "endLine": i64::MIN,
            "endColumn": i64::MIN
        }))));
        let open_ended = parse_region(Some(&region(json!({"startLine": i64::MAX}))));

        assert_eq!(offsets.range.start, Position::clamped(0, i64::MAX));
        assert_eq!(offsets.range.end, Position::clamped(0, i64::MAX));
        assert_eq!(lines.range, Range::from_coords(0, 0, 0, 0));
        assert!(open_ended.end_of_line);
        assert_eq!(open_ended.range.end, Position::clamped(i64::MAX, 0));
    }
}
