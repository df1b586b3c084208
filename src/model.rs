use serde::Serialize;

/// Zero-based line/character position.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Serialize)]
pub(crate) struct Position {
    pub(crate) line: u32,
    pub(crate) character: u32,
}

impl Position {
    pub(crate) fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }

    /// Build a position from signed SARIF arithmetic, clamping negatives to zero.
    pub(crate) fn clamped(line: i64, character: i64) -> Self {
        Self {
            line: clamp_u32(line),
            character: clamp_u32(character),
        }
    }
}

/// Half-open range between two positions.
///
/// Start and end are plain fields so serialized output always carries both.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub(crate) struct Range {
    pub(crate) start: Position,
    pub(crate) end: Position,
}

impl Range {
    pub(crate) fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub(crate) fn from_coords(start_line: u32, start_char: u32, end_line: u32, end_char: u32) -> Self {
        Self {
            start: Position::new(start_line, start_char),
            end: Position::new(end_line, end_char),
        }
    }

    /// Zero-width range at the start of this one.
    pub(crate) fn collapse_to_start(self) -> Self {
        Self {
            start: self.start,
            end: self.start,
        }
    }
}

fn clamp_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

/// Message rendered in both plain-text and HTML flavors.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub(crate) struct Message {
    pub(crate) text: String,
    pub(crate) html: String,
}

impl Message {
    pub(crate) fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// SARIF result level, ordered so that `Error` is the greatest.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Level {
    None,
    Note,
    Warning,
    Error,
}

impl Level {
    /// Parse a SARIF `level` string. Absent or unknown values fall back to warning.
    pub(crate) fn parse(value: Option<&str>) -> Self {
        match value {
            Some("error") => Level::Error,
            Some("note") => Level::Note,
            Some("none") => Level::None,
            _ => Level::Warning,
        }
    }

    pub(crate) fn severity(self) -> Severity {
        match self {
            Level::Error => Severity::Error,
            Level::Warning => Severity::Warning,
            Level::Note | Level::None => Severity::Information,
        }
    }
}

/// Severity used for displayed diagnostics.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Severity {
    Error,
    Warning,
    Information,
}

/// Importance of a thread-flow step.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Importance {
    Essential,
    #[default]
    Important,
    Unimportant,
}

impl Importance {
    pub(crate) fn parse(value: Option<&str>) -> Self {
        match value {
            Some("essential") => Importance::Essential,
            Some("unimportant") => Importance::Unimportant,
            _ => Importance::Important,
        }
    }
}

/// Read a SARIF enum-like field as its wire string.
///
/// serde-sarif models some of these fields as typed enums and others as raw
/// JSON values; both serialize to the SARIF string.
pub(crate) fn wire_str<T: Serialize>(value: &Option<T>) -> Option<String> {
    let value = value.as_ref()?;
    match serde_json::to_value(value).ok()? {
        serde_json::Value::String(text) => Some(text),
        _ => None,
    }
}
