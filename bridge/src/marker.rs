//! File marker extraction for captured text.
//!
//! The first line of a captured block names the target file, either as a
//! structured `{"$file": "..."}` tag or as a comment line such as
//! `// src/app.ts`. Everything after that line is the body.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Marker patterns in priority order, first match wins
static MARKER_PATTERNS: Lazy<Vec<MarkerPattern>> = Lazy::new(|| {
    vec![
        MarkerPattern {
            name: "tag",
            kind: PatternKind::Capture(
                Regex::new(r#"\{\s*"\$file"\s*:\s*"([^"]+)""#)
                    .expect("failed to compile tag marker pattern"),
            ),
        },
        MarkerPattern {
            name: "comment",
            kind: PatternKind::Strip {
                leading: Regex::new(r#"^[\s/*#!\[<\-'"`]*"#)
                    .expect("failed to compile comment prefix pattern"),
                trailing: Regex::new(r#"[\s\-/#*>\]'"`]+$"#)
                    .expect("failed to compile comment suffix pattern"),
            },
        },
    ]
});

/// A candidate must contain a separator or end in an extension
static PATH_SHAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.\w+$|[/\\]").expect("failed to compile path shape pattern"));

#[derive(Debug)]
struct MarkerPattern {
    name: &'static str,
    kind: PatternKind,
}

#[derive(Debug)]
enum PatternKind {
    /// Take the first capture group
    Capture(Regex),
    /// Strip comment punctuation from both ends and keep the remainder
    Strip { leading: Regex, trailing: Regex },
}

impl MarkerPattern {
    fn extract(&self, line: &str) -> Option<String> {
        let candidate = match &self.kind {
            PatternKind::Capture(re) => re.captures(line)?.get(1)?.as_str().trim().to_string(),
            PatternKind::Strip { leading, trailing } => {
                let rest = leading.replace(line, "");
                trailing.replace(rest.trim(), "").trim().to_string()
            }
        };
        (!candidate.is_empty()).then_some(candidate)
    }
}

/// One extracted (path, body) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMarker {
    pub filepath: String,
    pub body: String,
}

impl ParsedMarker {
    /// Final path segment, used in feedback messages
    pub fn file_name(&self) -> &str {
        file_name(&self.filepath)
    }
}

/// Final segment of a `/` or `\` separated path
pub fn file_name(path: &str) -> &str {
    path.rsplit(&['/', '\\'][..]).next().unwrap_or(path)
}

/// Extract a target path and body from captured text.
///
/// Returns `None` for text whose first line is not path-shaped or whose body
/// is empty, so ordinary copied prose never produces a save.
pub fn parse(text: &str) -> Option<ParsedMarker> {
    let text = text.trim_start();
    if text.is_empty() {
        return None;
    }

    let (marker_line, rest) = match text.split_once('\n') {
        Some((first, rest)) => (first, rest),
        None => (text, ""),
    };
    let marker_line = marker_line.trim_end_matches('\r');

    let filepath = extract_path(marker_line)?;
    if !is_path_shaped(&filepath) {
        tracing::trace!(candidate = %filepath, "marker candidate rejected: not path-shaped");
        return None;
    }

    let body = rest.trim();
    if body.is_empty() {
        tracing::trace!(filepath = %filepath, "marker rejected: empty body");
        return None;
    }

    Some(ParsedMarker {
        filepath,
        body: body.to_string(),
    })
}

fn extract_path(line: &str) -> Option<String> {
    MARKER_PATTERNS.iter().find_map(|pattern| {
        let found = pattern.extract(line)?;
        tracing::trace!(pattern = pattern.name, candidate = %found, "marker pattern matched");
        Some(found)
    })
}

/// Whether a candidate looks like a file path
pub fn is_path_shaped(candidate: &str) -> bool {
    PATH_SHAPE_RE.is_match(candidate)
}
