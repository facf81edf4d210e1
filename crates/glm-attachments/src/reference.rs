//! Attachment references in Markdown bodies
//!
//! GitLab stores issue and comment attachments under the project's
//! `/uploads/<secret>/<filename>` path and links them from Markdown as
//! `[label](/uploads/...)` or, for inline images, `![label](/uploads/...)`.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// `OptionalBang [ Label ] ( /uploads... )`, where the path ends at the first
/// unescaped `)`.
static REFERENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(!?)\[([^\]]+)\]\((/uploads(?:\\.|[^)\\])+)\)").unwrap()
});

/// Shared by the scanner and the substitution pass so offsets always agree
pub(crate) fn pattern() -> &'static Regex {
    &REFERENCE_PATTERN
}

/// How the reference is displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// `[label](path)`
    Link,
    /// `![label](path)`
    Image,
}

impl LinkKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            LinkKind::Link => "",
            LinkKind::Image => "!",
        }
    }
}

/// One matched attachment reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentReference {
    pub kind: LinkKind,
    /// Display text between the brackets
    pub label: String,
    /// Source-relative upload path, starting with `/uploads`
    pub path: String,
    /// Byte offset of the match start in the scanned body
    pub offset: usize,
    /// Byte offset just past the closing `)`
    pub end: usize,
}

impl AttachmentReference {
    /// Render the reference pointing at `url`, keeping prefix and label
    pub fn render(&self, url: &str) -> String {
        format!("{}[{}]({})", self.kind.prefix(), self.label, url)
    }

    pub fn is_image(&self) -> bool {
        self.kind == LinkKind::Image
    }
}

/// Find every attachment reference in `body`, left to right.
pub fn scan(body: &str) -> Vec<AttachmentReference> {
    pattern()
        .captures_iter(body)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let kind = match caps.get(1).map(|m| m.as_str()) {
                Some("!") => LinkKind::Image,
                _ => LinkKind::Link,
            };
            Some(AttachmentReference {
                kind,
                label: caps.get(2)?.as_str().to_string(),
                path: caps.get(3)?.as_str().to_string(),
                offset: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}
