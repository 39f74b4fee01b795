//! EXIF text sanitization.
//!
//! EXIF strings are attacker-controlled: anything written into a JPEG
//! header ends up in our logs and in the JSON returned to clients.
//! Detects and neutralizes:
//! - Script/markup injection
//! - SQL injection
//! - Command injection
//! - Path traversal
//! - Control characters and oversized values

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::logging::structured::LogContext;

/// Longest EXIF text value we keep.
pub const MAX_EXIF_TEXT_LEN: usize = 128;

/// Tags that carry free-form vendor or user payloads. Never surfaced.
pub const RISKY_EXIF_TAGS: &[&str] = &["MakerNote", "UserComment", "ImageDescription"];

lazy_static! {
    static ref SCRIPT_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)<script[^>]*>").unwrap(),
        Regex::new(r"(?i)javascript:").unwrap(),
        Regex::new(r"(?i)on\w+\s*=").unwrap(),
        Regex::new(r"(?i)<(iframe|object|embed)[^>]*>").unwrap(),
    ];

    static ref SQL_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)'\s*(or|and)\s*'?\d").unwrap(),
        Regex::new(r"(?i);\s*(drop|delete|truncate|alter)\s").unwrap(),
        Regex::new(r"(?i)union\s+(all\s+)?select").unwrap(),
    ];

    static ref CMD_PATTERNS: Vec<Regex> = vec![
        Regex::new(r";\s*(rm|cat|wget|curl|chmod)\s").unwrap(),
        Regex::new(r"\|\s*(bash|sh|zsh|cmd)").unwrap(),
        Regex::new(r"`[^`]+`").unwrap(),
        Regex::new(r"\$\([^)]+\)").unwrap(),
    ];

    static ref PATH_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"\.\.[\\/]").unwrap(),
        Regex::new(r"[\\/]etc[\\/](passwd|shadow)").unwrap(),
    ];

    static ref CONTROL_CHARS: Regex = Regex::new(r"[\x00-\x1F\x7F]").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatKind {
    Script,
    Sql,
    Command,
    PathTraversal,
}

/// Outcome of scanning one EXIF text value.
#[derive(Debug, Default, Clone)]
pub struct TextScan {
    pub threats: Vec<ThreatKind>,
    pub control_chars: usize,
    pub truncated: bool,
}

impl TextScan {
    pub fn has_threats(&self) -> bool {
        !self.threats.is_empty()
    }
}

/// Scan a raw EXIF string without modifying it.
pub fn scan_exif_text(raw: &str) -> TextScan {
    let groups: [(ThreatKind, &Vec<Regex>); 4] = [
        (ThreatKind::Script, &*SCRIPT_PATTERNS),
        (ThreatKind::Sql, &*SQL_PATTERNS),
        (ThreatKind::Command, &*CMD_PATTERNS),
        (ThreatKind::PathTraversal, &*PATH_PATTERNS),
    ];

    let mut scan = TextScan {
        control_chars: CONTROL_CHARS.find_iter(raw).count(),
        truncated: raw.chars().count() > MAX_EXIF_TEXT_LEN,
        ..TextScan::default()
    };

    for (kind, patterns) in groups {
        if patterns.iter().any(|p| p.is_match(raw)) {
            scan.threats.push(kind);
        }
    }

    scan
}

/// Clean an EXIF string for display.
///
/// Returns `None` when the value carries an injection payload or is empty
/// after control characters are stripped. Survivors are trimmed and capped
/// at `MAX_EXIF_TEXT_LEN` characters.
pub fn sanitize_exif_text(tag: &str, raw: &str, ctx: &LogContext) -> Option<String> {
    let scan = scan_exif_text(raw);

    if scan.has_threats() {
        log::warn!(
            "{} EXIF_TEXT_REJECTED tag={} threats={:?}",
            ctx,
            tag,
            scan.threats
        );
        return None;
    }

    let cleaned = CONTROL_CHARS.replace_all(raw, "");
    let cleaned = cleaned.trim();

    if scan.control_chars > 0 || scan.truncated {
        log::debug!(
            "{} EXIF_TEXT_CLEANED tag={} control_chars={} truncated={}",
            ctx,
            tag,
            scan.control_chars,
            scan.truncated
        );
    }

    if cleaned.is_empty() {
        return None;
    }

    Some(cleaned.chars().take(MAX_EXIF_TEXT_LEN).collect())
}

pub fn is_risky_tag(tag_name: &str) -> bool {
    RISKY_EXIF_TAGS.contains(&tag_name)
}
