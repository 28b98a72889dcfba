//! Structural segmentation of decision texts.
//!
//! Decisions follow a loose convention of short heading lines ("FACTS",
//! "II. REASONING", "ORDER:") separating caption, facts, legal reasoning and
//! the operative part. Segmentation is heuristic: text before the first
//! recognised heading is the header, unknown all-caps headings open an
//! `Other` section.

use crate::models::{Section, SectionKind};

const MAX_HEADING_CHARS: usize = 80;
const MAX_MARKER_WORDS: usize = 4;

const FACTS_MARKERS: &[&str] = &["FACTS", "BACKGROUND", "PROCEDURAL HISTORY"];
const REASONING_MARKERS: &[&str] = &[
    "REASONING",
    "REASONS",
    "FINDINGS",
    "ANALYSIS",
    "DISCUSSION",
    "GROUNDS",
    "CONSIDERATIONS",
];
const DECISION_MARKERS: &[&str] = &[
    "DECISION",
    "ORDER",
    "HOLDING",
    "CONCLUSION",
    "RULING",
    "JUDGMENT",
    "DISPOSITION",
];

/// Splits paragraphs into labelled sections.
///
/// Empty paragraphs are ignored; a heading with no body still yields a
/// section so the document structure is preserved.
pub fn extract_sections(paragraphs: &[String]) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut kind = SectionKind::Header;
    let mut heading: Option<String> = None;
    let mut body: Vec<&str> = Vec::new();

    for paragraph in paragraphs {
        let line = paragraph.trim();
        if line.is_empty() {
            continue;
        }

        match classify_heading(line) {
            Some(next_kind) => {
                if heading.is_some() || !body.is_empty() {
                    sections.push(Section {
                        kind,
                        heading: heading.take(),
                        position: sections.len(),
                        text: body.join("\n\n"),
                    });
                }
                kind = next_kind;
                heading = Some(line.to_string());
                body.clear();
            }
            None => body.push(line),
        }
    }

    if heading.is_some() || !body.is_empty() {
        sections.push(Section {
            kind,
            heading,
            position: sections.len(),
            text: body.join("\n\n"),
        });
    }

    sections
}

/// Returns the kind a heading line opens, or `None` for body text.
pub fn classify_heading(line: &str) -> Option<SectionKind> {
    let line = line.trim();
    if line.is_empty() || line.chars().count() > MAX_HEADING_CHARS {
        return None;
    }

    let normalized = strip_enumeration(line)
        .trim_end_matches([':', '.', ' '])
        .to_uppercase();
    if normalized.is_empty() {
        return None;
    }

    let is_all_caps = line.chars().any(char::is_alphabetic)
        && !line.chars().any(char::is_lowercase);
    let word_count = normalized.split_whitespace().count();

    let marker_kind = if contains_marker(&normalized, FACTS_MARKERS) {
        Some(SectionKind::Facts)
    } else if contains_marker(&normalized, REASONING_MARKERS) {
        Some(SectionKind::Reasoning)
    } else if contains_marker(&normalized, DECISION_MARKERS) {
        Some(SectionKind::Decision)
    } else {
        None
    };

    match marker_kind {
        Some(kind) if is_all_caps || word_count <= MAX_MARKER_WORDS => Some(kind),
        None if is_all_caps && word_count <= MAX_MARKER_WORDS * 2 => Some(SectionKind::Other),
        _ => None,
    }
}

fn contains_marker(normalized: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| {
        normalized == *marker
            || normalized.starts_with(&format!("{} ", marker))
            || normalized.ends_with(&format!(" {}", marker))
            || normalized.contains(&format!(" {} ", marker))
    })
}

/// Drops a leading "II.", "3)", "A." style enumerator.
fn strip_enumeration(line: &str) -> &str {
    let Some((first, rest)) = line.split_once(char::is_whitespace) else {
        return line;
    };
    let token = first.trim_end_matches(['.', ')']);
    let is_enumerator = first.len() > token.len()
        && !token.is_empty()
        && (token.chars().all(|c| c.is_ascii_digit())
            || token.chars().all(|c| "IVXLC".contains(c))
            || (token.len() == 1 && token.chars().all(|c| c.is_ascii_uppercase())));
    if is_enumerator { rest.trim_start() } else { line }
}

/// Splits `text` into chunks of at most `max_chars` characters.
///
/// Paragraph boundaries (`\n\n`) are preferred; a paragraph longer than the
/// limit is cut at the last whitespace that fits, or hard-cut when none does.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let len = paragraph.chars().count();

        if len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            chunks.extend(split_long(paragraph, max_chars));
            continue;
        }

        let separator = if current.is_empty() { 0 } else { 2 };
        if current_len + separator + len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push_str("\n\n");
            current_len += 2;
        }
        current.push_str(paragraph);
        current_len += len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn split_long(paragraph: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = paragraph.chars().collect();
    let mut pieces = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let hard_end = (start + max_chars).min(chars.len());
        let end = if hard_end == chars.len() {
            hard_end
        } else {
            chars[start..hard_end]
                .iter()
                .rposition(|c| c.is_whitespace())
                .filter(|&pos| pos > 0)
                .map_or(hard_end, |pos| start + pos)
        };

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        start = end;
        while start < chars.len() && chars[start].is_whitespace() {
            start += 1;
        }
    }
    pieces
}
