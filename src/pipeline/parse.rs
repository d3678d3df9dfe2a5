//! Tolerant JSON extraction from free-form model output.
//!
//! ## Why is this necessary?
//!
//! Model completions are not guaranteed well-formed JSON even when the
//! prompt explicitly demands it. The failure shapes seen in practice:
//!
//! - Wrapping the object in ` ```json ... ``` ` fences despite the prompt
//! - A prose preamble ("Here is the extracted data:") before the object
//! - Truncation mid-structure after hitting the max-token limit while
//!   emitting the last line item
//!
//! This module recovers the object with a best-effort, deliberately bounded
//! repair: fence stripping, balanced-candidate scanning, and truncation
//! repair (close the open string, strip one dangling `"key": value` tail,
//! close the still-open scopes). It is not a general JSON-recovery parser
//! and does not try to be — truncation inside a nested object mid-key stays
//! unrepaired, and a parse failure after repair is terminal.

use crate::error::ExtractError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

/// Extract a single JSON object from raw model text.
///
/// # Errors
/// [`ExtractError::NoJsonFound`] when the text contains no opening brace, or
/// when the candidate (after repair) still fails to parse. The error carries
/// a truncated excerpt of the raw text for caller-side diagnosis.
pub fn extract_json(raw: &str) -> Result<Value, ExtractError> {
    let text = strip_code_fences(raw);

    let start = text
        .find('{')
        .ok_or_else(|| ExtractError::no_json("no opening brace in response", raw))?;

    let candidate = &text[start..];
    match scan_balanced(candidate) {
        Scan::Balanced { end } => {
            serde_json::from_str(&candidate[..end]).map_err(|e| {
                ExtractError::no_json(format!("candidate is not valid JSON: {e}"), raw)
            })
        }
        Scan::Truncated { open_scopes, in_string } => {
            let repaired = repair_truncation(candidate, &open_scopes, in_string);
            debug!(
                appended = repaired.len().saturating_sub(candidate.len()),
                "repaired truncated model output"
            );
            serde_json::from_str(&repaired).map_err(|e| {
                ExtractError::no_json(format!("candidate is not valid JSON after repair: {e}"), raw)
            })
        }
    }
}

// ── Step 1: fence stripping ──────────────────────────────────────────────

static RE_FENCES: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[a-zA-Z]*").expect("valid regex"));

/// Remove markdown code-fence markers anywhere in the text, bare or with
/// any language tag (`json`, `JSON`, `markdown`, ...).
fn strip_code_fences(input: &str) -> String {
    RE_FENCES.replace_all(input, "").into_owned()
}

// ── Step 2/3: balanced-candidate scan ────────────────────────────────────

enum Scan {
    /// A balanced object ends at byte offset `end` (exclusive).
    Balanced { end: usize },
    /// Text ended before nesting returned to zero.
    Truncated {
        /// Still-open scope openers (`{` / `[`), outermost first.
        open_scopes: Vec<char>,
        /// Whether the text ended inside a string literal.
        in_string: bool,
    },
}

/// Scan forward from an opening brace, tracking nesting depth.
///
/// String-aware: braces inside string literals do not count (invoice notes
/// fields contain free text, so `{"notes": "a } b"}` is realistic input).
fn scan_balanced(candidate: &str) -> Scan {
    let mut open_scopes: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in candidate.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => open_scopes.push(ch),
            '}' | ']' => {
                open_scopes.pop();
                if open_scopes.is_empty() {
                    return Scan::Balanced { end: idx + ch.len_utf8() };
                }
            }
            _ => {}
        }
    }

    Scan::Truncated { open_scopes, in_string }
}

// ── Step 4: truncation repair ────────────────────────────────────────────

/// A dangling tail that cannot be completed: a trailing comma, a comma
/// followed by a bare key, or a key whose value never arrived. Kept as a
/// single pattern on purpose — this is the documented best-effort boundary.
static RE_TRAILING_FRAGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)(?:,\s*"(?:[^"\\]|\\.)*"\s*:?\s*|"(?:[^"\\]|\\.)*"\s*:\s*|,\s*)$"#)
        .expect("valid regex")
});

/// Repair a candidate that ended before its structure closed.
///
/// 1. Close an unterminated string literal.
/// 2. Strip one trailing partial `"key": value` fragment.
/// 3. Append closers for the still-open scopes in reverse nesting order —
///    order matters: `{"lineItems":[{` needs `}]}`, and bare
///    count-appending would interleave them invalidly.
fn repair_truncation(candidate: &str, open_scopes: &[char], in_string: bool) -> String {
    let mut repaired = candidate.trim_end().to_string();
    if in_string {
        repaired.push('"');
    }

    if let Some(m) = RE_TRAILING_FRAGMENT.find(&repaired) {
        // Never strip the opening brace itself.
        if m.start() > 0 {
            repaired.truncate(m.start());
            repaired.truncate(repaired.trim_end().len());
        }
    }

    for scope in open_scopes.iter().rev() {
        repaired.push(match scope {
            '[' => ']',
            _ => '}',
        });
    }
    repaired
}

// ── Tests ────────────────────────────────────────────────────────────────
