/**
 * Hand-off Tail Parsing
 *
 * DESIGN DECISION: Scan the tail of a stage's settled output for a labelled block (a header
 * line followed by `- **Label**: value` pairs) and extract the seven named fields by regex
 * WHY: after a stage's output settles, the assembler scans the tail for a labelled block; a
 * missing header returns null, signalling the engine to synthesise a minimal hand-off
 *
 * REASONING CHAIN:
 * 1. Models are not guaranteed to emit the block at all; absence must be a clean `None`, not
 *    an error, matching the assembler's habit of falling back to a safe default
 * 2. Each recognised label maps to exactly one of the seven Handoff fields; unrecognised
 *    labels are ignored rather than rejected, since a model may add extra bullet commentary
 * 3. `status`/`status_note` are derived from an optional `Status` label; its absence defaults
 *    to `completed` (the engine still records `needs_intervention` explicitly on rejection,
 *    not via this parser)
 *
 * PATTERN: regex-capture line scanner, grounded on verification/claim_parser.rs's
 * `- **Label**: value` bullet extraction style
 */

use regex::Regex;

use crate::model::handoff::HandoffStatus;

/// Labelled fields extracted from a stage's tail output. `None` from `parse_tail` means no
/// recognisable header was found at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialHandoff {
    pub summary: String,
    pub key_decisions: String,
    pub open_questions: String,
    pub files_modified: String,
    pub next_stage_needs: String,
    pub warnings: String,
    pub status_note: Option<String>,
    pub status: Option<HandoffStatus>,
}

const HEADER_PATTERN: &str = r"(?mi)^#{0,3}\s*hand-?off\s*:?\s*$";

fn label_pattern(label: &str) -> Regex {
    Regex::new(&format!(r"(?mi)^-\s*\*\*{}\*\*:\s*(.*)$", regex::escape(label))).unwrap()
}

fn extract(text: &str, label: &str) -> String {
    label_pattern(label)
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

fn extract_optional(text: &str, label: &str) -> Option<String> {
    let value = extract(text, label);
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Parse the tail of `raw_output` for a labelled hand-off block. Returns `None` if no header
/// line is found anywhere in the text.
pub fn parse_tail(raw_output: &str) -> Option<PartialHandoff> {
    let header_re = Regex::new(HEADER_PATTERN).unwrap();
    header_re.find(raw_output)?;

    let status = extract_optional(raw_output, "Status").and_then(|s| match s.to_lowercase().as_str() {
        "completed" => Some(HandoffStatus::Completed),
        "blocked" => Some(HandoffStatus::Blocked),
        "needs_intervention" | "needs-intervention" => Some(HandoffStatus::NeedsIntervention),
        _ => None,
    });

    Some(PartialHandoff {
        summary: extract(raw_output, "Summary"),
        key_decisions: extract(raw_output, "Key Decisions"),
        open_questions: extract(raw_output, "Open Questions"),
        files_modified: extract(raw_output, "Files Modified"),
        next_stage_needs: extract(raw_output, "Next Stage Needs"),
        warnings: extract(raw_output, "Warnings"),
        status_note: extract_optional(raw_output, "Status Note"),
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_full_block() {
        let text = "Some rambling assistant prose.\n\n\
Hand-off:\n\
- **Summary**: implemented the login flow\n\
- **Key Decisions**: used bcrypt for hashing\n\
- **Open Questions**: none\n\
- **Files Modified**: src/auth.rs\n\
- **Next Stage Needs**: a reviewer should check rate limiting\n\
- **Warnings**: none\n\
- **Status**: completed\n";

        let parsed = parse_tail(text).unwrap();
        assert_eq!(parsed.summary, "implemented the login flow");
        assert_eq!(parsed.files_modified, "src/auth.rs");
        assert_eq!(parsed.status, Some(HandoffStatus::Completed));
    }

    #[test]
    fn test_missing_header_returns_none() {
        let text = "Just some assistant text with no labelled block at all.";
        assert!(parse_tail(text).is_none());
    }

    #[test]
    fn test_missing_fields_default_to_empty_string() {
        let text = "Hand-off:\n- **Summary**: done\n";
        let parsed = parse_tail(text).unwrap();
        assert_eq!(parsed.summary, "done");
        assert_eq!(parsed.key_decisions, "");
        assert!(parsed.status_note.is_none());
    }
}
