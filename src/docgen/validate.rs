//! Completeness checks for generated documents.
//!
//! A draft is acceptable when every section header `## <n>.` for
//! `n in 1..=N` is present and the text does not end in a way that
//! suggests the model ran out of output tokens.

use std::collections::BTreeSet;

use crate::config::GenerationConfig;
use crate::models::DocumentDraft;

/// Section number of a `## <n>.` header line.
pub fn header_number(line: &str) -> Option<u32> {
    let rest = line.trim_start().strip_prefix("## ")?.trim_start();
    let digits_end = rest.find(|c: char| !c.is_ascii_digit())?;
    if digits_end == 0 || !rest[digits_end..].starts_with('.') {
        return None;
    }
    rest[..digits_end].parse().ok()
}

/// Section numbers in `1..=expected` found in `content`. Out-of-range
/// numbers are ignored.
pub fn scan_sections(content: &str, expected: u32) -> BTreeSet<u32> {
    content
        .lines()
        .filter_map(header_number)
        .filter(|n| (1..=expected).contains(n))
        .collect()
}

/// Heuristics for output cut off mid-sentence, mid-table, mid-header, or
/// inside a code fence.
pub fn looks_truncated(content: &str) -> bool {
    let Some(last) = content.lines().rev().map(str::trim).find(|l| !l.is_empty()) else {
        return false;
    };

    let fences = content
        .lines()
        .filter(|l| l.trim_start().starts_with("```"))
        .count();
    if fences % 2 == 1 {
        return true;
    }

    let horizontal_rule = last.chars().all(|c| c == '-');
    if !horizontal_rule && (last.ends_with('-') || last.ends_with('—')) {
        return true;
    }
    if last.ends_with("...") || last.ends_with('…') {
        return true;
    }
    if last.starts_with('|') && !last.ends_with('|') {
        return true;
    }
    last.starts_with('#')
}

/// Number of the positionally last section header in `content`.
fn last_section(content: &str, expected: u32) -> Option<u32> {
    content
        .lines()
        .rev()
        .filter_map(header_number)
        .find(|n| (1..=expected).contains(n))
}

#[derive(Debug, Clone)]
pub struct Validation {
    pub draft: DocumentDraft,
    pub missing: Vec<u32>,
    pub truncated: bool,
    /// Section the text ends in when it looks truncated.
    pub truncated_section: Option<u32>,
}

impl Validation {
    pub fn is_acceptable(&self) -> bool {
        self.missing.is_empty() && !self.truncated
    }

    pub fn coverage(&self) -> usize {
        self.draft.section_numbers_present.len()
    }

    /// Missing sections plus the cut-off one, ascending.
    pub fn repair_targets(&self) -> Vec<u32> {
        let mut targets = self.missing.clone();
        if let Some(n) = self.truncated_section.filter(|_| self.truncated) {
            if !targets.contains(&n) {
                targets.push(n);
                targets.sort_unstable();
            }
        }
        targets
    }

    /// `true` when every section missing here was also missing in `other`.
    pub fn no_new_gaps(&self, other: &Validation) -> bool {
        self.missing.iter().all(|n| other.missing.contains(n))
    }
}

/// `true` when in-range headers appear strictly ascending, so no section
/// is repeated or out of place.
pub fn sections_in_order(content: &str, expected: u32) -> bool {
    let numbers: Vec<u32> = content
        .lines()
        .filter_map(header_number)
        .filter(|n| (1..=expected).contains(n))
        .collect();
    numbers.windows(2).all(|w| w[0] < w[1])
}

/// Validate `content`, first reordering it when headers are repeated or
/// out of order. The returned draft never carries a duplicate section.
pub fn validate(content: &str, expected: u32) -> Validation {
    let normalized;
    let content = if sections_in_order(content, expected) {
        content
    } else {
        normalized = order_sections(content, expected);
        normalized.as_str()
    };

    let present = scan_sections(content, expected);
    let missing = (1..=expected).filter(|n| !present.contains(n)).collect();
    let truncated = looks_truncated(content);

    Validation {
        truncated_section: if truncated { last_section(content, expected) } else { None },
        truncated,
        missing,
        draft: DocumentDraft {
            content: content.to_string(),
            section_numbers_present: present,
            expected_section_count: expected,
        },
    }
}

/// Drop the text from the last header of `section` onward.
pub fn strip_section_tail(content: &str, section: u32) -> String {
    let lines: Vec<&str> = content.lines().collect();
    match lines.iter().rposition(|l| header_number(l) == Some(section)) {
        Some(pos) => lines[..pos].join("\n").trim_end().to_string(),
        None => content.to_string(),
    }
}

/// Reorder sections by number, keeping the first copy of each. Text before
/// the first header stays at the top.
pub fn order_sections(content: &str, expected: u32) -> String {
    let mut preamble: Vec<&str> = Vec::new();
    let mut sections: Vec<(u32, Vec<&str>)> = Vec::new();

    for line in content.lines() {
        match header_number(line).filter(|n| (1..=expected).contains(n)) {
            Some(n) => sections.push((n, vec![line])),
            None => match sections.last_mut() {
                Some((_, body)) => body.push(line),
                None => preamble.push(line),
            },
        }
    }

    sections.sort_by_key(|(n, _)| *n);
    sections.dedup_by_key(|(n, _)| *n);

    let mut blocks = Vec::with_capacity(sections.len() + 1);
    let head = preamble.join("\n");
    if !head.trim().is_empty() {
        blocks.push(head.trim_end().to_string());
    }
    blocks.extend(sections.iter().map(|(_, body)| body.join("\n").trim_end().to_string()));
    blocks.join("\n\n")
}

/// Output-token budget for a prompt of `prompt_chars` characters.
///
/// Input is estimated at four characters per token; the reserve is that
/// estimate plus the fixed overhead, and the result is clamped to
/// `[min_output_tokens, max_output_tokens]`.
pub fn output_budget(prompt_chars: usize, config: &GenerationConfig) -> u32 {
    let estimated_input = prompt_chars.div_ceil(4);
    let reserved = estimated_input + config.fixed_overhead;
    let budget = config
        .total_budget
        .saturating_sub(reserved)
        .clamp(config.min_output_tokens, config.max_output_tokens.max(config.min_output_tokens));
    u32::try_from(budget).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(numbers: &[u32]) -> String {
        numbers
            .iter()
            .map(|n| format!("## {}. Section {}\n\nBody of section {}.", n, n, n))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[test]
    fn test_header_number() {
        assert_eq!(header_number("## 3. Architecture"), Some(3));
        assert_eq!(header_number("  ## 12.Testing"), Some(12));
        assert_eq!(header_number("### 3. Nested"), None);
        assert_eq!(header_number("## Overview"), None);
        assert_eq!(header_number("## 3 Missing dot"), None);
    }

    #[test]
    fn test_validate_reports_missing_sections() {
        let v = validate(&doc(&[1, 2, 4, 5]), 5);
        assert_eq!(v.missing, vec![3]);
        assert!(!v.truncated);
        assert!(!v.is_acceptable());
        assert_eq!(v.coverage(), 4);
    }

    #[test]
    fn test_out_of_range_sections_ignored() {
        let v = validate(&doc(&[1, 2, 3, 9]), 3);
        assert!(v.is_acceptable());
        assert!(v.draft.is_complete());
    }

    #[test]
    fn test_truncation_heuristics() {
        assert!(looks_truncated("## 1. A\n\nThe system then..."));
        assert!(looks_truncated("## 1. A\n\nsplit across two-"));
        assert!(looks_truncated("| a | b |\n| 1 | 2"));
        assert!(looks_truncated("## 1. A\n\nText.\n\n## 2. B"));
        assert!(looks_truncated("## 1. A\n\n```rust\nfn main() {"));
        assert!(!looks_truncated("## 1. A\n\nDone.\n\n---"));
        assert!(!looks_truncated("| a | b |\n| 1 | 2 |"));
        assert!(!looks_truncated(""));
    }

    #[test]
    fn test_truncated_last_section_is_a_repair_target() {
        let content = format!("{}\n\n## 3. Section 3\n\nIt continues with...", doc(&[1, 2]));
        let v = validate(&content, 4);
        assert!(v.truncated);
        assert_eq!(v.truncated_section, Some(3));
        assert_eq!(v.repair_targets(), vec![3, 4]);
    }

    #[test]
    fn test_no_new_gaps() {
        let first = validate(&doc(&[1, 3]), 4);
        let better = validate(&doc(&[1, 2, 3]), 4);
        let shifted = validate(&doc(&[1, 2, 4]), 4);
        assert!(better.no_new_gaps(&first));
        assert!(!shifted.no_new_gaps(&first));
    }

    #[test]
    fn test_order_sections_sorts_and_dedups() {
        let content = "# Title\n\n## 2. B\n\nsecond\n\n## 1. A\n\nfirst\n\n## 2. B\n\nduplicate";
        let ordered = order_sections(content, 2);
        assert_eq!(ordered, "# Title\n\n## 1. A\n\nfirst\n\n## 2. B\n\nsecond");
    }

    #[test]
    fn test_validate_normalizes_repeated_and_shuffled_headers() {
        let content = format!("# Title\n\n{}\n\n{}", doc(&[3, 1, 2]), doc(&[2]));
        assert!(!sections_in_order(&content, 3));

        let v = validate(&content, 3);
        assert!(v.is_acceptable());
        assert!(sections_in_order(&v.draft.content, 3));
        assert_eq!(v.draft.content.matches("## 2. ").count(), 1);
        assert!(v.draft.content.starts_with("# Title\n\n## 1. Section 1"));
    }

    #[test]
    fn test_strip_section_tail() {
        let content = format!("{}\n\n## 3. Section 3\n\nhalf a sent-", doc(&[1, 2]));
        assert_eq!(strip_section_tail(&content, 3), doc(&[1, 2]));
    }

    #[test]
    fn test_output_budget_clamps() {
        let config = GenerationConfig {
            total_budget: 16_000,
            fixed_overhead: 1_000,
            min_output_tokens: 2_000,
            max_output_tokens: 8_000,
            min_draft_chars: 200,
        };
        // 4_000 chars -> 1_000 tokens; 16_000 - 2_000 = 14_000 -> capped.
        assert_eq!(output_budget(4_000, &config), 8_000);
        // 40_001 chars -> 10_001 tokens; 16_000 - 11_001 = 4_999.
        assert_eq!(output_budget(40_001, &config), 4_999);
        // Oversized prompts still get the floor.
        assert_eq!(output_budget(200_000, &config), 2_000);
    }

    #[test]
    fn test_output_budget_saturates_at_u32_max() {
        let config = GenerationConfig {
            total_budget: 16_000,
            fixed_overhead: 1_000,
            min_output_tokens: u32::MAX as usize + 10,
            max_output_tokens: u32::MAX as usize + 20,
            min_draft_chars: 200,
        };
        assert_eq!(output_budget(100, &config), u32::MAX);
    }
}
