//! Built-in document templates.
//!
//! A template fixes the number, order, and titles of a document's
//! sections. Generated headers take the form `## <n>. <title>`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSpec {
    pub number: u32,
    pub title: &'static str,
    pub min_paragraphs: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentTemplate {
    /// Stable identifier, also the `kind` of persisted documents.
    pub name: &'static str,
    pub title: &'static str,
    pub sections: &'static [SectionSpec],
}

const fn section(number: u32, title: &'static str, min_paragraphs: u32) -> SectionSpec {
    SectionSpec {
        number,
        title,
        min_paragraphs,
    }
}

pub const README: DocumentTemplate = DocumentTemplate {
    name: "readme",
    title: "README",
    sections: &[
        section(1, "Overview", 2),
        section(2, "Key Features", 1),
        section(3, "Architecture", 3),
        section(4, "Project Structure", 2),
        section(5, "Installation", 1),
        section(6, "Configuration", 2),
        section(7, "Usage", 2),
        section(8, "Core Modules", 3),
        section(9, "Data Model", 2),
        section(10, "API Reference", 2),
        section(11, "Error Handling", 1),
        section(12, "Testing", 1),
        section(13, "Performance Considerations", 1),
        section(14, "Security Considerations", 1),
        section(15, "Deployment", 1),
        section(16, "Contributing", 1),
        section(17, "Roadmap and Limitations", 1),
    ],
};

pub const TECHNICAL: DocumentTemplate = DocumentTemplate {
    name: "technical",
    title: "Technical Design Document",
    sections: &[
        section(1, "Purpose and Scope", 2),
        section(2, "System Context", 2),
        section(3, "Architecture Overview", 3),
        section(4, "Component Design", 3),
        section(5, "Data Model", 2),
        section(6, "Control Flow", 2),
        section(7, "External Interfaces", 2),
        section(8, "Error Handling", 2),
        section(9, "Concurrency Model", 1),
        section(10, "Configuration", 1),
        section(11, "Testing Strategy", 1),
        section(12, "Open Issues", 1),
    ],
};

pub const ALL: &[DocumentTemplate] = &[README, TECHNICAL];

pub fn template_by_name(name: &str) -> Option<&'static DocumentTemplate> {
    ALL.iter().find(|t| t.name.eq_ignore_ascii_case(name.trim()))
}

impl DocumentTemplate {
    pub fn section_count(&self) -> u32 {
        self.sections.len() as u32
    }

    pub fn section(&self, number: u32) -> Option<&SectionSpec> {
        self.sections.iter().find(|s| s.number == number)
    }

    /// One line per requested section: header plus paragraph requirement.
    pub fn outline(&self, numbers: &[u32]) -> String {
        numbers
            .iter()
            .filter_map(|n| self.section(*n))
            .map(|s| {
                format!(
                    "## {}. {} (at least {} paragraph{})",
                    s.number,
                    s.title,
                    s.min_paragraphs,
                    if s.min_paragraphs == 1 { "" } else { "s" }
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn all_numbers(&self) -> Vec<u32> {
        (1..=self.section_count()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_are_contiguous() {
        for template in ALL {
            let numbers: Vec<u32> = template.sections.iter().map(|s| s.number).collect();
            assert_eq!(numbers, template.all_numbers(), "{}", template.name);
        }
        assert_eq!(README.section_count(), 17);
        assert_eq!(TECHNICAL.section_count(), 12);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(template_by_name("README").map(|t| t.name), Some("readme"));
        assert!(template_by_name("changelog").is_none());
    }

    #[test]
    fn test_outline_lists_requested_sections() {
        let outline = README.outline(&[4, 17]);
        assert_eq!(
            outline,
            "## 4. Project Structure (at least 2 paragraphs)\n## 17. Roadmap and Limitations (at least 1 paragraph)"
        );
    }
}
