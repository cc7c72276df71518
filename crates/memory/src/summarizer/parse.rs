//! Line-oriented parser for the four-section summary response.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Summary,
    KeyFindings,
    Entities,
    Artifacts,
}

impl Section {
    /// Match a header line, returning the section and any text after the colon.
    fn from_header(line: &str) -> Option<(Self, &str)> {
        let bare = line.trim_start_matches(['#', '*', ' ']);
        [
            ("SUMMARY:", Self::Summary),
            ("KEY_FINDINGS:", Self::KeyFindings),
            ("ENTITIES:", Self::Entities),
            ("ARTIFACTS:", Self::Artifacts),
        ]
        .into_iter()
        .find_map(|(label, section)| {
            bare.strip_prefix(label)
                .map(|rest| (section, rest.trim_start_matches('*').trim()))
        })
    }
}

/// The structured pieces of a summary response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSummary {
    pub summary: String,
    pub key_findings: Vec<String>,
    pub entities: Vec<String>,
    pub artifacts: Vec<String>,
}

/// Parse `response`. Without any recognizable summary text, the whole
/// response becomes the summary.
pub fn parse(response: &str) -> ParsedSummary {
    let mut parsed = ParsedSummary::default();
    let mut current: Option<Section> = None;

    for line in response.trim().lines() {
        let line = line.trim();

        if let Some((section, rest)) = Section::from_header(line) {
            current = Some(section);
            if section == Section::Summary && !rest.is_empty() {
                parsed.summary = rest.to_string();
            }
            continue;
        }

        match current {
            Some(Section::Summary) => {
                if parsed.summary.is_empty() {
                    parsed.summary = line.to_string();
                } else {
                    parsed.summary.push('\n');
                    parsed.summary.push_str(line);
                }
            }
            Some(list) => {
                let Some(item) = line.strip_prefix("- ").map(str::trim) else {
                    continue;
                };
                if item.is_empty() {
                    continue;
                }
                let target = match list {
                    Section::KeyFindings => &mut parsed.key_findings,
                    Section::Entities => &mut parsed.entities,
                    Section::Artifacts | Section::Summary => &mut parsed.artifacts,
                };
                target.push(item.to_string());
            }
            None => {}
        }
    }

    parsed.summary = parsed.summary.trim().to_string();
    if parsed.summary.is_empty() {
        parsed.summary = response.to_string();
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_four_sections() {
        let response = "SUMMARY:\nWe ran BLAST on the query.\nHits were strong.\n\n\
                        KEY_FINDINGS:\n- TP53 is conserved\n- two paralogs found\n\n\
                        ENTITIES:\n- TP53\n- MDM2\n\n\
                        ARTIFACTS:\n- blast_hits.csv\n";
        let parsed = parse(response);
        assert_eq!(parsed.summary, "We ran BLAST on the query.\nHits were strong.");
        assert_eq!(parsed.key_findings, vec!["TP53 is conserved", "two paralogs found"]);
        assert_eq!(parsed.entities, vec!["TP53", "MDM2"]);
        assert_eq!(parsed.artifacts, vec!["blast_hits.csv"]);
    }

    #[test]
    fn summary_on_header_line() {
        let parsed = parse("SUMMARY: one line summary\nKEY_FINDINGS:\n- a");
        assert_eq!(parsed.summary, "one line summary");
        assert_eq!(parsed.key_findings, vec!["a"]);
    }

    #[test]
    fn unstructured_response_becomes_summary() {
        let text = "The user asked about BRCA1 and we found nothing.";
        let parsed = parse(text);
        assert_eq!(parsed.summary, text);
        assert!(parsed.key_findings.is_empty());
    }

    #[test]
    fn non_bullet_lines_in_lists_are_ignored() {
        let parsed = parse("SUMMARY:\nok\nENTITIES:\nsome prose\n- BRCA2\n-\n");
        assert_eq!(parsed.entities, vec!["BRCA2"]);
    }

    #[test]
    fn markdown_decorated_headers_are_recognized() {
        let parsed = parse("**SUMMARY:**\nDone.\n## KEY_FINDINGS:\n- x");
        assert_eq!(parsed.summary, "Done.");
        assert_eq!(parsed.key_findings, vec!["x"]);
    }
}
