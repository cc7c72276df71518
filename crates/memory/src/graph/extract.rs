//! Regex table for best-effort entity extraction.
//!
//! Over-inclusive on purpose: false positives are cleaned up by capacity
//! eviction, not by smarter matching. New rules are added as table rows.

use std::collections::HashSet;
use std::sync::LazyLock;

use mnemos_core::EntityType;
use regex_lite::Regex;

/// Words that several patterns match but never name an entity.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "are", "was", "gene", "protein", "pathway", "cell", "data",
];

const MIN_MATCH_CHARS: usize = 2;

/// (type, patterns). Each pattern has exactly one capture group.
const PATTERN_TABLE: &[(EntityType, &[&str])] = &[
    (
        EntityType::Gene,
        &[
            r"\b([A-Z][A-Z0-9]{1,10})\b",
            r"gene[:\s]+([A-Za-z0-9_-]+)",
            r"Gene ID[:\s]+(\d+)",
        ],
    ),
    (
        EntityType::Protein,
        &[
            r"\b([A-Z][A-Z0-9]{2,10}_[A-Z]+)\b",
            r"protein[:\s]+([A-Za-z0-9_-]+)",
            r"\b(P\d{5})\b",
        ],
    ),
    (
        EntityType::Variant,
        &[r"(rs\d+)", r"([A-Z]\d+[A-Z])", r"(c\.\d+[ACGT]>[ACGT])"],
    ),
    (
        EntityType::Pathway,
        &[r"(hsa\d{5})", r"(R-HSA-\d+)", r"pathway[:\s]+([A-Za-z0-9_ -]+)"],
    ),
    (EntityType::OntologyTerm, &[r"(GO:\d{7})"]),
    (
        EntityType::Structure,
        &[r"\b(\d[A-Za-z0-9]{3})\b", r"(AF-[A-Z0-9]+-F\d+)"],
    ),
    (
        EntityType::Organism,
        &[
            r"organism[:\s]+([A-Za-z]+ [a-z]+)",
            r"(Homo sapiens|Mus musculus|Escherichia coli)",
        ],
    ),
    (EntityType::Publication, &[r"PMID[:\s]*(\d+)"]),
];

static COMPILED: LazyLock<Vec<(EntityType, Vec<Regex>)>> = LazyLock::new(|| {
    PATTERN_TABLE
        .iter()
        .map(|(entity_type, patterns)| {
            let compiled = patterns
                .iter()
                .filter_map(|p| match Regex::new(p) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::warn!(pattern = %p, error = %e, "Skipping invalid extraction pattern");
                        None
                    }
                })
                .collect();
            (*entity_type, compiled)
        })
        .collect()
});

/// Every candidate `(type, name)` in `text`, first match wins per
/// case-insensitive name, in table order.
pub fn candidates(text: &str) -> Vec<(EntityType, String)> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for (entity_type, patterns) in COMPILED.iter() {
        for re in patterns {
            for caps in re.captures_iter(text) {
                let Some(m) = caps.get(1) else { continue };
                let name = m.as_str().trim();
                if name.chars().count() < MIN_MATCH_CHARS {
                    continue;
                }
                let key = name.to_lowercase();
                if STOP_WORDS.contains(&key.as_str()) || !seen.insert(key) {
                    continue;
                }
                out.push((*entity_type, name.to_string()));
            }
        }
    }

    out
}
