//! Entity graph records: typed nodes and directed, typed edges.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Metadata;

/// Kinds of domain entities tracked in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Gene,
    Protein,
    Variant,
    Pathway,
    Sample,
    Organism,
    Disease,
    Drug,
    Publication,
    Structure,
    Domain,
    #[serde(alias = "go_term")]
    OntologyTerm,
    Other,
}

impl EntityType {
    pub const ALL: [EntityType; 13] = [
        Self::Gene,
        Self::Protein,
        Self::Variant,
        Self::Pathway,
        Self::Sample,
        Self::Organism,
        Self::Disease,
        Self::Drug,
        Self::Publication,
        Self::Structure,
        Self::Domain,
        Self::OntologyTerm,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gene => "gene",
            Self::Protein => "protein",
            Self::Variant => "variant",
            Self::Pathway => "pathway",
            Self::Sample => "sample",
            Self::Organism => "organism",
            Self::Disease => "disease",
            Self::Drug => "drug",
            Self::Publication => "publication",
            Self::Structure => "structure",
            Self::Domain => "domain",
            Self::OntologyTerm => "ontology_term",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lenient: unknown labels become [`EntityType::Other`].
impl FromStr for EntityType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        if normalized == "go_term" {
            return Ok(Self::OntologyTerm);
        }
        Ok(Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .unwrap_or(Self::Other))
    }
}

/// Directed semantic labels for relationships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    InteractsWith,
    Regulates,
    RegulatedBy,
    MemberOf,
    Contains,
    AssociatedWith,
    Encodes,
    EncodedBy,
    VariantOf,
    HasVariant,
    OrthologOf,
    ParalogOf,
    LocatedIn,
    ParticipatesIn,
    HasFunction,
    Causes,
    Treats,
    CitedIn,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 18] = [
        Self::InteractsWith,
        Self::Regulates,
        Self::RegulatedBy,
        Self::MemberOf,
        Self::Contains,
        Self::AssociatedWith,
        Self::Encodes,
        Self::EncodedBy,
        Self::VariantOf,
        Self::HasVariant,
        Self::OrthologOf,
        Self::ParalogOf,
        Self::LocatedIn,
        Self::ParticipatesIn,
        Self::HasFunction,
        Self::Causes,
        Self::Treats,
        Self::CitedIn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InteractsWith => "interacts_with",
            Self::Regulates => "regulates",
            Self::RegulatedBy => "regulated_by",
            Self::MemberOf => "member_of",
            Self::Contains => "contains",
            Self::AssociatedWith => "associated_with",
            Self::Encodes => "encodes",
            Self::EncodedBy => "encoded_by",
            Self::VariantOf => "variant_of",
            Self::HasVariant => "has_variant",
            Self::OrthologOf => "ortholog_of",
            Self::ParalogOf => "paralog_of",
            Self::LocatedIn => "located_in",
            Self::ParticipatesIn => "participates_in",
            Self::HasFunction => "has_function",
            Self::Causes => "causes",
            Self::Treats => "treats",
            Self::CitedIn => "cited_in",
        }
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lenient: unknown labels become [`RelationshipType::AssociatedWith`].
impl FromStr for RelationshipType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Ok(Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .unwrap_or(Self::AssociatedWith))
    }
}

/// A node in the entity graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Tool or database that first identified this entity
    pub source: String,
    #[serde(default)]
    pub properties: Metadata,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    #[serde(default)]
    pub access_count: u64,
}

impl Entity {
    /// Create a fresh entity with a generated id of the form
    /// `{type}_{sanitized name}_{random suffix}`.
    pub fn new(name: impl Into<String>, entity_type: EntityType, source: impl Into<String>) -> Self {
        let name = name.into();
        let now = Utc::now();
        let suffix = Uuid::new_v4().simple().to_string();
        let id = format!(
            "{}_{}_{}",
            entity_type.as_str(),
            sanitize_name(&name, 20),
            &suffix[..8]
        );
        Self {
            id,
            name,
            entity_type,
            source: source.into(),
            properties: Metadata::new(),
            aliases: Vec::new(),
            created_at: now,
            last_accessed: now,
            access_count: 0,
        }
    }

    /// Record one lookup.
    pub fn touch(&mut self) {
        self.last_accessed = Utc::now();
        self.access_count += 1;
    }

    /// The canonical name followed by every alias.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// A directed edge between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    /// Tool that discovered this relationship
    pub source_attribution: String,
    pub confidence: f64,
    #[serde(default)]
    pub properties: Metadata,
    #[serde(default)]
    pub evidence: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relationship_type: RelationshipType,
        source_attribution: impl Into<String>,
        confidence: f64,
    ) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("rel_{}", &suffix[..12]),
            source_id: source_id.into(),
            target_id: target_id.into(),
            relationship_type,
            source_attribution: source_attribution.into(),
            confidence: confidence.clamp(0.0, 1.0),
            properties: Metadata::new(),
            evidence: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Whether this edge touches `entity_id` at either end.
    pub fn touches(&self, entity_id: &str) -> bool {
        self.source_id == entity_id || self.target_id == entity_id
    }
}

/// Lowercase, keep `[a-z0-9_-]`, map everything else to `_`, cap at `max` chars.
pub fn sanitize_name(name: &str, max: usize) -> String {
    name.chars()
        .take(max)
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
