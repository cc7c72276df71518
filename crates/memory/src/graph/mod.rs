//! Entity graph: typed entities and directed relationships persisted as JSON.
//!
//! Names and aliases resolve case-insensitively through a single index, so
//! each lowercase name maps to exactly one live entity. Repeated mentions
//! merge into the existing entity instead of duplicating it.
//!
//! Capacity is bounded: at the entity ceiling the least-used fraction is
//! evicted together with every relationship that touches it; at the
//! relationship ceiling the lowest-confidence fraction goes.

pub mod extract;
mod format;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use mnemos_core::error::GraphError;
use mnemos_core::{Entity, EntityType, Metadata, Relationship, RelationshipType};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::persist;

/// Capacity settings.
#[derive(Debug, Clone, Copy)]
pub struct GraphOptions {
    pub max_entities: usize,
    pub max_relationships: usize,
    /// Share of entries removed when a ceiling is reached.
    pub eviction_fraction: f64,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            max_entities: 10_000,
            max_relationships: 50_000,
            eviction_fraction: 0.1,
        }
    }
}

/// Which edges `get_neighbors` follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    Outgoing,
    Incoming,
    #[default]
    Both,
}

/// Lenient: anything unrecognized means both directions.
impl FromStr for Direction {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "outgoing" | "out" => Self::Outgoing,
            "incoming" | "in" => Self::Incoming,
            _ => Self::Both,
        })
    }
}

/// A relationship to record. Endpoints are entity names, not ids.
#[derive(Debug, Clone)]
pub struct NewRelationship {
    pub source_name: String,
    pub target_name: String,
    pub relationship_type: RelationshipType,
    pub source_attribution: String,
    pub confidence: f64,
    pub properties: Metadata,
    pub evidence: Vec<String>,
}

impl NewRelationship {
    pub fn new(
        source_name: impl Into<String>,
        target_name: impl Into<String>,
        relationship_type: RelationshipType,
        source_attribution: impl Into<String>,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            target_name: target_name.into(),
            relationship_type,
            source_attribution: source_attribution.into(),
            confidence: 1.0,
            properties: Metadata::new(),
            evidence: Vec::new(),
        }
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn properties(mut self, properties: Metadata) -> Self {
        self.properties = properties;
        self
    }

    pub fn evidence(mut self, evidence: Vec<String>) -> Self {
        self.evidence = evidence;
        self
    }
}

/// Result of a neighborhood lookup.
#[derive(Debug, Clone, Default)]
pub struct Neighbors {
    pub entity: Option<Entity>,
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    pub total_entities: usize,
    pub total_relationships: usize,
    pub entities_by_type: BTreeMap<String, usize>,
    pub relationships_by_type: BTreeMap<String, usize>,
    pub file: PathBuf,
}

/// On-disk shape: both maps keyed by id.
#[derive(Debug, Default, Serialize, Deserialize)]
struct GraphFile {
    #[serde(default)]
    entities: HashMap<String, Entity>,
    #[serde(default)]
    relationships: HashMap<String, Relationship>,
}

#[derive(Debug, Default)]
pub(crate) struct GraphState {
    entities: HashMap<String, Entity>,
    relationships: HashMap<String, Relationship>,
    /// Lowercase name or alias -> entity id.
    name_index: HashMap<String, String>,
}

impl GraphState {
    fn from_file(file: GraphFile) -> Self {
        let mut state = Self {
            entities: file.entities,
            relationships: file.relationships,
            name_index: HashMap::new(),
        };
        // Drop edges whose endpoints did not survive.
        let GraphState {
            entities,
            relationships,
            ..
        } = &mut state;
        relationships.retain(|_, r| entities.contains_key(&r.source_id) && entities.contains_key(&r.target_id));
        state.rebuild_index();
        state
    }

    fn to_file(&self) -> GraphFile {
        GraphFile {
            entities: self.entities.clone(),
            relationships: self.relationships.clone(),
        }
    }

    fn rebuild_index(&mut self) {
        self.name_index.clear();
        for (id, entity) in &self.entities {
            for name in entity.names() {
                self.name_index
                    .entry(name.to_lowercase())
                    .or_insert_with(|| id.clone());
            }
        }
    }

    pub(crate) fn resolve(&self, name: &str) -> Option<&Entity> {
        self.name_index
            .get(&name.to_lowercase())
            .and_then(|id| self.entities.get(id))
    }

    fn resolve_id(&self, name: &str) -> Option<String> {
        self.resolve(name).map(|e| e.id.clone())
    }

    pub(crate) fn entity_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.entities.get(id).map(|e| e.name.as_str()).unwrap_or(id)
    }

    /// Insert or merge an entity. `protected` ids are never evicted to make room.
    #[allow(clippy::too_many_arguments)]
    fn upsert(
        &mut self,
        name: &str,
        entity_type: EntityType,
        source: &str,
        properties: Metadata,
        aliases: &[String],
        protected: &HashSet<String>,
        options: &GraphOptions,
    ) -> Result<Entity, GraphError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GraphError::EmptyName);
        }

        let existing_id = self
            .resolve_id(name)
            .or_else(|| aliases.iter().find_map(|a| self.resolve_id(a)));

        if let Some(id) = existing_id {
            let mut new_names = Vec::new();
            let entity = self
                .entities
                .get_mut(&id)
                .ok_or_else(|| GraphError::Storage(format!("index points at missing entity {id}")))?;

            entity.properties.extend(properties);
            if entity.entity_type == EntityType::Other && entity_type != EntityType::Other {
                debug!(entity = %entity.name, to = %entity_type, "Upgrading entity type");
                entity.entity_type = entity_type;
            }
            for candidate in std::iter::once(name).chain(aliases.iter().map(String::as_str)) {
                let candidate = candidate.trim();
                if candidate.is_empty() || entity.names().any(|n| same_name(n, candidate)) {
                    continue;
                }
                match self.name_index.get(&candidate.to_lowercase()) {
                    Some(owner) if owner != &id => continue,
                    _ => {
                        entity.aliases.push(candidate.to_string());
                        new_names.push(candidate.to_lowercase());
                    }
                }
            }
            entity.touch();
            let updated = entity.clone();
            for n in new_names {
                self.name_index.insert(n, id.clone());
            }
            return Ok(updated);
        }

        if self.entities.len() >= options.max_entities {
            self.evict_entities(protected, options);
        }

        let mut entity = Entity::new(name, entity_type, source);
        entity.properties = properties;
        for alias in aliases {
            let alias = alias.trim();
            if alias.is_empty()
                || same_name(alias, name)
                || self.name_index.contains_key(&alias.to_lowercase())
                || entity.aliases.iter().any(|a| same_name(a, alias))
            {
                continue;
            }
            entity.aliases.push(alias.to_string());
        }

        for n in entity.names() {
            self.name_index.insert(n.to_lowercase(), entity.id.clone());
        }
        self.entities.insert(entity.id.clone(), entity.clone());
        Ok(entity)
    }

    /// Remove the least-used fraction of entities and their relationships.
    fn evict_entities(&mut self, protected: &HashSet<String>, options: &GraphOptions) {
        let to_remove = eviction_count(self.entities.len(), options.eviction_fraction);

        let mut ranked: Vec<&Entity> = self
            .entities
            .values()
            .filter(|e| !protected.contains(&e.id))
            .collect();
        ranked.sort_by(|a, b| {
            a.access_count
                .cmp(&b.access_count)
                .then(a.last_accessed.cmp(&b.last_accessed))
        });
        let victims: HashSet<String> = ranked.into_iter().take(to_remove).map(|e| e.id.clone()).collect();

        for id in &victims {
            self.entities.remove(id);
        }
        let before = self.relationships.len();
        self.relationships
            .retain(|_, r| !victims.contains(&r.source_id) && !victims.contains(&r.target_id));
        self.name_index.retain(|_, id| !victims.contains(id));

        info!(
            entities = victims.len(),
            relationships = before - self.relationships.len(),
            "Evicted least-used entities"
        );
    }

    /// Remove the lowest-confidence fraction of relationships.
    fn evict_relationships(&mut self, options: &GraphOptions) {
        let to_remove = eviction_count(self.relationships.len(), options.eviction_fraction);

        let mut ranked: Vec<(&String, f64)> = self
            .relationships
            .iter()
            .map(|(id, r)| (id, r.confidence))
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        let victims: Vec<String> = ranked.into_iter().take(to_remove).map(|(id, _)| id.clone()).collect();

        for id in &victims {
            self.relationships.remove(id);
        }
        info!(relationships = victims.len(), "Evicted lowest-confidence relationships");
    }

    fn add_relationship(
        &mut self,
        new: NewRelationship,
        options: &GraphOptions,
    ) -> Result<Relationship, GraphError> {
        let mut protected = HashSet::new();
        let source_id = match self.resolve_id(&new.source_name) {
            Some(id) => id,
            None => {
                self.upsert(
                    &new.source_name,
                    EntityType::Other,
                    &new.source_attribution,
                    Metadata::new(),
                    &[],
                    &protected,
                    options,
                )?
                .id
            }
        };
        protected.insert(source_id.clone());
        let target_id = match self.resolve_id(&new.target_name) {
            Some(id) => id,
            None => {
                self.upsert(
                    &new.target_name,
                    EntityType::Other,
                    &new.source_attribution,
                    Metadata::new(),
                    &[],
                    &protected,
                    options,
                )?
                .id
            }
        };

        if let Some(existing) = self.relationships.values_mut().find(|r| {
            r.source_id == source_id && r.target_id == target_id && r.relationship_type == new.relationship_type
        }) {
            existing.confidence = existing.confidence.max(new.confidence.clamp(0.0, 1.0));
            existing.properties.extend(new.properties);
            existing.evidence.extend(new.evidence);
            return Ok(existing.clone());
        }

        if self.relationships.len() >= options.max_relationships {
            self.evict_relationships(options);
        }

        let mut relationship = Relationship::new(
            source_id,
            target_id,
            new.relationship_type,
            new.source_attribution,
            new.confidence,
        );
        relationship.properties = new.properties;
        relationship.evidence = new.evidence;
        self.relationships.insert(relationship.id.clone(), relationship.clone());
        Ok(relationship)
    }

    /// Relationships touching `id` in the given direction, optionally by type.
    pub(crate) fn edges_of(
        &self,
        id: &str,
        relationship_type: Option<RelationshipType>,
        direction: Direction,
    ) -> Vec<&Relationship> {
        let mut edges: Vec<&Relationship> = self
            .relationships
            .values()
            .filter(|r| relationship_type.is_none_or(|t| r.relationship_type == t))
            .filter(|r| match direction {
                Direction::Outgoing => r.source_id == id,
                Direction::Incoming => r.target_id == id,
                Direction::Both => r.touches(id),
            })
            .collect();
        edges.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(a.created_at.cmp(&b.created_at))
        });
        edges
    }

    /// Entities ranked by access count, most used first.
    pub(crate) fn most_accessed(&self) -> Vec<&Entity> {
        let mut all: Vec<&Entity> = self.entities.values().collect();
        all.sort_by(|a, b| {
            b.access_count
                .cmp(&a.access_count)
                .then(b.last_accessed.cmp(&a.last_accessed))
                .then(a.name.cmp(&b.name))
        });
        all
    }
}

/// Case-insensitive name comparison, keyed the same way as the name index.
fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

fn eviction_count(len: usize, fraction: f64) -> usize {
    ((len as f64 * fraction).floor() as usize).max(1).min(len)
}

/// The entity graph store.
pub struct EntityGraph {
    file: PathBuf,
    options: GraphOptions,
    state: RwLock<GraphState>,
}

impl EntityGraph {
    /// Load the graph at `file`. A missing or corrupt file yields an empty graph.
    pub fn open(file: impl Into<PathBuf>, options: GraphOptions) -> Self {
        let file = file.into();
        let loaded: GraphFile = persist::load_json_or_default(&file, "entity graph");
        let state = GraphState::from_file(loaded);
        info!(
            path = %file.display(),
            entities = state.entities.len(),
            relationships = state.relationships.len(),
            "Entity graph loaded"
        );
        Self {
            file,
            options,
            state: RwLock::new(state),
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    fn save(&self, state: &GraphState) -> Result<(), GraphError> {
        persist::write_json_atomic(&self.file, &state.to_file())
            .map_err(|e| GraphError::Storage(format!("Cannot write {}: {e}", self.file.display())))
    }

    /// Add an entity, or merge into the one already known by this name or alias.
    pub async fn add_entity(
        &self,
        name: &str,
        entity_type: EntityType,
        source: &str,
        properties: Metadata,
        aliases: &[String],
    ) -> Result<Entity, GraphError> {
        let mut state = self.state.write().await;
        let entity = state.upsert(
            name,
            entity_type,
            source,
            properties,
            aliases,
            &HashSet::new(),
            &self.options,
        )?;
        self.save(&state)?;
        Ok(entity)
    }

    /// Record a relationship, creating missing endpoints as `other` entities.
    pub async fn add_relationship(&self, new: NewRelationship) -> Result<Relationship, GraphError> {
        let mut state = self.state.write().await;
        let relationship = state.add_relationship(new, &self.options)?;
        self.save(&state)?;
        Ok(relationship)
    }

    /// Case-insensitive substring search over names and aliases, most used first.
    pub async fn find_entities(
        &self,
        query: Option<&str>,
        entity_type: Option<EntityType>,
        limit: usize,
    ) -> Vec<Entity> {
        let needle = query.map(str::to_lowercase).filter(|q| !q.is_empty());
        let state = self.state.read().await;
        state
            .most_accessed()
            .into_iter()
            .filter(|e| entity_type.is_none_or(|t| e.entity_type == t))
            .filter(|e| {
                needle
                    .as_deref()
                    .is_none_or(|q| e.names().any(|n| n.to_lowercase().contains(q)))
            })
            .take(limit)
            .cloned()
            .collect()
    }

    /// Exact lookup by name or alias. Records the access.
    pub async fn get_entity(&self, name: &str) -> Result<Option<Entity>, GraphError> {
        let mut state = self.state.write().await;
        let Some(id) = state.resolve_id(name) else {
            return Ok(None);
        };
        let entity = match state.entities.get_mut(&id) {
            Some(entity) => {
                entity.touch();
                entity.clone()
            }
            None => return Ok(None),
        };
        self.save(&state)?;
        Ok(Some(entity))
    }

    /// Entities one hop from `name`. `None` if the name is unknown.
    pub async fn get_neighbors(
        &self,
        name: &str,
        relationship_type: Option<RelationshipType>,
        direction: Direction,
        limit: usize,
    ) -> Option<Neighbors> {
        let state = self.state.read().await;
        let center = state.resolve(name)?;
        let edges = state.edges_of(&center.id, relationship_type, direction);

        let mut seen = HashSet::new();
        let entities = edges
            .iter()
            .map(|r| {
                if r.source_id == center.id {
                    r.target_id.as_str()
                } else {
                    r.source_id.as_str()
                }
            })
            .filter(|id| seen.insert(*id))
            .filter_map(|id| state.entities.get(id))
            .take(limit)
            .cloned()
            .collect();

        Some(Neighbors {
            entity: Some(center.clone()),
            entities,
            relationships: edges.into_iter().take(limit).cloned().collect(),
        })
    }

    /// Upsert every pattern match in `text`, attributed to `source`.
    pub async fn extract_entities_from_text(&self, text: &str, source: &str) -> Result<Vec<Entity>, GraphError> {
        let found = extract::candidates(text);
        if found.is_empty() {
            return Ok(Vec::new());
        }

        let mut state = self.state.write().await;
        let mut extracted = Vec::with_capacity(found.len());
        for (entity_type, name) in found {
            extracted.push(state.upsert(
                &name,
                entity_type,
                source,
                Metadata::new(),
                &[],
                &HashSet::new(),
                &self.options,
            )?);
        }
        self.save(&state)?;
        debug!(source, count = extracted.len(), "Extracted entities");
        Ok(extracted)
    }

    /// Render known entities within `max_tokens`.
    ///
    /// With `names`, describes those entities and their strongest
    /// relationships; otherwise, or if none of the names are known, lists
    /// the most used entities.
    pub async fn format_for_context(&self, names: Option<&[String]>, max_tokens: usize) -> String {
        let state = self.state.read().await;
        format::render(&state, names.unwrap_or_default(), max_tokens)
    }

    pub async fn stats(&self) -> GraphStats {
        let state = self.state.read().await;
        let mut entities_by_type = BTreeMap::new();
        for e in state.entities.values() {
            *entities_by_type.entry(e.entity_type.as_str().to_string()).or_insert(0) += 1;
        }
        let mut relationships_by_type = BTreeMap::new();
        for r in state.relationships.values() {
            *relationships_by_type
                .entry(r.relationship_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        GraphStats {
            total_entities: state.entities.len(),
            total_relationships: state.relationships.len(),
            entities_by_type,
            relationships_by_type,
            file: self.file.clone(),
        }
    }

    pub async fn entity_count(&self) -> usize {
        self.state.read().await.entities.len()
    }

    pub async fn relationship_count(&self) -> usize {
        self.state.read().await.relationships.len()
    }

    /// Remove everything.
    pub async fn clear(&self) -> Result<(), GraphError> {
        let mut state = self.state.write().await;
        *state = GraphState::default();
        self.save(&state)?;
        info!("Entity graph cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(pairs: &[(&str, serde_json::Value)]) -> Metadata {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn graph(dir: &Path, options: GraphOptions) -> EntityGraph {
        EntityGraph::open(dir.join("knowledge_graph.json"), options)
    }

    #[tokio::test]
    async fn upsert_merges_properties() {
        let dir = tempfile::tempdir().unwrap();
        let g = graph(dir.path(), GraphOptions::default());

        g.add_entity("TP53", EntityType::Gene, "toolA", props(&[("chr", json!("17"))]), &[])
            .await
            .unwrap();
        let merged = g
            .add_entity("tp53", EntityType::Gene, "toolB", props(&[("len", json!(393))]), &[])
            .await
            .unwrap();

        assert_eq!(g.entity_count().await, 1);
        assert_eq!(merged.properties["chr"], json!("17"));
        assert_eq!(merged.properties["len"], json!(393));
        assert_eq!(merged.source, "toolA");
    }

    #[tokio::test]
    async fn aliases_merge_only_when_explicit() {
        let dir = tempfile::tempdir().unwrap();
        let g = graph(dir.path(), GraphOptions::default());

        g.add_entity("TP53", EntityType::Gene, "toolA", Metadata::new(), &[])
            .await
            .unwrap();
        g.add_entity("tumor protein p53", EntityType::Gene, "toolB", Metadata::new(), &[])
            .await
            .unwrap();
        assert_eq!(g.entity_count().await, 2);

        let dir2 = tempfile::tempdir().unwrap();
        let g2 = graph(dir2.path(), GraphOptions::default());
        g2.add_entity(
            "TP53",
            EntityType::Gene,
            "toolA",
            Metadata::new(),
            &["tumor protein p53".to_string()],
        )
        .await
        .unwrap();
        g2.add_entity("tumor protein p53", EntityType::Gene, "toolB", Metadata::new(), &[])
            .await
            .unwrap();
        assert_eq!(g2.entity_count().await, 1);
        let found = g2.get_entity("TUMOR PROTEIN P53").await.unwrap().unwrap();
        assert_eq!(found.name, "TP53");
    }

    #[tokio::test]
    async fn non_ascii_case_variant_adds_no_alias() {
        let dir = tempfile::tempdir().unwrap();
        let g = graph(dir.path(), GraphOptions::default());
        g.add_entity("Ωmega", EntityType::Other, "a", Metadata::new(), &["Δelta".into()])
            .await
            .unwrap();
        let merged = g
            .add_entity("ωmega", EntityType::Other, "b", Metadata::new(), &["δELTA".into()])
            .await
            .unwrap();

        assert_eq!(g.entity_count().await, 1);
        assert_eq!(merged.name, "Ωmega");
        assert_eq!(merged.aliases, vec!["Δelta"]);
    }

    #[tokio::test]
    async fn alias_on_second_call_merges_too() {
        let dir = tempfile::tempdir().unwrap();
        let g = graph(dir.path(), GraphOptions::default());
        g.add_entity("TP53", EntityType::Gene, "a", Metadata::new(), &[])
            .await
            .unwrap();
        let merged = g
            .add_entity("tumor protein p53", EntityType::Gene, "b", Metadata::new(), &["TP53".into()])
            .await
            .unwrap();
        assert_eq!(g.entity_count().await, 1);
        assert_eq!(merged.name, "TP53");
        assert!(merged.aliases.contains(&"tumor protein p53".to_string()));
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let g = graph(dir.path(), GraphOptions::default());
        let err = g
            .add_entity("  ", EntityType::Gene, "a", Metadata::new(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::EmptyName));
    }

    #[tokio::test]
    async fn other_type_is_upgraded() {
        let dir = tempfile::tempdir().unwrap();
        let g = graph(dir.path(), GraphOptions::default());
        g.add_relationship(NewRelationship::new("BRCA1", "DNA repair", RelationshipType::ParticipatesIn, "tool"))
            .await
            .unwrap();
        let e = g
            .add_entity("BRCA1", EntityType::Gene, "tool2", Metadata::new(), &[])
            .await
            .unwrap();
        assert_eq!(e.entity_type, EntityType::Gene);
    }

    #[tokio::test]
    async fn repeated_relationship_keeps_one_edge() {
        let dir = tempfile::tempdir().unwrap();
        let g = graph(dir.path(), GraphOptions::default());

        for (confidence, evidence) in [(0.4, "e1"), (0.9, "e2"), (0.6, "e3")] {
            g.add_relationship(
                NewRelationship::new("TP53", "MDM2", RelationshipType::InteractsWith, "string_db")
                    .confidence(confidence)
                    .evidence(vec![evidence.to_string()]),
            )
            .await
            .unwrap();
        }

        assert_eq!(g.relationship_count().await, 1);
        let n = g
            .get_neighbors("tp53", None, Direction::Outgoing, 10)
            .await
            .unwrap();
        let rel = &n.relationships[0];
        assert!((rel.confidence - 0.9).abs() < 1e-9);
        assert_eq!(rel.evidence, vec!["e1", "e2", "e3"]);
        assert_eq!(n.entities[0].name, "MDM2");
        assert_eq!(n.entities[0].entity_type, EntityType::Other);
        assert_eq!(n.entities[0].source, "string_db");
    }

    #[tokio::test]
    async fn neighbors_respect_direction() {
        let dir = tempfile::tempdir().unwrap();
        let g = graph(dir.path(), GraphOptions::default());
        g.add_relationship(NewRelationship::new("A", "B", RelationshipType::Regulates, "t"))
            .await
            .unwrap();
        g.add_relationship(NewRelationship::new("C", "A", RelationshipType::Regulates, "t"))
            .await
            .unwrap();

        let out = g.get_neighbors("A", None, Direction::Outgoing, 10).await.unwrap();
        assert_eq!(out.entities.len(), 1);
        assert_eq!(out.entities[0].name, "B");

        let inc = g.get_neighbors("A", None, Direction::Incoming, 10).await.unwrap();
        assert_eq!(inc.entities[0].name, "C");

        let both = g.get_neighbors("A", None, Direction::Both, 10).await.unwrap();
        assert_eq!(both.entities.len(), 2);

        let typed = g
            .get_neighbors("A", Some(RelationshipType::Causes), Direction::Both, 10)
            .await
            .unwrap();
        assert!(typed.relationships.is_empty());

        assert!(g.get_neighbors("Z", None, Direction::Both, 10).await.is_none());
    }

    #[tokio::test]
    async fn entity_eviction_keeps_graph_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let g = graph(
            dir.path(),
            GraphOptions {
                max_entities: 10,
                max_relationships: 100,
                eviction_fraction: 0.2,
            },
        );

        for i in 0..10 {
            g.add_entity(&format!("E{i}"), EntityType::Gene, "t", Metadata::new(), &[])
                .await
                .unwrap();
        }
        // Make E0..E7 more used than E8 and E9.
        for i in 0..8 {
            g.get_entity(&format!("E{i}")).await.unwrap();
        }
        g.add_relationship(NewRelationship::new("E8", "E0", RelationshipType::Regulates, "t"))
            .await
            .unwrap();
        g.add_relationship(NewRelationship::new("E1", "E2", RelationshipType::Regulates, "t"))
            .await
            .unwrap();

        g.add_entity("NEW", EntityType::Gene, "t", Metadata::new(), &[])
            .await
            .unwrap();

        assert_eq!(g.entity_count().await, 9);
        assert!(g.get_entity("E8").await.unwrap().is_none());
        assert!(g.get_entity("E9").await.unwrap().is_none());
        assert!(g.get_entity("NEW").await.unwrap().is_some());

        let state = g.state.read().await;
        for r in state.relationships.values() {
            assert!(state.entities.contains_key(&r.source_id));
            assert!(state.entities.contains_key(&r.target_id));
        }
        assert_eq!(state.relationships.len(), 1);
    }

    #[tokio::test]
    async fn relationship_eviction_drops_lowest_confidence() {
        let dir = tempfile::tempdir().unwrap();
        let g = graph(
            dir.path(),
            GraphOptions {
                max_entities: 100,
                max_relationships: 4,
                eviction_fraction: 0.5,
            },
        );
        for (i, c) in [0.1, 0.9, 0.2, 0.8].into_iter().enumerate() {
            g.add_relationship(
                NewRelationship::new("hub", format!("n{i}"), RelationshipType::Contains, "t").confidence(c),
            )
            .await
            .unwrap();
        }
        g.add_relationship(NewRelationship::new("hub", "n9", RelationshipType::Contains, "t").confidence(0.5))
            .await
            .unwrap();

        let state = g.state.read().await;
        let mut confidences: Vec<f64> = state.relationships.values().map(|r| r.confidence).collect();
        confidences.sort_by(f64::total_cmp);
        assert_eq!(confidences, vec![0.5, 0.8, 0.9]);
    }

    #[tokio::test]
    async fn extraction_upserts_matches() {
        let dir = tempfile::tempdir().unwrap();
        let g = graph(dir.path(), GraphOptions::default());
        let found = g
            .extract_entities_from_text("BRCA1 variant rs80357906 in pathway hsa03440", "clinvar")
            .await
            .unwrap();
        assert!(found.iter().any(|e| e.name == "BRCA1" && e.entity_type == EntityType::Gene));
        assert!(found.iter().any(|e| e.name == "rs80357906" && e.entity_type == EntityType::Variant));
        assert!(found.iter().any(|e| e.name == "hsa03440" && e.entity_type == EntityType::Pathway));
        assert!(found.iter().all(|e| e.source == "clinvar"));
    }

    #[tokio::test]
    async fn find_filters_by_query_and_type() {
        let dir = tempfile::tempdir().unwrap();
        let g = graph(dir.path(), GraphOptions::default());
        g.add_entity("BRCA1", EntityType::Gene, "t", Metadata::new(), &[])
            .await
            .unwrap();
        g.add_entity("BRCA2", EntityType::Gene, "t", Metadata::new(), &[])
            .await
            .unwrap();
        g.add_entity("Breast cancer", EntityType::Disease, "t", Metadata::new(), &["BRCA".into()])
            .await
            .unwrap();

        assert_eq!(g.find_entities(Some("brca"), None, 10).await.len(), 3);
        assert_eq!(g.find_entities(Some("brca"), Some(EntityType::Gene), 10).await.len(), 2);
        assert_eq!(g.find_entities(None, None, 2).await.len(), 2);
    }

    #[tokio::test]
    async fn persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        {
            let g = graph(dir.path(), GraphOptions::default());
            g.add_relationship(NewRelationship::new("TP53", "MDM2", RelationshipType::InteractsWith, "t"))
                .await
                .unwrap();
        }
        let g = graph(dir.path(), GraphOptions::default());
        assert_eq!(g.entity_count().await, 2);
        assert_eq!(g.relationship_count().await, 1);
        assert!(g.get_entity("mdm2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("knowledge_graph.json"), "{ not json").unwrap();
        let g = graph(dir.path(), GraphOptions::default());
        assert_eq!(g.entity_count().await, 0);
    }

    #[tokio::test]
    async fn stats_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let g = graph(dir.path(), GraphOptions::default());
        g.add_relationship(NewRelationship::new("A", "B", RelationshipType::Encodes, "t"))
            .await
            .unwrap();
        let stats = g.stats().await;
        assert_eq!(stats.total_entities, 2);
        assert_eq!(stats.entities_by_type["other"], 2);
        assert_eq!(stats.relationships_by_type["encodes"], 1);

        g.clear().await.unwrap();
        assert_eq!(g.entity_count().await, 0);
        assert_eq!(g.relationship_count().await, 0);
    }

    #[test]
    fn direction_parses_leniently() {
        assert_eq!("outgoing".parse::<Direction>().unwrap(), Direction::Outgoing);
        assert_eq!("Incoming".parse::<Direction>().unwrap(), Direction::Incoming);
        assert_eq!("sideways".parse::<Direction>().unwrap(), Direction::Both);
    }
}
