//! Context rendering for the entity graph.

use mnemos_core::{BudgetWriter, Entity, Relationship};

use super::{Direction, GraphState};

const HEADER: &str = "## Known Biological Entities\n";
const GENERAL_LIMIT: usize = 50;
const RELATIONSHIPS_PER_ENTITY: usize = 3;
const ALIASES_SHOWN: usize = 5;
const PROPERTIES_SHOWN: usize = 3;

/// Render `names` (or the most used entities) without splitting an entity block.
pub(super) fn render(state: &GraphState, names: &[String], max_tokens: usize) -> String {
    let Some(mut out) = BudgetWriter::new(HEADER, max_tokens) else {
        return String::new();
    };

    let mut resolved: Vec<&Entity> = Vec::new();
    for name in names {
        if let Some(entity) = state.resolve(name)
            && !resolved.iter().any(|e| e.id == entity.id)
        {
            resolved.push(entity);
        }
    }

    if resolved.is_empty() {
        for entity in state.most_accessed().into_iter().take(GENERAL_LIMIT) {
            if !out.push(&format!("- {} ({})", entity.name, entity.entity_type)) {
                break;
            }
        }
    } else {
        for entity in resolved {
            let mut block = describe(entity);
            for rel in state
                .edges_of(&entity.id, None, Direction::Both)
                .into_iter()
                .take(RELATIONSHIPS_PER_ENTITY)
            {
                block.push('\n');
                block.push_str(&describe_relationship(state, rel));
            }
            if !out.push(&block) {
                break;
            }
        }
    }

    out.finish()
}

fn describe(entity: &Entity) -> String {
    let mut lines = vec![format!("**{}** ({})", entity.name, entity.entity_type)];
    if !entity.aliases.is_empty() {
        let shown: Vec<&str> = entity.aliases.iter().take(ALIASES_SHOWN).map(String::as_str).collect();
        lines.push(format!("  Aliases: {}", shown.join(", ")));
    }
    for (key, value) in entity.properties.iter().take(PROPERTIES_SHOWN) {
        match value.as_str() {
            Some(s) => lines.push(format!("  {key}: {s}")),
            None => lines.push(format!("  {key}: {value}")),
        }
    }
    lines.join("\n")
}

fn describe_relationship(state: &GraphState, rel: &Relationship) -> String {
    format!(
        "  -> {} --[{}]--> {}",
        state.entity_name(&rel.source_id),
        rel.relationship_type,
        state.entity_name(&rel.target_id)
    )
}
