//! Mapping Include Graph Resolver.
//!
//! Mapping units form a directed graph whose edges are `include`s. This
//! module validates the graph structure (self includes, unknown targets,
//! duplicate includes, cycles), validates store substitutions on include
//! edges and flattens a unit's transitive includes with their composed
//! substitutions.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use tracing::trace;

use crate::model::ast::{IncludeDef, MappingDef};
use crate::model::object::ObjectModel;
use crate::model::span::{SourceSpan, Spanned};
use crate::store::{DatabaseId, StoreModel};

use super::error::{MappingError, SemanticResult};
use super::resolved::{ResolvedInclude, ResolvedMapping};

// ============================================================================
// Store substitution
// ============================================================================

/// Original database -> substitute database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct SubstitutionMap(BTreeMap<DatabaseId, DatabaseId>);

impl SubstitutionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, original: DatabaseId, substitute: DatabaseId) {
        self.0.insert(original, substitute);
    }

    pub fn apply(&self, database: DatabaseId) -> DatabaseId {
        self.0.get(&database).copied().unwrap_or(database)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn originals(&self) -> impl Iterator<Item = DatabaseId> + '_ {
        self.0.keys().copied()
    }

    /// The substitution applying `self` first, then `outer`.
    pub fn then(&self, outer: &SubstitutionMap) -> SubstitutionMap {
        let mut composed: BTreeMap<DatabaseId, DatabaseId> = self
            .0
            .iter()
            .map(|(original, substitute)| (*original, outer.apply(*substitute)))
            .collect();
        for (original, substitute) in &outer.0 {
            composed.entry(*original).or_insert(*substitute);
        }
        SubstitutionMap(composed)
    }
}

fn store_id(
    store: &StoreModel,
    model: &dyn ObjectModel,
    name: &Spanned<String>,
) -> SemanticResult<DatabaseId> {
    match store.database_id(name.as_str()) {
        Some(id) => Ok(id),
        None if model.has_element(name.as_str()) => Err(MappingError::NotAStore {
            name: name.value.clone(),
        }
        .at(&name.span)),
        None => Err(MappingError::UnknownStore {
            name: name.value.clone(),
        }
        .at(&name.span)),
    }
}

/// Validate the substitutions declared on one include edge.
pub fn validate_substitutions(
    store: &StoreModel,
    model: &dyn ObjectModel,
    include: &IncludeDef,
) -> SemanticResult<SubstitutionMap> {
    let mut pairs = Vec::with_capacity(include.substitutions.len());
    for substitution in &include.substitutions {
        let original = store_id(store, model, &substitution.original)?;
        let substitute = store_id(store, model, &substitution.substitute)?;
        pairs.push((original, substitute, substitution));
    }

    let mut originals = HashSet::new();
    for (original, _, def) in &pairs {
        if !originals.insert(*original) {
            return Err(MappingError::MultipleSubstitutions {
                original: def.original.value.clone(),
            }
            .at(&def.original.span));
        }
    }
    for (_, substitute, def) in &pairs {
        if originals.contains(substitute) {
            return Err(MappingError::OriginalAndSubstitute {
                store: def.substitute.value.clone(),
            }
            .at(&def.substitute.span));
        }
    }

    let mut map = SubstitutionMap::new();
    for (original, substitute, def) in pairs {
        if !store.includes_transitively(substitute, original) {
            return Err(MappingError::SubstituteDoesNotInclude {
                original: def.original.value.clone(),
                substitute: def.substitute.value.clone(),
            }
            .at(&def.substitute.span));
        }
        map.insert(original, substitute);
    }
    Ok(map)
}

/// Every substituted original must be a store the included unit actually
/// maps onto.
pub fn check_substituted_stores(
    outer: &str,
    include: &IncludeDef,
    map: &SubstitutionMap,
    included: &ResolvedMapping,
    store: &StoreModel,
) -> SemanticResult<()> {
    if map.is_empty() {
        return Ok(());
    }
    let referenced = included.referenced_databases();
    for original in map.originals() {
        if !referenced.contains(&original) {
            let name = &store.database(original).name;
            let span = include
                .substitutions
                .iter()
                .find(|s| s.original.as_str() == name)
                .map(|s| &s.original.span)
                .unwrap_or(&include.span);
            return Err(MappingError::SubstitutionNotInIncluded {
                outer: outer.to_string(),
                original: name.clone(),
                inner: included.name.clone(),
            }
            .at(span));
        }
    }
    Ok(())
}

/// Every unit reachable through `direct`, once, with the substitution
/// composed along the include path.
pub fn flatten(unit: &str, span: &SourceSpan, direct: &[ResolvedInclude]) -> SemanticResult<Vec<ResolvedInclude>> {
    let mut worklist: VecDeque<ResolvedInclude> = direct.iter().cloned().collect();
    let mut seen: HashMap<String, SubstitutionMap> = HashMap::new();
    let mut flattened = Vec::new();

    while let Some(include) = worklist.pop_front() {
        let name = &include.mapping.name;
        if let Some(previous) = seen.get(name) {
            if *previous == include.substitution {
                continue;
            }
            return Err(MappingError::AmbiguousIncludePaths {
                included: name.clone(),
                mapping: unit.to_string(),
            }
            .at(span));
        }
        seen.insert(name.clone(), include.substitution.clone());
        trace!(unit, included = %name, "flattened include");

        for inner in &include.mapping.includes {
            worklist.push_back(ResolvedInclude {
                mapping: inner.mapping.clone(),
                substitution: inner.substitution.then(&include.substitution),
            });
        }
        flattened.push(include);
    }
    Ok(flattened)
}

/// Ids must be unique across a unit and everything it includes.
pub fn check_duplicate_ids(
    unit: &str,
    span: &SourceSpan,
    local_ids: &[&str],
    flattened: &[ResolvedInclude],
) -> SemanticResult<()> {
    let mut seen = HashSet::new();
    let included_ids = flattened.iter().flat_map(|include| {
        let m = &include.mapping;
        m.class_mappings
            .iter()
            .flat_map(|c| std::iter::once(c.id()).chain(c.sub_implementations().into_iter().map(|s| s.id.as_str())))
            .chain(m.association_mappings.iter().map(|a| a.id.as_str()))
            .chain(m.enumeration_mappings.iter().map(|e| e.id.as_str()))
            .collect::<Vec<_>>()
    });
    for id in local_ids.iter().copied().chain(included_ids) {
        if !seen.insert(id) {
            return Err(MappingError::DuplicateMappingId {
                id: id.to_string(),
                mapping: unit.to_string(),
            }
            .at(span));
        }
    }
    Ok(())
}

// ============================================================================
// Include graph
// ============================================================================

/// Directed graph of mapping units; an edge `a -> b` means `a` includes `b`.
/// Edge weights are the include's declaration index.
#[derive(Debug, Default)]
pub struct IncludeGraph {
    graph: DiGraph<String, usize>,
    nodes: HashMap<String, NodeIndex>,
}

impl IncludeGraph {
    pub fn build<'a>(units: impl IntoIterator<Item = &'a MappingDef>) -> Self {
        let mut graph = IncludeGraph::default();
        let units: Vec<&MappingDef> = units.into_iter().collect();
        for unit in &units {
            graph.node(unit.name.as_str());
        }
        for unit in &units {
            let from = graph.nodes[unit.name.as_str()];
            for (index, include) in unit.includes.iter().enumerate() {
                if let Some(&to) = graph.nodes.get(include.mapping.as_str()) {
                    graph.graph.add_edge(from, to, index);
                }
            }
        }
        graph
    }

    fn node(&mut self, name: &str) -> NodeIndex {
        if let Some(&index) = self.nodes.get(name) {
            return index;
        }
        let index = self.graph.add_node(name.to_string());
        self.nodes.insert(name.to_string(), index);
        index
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Direct includes of a node, in declaration order.
    fn includes_of(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut edges: Vec<_> = self.graph.edges(node).map(|e| (*e.weight(), e.target())).collect();
        edges.sort();
        edges.into_iter().map(|(_, target)| target).collect()
    }

    /// Unit names ordered so that every unit comes after the units it
    /// includes. Members of a cycle are ordered by name.
    pub fn compile_order(&self) -> Vec<String> {
        tarjan_scc(&self.graph)
            .into_iter()
            .flat_map(|mut component| {
                component.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
                component.into_iter().map(|n| self.graph[n].clone())
            })
            .collect()
    }

    /// Structural validation of one unit's includes.
    pub fn validate(&self, unit: &MappingDef) -> SemanticResult<()> {
        let name = unit.name.as_str();
        let mut seen = HashSet::new();
        for include in &unit.includes {
            let target = include.mapping.as_str();
            if target == name {
                return Err(MappingError::CircularInclude {
                    mapping: name.to_string(),
                    cycle: vec![name.to_string(), name.to_string()],
                }
                .at(&include.span));
            }
            if !self.contains(target) {
                return Err(MappingError::UnknownMapping {
                    mapping: target.to_string(),
                    includer: name.to_string(),
                }
                .at(&include.mapping.span));
            }
            if !seen.insert(target) {
                return Err(MappingError::DuplicateInclude {
                    mapping: name.to_string(),
                    included: target.to_string(),
                }
                .at(&include.span));
            }
        }

        if let Some(cycle) = self.nodes.get(name).and_then(|&node| self.find_cycle(node)) {
            return Err(MappingError::CircularInclude {
                mapping: name.to_string(),
                cycle,
            }
            .at(&unit.span));
        }
        Ok(())
    }

    /// A cycle through `start`, as the path `start -> ... -> start`.
    fn find_cycle(&self, start: NodeIndex) -> Option<Vec<String>> {
        let mut path = vec![start];
        let mut stack = vec![self.includes_of(start).into_iter()];
        let mut explored = HashSet::new();

        while let Some(children) = stack.last_mut() {
            match children.next() {
                Some(child) if child == start => {
                    path.push(child);
                    return Some(path.into_iter().map(|n| self.graph[n].clone()).collect());
                }
                Some(child) if path.contains(&child) || explored.contains(&child) => {}
                Some(child) => {
                    path.push(child);
                    stack.push(self.includes_of(child).into_iter());
                }
                None => {
                    stack.pop();
                    if let Some(done) = path.pop() {
                        explored.insert(done);
                    }
                }
            }
        }
        None
    }
}
