//! # Debugger Schema
//!
//! Names the query language understands on top of the raw graph:
//! collection aliases (`sessions` -> entities of type `session`), relation
//! steps (`/threads`, `/frame`), the focus role hierarchy and the axes
//! used by anchor offsets (`@frame+1`).
//!
//! The defaults describe the DAP object model:
//!
//! ```text
//! session <- thread <- frame <- scope <- variable <- variable ...
//!    ^          (all linked by `parent` edges, child -> parent)
//!    +-- session (child sessions)
//! breakpoint -> source          (`source` edges)
//! ```

use crate::primitives::MAX_ANCESTOR_DEPTH;
use crate::store::{Entity, Store};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Entity type tags used by the debugger model.
pub mod kinds {
    pub const SESSION: &str = "session";
    pub const THREAD: &str = "thread";
    pub const FRAME: &str = "frame";
    pub const SCOPE: &str = "scope";
    pub const VARIABLE: &str = "variable";
    pub const SOURCE: &str = "source";
    pub const BREAKPOINT: &str = "breakpoint";
    pub const OUTPUT: &str = "output";
}

/// Edge type tags used by the debugger model.
pub mod edges {
    /// child -> parent
    pub const PARENT: &str = "parent";
    /// breakpoint/frame -> source
    pub const SOURCE: &str = "source";
}

/// Which end of an edge a relation starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Follow edges from the current entity (`edges_from`).
    Out,
    /// Follow edges into the current entity (`edges_to`).
    In,
}

/// A named relation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Relation {
    pub edge: String,
    pub direction: Direction,
    /// Keep only related entities of this type.
    #[serde(default)]
    pub kind: Option<String>,
    /// Keep following the edge; yields the nearest entities of `kind`
    /// on every path.
    #[serde(default)]
    pub transitive: bool,
}

impl Relation {
    fn new(edge: &str, direction: Direction, kind: Option<&str>, transitive: bool) -> Self {
        Self {
            edge: edge.to_string(),
            direction,
            kind: kind.map(str::to_string),
            transitive,
        }
    }

    fn admits(&self, entity: &Entity) -> bool {
        self.kind.as_deref().is_none_or(|kind| entity.kind() == kind)
    }

    /// Entities related to `entity`, in edge-list order; tracked.
    pub fn follow(&self, store: &Store, entity: &Entity) -> Vec<Entity> {
        if !self.transitive {
            return self
                .step(store, entity)
                .into_iter()
                .filter(|e| self.admits(e))
                .collect();
        }

        let mut found: Vec<Entity> = Vec::new();
        let mut frontier = vec![entity.clone()];
        let mut seen = vec![entity.uri().clone()];
        for _ in 0..MAX_ANCESTOR_DEPTH {
            let mut next = Vec::new();
            for current in &frontier {
                for related in self.step(store, current) {
                    if seen.contains(related.uri()) {
                        continue;
                    }
                    seen.push(related.uri().clone());
                    if self.kind.is_some() && self.admits(&related) {
                        found.push(related);
                    } else {
                        if self.kind.is_none() {
                            found.push(related.clone());
                        }
                        next.push(related);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        found
    }

    fn step(&self, store: &Store, entity: &Entity) -> Vec<Entity> {
        let uris = match self.direction {
            Direction::Out => store.edges_from(entity.uri().as_str(), &self.edge),
            Direction::In => store.edges_to(entity.uri().as_str(), &self.edge),
        };
        uris.iter().filter_map(|uri| store.get(uri.as_str())).collect()
    }
}

/// How an anchor offset moves: `@frame+1` goes from the focused frame to
/// its `container` (the thread), lists the container's `members` (the
/// stack, innermost first) and picks the neighbour one position further.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Axis {
    pub container: String,
    pub members: String,
}

/// Relations, aliases and roles the resolver and focus work with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Schema {
    /// Edge type linking a child to its parent.
    pub parent_edge: String,
    /// Focus roles, outermost first.
    pub roles: Vec<String>,
    /// Collection alias -> entity type.
    pub collections: BTreeMap<String, String>,
    pub relations: BTreeMap<String, Relation>,
    /// Role -> offset axis.
    pub axes: BTreeMap<String, Axis>,
}

impl Default for Schema {
    fn default() -> Self {
        use Direction::{In, Out};
        use edges::{PARENT, SOURCE};
        use kinds::{BREAKPOINT, FRAME, OUTPUT, SCOPE, SESSION, THREAD, VARIABLE};

        let roles = [SESSION, THREAD, FRAME, SCOPE, VARIABLE]
            .iter()
            .map(|r| r.to_string())
            .collect();

        let collections = [
            ("sessions", SESSION),
            ("threads", THREAD),
            ("frames", FRAME),
            ("scopes", SCOPE),
            ("variables", VARIABLE),
            ("sources", kinds::SOURCE),
            ("breakpoints", BREAKPOINT),
            ("outputs", OUTPUT),
        ]
        .iter()
        .map(|(alias, kind)| (alias.to_string(), kind.to_string()))
        .collect();

        let relations = [
            ("threads", Relation::new(PARENT, In, Some(THREAD), false)),
            ("frames", Relation::new(PARENT, In, Some(FRAME), false)),
            ("stack", Relation::new(PARENT, In, Some(FRAME), false)),
            ("scopes", Relation::new(PARENT, In, Some(SCOPE), false)),
            ("variables", Relation::new(PARENT, In, Some(VARIABLE), false)),
            ("sessions", Relation::new(PARENT, In, Some(SESSION), false)),
            ("outputs", Relation::new(PARENT, In, Some(OUTPUT), false)),
            ("children", Relation::new(PARENT, In, None, false)),
            ("parent", Relation::new(PARENT, Out, None, false)),
            ("ancestors", Relation::new(PARENT, Out, None, true)),
            ("session", Relation::new(PARENT, Out, Some(SESSION), true)),
            ("thread", Relation::new(PARENT, Out, Some(THREAD), true)),
            ("frame", Relation::new(PARENT, Out, Some(FRAME), true)),
            ("scope", Relation::new(PARENT, Out, Some(SCOPE), true)),
            ("source", Relation::new(SOURCE, Out, None, false)),
            ("breakpoints", Relation::new(SOURCE, In, Some(BREAKPOINT), false)),
        ]
        .into_iter()
        .map(|(name, relation)| (name.to_string(), relation))
        .collect();

        let axes = [
            (FRAME, Axis { container: "thread".into(), members: "frames".into() }),
            (THREAD, Axis { container: "session".into(), members: "threads".into() }),
        ]
        .into_iter()
        .map(|(role, axis)| (role.to_string(), axis))
        .collect();

        Self {
            parent_edge: PARENT.to_string(),
            roles,
            collections,
            relations,
            axes,
        }
    }
}

impl Schema {
    /// Entity type a collection name stands for; unknown names are taken
    /// as a type tag verbatim.
    pub fn collection_kind<'a>(&'a self, name: &'a str) -> &'a str {
        self.collections.get(name).map_or(name, String::as_str)
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    pub fn axis(&self, role: &str) -> Option<&Axis> {
        self.axes.get(role)
    }

    /// Position of a role in the hierarchy (0 = outermost).
    pub fn role_depth(&self, role: &str) -> Option<usize> {
        self.roles.iter().position(|r| r == role)
    }

    /// The focus role an entity fills: its type, if that type is a role.
    pub fn role_of<'a>(&self, entity: &'a Entity) -> Option<&'a str> {
        self.role_depth(entity.kind()).map(|_| entity.kind())
    }

    /// Parent chain of `entity`, nearest first; tracked.
    pub fn ancestors(&self, store: &Store, entity: &Entity) -> Vec<Entity> {
        let mut chain: Vec<Entity> = Vec::new();
        let mut current = entity.clone();
        for _ in 0..MAX_ANCESTOR_DEPTH {
            let Some(parent) = store
                .edges_from(current.uri().as_str(), &self.parent_edge)
                .first()
                .and_then(|uri| store.get(uri.as_str()))
            else {
                break;
            };
            if parent == *entity || chain.contains(&parent) {
                tracing::warn!(target: "dapgraph_core::schema", uri = %entity.uri(), "parent chain loops");
                break;
            }
            chain.push(parent.clone());
            current = parent;
        }
        chain
    }

    /// Add or replace a relation.
    #[must_use]
    pub fn with_relation(mut self, name: impl Into<String>, relation: Relation) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }

    /// Add or replace a collection alias.
    #[must_use]
    pub fn with_collection(mut self, alias: impl Into<String>, kind: impl Into<String>) -> Self {
        self.collections.insert(alias.into(), kind.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntitySpec;

    fn chain() -> Store {
        let store = Store::new();
        for (uri, kind) in [
            ("s1", kinds::SESSION),
            ("s2", kinds::SESSION),
            ("t1", kinds::THREAD),
            ("f1", kinds::FRAME),
        ] {
            store.add(EntitySpec::new(uri, kind)).expect("add");
        }
        store.add_edge(edges::PARENT, "s2", "s1");
        store.add_edge(edges::PARENT, "t1", "s2");
        store.add_edge(edges::PARENT, "f1", "t1");
        store
    }

    #[test]
    fn collection_aliases_fall_back_to_type_names() {
        let schema = Schema::default();
        assert_eq!(schema.collection_kind("sessions"), "session");
        assert_eq!(schema.collection_kind("watch"), "watch");
    }

    #[test]
    fn ancestors_are_nearest_first() {
        let store = chain();
        let schema = Schema::default();
        let frame = store.get("f1").expect("frame");
        let uris: Vec<String> = schema
            .ancestors(&store, &frame)
            .iter()
            .map(|e| e.uri().to_string())
            .collect();
        assert_eq!(uris, vec!["t1", "s2", "s1"]);
    }

    #[test]
    fn transitive_relation_stops_at_nearest_match() {
        let store = chain();
        let schema = Schema::default();
        let frame = store.get("f1").expect("frame");
        let session = schema.relation("session").expect("relation");
        let found: Vec<String> = session
            .follow(&store, &frame)
            .iter()
            .map(|e| e.uri().to_string())
            .collect();
        assert_eq!(found, vec!["s2"]);
    }

    #[test]
    fn role_follows_entity_type() {
        let store = chain();
        let schema = Schema::default();
        let frame = store.get("f1").expect("frame");
        assert_eq!(schema.role_of(&frame), Some("frame"));
        assert_eq!(schema.role_depth("session"), Some(0));
        assert_eq!(schema.role_depth("breakpoint"), None);
    }
}
