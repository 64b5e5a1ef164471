//! Evaluation of parsed patterns against the store and the focus.

use super::parser::{CompareOp, Condition, Pattern, Root, Step};
use super::ParseError;
use crate::focus::{Focus, FocusContext};
use crate::schema::Schema;
use crate::store::{Entity, Store};
use std::rc::Rc;

/// Outcome of resolving a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The pattern names at most one entity (anchor, URI or trailing index).
    Single(Option<Entity>),
    /// The pattern names a list.
    List(Vec<Entity>),
}

impl Resolution {
    /// Flatten into a list (0 or 1 element for `Single`).
    pub fn into_vec(self) -> Vec<Entity> {
        match self {
            Self::Single(entity) => entity.into_iter().collect(),
            Self::List(list) => list,
        }
    }
}

/// Parses and evaluates query patterns.
///
/// All reads go through tracked store and focus accessors, so a resolution
/// made inside a derived signal is recomputed when the entities, edges or
/// focus it looked at change.
#[derive(Clone, Debug)]
pub struct Resolver {
    store: Store,
    focus: Focus,
    schema: Rc<Schema>,
    scope: Option<String>,
}

impl Resolver {
    pub fn new(store: Store, focus: Focus, schema: Rc<Schema>) -> Self {
        Self {
            store,
            focus,
            schema,
            scope: None,
        }
    }

    /// A resolver whose anchors read the focus override of `scope`.
    #[must_use]
    pub fn with_scope(&self, scope: impl Into<String>) -> Self {
        Self {
            scope: Some(scope.into()),
            ..self.clone()
        }
    }

    /// The focus scope anchors resolve in (`None` = global).
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Exactly one entity, or `None`.
    ///
    /// A list pattern yields `Some` only when it matched exactly one
    /// entity; the resolver never picks among several. Use an index step
    /// (`sessions[0]`) to choose deterministically.
    pub fn resolve_one(&self, source: &str) -> Result<Option<Entity>, ParseError> {
        let pattern = Pattern::parse(source)?;
        Ok(match self.evaluate(&pattern) {
            Resolution::Single(entity) => entity,
            Resolution::List(mut list) => {
                if list.len() == 1 {
                    list.pop()
                } else {
                    if list.len() > 1 {
                        tracing::debug!(target: "dapgraph_core::query", pattern = source, matches = list.len(), "ambiguous resolve_one; returning none");
                    }
                    None
                }
            }
        })
    }

    /// Every matching entity, in result order.
    pub fn resolve_all(&self, source: &str) -> Result<Vec<Entity>, ParseError> {
        let pattern = Pattern::parse(source)?;
        Ok(self.evaluate(&pattern).into_vec())
    }

    /// Parse and evaluate, keeping the single/list distinction.
    pub fn resolve(&self, source: &str) -> Result<Resolution, ParseError> {
        let pattern = Pattern::parse(source)?;
        Ok(self.evaluate(&pattern))
    }

    /// Evaluate a parsed pattern: fold the steps over the root set.
    pub fn evaluate(&self, pattern: &Pattern) -> Resolution {
        let (mut working, mut single) = match &pattern.root {
            Root::Collection(name) => (
                self.store
                    .entities_of(self.schema.collection_kind(name)),
                false,
            ),
            Root::Anchor { role, offset } => (self.anchor(role, *offset).into_iter().collect(), true),
            Root::Uri(uri) => (self.store.get(uri.as_str()).into_iter().collect(), true),
        };

        for step in &pattern.steps {
            match step {
                Step::Relation(name) => {
                    working = self.traverse(&working, name);
                    single = false;
                }
                Step::Filter(conditions) => {
                    working.retain(|entity| conditions.iter().all(|c| matches(entity, c)));
                }
                Step::Index(n) => {
                    working = working.into_iter().nth(*n).into_iter().collect();
                    single = true;
                }
            }
        }

        if single {
            Resolution::Single(working.into_iter().next())
        } else {
            Resolution::List(working)
        }
    }

    fn context(&self) -> FocusContext {
        self.focus.context(self.scope.as_deref())
    }

    fn anchor(&self, role: &str, offset: i64) -> Option<Entity> {
        let focused = self.context().entity(role)?;
        if offset == 0 {
            return Some(focused);
        }
        let Some(axis) = self.schema.axis(role) else {
            tracing::debug!(target: "dapgraph_core::query", role, "role has no offset axis");
            return None;
        };
        let container = self
            .related(&focused, &axis.container)?
            .into_iter()
            .next()?;
        let members = self.related(&container, &axis.members)?;
        let position = members.iter().position(|m| *m == focused)?;
        let target = i64::try_from(position).ok()?.checked_add(offset)?;
        members.into_iter().nth(usize::try_from(target).ok()?)
    }

    fn related(&self, entity: &Entity, relation: &str) -> Option<Vec<Entity>> {
        let Some(relation) = self.schema.relation(relation) else {
            tracing::debug!(target: "dapgraph_core::query", relation, "unknown relation");
            return None;
        };
        Some(relation.follow(&self.store, entity))
    }

    /// Union of the relation over the working set, first occurrence order.
    fn traverse(&self, working: &[Entity], relation: &str) -> Vec<Entity> {
        let mut out: Vec<Entity> = Vec::new();
        for entity in working {
            let Some(related) = self.related(entity, relation) else {
                return Vec::new();
            };
            for r in related {
                if !out.contains(&r) {
                    out.push(r);
                }
            }
        }
        out
    }
}

fn matches(entity: &Entity, condition: &Condition) -> bool {
    let hit = entity.get(&condition.field).matches_text(&condition.value);
    match condition.op {
        CompareOp::Eq => hit,
        CompareOp::Ne => !hit,
    }
}

// =============================================================================
// TESTS
// =============================================================================
