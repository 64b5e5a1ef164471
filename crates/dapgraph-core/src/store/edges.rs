//! Forward and reverse adjacency lists keyed by `(uri, edge type)`.

use crate::{Edge, Uri};
use std::collections::BTreeMap;

type Adjacency = BTreeMap<(Uri, String), Vec<Uri>>;

/// Ordered edge lists mirrored in both directions.
///
/// `forward[(from, kind)]` lists targets, `reverse[(to, kind)]` lists
/// sources. Both lists are kept in insertion order, except that
/// [`prepend`](Self::prepend) puts the new entry first on both sides.
#[derive(Debug, Default)]
pub(super) struct EdgeIndex {
    forward: Adjacency,
    reverse: Adjacency,
    count: usize,
}

impl EdgeIndex {
    pub(super) fn contains(&self, edge: &Edge) -> bool {
        self.forward
            .get(&(edge.from.clone(), edge.kind.clone()))
            .is_some_and(|targets| targets.contains(&edge.to))
    }

    /// Insert an edge. Returns `false` if it was already present.
    pub(super) fn insert(&mut self, edge: &Edge, at_front: bool) -> bool {
        if self.contains(edge) {
            return false;
        }
        let targets = self
            .forward
            .entry((edge.from.clone(), edge.kind.clone()))
            .or_default();
        let sources = self
            .reverse
            .entry((edge.to.clone(), edge.kind.clone()))
            .or_default();
        if at_front {
            targets.insert(0, edge.to.clone());
            sources.insert(0, edge.from.clone());
        } else {
            targets.push(edge.to.clone());
            sources.push(edge.from.clone());
        }
        self.count = self.count.saturating_add(1);
        true
    }

    /// Remove an edge. Returns `false` if it was absent.
    pub(super) fn remove(&mut self, edge: &Edge) -> bool {
        let removed = Self::unlink(&mut self.forward, &edge.from, &edge.kind, &edge.to);
        if removed {
            Self::unlink(&mut self.reverse, &edge.to, &edge.kind, &edge.from);
            self.count = self.count.saturating_sub(1);
        }
        removed
    }

    pub(super) fn from(&self, uri: &Uri, kind: &str) -> &[Uri] {
        Self::lookup(&self.forward, uri, kind)
    }

    pub(super) fn to(&self, uri: &Uri, kind: &str) -> &[Uri] {
        Self::lookup(&self.reverse, uri, kind)
    }

    pub(super) fn len(&self) -> usize {
        self.count
    }

    /// Every edge, grouped by `(to, kind)` in incoming-list order.
    ///
    /// Re-adding the result in order rebuilds every incoming list exactly.
    pub(super) fn all(&self) -> Vec<Edge> {
        self.reverse
            .iter()
            .flat_map(|((to, kind), sources)| {
                sources
                    .iter()
                    .map(move |from| Edge::new(kind.clone(), from.clone(), to.clone()))
            })
            .collect()
    }

    /// Remove every edge touching `uri` and return them.
    ///
    /// Outgoing edges come first, in `(kind, position)` order, then
    /// incoming ones. A self-loop is reported once.
    pub(super) fn detach(&mut self, uri: &Uri) -> Vec<Edge> {
        let mut removed = Vec::new();
        for (kind, targets) in Self::drain_keyed(&mut self.forward, uri) {
            for to in targets {
                Self::unlink(&mut self.reverse, &to, &kind, uri);
                removed.push(Edge::new(kind.clone(), uri.clone(), to));
            }
        }
        for (kind, sources) in Self::drain_keyed(&mut self.reverse, uri) {
            for from in sources {
                Self::unlink(&mut self.forward, &from, &kind, uri);
                removed.push(Edge::new(kind.clone(), from, uri.clone()));
            }
        }
        self.count = self.count.saturating_sub(removed.len());
        removed
    }

    fn lookup<'a>(map: &'a Adjacency, uri: &Uri, kind: &str) -> &'a [Uri] {
        map.get(&(uri.clone(), kind.to_string()))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn unlink(map: &mut Adjacency, key_uri: &Uri, kind: &str, value: &Uri) -> bool {
        let key = (key_uri.clone(), kind.to_string());
        let Some(list) = map.get_mut(&key) else {
            return false;
        };
        let Some(pos) = list.iter().position(|existing| existing == value) else {
            return false;
        };
        list.remove(pos);
        if list.is_empty() {
            map.remove(&key);
        }
        true
    }

    fn drain_keyed(map: &mut Adjacency, uri: &Uri) -> Vec<(String, Vec<Uri>)> {
        let kinds: Vec<String> = map
            .range((uri.clone(), String::new())..)
            .take_while(|((key_uri, _), _)| key_uri == uri)
            .map(|((_, kind), _)| kind.clone())
            .collect();
        kinds
            .into_iter()
            .filter_map(|kind| {
                let list = map.remove(&(uri.clone(), kind.clone()))?;
                Some((kind, list))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(kind: &str, from: &str, to: &str) -> Edge {
        Edge::new(kind, from, to)
    }

    #[test]
    fn append_keeps_insertion_order_on_both_sides() {
        let mut index = EdgeIndex::default();
        assert!(index.insert(&edge("parent", "t1", "s1"), false));
        assert!(index.insert(&edge("parent", "t2", "s1"), false));

        assert_eq!(index.to(&Uri::new("s1"), "parent"), &[Uri::new("t1"), Uri::new("t2")]);
        assert_eq!(index.from(&Uri::new("t1"), "parent"), &[Uri::new("s1")]);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn prepend_puts_newest_first() {
        let mut index = EdgeIndex::default();
        index.insert(&edge("parent", "f1", "t1"), false);
        index.insert(&edge("parent", "f2", "t1"), true);

        assert_eq!(index.to(&Uri::new("t1"), "parent"), &[Uri::new("f2"), Uri::new("f1")]);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut index = EdgeIndex::default();
        assert!(index.insert(&edge("source", "b1", "src"), false));
        assert!(!index.insert(&edge("source", "b1", "src"), true));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn detach_removes_both_directions_and_self_loops() {
        let mut index = EdgeIndex::default();
        index.insert(&edge("parent", "t1", "s1"), false);
        index.insert(&edge("parent", "s1", "root"), false);
        index.insert(&edge("link", "s1", "s1"), false);
        index.insert(&edge("parent", "t2", "s2"), false);

        let removed = index.detach(&Uri::new("s1"));
        assert_eq!(removed.len(), 3);
        assert!(index.to(&Uri::new("s1"), "parent").is_empty());
        assert!(index.from(&Uri::new("t1"), "parent").is_empty());
        assert!(index.to(&Uri::new("root"), "parent").is_empty());
        assert_eq!(index.len(), 1);
        assert_eq!(index.all(), vec![edge("parent", "t2", "s2")]);
    }

    #[test]
    fn remove_reports_absence() {
        let mut index = EdgeIndex::default();
        index.insert(&edge("parent", "a", "b"), false);
        assert!(index.remove(&edge("parent", "a", "b")));
        assert!(!index.remove(&edge("parent", "a", "b")));
        assert_eq!(index.len(), 0);
    }
}
