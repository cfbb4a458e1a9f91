use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use crate::{codec::Reference, paths::TitleKey};

/// All references from one source page to one target title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// The target as first spelled in the source.
    pub target: String,
    pub count: usize,
}

/// Directed multigraph of page references.
///
/// `forward` and `backward` are two views of the same edge set and are only ever changed
/// together. `broken` holds the target keys that currently have inbound edges but no page; the
/// index owns title resolution, so it tells the graph which keys resolve via
/// [`LinkGraph::refresh_broken`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkGraph {
    forward: BTreeMap<PathBuf, BTreeMap<TitleKey, Edge>>,
    backward: BTreeMap<TitleKey, BTreeMap<PathBuf, usize>>,
    broken: BTreeSet<TitleKey>,
}

fn edges_from(references: &[Reference]) -> BTreeMap<TitleKey, Edge> {
    let mut edges: BTreeMap<TitleKey, Edge> = BTreeMap::new();
    for reference in references {
        let key = reference.key();
        if key.is_empty() {
            continue;
        }
        edges
            .entry(key)
            .and_modify(|edge| edge.count += 1)
            .or_insert_with(|| Edge {
                target: reference.target.clone(),
                count: 1,
            });
    }
    edges
}

impl LinkGraph {
    /// Replace the outbound edges of `source`, touching only the edges that changed.
    /// Returns the target keys whose inbound edges changed.
    pub fn set_outbound(&mut self, source: &Path, references: &[Reference]) -> BTreeSet<TitleKey> {
        let new_edges = edges_from(references);
        let old_edges = self.forward.remove(source).unwrap_or_default();
        let mut touched = BTreeSet::new();

        for (key, old) in old_edges.iter() {
            match new_edges.get(key) {
                Some(new) if new.count == old.count => {}
                _ => {
                    touched.insert(key.clone());
                    self.unlink(key, source);
                }
            }
        }
        for (key, new) in new_edges.iter() {
            let unchanged = old_edges
                .get(key)
                .map(|old| old.count == new.count)
                .unwrap_or(false);
            if !unchanged {
                touched.insert(key.clone());
                self.backward
                    .entry(key.clone())
                    .or_default()
                    .insert(source.to_path_buf(), new.count);
            }
        }
        if !new_edges.is_empty() {
            self.forward.insert(source.to_path_buf(), new_edges);
        }
        touched
    }

    /// Drop every outbound edge of `source`. Returns the target keys that lost inbound edges.
    pub fn remove_source(&mut self, source: &Path) -> BTreeSet<TitleKey> {
        let Some(old_edges) = self.forward.remove(source) else {
            return BTreeSet::new();
        };
        for key in old_edges.keys() {
            self.unlink(key, source);
        }
        old_edges.into_keys().collect()
    }

    fn unlink(&mut self, key: &TitleKey, source: &Path) {
        if let Some(sources) = self.backward.get_mut(key) {
            sources.remove(source);
            if sources.is_empty() {
                self.backward.remove(key);
            }
        }
    }

    /// Recompute whether `key` is broken given whether any page currently holds that title.
    pub fn refresh_broken(&mut self, key: &TitleKey, resolvable: bool) {
        if !resolvable && self.backward.contains_key(key) {
            self.broken.insert(key.clone());
        } else {
            self.broken.remove(key);
        }
    }

    /// Source pages referencing `key`, with occurrence counts.
    pub fn sources(&self, key: &TitleKey) -> Option<&BTreeMap<PathBuf, usize>> {
        self.backward.get(key)
    }

    pub fn outbound(&self, source: &Path) -> Option<&BTreeMap<TitleKey, Edge>> {
        self.forward.get(source)
    }

    pub fn broken(&self) -> &BTreeSet<TitleKey> {
        &self.broken
    }

    pub fn is_broken(&self, key: &TitleKey) -> bool {
        self.broken.contains(key)
    }

    pub fn target_keys(&self) -> impl Iterator<Item = &TitleKey> {
        self.backward.keys()
    }

    /// Spelling of `key` used by the first source (in path order) that references it.
    pub fn spelling(&self, key: &TitleKey) -> Option<&str> {
        let (source, _) = self.backward.get(key)?.iter().next()?;
        self.forward
            .get(source)
            .and_then(|edges| edges.get(key))
            .map(|edge| edge.target.as_str())
    }

    /// Total number of (source, target) edges.
    pub fn edge_count(&self) -> usize {
        self.forward.values().map(|edges| edges.len()).sum()
    }

    /// Check that `backward` is exactly the inverse of `forward`.
    pub fn check_views(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut inverse: BTreeMap<&TitleKey, BTreeMap<&PathBuf, usize>> = BTreeMap::new();
        for (source, edges) in self.forward.iter() {
            for (key, edge) in edges.iter() {
                inverse.entry(key).or_default().insert(source, edge.count);
            }
        }
        for (key, sources) in self.backward.iter() {
            let expected = inverse.remove(key).unwrap_or_default();
            let actual: BTreeMap<&PathBuf, usize> = sources.iter().map(|(p, c)| (p, *c)).collect();
            if expected != actual {
                problems.push(format!(
                    "backward edges for '{key}' do not match forward edges: {actual:?} vs {expected:?}"
                ));
            }
        }
        for key in inverse.keys() {
            problems.push(format!("forward edges to '{key}' missing from backward view"));
        }
        problems
    }
}
