//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, HashSet};

use generational_arena::Index;

use crate::link::Link;

pub type LinkIndex = Index;

// Canonical link identity: the lexicographically ordered pair of
// (node name, interface name) endpoints.
pub type LinkKey = ((String, String), (String, String));

#[derive(Debug)]
pub struct Arena<T>(generational_arena::Arena<T>);

// Set of links of one area, indexed by canonical identity and by incident
// node. Links are owned by the arena; every other collection holds indices.
#[derive(Debug, Default)]
pub struct Links {
    arena: Arena<Link>,
    key_tree: BTreeMap<LinkKey, LinkIndex>,
    node_tree: BTreeMap<String, HashSet<LinkIndex>>,
}

// ===== impl Arena =====

impl<T> Arena<T> {
    pub(crate) fn insert(&mut self, value: T) -> Index {
        self.0.insert(value)
    }

    pub(crate) fn remove(&mut self, index: Index) -> Option<T> {
        self.0.remove(index)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (Index, &T)> {
        self.0.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (Index, &mut T)> {
        self.0.iter_mut()
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Arena<T> {
        Arena(Default::default())
    }
}

impl<T> std::ops::Index<Index> for Arena<T> {
    type Output = T;

    fn index(&self, index: Index) -> &Self::Output {
        &self.0[index]
    }
}

impl<T> std::ops::IndexMut<Index> for Arena<T> {
    fn index_mut(&mut self, index: Index) -> &mut Self::Output {
        &mut self.0[index]
    }
}

// ===== impl Links =====

impl Links {
    // Adds a link, indexing it under both endpoints.
    //
    // The link must not be present already.
    pub(crate) fn insert(&mut self, link: Link) -> LinkIndex {
        let key = link.key().clone();
        let node1 = link.first_node_name().to_owned();
        let node2 = link.second_node_name().to_owned();
        assert!(!self.key_tree.contains_key(&key));

        let link_idx = self.arena.insert(link);
        self.key_tree.insert(key, link_idx);
        self.node_tree.entry(node1).or_default().insert(link_idx);
        self.node_tree.entry(node2).or_default().insert(link_idx);
        link_idx
    }

    // Removes a link from the arena and from both endpoint indices.
    pub(crate) fn remove(&mut self, link_idx: LinkIndex) -> Option<Link> {
        let link = self.arena.remove(link_idx)?;
        self.key_tree.remove(link.key());
        for node_name in [link.first_node_name(), link.second_node_name()] {
            if let Some(set) = self.node_tree.get_mut(node_name) {
                set.remove(&link_idx);
                if set.is_empty() {
                    self.node_tree.remove(node_name);
                }
            }
        }
        Some(link)
    }

    // Returns the indices of all links incident to the given node.
    pub(crate) fn from_node(
        &self,
        node_name: &str,
    ) -> impl Iterator<Item = LinkIndex> + '_ {
        self.node_tree
            .get(node_name)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    // Returns the links incident to the given node, ordered by canonical
    // link identity.
    pub(crate) fn ordered_from_node(&self, node_name: &str) -> Vec<LinkIndex> {
        let mut links = self.from_node(node_name).collect::<Vec<_>>();
        links.sort_by(|a, b| self.arena[*a].cmp(&self.arena[*b]));
        links
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (LinkIndex, &Link)> {
        self.arena.iter()
    }

    pub(crate) fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = (LinkIndex, &mut Link)> {
        self.arena.iter_mut()
    }
}

impl std::ops::Index<LinkIndex> for Links {
    type Output = Link;

    fn index(&self, index: LinkIndex) -> &Self::Output {
        &self.arena[index]
    }
}

impl std::ops::IndexMut<LinkIndex> for Links {
    fn index_mut(&mut self, index: LinkIndex) -> &mut Self::Output {
        &mut self.arena[index]
    }
}
