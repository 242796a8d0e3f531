//! Role arena and ancestor traversal
//!
//! A [`RoleGraph`] is an id-keyed snapshot of a root role and every role
//! reachable from it through parent edges. Traversals over it are synchronous
//! and thread an explicit path through the walk, so a cycle is reported as an
//! error carrying the id chain instead of recursing forever. Two branches that
//! meet at a shared ancestor (a diamond) are not a cycle.

use crate::error::{RoleError, RoleResult};
use crate::hierarchy::types::Role;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{trace, warn};

/// Ancestors of the root in discovery order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ancestry {
    /// Ancestor ids, each listed once, depth-first in parent-list order
    pub ids: Vec<String>,
    /// Length of the longest parent chain above the root
    pub height: usize,
}

/// Snapshot of the roles reachable from `root` via parent edges
#[derive(Debug, Clone)]
pub struct RoleGraph {
    root: String,
    roles: HashMap<String, Role>,
}

impl RoleGraph {
    pub fn new(root: Role) -> Self {
        let id = root.id.clone();
        let mut roles = HashMap::new();
        roles.insert(id.clone(), root);
        Self { root: id, roles }
    }

    pub fn root(&self) -> &Role {
        &self.roles[&self.root]
    }

    pub fn insert(&mut self, role: Role) {
        self.roles.insert(role.id.clone(), role);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.roles.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Role> {
        self.roles.get(id)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Collect the root's ancestors
    ///
    /// A parent already on the current path is a cycle; a parent deeper than
    /// `max_depth` exceeds the limit. With `detect_cycles` both abort with
    /// [`RoleError::CircularDependency`] carrying the chain from the root;
    /// without it the offending edge is skipped. Parents missing from the
    /// graph are orphaned references and are skipped.
    pub fn ancestors(&self, max_depth: usize, detect_cycles: bool) -> RoleResult<Ancestry> {
        let mut walk = Walk {
            graph: self,
            max_depth,
            detect_cycles,
            path: Vec::new(),
            collected: Vec::new(),
            seen: HashSet::new(),
            finished: HashMap::new(),
        };
        let height = walk.visit(&self.root, 0)?;
        Ok(Ancestry {
            ids: walk.collected.into_iter().map(str::to_string).collect(),
            height,
        })
    }

    /// First cycle reachable from the root, as a closed id chain
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut path = Vec::new();
        let mut clean = HashSet::new();
        self.cycle_from(&self.root, &mut path, &mut clean)
    }

    fn cycle_from<'g>(
        &'g self,
        id: &'g str,
        path: &mut Vec<&'g str>,
        clean: &mut HashSet<&'g str>,
    ) -> Option<Vec<String>> {
        let role = self.roles.get(id)?;
        path.push(id);
        for parent in &role.parent_roles {
            let parent = parent.as_str();
            if !self.contains(parent) || clean.contains(parent) {
                continue;
            }
            if path.contains(&parent) {
                return Some(closed_chain(path, parent));
            }
            if let Some(chain) = self.cycle_from(parent, path, clean) {
                return Some(chain);
            }
        }
        path.pop();
        clean.insert(id);
        None
    }

    /// Shortest parent-edge path from the root to `target`, both ends included
    pub fn path_to(&self, target: &str) -> Option<Vec<String>> {
        let mut previous: HashMap<&str, &str> = HashMap::new();
        let mut queue = VecDeque::from([self.root.as_str()]);

        while let Some(id) = queue.pop_front() {
            let Some(role) = self.roles.get(id) else {
                continue;
            };
            for parent in &role.parent_roles {
                let parent = parent.as_str();
                if parent == self.root || previous.contains_key(parent) {
                    continue;
                }
                previous.insert(parent, id);
                if parent == target {
                    let mut chain = vec![parent.to_string()];
                    let mut cursor = parent;
                    while let Some(&prev) = previous.get(cursor) {
                        chain.push(prev.to_string());
                        cursor = prev;
                    }
                    chain.reverse();
                    return Some(chain);
                }
                queue.push_back(parent);
            }
        }
        None
    }
}

fn closed_chain(path: &[&str], repeated: &str) -> Vec<String> {
    path.iter()
        .copied()
        .chain(std::iter::once(repeated))
        .map(str::to_string)
        .collect()
}

struct Walk<'g> {
    graph: &'g RoleGraph,
    max_depth: usize,
    detect_cycles: bool,
    path: Vec<&'g str>,
    collected: Vec<&'g str>,
    seen: HashSet<&'g str>,
    /// Fully explored roles: (height, shallowest depth reached at)
    finished: HashMap<&'g str, (usize, usize)>,
}

impl<'g> Walk<'g> {
    fn visit(&mut self, id: &'g str, depth: usize) -> RoleResult<usize> {
        let Some(role) = self.graph.get(id) else {
            return Ok(0);
        };
        self.path.push(id);

        let mut height = 0;
        for parent in &role.parent_roles {
            let parent = parent.as_str();
            if !self.graph.contains(parent) {
                trace!(role_id = id, parent_id = parent, "Skipping orphaned parent reference");
                continue;
            }

            if self.path.contains(&parent) {
                let chain = closed_chain(&self.path, parent);
                if self.detect_cycles {
                    return Err(RoleError::cycle(chain));
                }
                warn!(chain = %chain.join(" -> "), "Skipping cyclic parent edge");
                continue;
            }

            let parent_depth = depth + 1;
            if parent_depth > self.max_depth {
                if self.detect_cycles {
                    let chain = closed_chain(&self.path, parent);
                    return Err(RoleError::max_depth(chain, parent_depth, self.max_depth));
                }
                continue;
            }

            if self.seen.insert(parent) {
                self.collected.push(parent);
            }

            let parent_height = match self.finished.get(parent).copied() {
                // Acyclic below; re-walk only to report an overflowing chain
                Some((h, _)) if self.detect_cycles && parent_depth + h <= self.max_depth => h,
                // Already explored from at least this high up
                Some((h, reached)) if !self.detect_cycles && reached <= parent_depth => h,
                _ => self.visit(parent, parent_depth)?,
            };
            height = height.max(parent_height + 1);
        }

        self.path.pop();
        let reached = match self.finished.get(id) {
            Some(&(_, reached)) => reached.min(depth),
            None => depth,
        };
        self.finished.insert(id, (height, reached));
        Ok(height)
    }
}
