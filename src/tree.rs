//! Hierarchical coverage model: report root → environment → unit →
//! subprogram.
//!
//! Nodes live in an arena owned by [`CoverageTree`]. Children are owned
//! top-down through name-keyed maps of [`NodeId`]s; the parent handle is a
//! plain id that is wired up in a separate pass once every document of a
//! build has been decoded (see [`CoverageTree::link_parents`]).

use std::collections::BTreeMap;

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;

use crate::model::{MetricKind, Ratio, Ratios, Scope};

/// Display name of the report root.
pub const ROOT_NAME: &str = "VectorCAST";

/// Handle to a node inside a [`CoverageTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(usize);

/// Depth of a node in the report hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Root,
    Environment,
    Unit,
    Subprogram,
}

impl From<Scope> for Level {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Environment => Level::Environment,
            Scope::Unit => Level::Unit,
            Scope::Subprogram => Level::Subprogram,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    level: Level,
    ratios: Ratios,
    failed: bool,
    parent: Option<NodeId>,
    children: BTreeMap<String, NodeId>,
}

impl Node {
    fn new(name: String, level: Level) -> Self {
        Self {
            name,
            level,
            ratios: Ratios::new(),
            failed: false,
            parent: None,
            children: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn ratios(&self) -> &Ratios {
        &self.ratios
    }

    pub fn ratio(&self, kind: MetricKind) -> &Ratio {
        &self.ratios[kind]
    }

    pub fn has_coverage(&self, kind: MetricKind) -> bool {
        self.ratios[kind].is_initialized()
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Children in name order.
    pub fn children(&self) -> impl Iterator<Item = (&str, NodeId)> + '_ {
        self.children.iter().map(|(name, &id)| (name.as_str(), id))
    }
}

/// The decoded coverage report of one build.
#[derive(Debug, Clone)]
pub struct CoverageTree {
    nodes: Vec<Node>,
    build: Option<u64>,
}

impl Default for CoverageTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CoverageTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(ROOT_NAME.to_string(), Level::Root)],
            build: None,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The build number this report belongs to, if it is attached to one.
    pub fn build(&self) -> Option<u64> {
        self.build
    }

    pub fn set_build(&mut self, number: u64) {
        self.build = Some(number);
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Root ratios, i.e. the whole-build figures.
    pub fn ratios(&self) -> &Ratios {
        &self.nodes[0].ratios
    }

    pub fn ratio(&self, kind: MetricKind) -> &Ratio {
        &self.nodes[0].ratios[kind]
    }

    pub fn is_failed(&self) -> bool {
        self.nodes[0].failed
    }

    pub(crate) fn ratio_mut(&mut self, id: NodeId, kind: MetricKind) -> &mut Ratio {
        &mut self.nodes[id.0].ratios[kind]
    }

    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.nodes[parent.0].children.get(name).copied()
    }

    /// Look a node up by its name path below the root,
    /// e.g. `["ENV", "manager.c"]`.
    pub fn find(&self, path: &[&str]) -> Option<NodeId> {
        path.iter()
            .try_fold(self.root(), |id, name| self.child(id, name))
    }

    /// Insert a fresh child under `parent`. An existing child with the same
    /// name is replaced (last write wins) and becomes unreachable.
    pub(crate) fn add_child(&mut self, parent: NodeId, name: &str, level: Level) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(name.to_string(), level));
        self.nodes[parent.0].children.insert(name.to_string(), id);
        id
    }

    /// Second construction phase: set every reachable node's parent handle,
    /// top-down from the root.
    pub fn link_parents(&mut self) {
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            let children: Vec<NodeId> = self.nodes[id.0].children.values().copied().collect();
            for child in children {
                self.nodes[child.0].parent = Some(id);
                stack.push(child);
            }
        }
        self.nodes[0].parent = None;
    }

    /// Mark a node failed and propagate the failure to every ancestor.
    pub fn set_failed(&mut self, id: NodeId) {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = &mut self.nodes[current.0];
            node.failed = true;
            cursor = node.parent;
        }
    }

    /// True if any direct child of `id` measured `kind`.
    pub fn has_children_coverage(&self, id: NodeId, kind: MetricKind) -> bool {
        self.nodes[id.0]
            .children
            .values()
            .any(|&c| self.nodes[c.0].has_coverage(kind))
    }

    /// All reachable nodes in pre-order, children visited in name order.
    pub fn walk(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.nodes[id.0].children.values().rev().copied());
        }
        out
    }

    /// Reachable nodes on the given level, in walk order.
    pub fn nodes_at(&self, level: Level) -> Vec<NodeId> {
        self.walk()
            .into_iter()
            .filter(|&id| self.nodes[id.0].level == level)
            .collect()
    }

    /// Names from the first level below the root down to `id`.
    /// Requires parents to be linked.
    pub fn path(&self, id: NodeId) -> Vec<&str> {
        let mut names = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = &self.nodes[current.0];
            if node.level != Level::Root {
                names.push(node.name.as_str());
            }
            cursor = node.parent;
        }
        names.reverse();
        names
    }

    /// Reachable failed nodes.
    pub fn failed_nodes(&self) -> Vec<NodeId> {
        self.walk()
            .into_iter()
            .filter(|&id| self.nodes[id.0].failed)
            .collect()
    }
}

/// Serializes a subtree as nested objects; used for `--json` output.
struct NodeRef<'a> {
    tree: &'a CoverageTree,
    id: NodeId,
}

impl Serialize for NodeRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let node = self.tree.node(self.id);
        let ratios: BTreeMap<&str, &Ratio> = node
            .ratios
            .iter()
            .filter(|(_, r)| r.is_initialized())
            .map(|(k, r)| (k.as_str(), r))
            .collect();
        let children: Vec<NodeRef<'_>> = node
            .children
            .values()
            .map(|&id| NodeRef {
                tree: self.tree,
                id,
            })
            .collect();

        let mut s = serializer.serialize_struct("Node", 5)?;
        s.serialize_field("name", &node.name)?;
        s.serialize_field("level", &node.level)?;
        s.serialize_field("failed", &node.failed)?;
        s.serialize_field("ratios", &ratios)?;
        s.serialize_field("children", &children)?;
        s.end()
    }
}

impl Serialize for CoverageTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        NodeRef {
            tree: self,
            id: self.root(),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CoverageTree {
        let mut tree = CoverageTree::new();
        let root = tree.root();
        let env = tree.add_child(root, "ENV", Level::Environment);
        let unit = tree.add_child(env, "manager.c", Level::Unit);
        tree.add_child(unit, "Place_Order", Level::Subprogram);
        tree.add_child(unit, "Clear_Table", Level::Subprogram);
        tree.add_child(env, "database.c", Level::Unit);
        tree.link_parents();
        tree
    }

    #[test]
    fn test_find_and_path() {
        let tree = sample();
        let sub = tree.find(&["ENV", "manager.c", "Place_Order"]).unwrap();
        assert_eq!(tree.node(sub).level(), Level::Subprogram);
        assert_eq!(tree.path(sub), vec!["ENV", "manager.c", "Place_Order"]);
        assert!(tree.find(&["ENV", "missing.c"]).is_none());
        assert_eq!(tree.find(&[]), Some(tree.root()));
    }

    #[test]
    fn test_children_are_name_ordered() {
        let tree = sample();
        let unit = tree.find(&["ENV", "manager.c"]).unwrap();
        let names: Vec<&str> = tree.node(unit).children().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Clear_Table", "Place_Order"]);

        let walk: Vec<&str> = tree.walk().iter().map(|&id| tree.node(id).name()).collect();
        assert_eq!(
            walk,
            vec![ROOT_NAME, "ENV", "database.c", "manager.c", "Clear_Table", "Place_Order"]
        );
    }

    #[test]
    fn test_set_failed_propagates_to_root() {
        let mut tree = sample();
        let sub = tree.find(&["ENV", "manager.c", "Place_Order"]).unwrap();
        tree.set_failed(sub);

        assert!(tree.node(sub).is_failed());
        assert!(tree.node(tree.find(&["ENV", "manager.c"]).unwrap()).is_failed());
        assert!(tree.node(tree.find(&["ENV"]).unwrap()).is_failed());
        assert!(tree.is_failed());
        // Siblings are untouched
        assert!(!tree.node(tree.find(&["ENV", "database.c"]).unwrap()).is_failed());
        assert!(!tree
            .node(tree.find(&["ENV", "manager.c", "Clear_Table"]).unwrap())
            .is_failed());
        assert_eq!(tree.failed_nodes().len(), 4);
    }

    #[test]
    fn test_name_collision_last_write_wins() {
        let mut tree = CoverageTree::new();
        let root = tree.root();
        let first = tree.add_child(root, "ENV", Level::Environment);
        tree.ratio_mut(first, MetricKind::Statement)
            .merge(Ratio::new(1.0, 2.0));
        let second = tree.add_child(root, "ENV", Level::Environment);
        tree.link_parents();

        assert_eq!(tree.find(&["ENV"]), Some(second));
        assert!(!tree.node(second).has_coverage(MetricKind::Statement));
        assert_eq!(tree.walk().len(), 2);
    }

    #[test]
    fn test_has_children_coverage_is_not_recursive() {
        let mut tree = sample();
        let sub = tree.find(&["ENV", "manager.c", "Place_Order"]).unwrap();
        tree.ratio_mut(sub, MetricKind::Mcdc).merge(Ratio::new(1.0, 4.0));

        let unit = tree.find(&["ENV", "manager.c"]).unwrap();
        let env = tree.find(&["ENV"]).unwrap();
        assert!(tree.has_children_coverage(unit, MetricKind::Mcdc));
        assert!(!tree.has_children_coverage(unit, MetricKind::Branch));
        assert!(!tree.has_children_coverage(env, MetricKind::Mcdc));
    }

    #[test]
    fn test_serialize_tree() {
        let mut tree = sample();
        let env = tree.find(&["ENV"]).unwrap();
        tree.ratio_mut(env, MetricKind::Statement)
            .merge(Ratio::new(3.0, 4.0));
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["name"], ROOT_NAME);
        assert_eq!(json["children"][0]["name"], "ENV");
        assert_eq!(json["children"][0]["level"], "environment");
        assert_eq!(json["children"][0]["ratios"]["statement"]["numerator"], 3.0);
        assert!(json["ratios"].as_object().unwrap().is_empty());
    }
}
