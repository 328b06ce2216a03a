//! Structural edits: rerooting, support-based collapsing and polytomy
//! resolution. Every edit leaves the tree reindexed with the root at id 0.

use super::{NodeId, Tree, TreeNode, DEFAULT_BRANCH_LENGTH};

#[derive(Debug, Clone, Copy)]
struct Edge {
    to: NodeId,
    length: Option<f64>,
    support: Option<f64>,
}

impl Edge {
    fn weight(&self) -> f64 {
        self.length.unwrap_or(DEFAULT_BRANCH_LENGTH)
    }
}

fn add_lengths(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a + b),
        (Some(a), None) | (None, Some(a)) => Some(a),
        (None, None) => None,
    }
}

impl Tree {
    fn build_adjacency(&self) -> Vec<Vec<Edge>> {
        let mut adjacency = vec![Vec::new(); self.nodes.len()];
        for node in &self.nodes {
            if let Some(parent) = node.parent {
                adjacency[node.id].push(Edge {
                    to: parent,
                    length: node.length,
                    support: node.support,
                });
                adjacency[parent].push(Edge {
                    to: node.id,
                    length: node.length,
                    support: node.support,
                });
            }
        }
        adjacency
    }

    /// The branch holding the midpoint of the longest leaf-to-leaf path, as
    /// the node below that branch and the distance from that node.
    pub fn midpoint_outgroup(&self) -> Option<(NodeId, f64)> {
        if self.leaf_count() < 2 {
            return None;
        }

        let adjacency = self.build_adjacency();
        // a unary root has degree one but is not a tip
        let tips: Vec<bool> = self
            .nodes
            .iter()
            .map(|node| node.is_leaf() && Some(node.id) != self.root)
            .collect();
        let start = self.nodes.iter().find(|node| tips[node.id])?.id;

        let (first_leaf, _, _) = farthest_leaf(&adjacency, &tips, start);
        let (_, diameter, path) = farthest_leaf(&adjacency, &tips, first_leaf);

        if path.len() < 2 || diameter <= f64::EPSILON {
            return None;
        }

        let midpoint_distance = diameter / 2.0;
        let mut traversed = 0.0;

        for window in path.windows(2) {
            let (a, b) = (window[0], window[1]);
            let length = adjacency[a]
                .iter()
                .find(|edge| edge.to == b)
                .map(Edge::weight)
                .unwrap_or(DEFAULT_BRANCH_LENGTH);

            if traversed + length >= midpoint_distance {
                let offset = midpoint_distance - traversed;
                return if self.nodes[b].parent == Some(a) {
                    Some((b, length - offset))
                } else {
                    Some((a, offset))
                };
            }
            traversed += length;
        }

        None
    }

    /// Root the tree at the midpoint of its longest leaf-to-leaf path.
    pub fn midpoint_root(&mut self) -> bool {
        match self.midpoint_outgroup() {
            Some((child, distance)) => self.reroot_on_branch(child, distance),
            None => false,
        }
    }

    /// Insert a new root on the branch above `child`, `distance_from_child`
    /// along it, and orient the whole tree away from it.
    pub fn reroot_on_branch(&mut self, child: NodeId, distance_from_child: f64) -> bool {
        let Some(old_root) = self.effective_root() else {
            return false;
        };
        if self.is_on_root_chain(child) {
            return false;
        }
        let Some(node) = self.nodes.get(child) else {
            return false;
        };
        let Some(parent) = node.parent else {
            return false;
        };

        // Drop unary nodes above the first split; their branch leads nowhere.
        self.nodes[old_root].parent = None;
        self.root = Some(old_root);
        let node = &self.nodes[child];

        let (child_side, parent_side) = match node.length {
            Some(length) => {
                let split = distance_from_child.clamp(0.0, length);
                (Some(split), Some(length - split))
            }
            None => (None, None),
        };
        let support = node.support;

        let mut adjacency = self.build_adjacency();
        adjacency[child].retain(|edge| edge.to != parent);
        adjacency[parent].retain(|edge| edge.to != child);

        let new_root = self.nodes.len();
        self.nodes.push(TreeNode::new(new_root, None, None));
        adjacency.push(vec![
            Edge {
                to: child,
                length: child_side,
                support,
            },
            Edge {
                to: parent,
                length: parent_side,
                support,
            },
        ]);
        adjacency[child].push(Edge {
            to: new_root,
            length: child_side,
            support,
        });
        adjacency[parent].push(Edge {
            to: new_root,
            length: parent_side,
            support,
        });

        let mut visited = vec![false; self.nodes.len()];
        self.orient(new_root, None, &adjacency, &mut visited);
        self.root = Some(new_root);

        if self.nodes[old_root].children.len() == 1 {
            self.splice_out(old_root);
        }

        self.reindex();
        true
    }

    /// The root, or the first node below it with other than one child.
    fn effective_root(&self) -> Option<NodeId> {
        let mut current = self.root?;
        while let [only] = self.nodes[current].children[..] {
            current = only;
        }
        Some(current)
    }

    /// Whether `node_id` is the root or one of its single-child descendants
    /// down to and including the effective root.
    fn is_on_root_chain(&self, node_id: NodeId) -> bool {
        let mut current = self.root;
        while let Some(id) = current {
            if id == node_id {
                return true;
            }
            current = match self.nodes[id].children[..] {
                [only] => Some(only),
                _ => None,
            };
        }
        false
    }

    fn orient(
        &mut self,
        node: NodeId,
        incoming: Option<(NodeId, Edge)>,
        adjacency: &[Vec<Edge>],
        visited: &mut [bool],
    ) {
        if visited[node] {
            return;
        }
        visited[node] = true;

        let parent = incoming.map(|(parent, _)| parent);
        let outgoing: Vec<Edge> = adjacency[node]
            .iter()
            .copied()
            .filter(|edge| Some(edge.to) != parent)
            .collect();

        let entry = &mut self.nodes[node];
        entry.parent = parent;
        entry.length = incoming.and_then(|(_, edge)| edge.length);
        entry.support = incoming.and_then(|(_, edge)| edge.support);
        entry.children = outgoing.iter().map(|edge| edge.to).collect();

        for edge in outgoing {
            self.orient(edge.to, Some((node, edge)), adjacency, visited);
        }
    }

    /// Replace a single-child node by its child, merging the two branches.
    fn splice_out(&mut self, node_id: NodeId) {
        let Some(parent) = self.nodes[node_id].parent else {
            return;
        };
        let [child] = self.nodes[node_id].children[..] else {
            return;
        };

        let length = self.nodes[node_id].length;
        let merged = &mut self.nodes[child];
        merged.parent = Some(parent);
        merged.length = add_lengths(merged.length, length);

        for slot in &mut self.nodes[parent].children {
            if *slot == node_id {
                *slot = child;
            }
        }

        let removed = &mut self.nodes[node_id];
        removed.parent = None;
        removed.children.clear();
    }

    /// Remove every non-root internal node whose support is below
    /// `threshold`, attaching its children to its parent. Nodes without
    /// support are kept.
    pub fn collapse_below_support(&mut self, threshold: f64) -> usize {
        let mut removed = 0;

        for node_id in 0..self.nodes.len() {
            let node = &self.nodes[node_id];
            if node.is_leaf() || !node.support.is_some_and(|support| support < threshold) {
                continue;
            }
            let Some(parent) = node.parent else {
                continue;
            };

            let length = node.length;
            let children = std::mem::take(&mut self.nodes[node_id].children);
            for &child in &children {
                let entry = &mut self.nodes[child];
                entry.parent = Some(parent);
                entry.length = add_lengths(entry.length, length);
            }

            let siblings = &mut self.nodes[parent].children;
            if let Some(position) = siblings.iter().position(|&id| id == node_id) {
                siblings.splice(position..=position, children);
            }
            self.nodes[node_id].parent = None;
            removed += 1;
        }

        if removed > 0 {
            self.reindex();
        }
        removed
    }

    /// Split every node with more than two children into a ladder of binary
    /// nodes joined by zero-length branches.
    pub fn resolve_polytomies(&mut self) -> usize {
        let Some(root) = self.root else {
            return 0;
        };

        let mut inserted = 0;
        let mut stack = vec![root];
        while let Some(node_id) = stack.pop() {
            if self.nodes[node_id].children.len() > 2 {
                let rest = self.nodes[node_id].children.split_off(1);
                let new_id = self.nodes.len();

                let mut joint = TreeNode::new(new_id, None, Some(0.0));
                joint.parent = Some(node_id);
                for &child in &rest {
                    self.nodes[child].parent = Some(new_id);
                }
                joint.children = rest;

                self.nodes.push(joint);
                self.nodes[node_id].children.push(new_id);
                inserted += 1;
            }
            stack.extend(self.nodes[node_id].children.iter().copied());
        }

        if inserted > 0 {
            self.reindex();
        }
        inserted
    }
}

/// Farthest leaf from `start` with its distance and the path leading to it.
fn farthest_leaf(
    adjacency: &[Vec<Edge>],
    tips: &[bool],
    start: NodeId,
) -> (NodeId, f64, Vec<NodeId>) {
    let mut parents: Vec<Option<NodeId>> = vec![None; adjacency.len()];
    let mut best_node = start;
    let mut best_distance = -1.0;

    fn dfs(
        node: NodeId,
        parent: Option<NodeId>,
        distance: f64,
        adjacency: &[Vec<Edge>],
        tips: &[bool],
        parents: &mut [Option<NodeId>],
        best_node: &mut NodeId,
        best_distance: &mut f64,
    ) {
        parents[node] = parent;
        for edge in &adjacency[node] {
            if Some(edge.to) == parent {
                continue;
            }
            dfs(
                edge.to,
                Some(node),
                distance + edge.weight(),
                adjacency,
                tips,
                parents,
                best_node,
                best_distance,
            );
        }

        if tips[node] && parent.is_some() && distance > *best_distance {
            *best_distance = distance;
            *best_node = node;
        }
    }

    dfs(
        start,
        None,
        0.0,
        adjacency,
        tips,
        &mut parents,
        &mut best_node,
        &mut best_distance,
    );

    if best_distance < 0.0 {
        return (start, 0.0, vec![start]);
    }

    let mut path = vec![best_node];
    let mut current = best_node;
    while let Some(parent) = parents[current] {
        current = parent;
        path.push(current);
    }
    path.reverse();

    (best_node, best_distance, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_distance(tree: &Tree, name: &str) -> f64 {
        let distances = tree.distances_from_root();
        let node = tree.find_by_name(name).unwrap();
        distances[node.id]
    }

    fn verify_tree_consistency(tree: &Tree) {
        for node in &tree.nodes {
            for &child_id in &node.children {
                assert_eq!(
                    tree.nodes[child_id].parent,
                    Some(node.id),
                    "Child {} should have parent {}",
                    child_id,
                    node.id
                );
            }
            if let Some(parent_id) = node.parent {
                assert!(tree.nodes[parent_id].children.contains(&node.id));
            }
        }
        if let Some(root_id) = tree.root {
            assert!(tree.nodes[root_id].parent.is_none());
        }
    }

    #[test]
    fn finds_midpoint_branch() {
        let tree = Tree::from_newick("((A:1,B:1):1,C:3);").unwrap();
        let (child, distance) = tree.midpoint_outgroup().unwrap();
        assert_eq!(tree.nodes[child].name.as_deref(), Some("C"));
        assert!((distance - 2.5).abs() < 1e-9);
    }

    #[test]
    fn midpoint_root_balances_extreme_leaves() {
        let mut tree = Tree::from_newick("((A:1,B:1):1,C:3);").unwrap();
        assert!(tree.midpoint_root());
        verify_tree_consistency(&tree);

        assert_eq!(tree.root, Some(0));
        assert_eq!(tree.nodes[0].children.len(), 2);
        assert_eq!(tree.leaf_count(), 3);
        assert!((leaf_distance(&tree, "A") - 2.5).abs() < 1e-9);
        assert!((leaf_distance(&tree, "C") - 2.5).abs() < 1e-9);
        // old root spliced out
        assert_eq!(tree.nodes.len(), 5);
    }

    #[test]
    fn midpoint_root_moves_support_with_its_branch() {
        let mut tree = Tree::from_newick("(((A:1,B:1)80:1,C:1)60:1,D:6);").unwrap();
        assert!(tree.midpoint_root());
        verify_tree_consistency(&tree);

        let supports: Vec<f64> = tree.nodes.iter().filter_map(|node| node.support).collect();
        assert!(supports.contains(&80.0));
        assert!((leaf_distance(&tree, "A") - leaf_distance(&tree, "D")).abs() < 1e-9);
    }

    #[test]
    fn midpoint_root_needs_two_leaves() {
        let mut tree = Tree::from_newick("(A:1);").unwrap();
        assert!(!tree.midpoint_root());
    }

    #[test]
    fn midpoint_root_drops_unary_root() {
        let mut tree = Tree::from_newick("((A:1,B:1):5);").unwrap();
        assert!(tree.midpoint_root());
        verify_tree_consistency(&tree);

        assert_eq!(tree.leaf_count(), 2);
        assert_eq!(tree.nodes.len(), 3);
        assert!((leaf_distance(&tree, "A") - 1.0).abs() < 1e-9);
        assert!((leaf_distance(&tree, "B") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn reroot_on_dangling_root_branch_is_rejected() {
        let mut tree = Tree::from_newick("((A:1,B:1):5);").unwrap();
        let clade = tree.nodes[tree.root.unwrap()].children[0];
        let before = tree.to_newick();
        assert!(!tree.reroot_on_branch(clade, 1.0));
        assert_eq!(tree.to_newick(), before);
    }

    #[test]
    fn reroot_splits_branch_at_requested_distance() {
        let mut tree = Tree::from_newick("((A:1,B:1):1,(C:1,D:1):1);").unwrap();
        let a = tree.find_by_name("A").unwrap().id;
        assert!(tree.reroot_on_branch(a, 0.25));
        verify_tree_consistency(&tree);

        let root = tree.root().unwrap();
        assert_eq!(root.children.len(), 2);
        assert!((leaf_distance(&tree, "A") - 0.25).abs() < 1e-9);
        assert!((leaf_distance(&tree, "B") - 1.75).abs() < 1e-9);
        assert!((leaf_distance(&tree, "C") - 3.75).abs() < 1e-9);
    }

    #[test]
    fn reroot_at_root_is_rejected() {
        let mut tree = Tree::from_newick("(A:1,B:1);").unwrap();
        let root = tree.root.unwrap();
        assert!(!tree.reroot_on_branch(root, 0.0));
    }

    #[test]
    fn collapses_weak_nodes_and_keeps_lengths() {
        let mut tree = Tree::from_newick("(((A:1,B:1)30:1,C:1)90:1,D:1);").unwrap();
        let removed = tree.collapse_below_support(50.0);
        assert_eq!(removed, 1);
        verify_tree_consistency(&tree);

        assert_eq!(tree.leaf_count(), 4);
        let strong = tree
            .nodes
            .iter()
            .find(|node| node.support == Some(90.0))
            .unwrap();
        assert_eq!(strong.children.len(), 3);
        assert!((leaf_distance(&tree, "A") - 3.0).abs() < 1e-9);
    }

    #[test]
    fn collapse_keeps_nodes_without_support() {
        let mut tree = Tree::from_newick("((A:1,B:1):1,C:1);").unwrap();
        assert_eq!(tree.collapse_below_support(50.0), 0);
        assert_eq!(tree.internal_nodes().len(), 2);
    }

    #[test]
    fn resolves_polytomies_into_binary_nodes() {
        let mut tree = Tree::from_newick("(A:1,B:1,C:1,(D:1,E:1,F:1):1);").unwrap();
        let inserted = tree.resolve_polytomies();
        assert_eq!(inserted, 3);
        verify_tree_consistency(&tree);

        assert_eq!(tree.leaf_count(), 6);
        assert!(tree.nodes.iter().all(|node| node.children.len() <= 2));
        for leaf in ["A", "B", "C"] {
            assert!((leaf_distance(&tree, leaf) - 1.0).abs() < 1e-9);
        }
        assert!((leaf_distance(&tree, "F") - 2.0).abs() < 1e-9);
    }

    #[test]
    fn resolving_binary_tree_is_noop() {
        let mut tree = Tree::from_newick("((A:1,B:1):1,C:1);").unwrap();
        let before = tree.to_newick();
        assert_eq!(tree.resolve_polytomies(), 0);
        assert_eq!(tree.to_newick(), before);
    }
}
