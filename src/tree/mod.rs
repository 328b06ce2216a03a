use std::borrow::Cow;
use std::sync::LazyLock;

use anyhow::{anyhow, Result};
use phylotree::tree::{Node as PhyloNode, Tree as PhyloTree};
use regex::{Captures, Regex};

pub mod edit;
pub mod layout;
pub mod style;

pub type NodeId = phylotree::tree::NodeId;

/// Branch length assumed wherever a tree omits one.
pub const DEFAULT_BRANCH_LENGTH: f64 = 1.0;

// Bracketed comment | quoted label.
static QUOTED_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]|'((?:[^']|'')*)'").unwrap());

const PLACEHOLDER_PREFIX: &str = "__treekit_quoted_";
const PLACEHOLDER_SUFFIX: &str = "__";

/// Representation of a phylogenetic tree with an explicit node list.
#[derive(Debug, Clone)]
pub struct Tree {
    pub id: usize,
    pub root: Option<NodeId>,
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    pub fn new(id: usize, phylo: &PhyloTree) -> Self {
        let root = phylo.get_root().ok();
        let nodes = Self::build_nodes_from_phylo(phylo);
        Self { id, root, nodes }
    }

    /// Parse a single Newick statement.
    ///
    /// Quoted labels go through `phylotree` as bare placeholders and are
    /// restored afterwards, keeping their whitespace and delimiters.
    pub fn from_newick(newick: &str) -> Result<Self> {
        let (masked, labels) = mask_quoted_labels(newick);
        let phylo = PhyloTree::from_newick(&masked)
            .map_err(|err| anyhow!("failed to parse newick tree: {err}"))?;

        let mut tree = Self::new(0, &phylo);
        if !labels.is_empty() {
            for node in &mut tree.nodes {
                let restored = node
                    .name
                    .as_deref()
                    .and_then(|name| placeholder_label(name, &labels));
                if let Some(label) = restored {
                    node.name = (!label.is_empty()).then(|| label.to_owned());
                }
            }
        }
        Ok(tree)
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.root.and_then(|id| self.nodes.get(id))
    }

    #[cfg(test)]
    pub fn find_by_name(&self, name: &str) -> Option<&TreeNode> {
        self.nodes
            .iter()
            .find(|node| node.name.as_deref() == Some(name))
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_leaf()).count()
    }

    pub fn leaves(&self) -> Vec<&TreeNode> {
        self.nodes.iter().filter(|node| node.is_leaf()).collect()
    }

    pub fn internal_nodes(&self) -> Vec<&TreeNode> {
        self.nodes.iter().filter(|node| !node.is_leaf()).collect()
    }

    /// Leaves in the order a depth-first walk from the root meets them.
    pub fn leaves_in_order(&self) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        let Some(root) = self.root else {
            return leaves;
        };
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if node.is_leaf() {
                leaves.push(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        leaves
    }

    /// Distance from the root to every node; missing lengths count as
    /// [`DEFAULT_BRANCH_LENGTH`].
    pub fn distances_from_root(&self) -> Vec<f64> {
        let mut distances = vec![0.0; self.nodes.len()];

        fn calculate_distance(
            node_id: NodeId,
            current_distance: f64,
            nodes: &[TreeNode],
            distances: &mut [f64],
        ) {
            distances[node_id] = current_distance;

            for &child_id in &nodes[node_id].children {
                let branch_length = nodes[child_id].length.unwrap_or(DEFAULT_BRANCH_LENGTH);
                calculate_distance(child_id, current_distance + branch_length, nodes, distances);
            }
        }

        if let Some(root_id) = self.root {
            calculate_distance(root_id, 0.0, &self.nodes, &mut distances);
        }

        distances
    }

    /// Largest root-to-tip distance.
    pub fn height(&self) -> f64 {
        let distances = self.distances_from_root();
        self.nodes
            .iter()
            .filter(|node| node.is_leaf())
            .map(|node| distances[node.id])
            .fold(0.0f64, f64::max)
    }

    /// Serialise to Newick, writing internal names or, failing that, support
    /// values as internal labels.
    pub fn to_newick(&self) -> String {
        let mut out = String::new();
        if let Some(root) = self.root {
            self.write_newick(root, &mut out);
        }
        out.push(';');
        out
    }

    fn write_newick(&self, node_id: NodeId, out: &mut String) {
        let node = &self.nodes[node_id];
        if !node.children.is_empty() {
            out.push('(');
            for (index, &child) in node.children.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                self.write_newick(child, out);
            }
            out.push(')');
        }

        match (&node.name, node.support) {
            // a bare numeric internal label would read back as support
            (Some(name), _) if !node.is_leaf() && name.parse::<f64>().is_ok() => {
                out.push_str(&format!("'{name}'"))
            }
            (Some(name), _) => out.push_str(&newick_label(name)),
            (None, Some(support)) if !node.is_leaf() => out.push_str(&support.to_string()),
            _ => {}
        }

        if let Some(length) = node.length {
            out.push(':');
            out.push_str(&length.to_string());
        }
    }

    /// Drop nodes unreachable from the root and renumber the rest in preorder.
    pub(crate) fn reindex(&mut self) {
        let Some(root) = self.root else {
            self.nodes.clear();
            return;
        };

        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children.iter().rev().copied());
        }

        let mut remap: Vec<Option<NodeId>> = vec![None; self.nodes.len()];
        for (new_id, &old_id) in order.iter().enumerate() {
            remap[old_id] = Some(new_id);
        }

        let nodes = order
            .iter()
            .enumerate()
            .map(|(new_id, &old_id)| {
                let mut node = self.nodes[old_id].clone();
                node.id = new_id;
                node.parent = node.parent.and_then(|parent| remap[parent]);
                node.children = node
                    .children
                    .iter()
                    .filter_map(|&child| remap[child])
                    .collect();
                node
            })
            .collect();

        self.nodes = nodes;
        self.root = Some(0);
    }

    fn build_nodes_from_phylo(phylo: &PhyloTree) -> Vec<TreeNode> {
        let mut nodes = Vec::with_capacity(phylo.size());
        for idx in 0..phylo.size() {
            match phylo.get(&idx) {
                Ok(node) => nodes.push(TreeNode::from_phylo(node)),
                Err(_) => nodes.push(TreeNode::new(idx, None, None)),
            }
        }
        nodes
    }
}

/// Node within a phylogenetic tree. `length` and `support` describe the
/// branch above the node.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub id: NodeId,
    pub name: Option<String>,
    pub length: Option<f64>,
    pub support: Option<f64>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl TreeNode {
    pub fn new(id: NodeId, name: Option<String>, length: Option<f64>) -> Self {
        Self {
            id,
            name,
            length,
            support: None,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub(crate) fn from_phylo(node: &PhyloNode) -> Self {
        let name = node
            .name
            .as_deref()
            .map(|name| unquote_label(name).into_owned())
            .filter(|name| !name.is_empty());
        let mut tree_node = TreeNode::new(node.id, name, node.parent_edge);
        tree_node.parent = node.parent;
        tree_node.children = node.children.clone();

        // Numeric internal labels carry bootstrap support.
        if !tree_node.children.is_empty() {
            if let Some(support) = tree_node
                .name
                .as_deref()
                .and_then(|name| name.trim().parse::<f64>().ok())
            {
                tree_node.support = Some(support);
                tree_node.name = None;
            }
        }
        tree_node
    }
}

/// Quote a label for Newick output when it contains delimiters or whitespace.
pub fn newick_label(label: &str) -> Cow<'_, str> {
    let needs_quotes = label
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | ',' | ':' | ';' | '\''));
    if needs_quotes {
        Cow::Owned(format!("'{}'", label.replace('\'', "''")))
    } else {
        Cow::Borrowed(label)
    }
}

/// Strip Newick single quotes, turning `''` back into `'`.
pub fn unquote_label(label: &str) -> Cow<'_, str> {
    match label
        .strip_prefix('\'')
        .and_then(|inner| inner.strip_suffix('\''))
    {
        Some(inner) => Cow::Owned(inner.replace("''", "'")),
        None => Cow::Borrowed(label),
    }
}

/// Replace every quoted label with a bare placeholder token, returning the
/// unquoted labels in order.
fn mask_quoted_labels(newick: &str) -> (String, Vec<String>) {
    let mut labels = Vec::new();
    let masked = QUOTED_LABEL.replace_all(newick, |caps: &Captures<'_>| match caps.get(1) {
        Some(inner) => {
            let token = format!("{PLACEHOLDER_PREFIX}{}{PLACEHOLDER_SUFFIX}", labels.len());
            labels.push(inner.as_str().replace("''", "'"));
            token
        }
        None => caps[0].to_owned(),
    });
    (masked.into_owned(), labels)
}

fn placeholder_label<'a>(name: &str, labels: &'a [String]) -> Option<&'a str> {
    name.strip_prefix(PLACEHOLDER_PREFIX)?
        .strip_suffix(PLACEHOLDER_SUFFIX)?
        .parse::<usize>()
        .ok()
        .and_then(|index| labels.get(index))
        .map(String::as_str)
}
