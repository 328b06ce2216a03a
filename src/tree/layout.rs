use std::fmt;

use clap::ValueEnum;

use super::{NodeId, Tree};

mod circular;
mod rectangular;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TreeLayoutType {
    Rectangular,
    #[default]
    Circular,
}

impl fmt::Display for TreeLayoutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeLayoutType::Rectangular => write!(f, "rectangular"),
            TreeLayoutType::Circular => write!(f, "circular"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TreeLayout {
    pub positions: Vec<(f32, f32)>,
    pub branches: Vec<Branch>,
    /// Direction of each node from the layout centre, in radians. Empty for
    /// rectangular layouts.
    pub angles: Vec<f32>,
    pub width: f32,
    pub height: f32,
    pub leaf_count: usize,
    pub layout_type: TreeLayoutType,
}

/// Polyline from a child up to its parent.
#[derive(Debug, Clone)]
pub struct Branch {
    pub points: Vec<(f32, f32)>,
}

pub(super) const DEFAULT_BRANCH_LENGTH: f32 = 1.0;

impl TreeLayout {
    /// Build a layout for the provided tree using the specified layout type.
    pub fn from_tree(tree: &Tree, layout_type: TreeLayoutType) -> Option<Self> {
        match layout_type {
            TreeLayoutType::Rectangular => rectangular::build(tree),
            TreeLayoutType::Circular => circular::build(tree),
        }
    }

    pub fn angle(&self, node_id: NodeId) -> Option<f32> {
        self.angles.get(node_id).copied()
    }
}

pub(super) fn bounding_box(positions: &[(f32, f32)]) -> (f32, f32, f32, f32) {
    let mut min_x = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_y = f32::NEG_INFINITY;

    for (x, y) in positions.iter() {
        if x.is_finite() {
            min_x = min_x.min(*x);
            max_x = max_x.max(*x);
        }
        if y.is_finite() {
            min_y = min_y.min(*y);
            max_y = max_y.max(*y);
        }
    }

    if !min_x.is_finite() || !max_x.is_finite() || !min_y.is_finite() || !max_y.is_finite() {
        return (-1.0, 1.0, -1.0, 1.0);
    }

    (min_x, max_x, min_y, max_y)
}
