use super::{Branch, NodeId, Tree, TreeLayout, TreeLayoutType, DEFAULT_BRANCH_LENGTH};

/// Phylogram coordinates: x is the distance from the root, y the tip row.
pub(super) struct RectangularLayoutData {
    pub positions: Vec<(f32, f32)>,
    pub edges: Vec<(NodeId, NodeId)>,
    pub max_x: f32,
    pub tip_count: usize,
}

pub(super) fn compute_base(tree: &Tree) -> Option<RectangularLayoutData> {
    let root_id = tree.root?;
    let tip_count = tree.leaf_count().max(1);

    let mut positions = vec![(0.0f32, 0.0f32); tree.nodes.len()];
    let mut edges = Vec::with_capacity(tree.nodes.len());
    let mut state = RectangularState {
        next_tip_index: 0,
        max_x: 0.0,
    };

    assign_rectangular_positions(tree, root_id, 0.0, &mut positions, &mut edges, &mut state);

    Some(RectangularLayoutData {
        positions,
        edges,
        max_x: state.max_x,
        tip_count,
    })
}

pub(super) fn build(tree: &Tree) -> Option<TreeLayout> {
    let data = compute_base(tree)?;

    let layout_height = if data.tip_count > 1 {
        (data.tip_count - 1) as f32
    } else {
        1.0
    };

    // child -> shoulder (parent x, child y) -> parent
    let branches = data
        .edges
        .iter()
        .map(|&(parent, child)| {
            let parent_pos = data.positions[parent];
            let child_pos = data.positions[child];
            let shoulder = (parent_pos.0, child_pos.1);

            let mut points = vec![child_pos];
            if shoulder != child_pos {
                points.push(shoulder);
            }
            if shoulder != parent_pos {
                points.push(parent_pos);
            }

            Branch { points }
        })
        .collect();

    Some(TreeLayout {
        positions: data.positions,
        branches,
        angles: Vec::new(),
        width: data.max_x.max(1e-6),
        height: layout_height.max(1e-6),
        leaf_count: data.tip_count,
        layout_type: TreeLayoutType::Rectangular,
    })
}

struct RectangularState {
    next_tip_index: usize,
    max_x: f32,
}

fn assign_rectangular_positions(
    tree: &Tree,
    node_id: NodeId,
    x_pos: f32,
    positions: &mut [(f32, f32)],
    edges: &mut Vec<(NodeId, NodeId)>,
    state: &mut RectangularState,
) -> f32 {
    let node = &tree.nodes[node_id];

    let y_pos = if node.children.is_empty() {
        let y = state.next_tip_index as f32;
        state.next_tip_index += 1;
        y
    } else {
        let mut first_y = f32::MAX;
        let mut last_y = f32::MIN;

        for &child_id in &node.children {
            edges.push((node_id, child_id));

            let branch_length = tree.nodes[child_id]
                .length
                .map(|value| value as f32)
                .unwrap_or(DEFAULT_BRANCH_LENGTH);
            let child_y = assign_rectangular_positions(
                tree,
                child_id,
                x_pos + branch_length,
                positions,
                edges,
                state,
            );

            first_y = first_y.min(child_y);
            last_y = last_y.max(child_y);
        }

        (first_y + last_y) / 2.0
    };

    positions[node_id] = (x_pos, y_pos);
    state.max_x = state.max_x.max(x_pos);

    y_pos
}
