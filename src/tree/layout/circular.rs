use super::rectangular::{self, RectangularLayoutData};
use super::{bounding_box, Branch, NodeId, Tree, TreeLayout, TreeLayoutType};

const ARC_SEGMENTS: usize = 10;

pub(super) fn build(tree: &Tree) -> Option<TreeLayout> {
    let root_id = tree.root?;
    let RectangularLayoutData {
        positions,
        edges,
        tip_count,
        ..
    } = rectangular::compute_base(tree)?;

    // Leave a gap between the first and last tip.
    let angular_range = std::f32::consts::TAU * 0.9;
    let start_angle = std::f32::consts::PI;

    let mut angles = vec![0.0f32; positions.len()];
    compute_node_angles(
        tree,
        root_id,
        &positions,
        tip_count,
        angular_range,
        start_angle,
        &mut angles,
    );

    // The phylogram x coordinate becomes the radius.
    let polar = |radius: f32, angle: f32| (radius * angle.cos(), radius * angle.sin());

    let mut polar_positions: Vec<(f32, f32)> = positions
        .iter()
        .zip(&angles)
        .map(|(&(x, _), &angle)| polar(x, angle))
        .collect();

    let mut branches: Vec<Branch> = edges
        .iter()
        .map(|&(parent, child)| {
            let parent_radius = positions[parent].0;
            let child_radius = positions[child].0;
            let parent_angle = angles[parent];
            let child_angle = angles[child];

            let mut points = vec![
                polar(child_radius, child_angle),
                polar(parent_radius, child_angle),
            ];
            let angle_step = (parent_angle - child_angle) / ARC_SEGMENTS as f32;
            for step in 1..ARC_SEGMENTS {
                points.push(polar(parent_radius, child_angle + angle_step * step as f32));
            }
            points.push(polar(parent_radius, parent_angle));

            Branch { points }
        })
        .collect();

    let all_points: Vec<(f32, f32)> = polar_positions
        .iter()
        .copied()
        .chain(branches.iter().flat_map(|branch| branch.points.iter().copied()))
        .collect();
    let (min_x, max_x, min_y, max_y) = bounding_box(&all_points);

    for pos in polar_positions
        .iter_mut()
        .chain(branches.iter_mut().flat_map(|branch| branch.points.iter_mut()))
    {
        pos.0 -= min_x;
        pos.1 -= min_y;
    }

    Some(TreeLayout {
        positions: polar_positions,
        branches,
        angles,
        width: (max_x - min_x).abs().max(1e-6),
        height: (max_y - min_y).abs().max(1e-6),
        leaf_count: tip_count,
        layout_type: TreeLayoutType::Circular,
    })
}

/// Tips are spread evenly over the angular range; an internal node takes the
/// middle of its children's span.
fn compute_node_angles(
    tree: &Tree,
    node_id: NodeId,
    positions: &[(f32, f32)],
    tip_count: usize,
    angular_range: f32,
    start_angle: f32,
    node_angles: &mut [f32],
) -> (f32, f32) {
    let node = &tree.nodes[node_id];

    if node.children.is_empty() {
        let y_pos = positions[node_id].1;
        let angle = if tip_count > 1 {
            start_angle - (y_pos / (tip_count - 1) as f32) * angular_range
        } else {
            start_angle
        };
        node_angles[node_id] = angle;
        return (angle, angle);
    }

    let mut min_angle = f32::INFINITY;
    let mut max_angle = f32::NEG_INFINITY;
    for &child_id in &node.children {
        let (child_min, child_max) = compute_node_angles(
            tree,
            child_id,
            positions,
            tip_count,
            angular_range,
            start_angle,
            node_angles,
        );
        min_angle = min_angle.min(child_min);
        max_angle = max_angle.max(child_max);
    }

    node_angles[node_id] = (min_angle + max_angle) * 0.5;
    (min_angle, max_angle)
}
