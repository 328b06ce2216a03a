use std::path::Path;

use anyhow::{anyhow, Context, Result};
use log::debug;
use svg::node::element::{Circle, Group, Path as SvgPath, Rectangle, Text};
use svg::Document;

use crate::tree::layout::{TreeLayout, TreeLayoutType};
use crate::tree::style::{support_color, RenderStyle, SpeciesColors};
use crate::tree::Tree;

/// Width of the drawing in SVG user units; the physical size comes from
/// `RenderStyle::width_mm`.
const CANVAS_WIDTH: f32 = 1000.0;
const MARGIN: f32 = 20.0;
const ROW_SPACING: f32 = 14.0;
const LABEL_GAP: f32 = 4.0;
const BRANCH_STROKE_WIDTH: f32 = 1.0;

/// Approximate rendered width of a label, used to reserve room for tips.
fn label_extent(tree: &Tree, style: &RenderStyle) -> f32 {
    let longest = tree
        .leaves()
        .iter()
        .filter_map(|leaf| leaf.name.as_ref())
        .map(|name| name.chars().count())
        .max()
        .unwrap_or(0);
    longest as f32 * style.font_size * 0.6 + LABEL_GAP
}

struct Canvas {
    height: f32,
    scale_x: f32,
    scale_y: f32,
    offset: (f32, f32),
}

impl Canvas {
    fn fit(layout: &TreeLayout, label_space: f32) -> Self {
        match layout.layout_type {
            TreeLayoutType::Rectangular => {
                let inner_width = (CANVAS_WIDTH - 2.0 * MARGIN - label_space).max(1.0);
                let rows = layout.leaf_count.saturating_sub(1).max(1) as f32;
                Self {
                    height: 2.0 * MARGIN + rows * ROW_SPACING,
                    scale_x: inner_width / layout.width,
                    scale_y: rows * ROW_SPACING / layout.height,
                    offset: (MARGIN, MARGIN),
                }
            }
            TreeLayoutType::Circular => {
                let border = MARGIN + label_space;
                let inner = (CANVAS_WIDTH - 2.0 * border).max(1.0);
                let scale = inner / layout.width.max(layout.height);
                Self {
                    height: layout.height * scale + 2.0 * border,
                    scale_x: scale,
                    scale_y: scale,
                    offset: (border, border),
                }
            }
        }
    }

    fn map(&self, pos: (f32, f32)) -> (f32, f32) {
        (
            self.offset.0 + pos.0 * self.scale_x,
            self.offset.1 + pos.1 * self.scale_y,
        )
    }
}

/// Build the SVG document for a tree: branches, support markers on internal
/// nodes and tip labels coloured by species.
pub fn render_svg(tree: &Tree, style: &RenderStyle) -> Result<Document> {
    let layout = TreeLayout::from_tree(tree, style.layout)
        .ok_or_else(|| anyhow!("tree {} has no root to lay out", tree.id + 1))?;

    let palette = SpeciesColors::assign(tree, style, &mut style.rng());
    debug!(
        "Assigned colours to {} species for tree #{}",
        palette.len(),
        tree.id + 1
    );

    let canvas = Canvas::fit(&layout, label_extent(tree, style));
    let height_mm = style.width_mm * canvas.height / CANVAS_WIDTH;

    let mut document = Document::new()
        .set("width", format!("{}mm", style.width_mm))
        .set("height", format!("{:.2}mm", height_mm))
        .set("viewBox", (0.0, 0.0, CANVAS_WIDTH, canvas.height));

    let background = Rectangle::new()
        .set("width", "100%")
        .set("height", "100%")
        .set("fill", "white");
    document = document.add(background);

    let mut branch_group = Group::new()
        .set("id", "branches")
        .set("fill", "none")
        .set("stroke", "black")
        .set("stroke-width", BRANCH_STROKE_WIDTH);
    for branch in &layout.branches {
        let mut path_data = String::new();
        for (i, point) in branch.points.iter().enumerate() {
            let (x, y) = canvas.map(*point);
            let command = if i == 0 { 'M' } else { 'L' };
            path_data.push_str(&format!("{command} {x:.2} {y:.2} "));
        }
        branch_group = branch_group.add(SvgPath::new().set("d", path_data.trim_end()));
    }
    document = document.add(branch_group);

    let mut support_group = Group::new().set("id", "support");
    for node in tree.internal_nodes() {
        let Some(support) = node.support else {
            continue;
        };
        let (x, y) = canvas.map(layout.positions[node.id]);
        let circle = Circle::new()
            .set("cx", x)
            .set("cy", y)
            .set("r", style.node_size / 2.0)
            .set("fill", support_color(support));
        support_group = support_group.add(circle);
    }
    document = document.add(support_group);

    let mut label_group = Group::new()
        .set("id", "labels")
        .set("font-family", style.font_family.as_str())
        .set("font-size", style.font_size);
    for leaf in tree.leaves() {
        let Some(name) = leaf.name.as_deref() else {
            continue;
        };
        let (x, y) = canvas.map(layout.positions[leaf.id]);
        let text = Text::new("")
            .set("fill", palette.leaf_color(name, style))
            .set("dominant-baseline", "middle")
            .add(svg::node::Text::new(name));

        let text = match layout.angle(leaf.id) {
            Some(angle) => {
                let (dx, dy) = (angle.cos(), angle.sin());
                let anchor_x = x + dx * LABEL_GAP;
                let anchor_y = y + dy * LABEL_GAP;
                // keep text upright on the left half of the circle
                let (rotation, anchor) = if dx < 0.0 {
                    (angle.to_degrees() + 180.0, "end")
                } else {
                    (angle.to_degrees(), "start")
                };
                text.set("x", anchor_x)
                    .set("y", anchor_y)
                    .set("text-anchor", anchor)
                    .set(
                        "transform",
                        format!("rotate({rotation:.2} {anchor_x:.2} {anchor_y:.2})"),
                    )
            }
            None => text
                .set("x", x + LABEL_GAP)
                .set("y", y)
                .set("text-anchor", "start"),
        };
        label_group = label_group.add(text);
    }
    document = document.add(label_group);

    Ok(document)
}

/// Export tree to SVG format
pub fn export_svg(tree: &Tree, style: &RenderStyle, path: &Path) -> Result<()> {
    let document = render_svg(tree, style)?;
    svg::save(path, &document)
        .with_context(|| format!("failed to save SVG: {}", path.display()))
}
