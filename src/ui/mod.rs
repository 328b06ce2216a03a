use crate::tree::Tree;

const PREVIEW_TREES: usize = 3;
const PREVIEW_CHARS: usize = 64;

/// Print a short description of the loaded trees to stdout.
pub fn render_preview(trees: &[Tree]) {
    println!("Loaded {} tree(s).", trees.len());

    for tree in trees.iter().take(PREVIEW_TREES) {
        println!(
            "- tree #{}: {} leaves, {} nodes, height {:.4}",
            tree.id + 1,
            tree.leaf_count(),
            tree.nodes.len(),
            tree.height()
        );
        println!("  {}", preview(&tree.to_newick()));
    }

    if trees.len() > PREVIEW_TREES {
        println!(
            "... ({} more tree(s) omitted)",
            trees.len() - PREVIEW_TREES
        );
    }
}

fn preview(newick: &str) -> String {
    match newick.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &newick[..cut]),
        None => newick.to_string(),
    }
}
