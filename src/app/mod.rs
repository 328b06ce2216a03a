use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{error, info, warn};
use regex::Regex;

use crate::export::svg::export_svg;
use crate::tree::layout::TreeLayoutType;
use crate::tree::style::RenderStyle;
use crate::tree::Tree;
use crate::{io, rename, ui};

pub const MIDPOINT_SUFFIX: &str = ".midpoint_rooted";
pub const COLLAPSED_SUFFIX: &str = ".collapsed";
pub const RESOLVED_SUFFIX: &str = ".resolved_polytomies";
pub const SVG_SUFFIX: &str = ".svg";
pub const NEWICK_EXTENSION: &str = ".nwk";

#[derive(Debug, Clone, Parser)]
#[command(
    name = "treekit",
    about = "Rename, reroot, collapse and render phylogenetic trees."
)]
pub struct AppConfig {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Replace gene identifiers in a tree file with names from a header list.
    Rename {
        /// Header lines such as `>GENE1_species/1-200`, one per line.
        #[arg(value_name = "NAMES")]
        names: PathBuf,
        #[arg(value_name = "TREE_FILE")]
        tree: PathBuf,
    },

    /// Root every tree at the midpoint of its longest leaf-to-leaf path.
    Midpoint {
        #[arg(value_name = "TREE_FILE")]
        tree: PathBuf,
    },

    /// Remove internal nodes with bootstrap support below a threshold.
    Collapse {
        #[arg(value_name = "TREE_FILE")]
        tree: PathBuf,

        #[arg(short, long)]
        threshold: f64,
    },

    /// Turn multifurcations into binary splits.
    Resolve {
        #[arg(value_name = "TREE_FILE")]
        tree: PathBuf,
    },

    /// Render a tree to SVG with species-coloured leaves.
    Render {
        #[arg(value_name = "TREE_FILE")]
        tree: PathBuf,

        #[command(flatten)]
        style: StyleArgs,

        /// Output path; defaults to the tree path with `.svg` appended.
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Render every `.nwk` file in a directory.
    RenderDir {
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        #[command(flatten)]
        style: StyleArgs,
    },

    /// Print a short description of a tree file.
    Summary {
        #[arg(value_name = "TREE_FILE")]
        tree: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
pub struct StyleArgs {
    #[arg(long, value_enum, default_value_t = TreeLayoutType::Circular)]
    pub layout: TreeLayoutType,

    /// Leaves matching this regex are drawn in black as reference taxa.
    #[arg(long, value_name = "REGEX")]
    pub reference: Option<String>,

    /// Physical width of the SVG in millimetres.
    #[arg(long, default_value_t = 500.0)]
    pub width_mm: f32,

    /// Seed for species colours; random when omitted.
    #[arg(long)]
    pub seed: Option<u64>,
}

impl StyleArgs {
    pub fn to_style(&self) -> Result<RenderStyle> {
        let reference = self
            .reference
            .as_deref()
            .map(Regex::new)
            .transpose()
            .context("invalid --reference pattern")?;

        Ok(RenderStyle {
            layout: self.layout,
            width_mm: self.width_mm,
            reference,
            seed: self.seed,
            ..RenderStyle::default()
        })
    }
}

pub struct TreeKitApp;

impl TreeKitApp {
    pub fn run(config: &AppConfig) -> Result<()> {
        match &config.command {
            Command::Rename { names, tree } => {
                let report = rename::rename_tree(names, tree)?;
                println!(
                    "{}: {} label(s) renamed from {} identifier(s), {} unmatched label(s), {} unused identifier(s)",
                    report.output.display(),
                    report.replaced,
                    report.table_size,
                    report.unmatched_labels.len(),
                    report.unused_ids.len()
                );
                Ok(())
            }
            Command::Midpoint { tree } => Self::edit_trees(tree, MIDPOINT_SUFFIX, |tree| {
                if !tree.midpoint_root() {
                    warn!("Tree #{} has no midpoint to root on; left unchanged", tree.id + 1);
                }
            }),
            Command::Collapse { tree, threshold } => {
                let threshold = *threshold;
                Self::edit_trees(tree, COLLAPSED_SUFFIX, |tree| {
                    let removed = tree.collapse_below_support(threshold);
                    info!(
                        "Tree #{}: collapsed {removed} node(s) with support below {threshold}",
                        tree.id + 1
                    );
                })
            }
            Command::Resolve { tree } => Self::edit_trees(tree, RESOLVED_SUFFIX, |tree| {
                let inserted = tree.resolve_polytomies();
                info!("Tree #{}: inserted {inserted} node(s)", tree.id + 1);
            }),
            Command::Render {
                tree,
                style,
                output,
            } => {
                let style = style.to_style()?;
                let output = output
                    .clone()
                    .unwrap_or_else(|| io::with_suffix(tree, SVG_SUFFIX));
                Self::render_file(tree, &style, &output)
            }
            Command::RenderDir { dir, style } => {
                let style = style.to_style()?;
                Self::render_dir(dir, &style)
            }
            Command::Summary { tree } => {
                let trees = io::load_trees(tree)?;
                ui::render_preview(&trees);
                Ok(())
            }
        }
    }

    /// Load every tree in `path`, apply `edit` and write them next to the
    /// input with `suffix` appended.
    fn edit_trees<F>(path: &Path, suffix: &str, mut edit: F) -> Result<()>
    where
        F: FnMut(&mut Tree),
    {
        let mut trees = io::load_trees(path)?;
        for tree in &mut trees {
            edit(tree);
        }

        let output = io::with_suffix(path, suffix);
        io::save_trees(&trees, &output)?;
        info!("Wrote {} tree(s) to {}", trees.len(), output.display());
        Ok(())
    }

    fn render_file(path: &Path, style: &RenderStyle, output: &Path) -> Result<()> {
        let trees = io::load_trees(path)?;
        if trees.len() > 1 {
            warn!(
                "{} holds {} trees; rendering only the first",
                path.display(),
                trees.len()
            );
        }

        export_svg(&trees[0], style, output)?;
        info!("Rendered {} to {}", path.display(), output.display());
        Ok(())
    }

    fn render_dir(dir: &Path, style: &RenderStyle) -> Result<()> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("failed to read directory: {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.is_file() && is_newick_file(path))
            .collect();
        files.sort();

        if files.is_empty() {
            warn!("No {NEWICK_EXTENSION} files found in {}", dir.display());
            return Ok(());
        }

        let mut failures = 0;
        for path in &files {
            let output = io::with_suffix(path, SVG_SUFFIX);
            if let Err(err) = Self::render_file(path, style, &output) {
                error!("Failed to render {}: {err:#}", path.display());
                failures += 1;
            }
        }

        if failures > 0 {
            bail!("{failures} of {} tree file(s) failed to render", files.len());
        }
        Ok(())
    }
}

fn is_newick_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(NEWICK_EXTENSION))
}
