use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::tree::Tree;

pub fn load_trees(path: &Path) -> Result<Vec<Tree>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read tree file: {}", path.display()))?;

    let trees = parse_newick(&raw)
        .with_context(|| format!("failed to parse tree file: {}", path.display()))?;

    if trees.is_empty() {
        bail!("tree file did not contain any trees: {}", path.display());
    }

    Ok(trees)
}

/// Parse every `;`-terminated Newick statement in `raw`.
pub fn parse_newick(raw: &str) -> Result<Vec<Tree>> {
    if is_nexus(raw) {
        bail!("NEXUS files are not supported; export the trees as Newick first");
    }

    let mut trees = Vec::new();
    for chunk in statements(raw) {
        let candidate = chunk.trim();
        if candidate.is_empty() {
            continue;
        }

        let mut tree = Tree::from_newick(candidate)?;
        tree.id = trees.len();
        trees.push(tree);
    }

    Ok(trees)
}

/// `;`-terminated statements of `raw`. Semicolons inside quoted labels and
/// `[...]` comments do not end a statement; an unterminated trailer is dropped.
fn statements(raw: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut comment = false;

    for (index, c) in raw.char_indices() {
        match c {
            '\'' if !comment => quoted = !quoted,
            '[' if !quoted => comment = true,
            ']' if !quoted => comment = false,
            ';' if !quoted && !comment => {
                out.push(&raw[start..=index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    out
}

fn is_nexus(raw: &str) -> bool {
    raw.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .is_some_and(|line| line.to_ascii_uppercase().starts_with("#NEXUS"))
}

/// Write trees as Newick, one statement per line.
pub fn save_trees(trees: &[Tree], path: &Path) -> Result<()> {
    let mut out = String::new();
    for tree in trees {
        out.push_str(&tree.to_newick());
        out.push('\n');
    }
    fs::write(path, out).with_context(|| format!("failed to write tree file: {}", path.display()))
}

/// `path` with `suffix` appended to its full file name.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = OsString::from(path.as_os_str());
    raw.push(suffix);
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_newick() {
        let trees = parse_newick("(A:0.1,B:0.2);").unwrap();
        assert_eq!(trees.len(), 1);
        let tree = &trees[0];
        assert_eq!(tree.to_newick(), "(A:0.1,B:0.2);");
        assert_eq!(tree.leaf_count(), 2);
        assert!(tree.root.is_some());
    }

    #[test]
    fn parses_multiple_newick() {
        let trees = parse_newick("(A:0.1,B:0.2);\n(C:0.3,D:0.4);\n").unwrap();
        assert_eq!(trees.len(), 2);
        assert_eq!(trees[1].id, 1);
    }

    #[test]
    fn ignores_unterminated_trailer() {
        let trees = parse_newick("(A,B);\n(C,D)").unwrap();
        assert_eq!(trees.len(), 1);
    }

    #[test]
    fn rejects_nexus() {
        let err = parse_newick("#NEXUS\nBEGIN TREES;\nTREE t = (A,B);\nEND;").unwrap_err();
        assert!(err.to_string().contains("NEXUS"));
    }

    #[test]
    fn load_reports_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.nwk");
        fs::write(&path, "\n").unwrap();
        let err = load_trees(&path).unwrap_err();
        assert!(err.to_string().contains("did not contain any trees"));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.nwk");
        let trees = parse_newick("((A:1,B:2)95:0.5,C:3);").unwrap();
        save_trees(&trees, &path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "((A:1,B:2)95:0.5,C:3);\n"
        );
        assert_eq!(load_trees(&path).unwrap().len(), 1);
    }

    #[test]
    fn quoted_labels_survive_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quoted.nwk");
        let source = "(('G1_Homo sapiens':1,'it''s; odd':1)90:1,G3:3);\n('a b',C);\n";
        let trees = parse_newick(source).unwrap();
        assert_eq!(trees.len(), 2);

        save_trees(&trees, &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), source);

        let reloaded = load_trees(&path).unwrap();
        assert!(reloaded[0].find_by_name("it's; odd").is_some());
        assert!(reloaded[1].find_by_name("a b").is_some());
    }

    #[test]
    fn suffix_is_appended_to_file_name() {
        assert_eq!(
            with_suffix(Path::new("dir/tree.nwk"), ".midpoint_rooted"),
            PathBuf::from("dir/tree.nwk.midpoint_rooted")
        );
    }
}
