//! Replace gene identifiers in Newick text with full names taken from a list of
//! sequence headers.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use regex::{Captures, Regex};

use crate::io;
use crate::tree::newick_label;

/// Marker character that opens a sequence header line.
pub const HEADER_MARKER: char = '>';

/// Suffix appended to the tree path for the renamed copy.
pub const NAMES_SUFFIX: &str = ".names";

// Bracketed comment | quoted label | bare label token.
static LABEL_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[[^\]]*\]|'((?:[^']|'')*)'|[^()\[\],:;'\s]+").unwrap()
});

/// Identifier/full-name pair derived from a single header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierRecord {
    pub id: String,
    pub name: String,
}

/// Derive the identifier and display name from a header line.
///
/// The identifier is the header without its leading marker, cut at the first
/// underscore. The name is the header without its leading marker and with every
/// `/` removed.
pub fn extract_record(header: &str) -> IdentifierRecord {
    let body = header.strip_prefix(HEADER_MARKER).unwrap_or(header);

    let id = match body.find('_') {
        Some(cut) => &body[..cut],
        None => body,
    };
    let name: String = body.chars().filter(|c| *c != '/').collect();

    IdentifierRecord {
        id: id.to_owned(),
        name,
    }
}

/// Insertion-ordered identifier lookup. Re-inserting an id replaces its name
/// but keeps its original position.
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    entries: Vec<IdentifierRecord>,
    index: HashMap<String, usize>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a record, returning the name it replaced.
    pub fn insert(&mut self, record: IdentifierRecord) -> Option<String> {
        match self.index.get(&record.id) {
            Some(&slot) => Some(std::mem::replace(
                &mut self.entries[slot].name,
                record.name,
            )),
            None => {
                self.index.insert(record.id.clone(), self.entries.len());
                self.entries.push(record);
                None
            }
        }
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Option<&str> {
        self.index
            .get(id)
            .map(|&slot| self.entries[slot].name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IdentifierRecord> {
        self.entries.iter()
    }

    /// Build a table from header lines in order, skipping blank lines.
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut table = Self::new();
        for line in lines {
            let header = line.trim();
            if header.is_empty() {
                continue;
            }
            let record = extract_record(header);
            if let Some(previous) = table.insert(record.clone()) {
                debug!(
                    "Identifier {} redefined: {} -> {}",
                    record.id, previous, record.name
                );
            }
        }
        table
    }
}

pub fn build_name_table(path: &Path) -> Result<NameTable> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read names file: {}", path.display()))?;
    Ok(NameTable::from_lines(raw.lines()))
}

/// Tree text after substitution, with what did and did not match.
#[derive(Debug, Clone, Default)]
pub struct RenamedText {
    pub text: String,
    pub replaced: usize,
    pub unmatched_labels: Vec<String>,
    pub unused_ids: Vec<String>,
}

/// Replace every label token that equals a table id with the mapped name.
///
/// Tokens are bounded by Newick delimiters, so an id never matches inside a
/// longer label. Branch lengths and `[...]` comments are left alone, and
/// inserted names are not scanned again.
pub fn rename_text(table: &NameTable, text: &str) -> RenamedText {
    let mut replaced = 0;
    let mut used: HashSet<&str> = HashSet::new();
    let mut unmatched_labels = Vec::new();

    let renamed = LABEL_TOKEN.replace_all(text, |caps: &Captures<'_>| {
        let whole = &caps[0];
        if whole.starts_with('[') {
            return whole.to_owned();
        }

        let (label, quoted) = match caps.get(1) {
            Some(inner) => (inner.as_str().replace("''", "'"), true),
            None => {
                let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
                if text[..start].trim_end().ends_with(':') {
                    return whole.to_owned();
                }
                (whole.to_owned(), false)
            }
        };

        match table.index.get_key_value(label.as_str()) {
            Some((id, &slot)) => {
                replaced += 1;
                used.insert(id.as_str());
                let name = &table.entries[slot].name;
                if quoted {
                    format!("'{}'", name.replace('\'', "''"))
                } else {
                    newick_label(name).into_owned()
                }
            }
            None => {
                if label.parse::<f64>().is_err() {
                    unmatched_labels.push(label);
                }
                whole.to_owned()
            }
        }
    });

    let unused_ids = table
        .iter()
        .filter(|record| !used.contains(record.id.as_str()))
        .map(|record| record.id.clone())
        .collect();

    RenamedText {
        text: renamed.into_owned(),
        replaced,
        unmatched_labels,
        unused_ids,
    }
}

pub fn names_output_path(tree_path: &Path) -> PathBuf {
    io::with_suffix(tree_path, NAMES_SUFFIX)
}

#[derive(Debug, Clone)]
pub struct RenameReport {
    pub output: PathBuf,
    pub table_size: usize,
    pub replaced: usize,
    pub unmatched_labels: Vec<String>,
    pub unused_ids: Vec<String>,
}

/// Rename identifiers in `tree_path` using headers from `names_path` and
/// write the result next to the tree file with a `.names` suffix.
pub fn rename_tree(names_path: &Path, tree_path: &Path) -> Result<RenameReport> {
    let table = build_name_table(names_path)?;
    let raw = fs::read_to_string(tree_path)
        .with_context(|| format!("failed to read tree file: {}", tree_path.display()))?;

    let renamed = rename_text(&table, &raw);

    let output = names_output_path(tree_path);
    fs::write(&output, &renamed.text)
        .with_context(|| format!("failed to write renamed tree: {}", output.display()))?;

    info!(
        "Replaced {} label(s) using {} identifier(s); wrote {}",
        renamed.replaced,
        table.len(),
        output.display()
    );
    if !renamed.unmatched_labels.is_empty() {
        warn!(
            "{} label(s) in {} have no entry in {}",
            renamed.unmatched_labels.len(),
            tree_path.display(),
            names_path.display()
        );
        for label in &renamed.unmatched_labels {
            debug!("No name for label {label}");
        }
    }
    for id in &renamed.unused_ids {
        warn!("Identifier {id} does not occur in {}", tree_path.display());
    }

    Ok(RenameReport {
        output,
        table_size: table.len(),
        replaced: renamed.replaced,
        unmatched_labels: renamed.unmatched_labels,
        unused_ids: renamed.unused_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(lines: &[&str]) -> NameTable {
        NameTable::from_lines(lines.iter().copied())
    }

    #[test]
    fn extracts_id_and_name() {
        let record = extract_record(">GENE1_isoformA/v2");
        assert_eq!(record.id, "GENE1");
        assert_eq!(record.name, "GENE1_isoformAv2");

        let record = extract_record(">Human_001/a");
        assert_eq!(record.id, "Human");
        assert_eq!(record.name, "Human_001a");
    }

    #[test]
    fn extract_without_marker_or_separators_is_noop() {
        let record = extract_record("plain");
        assert_eq!(record.id, "plain");
        assert_eq!(record.name, "plain");

        let record = extract_record(">a/b/c");
        assert_eq!(record.id, "a/b/c");
        assert_eq!(record.name, "abc");
    }

    #[test]
    fn unique_ids_give_one_entry_each() {
        let table = table(&[">A_1", ">B_2", ">C_3"]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.get("B"), Some("B_2"));
    }

    #[test]
    fn duplicate_ids_keep_last_value_and_first_position() {
        let table = table(&[">A_first", ">B_x", ">A_second"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("A"), Some("A_second"));
        let order: Vec<&str> = table.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(order, vec!["A", "B"]);
    }

    #[test]
    fn blank_lines_and_trailing_whitespace_are_ignored() {
        let table = table(&["", ">A_1/x  \r", "   "]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("A"), Some("A_1x"));
    }

    #[test]
    fn replaces_whole_labels_only() {
        let table = table(&[">Human_001/a", ">Mouse_002/b"]);
        let renamed = rename_text(&table, "(Human:0.1,Mouse:0.2);");
        assert_eq!(renamed.text, "(Human_001a:0.1,Mouse_002b:0.2);");
        assert_eq!(renamed.replaced, 2);
        assert!(renamed.unused_ids.is_empty());

        let untouched = "(Human_001:0.1,Mouse_002:0.2);";
        let renamed = rename_text(&table, untouched);
        assert_eq!(renamed.text, untouched);
        assert_eq!(renamed.replaced, 0);
        assert_eq!(renamed.unused_ids, vec!["Human", "Mouse"]);
        assert_eq!(renamed.unmatched_labels, vec!["Human_001", "Mouse_002"]);
    }

    #[test]
    fn prefix_ids_do_not_collide() {
        let table = table(&[">AT1_x", ">AT10_y"]);
        let renamed = rename_text(&table, "(AT1:1,AT10:2)AT1:0.5;");
        assert_eq!(renamed.text, "(AT1_x:1,AT10_y:2)AT1_x:0.5;");
    }

    #[test]
    fn inserted_names_are_not_rescanned() {
        // B's name contains A's id as a full token once substituted
        let table = table(&[">B_A", ">A_z"]);
        let renamed = rename_text(&table, "(A,B);");
        assert_eq!(renamed.text, "(A_z,B_A);");
    }

    #[test]
    fn branch_lengths_and_comments_are_preserved() {
        let table = table(&[">1_one", ">x_ex"]);
        let renamed = rename_text(&table, "(x:1,y: 1)[x 1]1;");
        assert_eq!(renamed.text, "(x_ex:1,y: 1)[x 1]1_one;");
    }

    #[test]
    fn quoted_labels_are_matched_on_their_content() {
        let table = table(&[">Q_quoted/name"]);
        let renamed = rename_text(&table, "('Q':1,R:2);");
        assert_eq!(renamed.text, "('Q_quotedname':1,R:2);");
    }

    #[test]
    fn names_with_delimiters_are_quoted() {
        let table = table(&[">G1_Homo sapiens"]);
        let renamed = rename_text(&table, "(G1,G2);");
        assert_eq!(renamed.text, "('G1_Homo sapiens',G2);");
    }

    #[test]
    fn multi_line_files_are_fully_renamed() {
        let table = table(&[">A_1", ">B_2"]);
        let renamed = rename_text(&table, "(A,C);\n(B,C);\n");
        assert_eq!(renamed.text, "(A_1,C);\n(B_2,C);\n");
    }

    #[test]
    fn output_names_match_input_ids() {
        let table = table(&[">A_1", ">B_2", ">C_3"]);
        let input = "((A:1,B:1):1,D:2);";
        let renamed = rename_text(&table, input);
        for record in table.iter() {
            if renamed.text.contains(&record.name) {
                assert!(input.contains(&record.id));
            }
        }
        assert_eq!(renamed.unused_ids, vec!["C"]);
    }

    #[test]
    fn output_path_appends_suffix() {
        assert_eq!(
            names_output_path(Path::new("trees/a.nwk")),
            PathBuf::from("trees/a.nwk.names")
        );
    }

    #[test]
    fn rename_tree_writes_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let names = dir.path().join("ids.txt");
        let tree = dir.path().join("tree.nwk");
        fs::write(&names, ">Human_001/a\n>Mouse_002/b\n").unwrap();
        fs::write(&tree, "(Human:0.1,Mouse:0.2);\n").unwrap();

        let report = rename_tree(&names, &tree).unwrap();
        assert_eq!(report.output, dir.path().join("tree.nwk.names"));
        assert_eq!(report.table_size, 2);
        assert_eq!(report.replaced, 2);
        let first = fs::read(&report.output).unwrap();
        assert_eq!(first, b"(Human_001a:0.1,Mouse_002b:0.2);\n");

        rename_tree(&names, &tree).unwrap();
        let second = fs::read(&report.output).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_names_file_copies_tree_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let names = dir.path().join("empty.txt");
        let tree = dir.path().join("tree.nwk");
        let content = "((A:1,B:2)90:0.5,C:3);\n";
        fs::write(&names, "").unwrap();
        fs::write(&tree, content).unwrap();

        let report = rename_tree(&names, &tree).unwrap();
        assert_eq!(fs::read_to_string(report.output).unwrap(), content);
        assert_eq!(report.replaced, 0);
    }

    #[test]
    fn missing_inputs_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("tree.nwk");
        fs::write(&tree, "(A,B);").unwrap();

        let err = rename_tree(&dir.path().join("missing.txt"), &tree).unwrap_err();
        assert!(err.to_string().contains("failed to read names file"));

        let names = dir.path().join("ids.txt");
        fs::write(&names, ">A_1").unwrap();
        let err = rename_tree(&names, &dir.path().join("missing.nwk")).unwrap_err();
        assert!(err.to_string().contains("failed to read tree file"));
    }
}
