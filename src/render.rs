//! Human-readable output for the `inspect` and `temporal` commands.

use livewall_media::temporal::{detect_pattern, pack_nibbles};
use livewall_media::{AtomTree, FieldValue, ParsedAtom, TemporalAnalysis};
use serde::Serialize;
use std::fmt::Write;

/// Fields shown inline after an atom's header line.
const MAX_INLINE_FIELDS: usize = 6;

/// Copy of `tree` with children below `depth` removed (depth 0 keeps only
/// the top-level atoms).
pub fn prune(tree: &AtomTree, depth: Option<usize>) -> AtomTree {
    fn prune_atom(atom: &ParsedAtom, remaining: Option<usize>) -> ParsedAtom {
        let mut atom = atom.clone();
        match remaining {
            Some(0) => atom.children.clear(),
            _ => {
                let next = remaining.map(|d| d - 1);
                atom.children = atom.children.iter().map(|c| prune_atom(c, next)).collect();
            }
        }
        atom
    }

    AtomTree {
        atoms: tree.atoms.iter().map(|a| prune_atom(a, depth)).collect(),
        issues: tree.issues.clone(),
    }
}

/// Indented text listing of an atom tree.
pub fn render_tree(tree: &AtomTree) -> String {
    let mut out = String::new();
    for atom in &tree.atoms {
        render_atom(&mut out, atom, 0);
    }
    for issue in &tree.issues {
        let _ = writeln!(
            out,
            "! truncated at {}: declares {} bytes, {} available",
            issue.offset, issue.declared, issue.available
        );
    }
    out
}

fn render_atom(out: &mut String, atom: &ParsedAtom, level: usize) {
    let indent = "  ".repeat(level);
    let _ = write!(
        out,
        "{}{} @{} size={}",
        indent, atom.atom_type, atom.offset, atom.size
    );
    if let Some(version) = atom.version {
        let _ = write!(out, " v{}", version);
    }
    if let Some(flags) = atom.flags.filter(|&f| f != 0) {
        let _ = write!(out, " flags=0x{:x}", flags);
    }

    let summary: Vec<String> = atom
        .fields
        .iter()
        .filter(|(name, _)| !matches!(*name, "version" | "flags"))
        .take(MAX_INLINE_FIELDS)
        .map(|(name, value)| format!("{}={}", name, summarize(value)))
        .collect();
    if !summary.is_empty() {
        let _ = write!(out, " [{}]", summary.join(", "));
    }
    out.push('\n');

    for child in &atom.children {
        render_atom(out, child, level + 1);
    }
}

/// Short form of a field value.
pub fn summarize(value: &FieldValue) -> String {
    match value {
        FieldValue::U8(v) => v.to_string(),
        FieldValue::U16(v) => v.to_string(),
        FieldValue::U32(v) => v.to_string(),
        FieldValue::U64(v) => v.to_string(),
        FieldValue::I16(v) => v.to_string(),
        FieldValue::I32(v) => v.to_string(),
        FieldValue::I64(v) => v.to_string(),
        FieldValue::Bool(v) => v.to_string(),
        FieldValue::Fixed(v) => format!("{:.3}", v),
        FieldValue::Str(s) => format!("{:?}", s),
        FieldValue::Code(c) => format!("'{}'", c),
        FieldValue::Bytes(b) if b.len() <= 8 => hex::encode(b),
        FieldValue::Bytes(b) => format!("<{} bytes>", b.len()),
        FieldValue::Matrix(_) => "matrix".to_string(),
        FieldValue::Codes(c) => c.iter().map(|c| c.to_string()).collect::<Vec<_>>().join("/"),
        FieldValue::U16s(v) => list(v.len()),
        FieldValue::U32s(v) => list(v.len()),
        FieldValue::U64s(v) => list(v.len()),
        FieldValue::Records(v) => list(v.len()),
    }
}

fn list(len: usize) -> String {
    format!("[{} entries]", len)
}

/// Temporal layer summary for display or JSON.
#[derive(Debug, Serialize)]
pub struct TemporalSummary {
    pub sample_count: usize,
    pub max_temporal_id: Option<i32>,
    pub pattern: Vec<i32>,
    /// Nibble-packed pattern as written to the segment maps, in hex.
    pub packed: String,
    pub issue: Option<String>,
}

impl TemporalSummary {
    pub fn new(analysis: &TemporalAnalysis) -> Self {
        let pattern = detect_pattern(&analysis.temporal_ids).to_vec();
        Self {
            sample_count: analysis.temporal_ids.len(),
            max_temporal_id: analysis.temporal_ids.iter().copied().max(),
            packed: hex::encode(pack_nibbles(&pattern)),
            pattern,
            issue: analysis.issue.as_ref().map(ToString::to_string),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Samples: {}", self.sample_count);
        if let Some(max) = self.max_temporal_id {
            let _ = writeln!(out, "Highest temporal id: {}", max);
        }
        let pattern: Vec<String> = self.pattern.iter().map(|id| id.to_string()).collect();
        let _ = writeln!(out, "Pattern ({}): {}", self.pattern.len(), pattern.join(" "));
        let _ = writeln!(out, "Packed: {}", self.packed);
        if let Some(issue) = &self.issue {
            let _ = writeln!(out, "Incomplete: {}", issue);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livewall_media::{inspect, AnalysisIncomplete, FourCC, Registry};

    fn sample_tree() -> AtomTree {
        let stco: Vec<u8> = [0, 0, 0, 20, b's', b't', b'c', b'o', 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 9]
            .to_vec();
        let mut stbl = vec![0, 0, 0, 28];
        stbl.extend_from_slice(b"stbl");
        stbl.extend(stco);
        let mut moov = vec![0, 0, 0, 36];
        moov.extend_from_slice(b"moov");
        moov.extend(stbl);
        inspect(&moov, &Registry::standard())
    }

    #[test]
    fn test_render_tree_indents_children() {
        let text = render_tree(&sample_tree());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "moov @0 size=36");
        assert_eq!(lines[1], "  stbl @8 size=28");
        assert!(lines[2].starts_with("    stco @16 size=20 v0"));
        assert!(lines[2].contains("chunk_offsets=[1 entries]"));
    }

    #[test]
    fn test_prune_limits_depth() {
        let tree = sample_tree();
        let pruned = prune(&tree, Some(0));
        assert!(pruned.atoms[0].children.is_empty());
        let pruned = prune(&tree, Some(1));
        assert_eq!(pruned.atoms[0].children[0].atom_type, FourCC::STBL);
        assert!(pruned.atoms[0].children[0].children.is_empty());
        assert_eq!(prune(&tree, None).find(FourCC::STCO).map(|a| a.size), Some(20));
    }

    #[test]
    fn test_temporal_summary() {
        let analysis = TemporalAnalysis {
            temporal_ids: [0, 2, 1, 2].repeat(3),
            issue: Some(AnalysisIncomplete::EmptySampleToChunk),
        };
        let summary = TemporalSummary::new(&analysis);
        assert_eq!(summary.pattern, vec![0, 2, 1, 2]);
        assert_eq!(summary.packed, "1323");
        assert_eq!(summary.max_temporal_id, Some(2));
        assert!(summary.render().contains("Pattern (4): 0 2 1 2"));
    }
}
