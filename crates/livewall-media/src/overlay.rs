//! Mutable overlay over a parse tree.
//!
//! Nodes live in an arena and refer to each other by [`AtomId`]. A node
//! created from the source remembers its byte range; as long as neither it
//! nor anything below it changes, serialization copies that range verbatim.
//! Everything else is re-encoded from its fields, explicit body or children.

use crate::atom::{AtomTree, FieldMap, FieldValue, FourCC, ParsedAtom};
use crate::cursor::AtomWriteExt;
use crate::parser::{AtomParser, TRAILING_DATA};
use crate::registry::Registry;
use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::ops::Range;

/// Handle to a node in an [`AtomOverlay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomId(usize);

/// One mutable atom.
#[derive(Debug, Clone)]
pub struct MutableAtom {
    pub atom_type: FourCC,
    origin: Option<Range<u64>>,
    is_container: bool,
    fields: FieldMap,
    children: Vec<AtomId>,
    gap: Option<Bytes>,
    body: Option<Bytes>,
    dirty: bool,
}

impl MutableAtom {
    fn freestanding(atom_type: FourCC, is_container: bool) -> Self {
        Self {
            atom_type,
            origin: None,
            is_container,
            fields: FieldMap::new(),
            children: Vec::new(),
            gap: None,
            body: None,
            dirty: true,
        }
    }

    /// Source range this node was parsed from, if any.
    pub fn origin(&self) -> Option<&Range<u64>> {
        self.origin.as_ref()
    }

    pub fn is_container(&self) -> bool {
        self.is_container
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn children(&self) -> &[AtomId] {
        &self.children
    }
}

/// Arena of mutable atoms backed by the original file bytes.
#[derive(Debug, Clone)]
pub struct AtomOverlay {
    source: Bytes,
    nodes: Vec<MutableAtom>,
    roots: Vec<AtomId>,
}

impl AtomOverlay {
    /// Build the overlay for a tree parsed from `source`.
    pub fn new(tree: &AtomTree, source: Bytes) -> Self {
        let mut overlay = Self {
            source,
            nodes: Vec::new(),
            roots: Vec::new(),
        };
        let source = overlay.source.clone();
        let roots = tree
            .atoms
            .iter()
            .map(|atom| overlay.adopt(atom, &source, true))
            .collect();
        overlay.roots = roots;
        overlay
    }

    /// Parse `source` and build its overlay in one step.
    pub fn parse(source: Bytes, registry: &Registry) -> (AtomTree, Self) {
        let tree = AtomParser::new(registry).parse(&source);
        let overlay = Self::new(&tree, source);
        (tree, overlay)
    }

    /// Original file bytes.
    pub fn source(&self) -> &Bytes {
        &self.source
    }

    pub fn roots(&self) -> &[AtomId] {
        &self.roots
    }

    pub fn get(&self, id: AtomId) -> &MutableAtom {
        &self.nodes[id.0]
    }

    pub fn atom_type(&self, id: AtomId) -> FourCC {
        self.nodes[id.0].atom_type
    }

    pub fn children(&self, id: AtomId) -> &[AtomId] {
        &self.nodes[id.0].children
    }

    /// First top-level atom of the given type.
    pub fn root(&self, atom_type: FourCC) -> Option<AtomId> {
        self.roots
            .iter()
            .copied()
            .find(|&id| self.atom_type(id) == atom_type)
    }

    /// First direct child of the given type.
    pub fn child(&self, parent: AtomId, atom_type: FourCC) -> Option<AtomId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&id| self.atom_type(id) == atom_type)
    }

    pub fn children_of_type(&self, parent: AtomId, atom_type: FourCC) -> Vec<AtomId> {
        self.children(parent)
            .iter()
            .copied()
            .filter(|&id| self.atom_type(id) == atom_type)
            .collect()
    }

    /// Every node of the given type at or below `id`, in pre-order.
    pub fn find_all(&self, id: AtomId, atom_type: FourCC) -> Vec<AtomId> {
        let mut found = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if self.atom_type(next) == atom_type {
                found.push(next);
            }
            stack.extend(self.children(next).iter().rev());
        }
        found
    }

    pub fn fields(&self, id: AtomId) -> &FieldMap {
        &self.nodes[id.0].fields
    }

    pub fn field(&self, id: AtomId, name: &str) -> Option<&FieldValue> {
        self.nodes[id.0].fields.get(name)
    }

    /// Mutable access to a node's fields; marks the node modified.
    pub fn fields_mut(&mut self, id: AtomId) -> &mut FieldMap {
        let node = &mut self.nodes[id.0];
        node.dirty = true;
        &mut node.fields
    }

    pub fn set_field(&mut self, id: AtomId, name: &'static str, value: FieldValue) {
        self.fields_mut(id).set(name, value);
    }

    pub fn is_dirty(&self, id: AtomId) -> bool {
        self.nodes[id.0].dirty
    }

    /// New detached leaf encoded from `fields` at serialization time.
    pub fn create_leaf(&mut self, atom_type: FourCC, fields: FieldMap) -> AtomId {
        let mut node = MutableAtom::freestanding(atom_type, false);
        node.fields = fields;
        self.push(node)
    }

    /// New detached container.
    pub fn create_container(&mut self, atom_type: FourCC, children: Vec<AtomId>) -> AtomId {
        let mut node = MutableAtom::freestanding(atom_type, true);
        node.children = children;
        self.push(node)
    }

    /// Import complete atoms from a foreign buffer as detached nodes.
    ///
    /// Leaves keep their payload bytes as an explicit body and also get
    /// decoded fields, so they can be inspected like parsed atoms.
    pub fn import(&mut self, data: &[u8], registry: &Registry) -> Vec<AtomId> {
        let tree = AtomParser::new(registry).parse(data);
        let data = Bytes::copy_from_slice(data);
        tree.atoms
            .iter()
            .map(|atom| self.adopt(atom, &data, false))
            .collect()
    }

    pub fn append_child(&mut self, parent: AtomId, child: AtomId) {
        self.insert_child(parent, usize::MAX, child);
    }

    /// Insert at `index` (clamped to the child count); marks the parent.
    pub fn insert_child(&mut self, parent: AtomId, index: usize, child: AtomId) {
        let node = &mut self.nodes[parent.0];
        let index = index.min(node.children.len());
        node.children.insert(index, child);
        node.is_container = true;
        node.dirty = true;
    }

    /// Drop children rejected by `keep`. Returns how many were removed.
    pub fn retain_children<F>(&mut self, parent: AtomId, mut keep: F) -> usize
    where
        F: FnMut(&MutableAtom) -> bool,
    {
        let kept: Vec<AtomId> = self.nodes[parent.0]
            .children
            .iter()
            .copied()
            .filter(|&id| keep(&self.nodes[id.0]))
            .collect();
        let node = &mut self.nodes[parent.0];
        let removed = node.children.len() - kept.len();
        if removed > 0 {
            node.children = kept;
            node.dirty = true;
        }
        removed
    }

    /// Stable sort of a node's children; marks the node only when the order
    /// actually changes.
    pub fn sort_children_by_key<K, F>(&mut self, parent: AtomId, mut key: F)
    where
        K: Ord,
        F: FnMut(FourCC) -> K,
    {
        let mut sorted = self.nodes[parent.0].children.clone();
        sorted.sort_by_key(|&id| key(self.nodes[id.0].atom_type));
        let node = &mut self.nodes[parent.0];
        if sorted != node.children {
            node.children = sorted;
            node.dirty = true;
        }
    }

    /// Which nodes can be copied verbatim from the source.
    ///
    /// A node qualifies when it came from the source, is not modified, and
    /// every descendant qualifies too.
    pub fn copy_plan(&self) -> Vec<bool> {
        let mut plan = vec![false; self.nodes.len()];
        for &root in &self.roots {
            self.fold_copyable(root, &mut plan);
        }
        plan
    }

    fn fold_copyable(&self, id: AtomId, plan: &mut [bool]) -> bool {
        let node = &self.nodes[id.0];
        let mut copyable = node.origin.is_some() && !node.dirty;
        for &child in &node.children {
            // Visit every child so their own entries are filled in.
            copyable &= self.fold_copyable(child, plan);
        }
        plan[id.0] = copyable;
        copyable
    }

    /// Serialize every top-level atom.
    pub fn to_bytes(&self, registry: &Registry) -> Result<BytesMut> {
        let plan = self.copy_plan();
        let mut out = BytesMut::with_capacity(self.source.len());
        for &root in &self.roots {
            self.write_atom(root, registry, &plan, &mut out)?;
        }
        Ok(out)
    }

    /// Serialize one atom and its subtree.
    pub fn atom_bytes(&self, id: AtomId, registry: &Registry) -> Result<BytesMut> {
        let plan = self.copy_plan();
        let mut out = BytesMut::new();
        self.write_atom(id, registry, &plan, &mut out)?;
        Ok(out)
    }

    pub(crate) fn write_atom(
        &self,
        id: AtomId,
        registry: &Registry,
        plan: &[bool],
        out: &mut BytesMut,
    ) -> Result<()> {
        let node = &self.nodes[id.0];
        if let (true, Some(origin)) = (plan[id.0], &node.origin) {
            out.put_slice(&self.source[origin.start as usize..origin.end as usize]);
            return Ok(());
        }

        let start = out.len();
        out.put_u32(0);
        out.put_fourcc(node.atom_type);

        let full_atom = registry.is_full_atom(node.atom_type);
        let version = node.fields.u64("version").unwrap_or(0) as u8;
        let flags = node.fields.u32("flags").unwrap_or(0);

        if let Some(body) = &node.body {
            out.put_slice(body);
        } else if node.is_container {
            if full_atom {
                out.put_version_flags(version, flags);
            }
            for &child in &node.children {
                self.write_atom(child, registry, plan, out)?;
            }
            if let Some(gap) = &node.gap {
                out.put_slice(gap);
            }
        } else {
            let encode = match registry.get(node.atom_type) {
                Some(codec) => codec.encode,
                None if node.fields.contains("raw_data") => Some(crate::codec::encode_raw as _),
                None => None,
            }
            .ok_or(Error::MissingEncoder(node.atom_type))?;

            if full_atom {
                out.put_version_flags(version, flags);
            }
            encode(&node.fields, out);
            if let Some(trailing) = node.fields.bytes(TRAILING_DATA) {
                out.put_slice(trailing);
            }
        }

        finish_header(out, start);
        Ok(())
    }

    fn push(&mut self, node: MutableAtom) -> AtomId {
        self.nodes.push(node);
        AtomId(self.nodes.len() - 1)
    }

    fn adopt(&mut self, atom: &ParsedAtom, data: &Bytes, from_source: bool) -> AtomId {
        let children: Vec<AtomId> = atom
            .children
            .iter()
            .map(|child| self.adopt(child, data, from_source))
            .collect();

        let slice = |range: &Range<u64>| data.slice(range.start as usize..range.end as usize);
        let body = (!from_source && !atom.is_container && children.is_empty())
            .then(|| slice(&(atom.data_offset()..atom.end())));

        self.push(MutableAtom {
            atom_type: atom.atom_type,
            origin: from_source.then(|| atom.range()),
            is_container: atom.is_container || !children.is_empty(),
            fields: atom.fields.clone(),
            children,
            gap: atom.gap.as_ref().map(slice),
            body,
            dirty: !from_source,
        })
    }
}

/// Patch the size of the atom written from `start`, widening the header to
/// the 64-bit form when needed.
fn finish_header(out: &mut BytesMut, start: usize) {
    let size = (out.len() - start) as u64;
    if let Ok(size) = u32::try_from(size) {
        out[start..start + 4].copy_from_slice(&size.to_be_bytes());
        return;
    }

    let payload = out.split_off(start + 8);
    let atom_type = [out[start + 4], out[start + 5], out[start + 6], out[start + 7]];
    out.truncate(start);
    out.put_u32(1);
    out.put_slice(&atom_type);
    out.put_u64(size + 8);
    out.extend_from_slice(&payload);
}
