//! Recursive-descent atom parser.

use crate::atom::{AtomTree, FieldMap, FieldValue, FourCC, ParseIssue, ParsedAtom};
use crate::cursor::ByteCursor;
use crate::registry::Registry;

/// Field holding leaf bytes the decoder did not consume.
pub const TRAILING_DATA: &str = "_trailing_data";

/// Parses a buffer into an [`AtomTree`].
///
/// Malformed sizes never abort the parse: the current container simply ends
/// at the bad header and the problem is recorded in [`AtomTree::issues`].
pub struct AtomParser<'r> {
    registry: &'r Registry,
}

impl<'r> AtomParser<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Parse every top-level atom in `data`.
    pub fn parse(&self, data: &[u8]) -> AtomTree {
        let mut issues = Vec::new();
        let (atoms, _) = self.parse_range(data, 0, data.len() as u64, None, &mut issues);

        for issue in &issues {
            tracing::warn!(
                "Truncated atom at offset {} in {}: declares {} bytes, {} available",
                issue.offset,
                issue.container.map_or("file".to_string(), |c| c.to_string()),
                issue.declared,
                issue.available
            );
        }
        tracing::debug!(
            "Parsed {} top-level atoms from {} bytes",
            atoms.len(),
            data.len()
        );

        AtomTree { atoms, issues }
    }

    /// Parse sibling atoms in `[start, end)`. Returns them together with the
    /// offset where parsing stopped.
    fn parse_range(
        &self,
        data: &[u8],
        start: u64,
        end: u64,
        container: Option<FourCC>,
        issues: &mut Vec<ParseIssue>,
    ) -> (Vec<ParsedAtom>, u64) {
        let mut atoms = Vec::new();
        let mut pos = start;

        while pos + 8 <= end {
            let mut cursor = ByteCursor::window(data, pos, end);
            let size = cursor.read_u32() as u64;
            let atom_type = cursor.read_fourcc();
            let available = end - pos;

            let (actual_size, header_size) = match size {
                1 => {
                    if cursor.remaining() < 8 {
                        issues.push(ParseIssue {
                            offset: pos,
                            container,
                            declared: 16,
                            available,
                        });
                        break;
                    }
                    // 64-bit extended size
                    (cursor.read_u64(), 16u8)
                }
                // Atom extends to the end of its container
                0 => (available, 8u8),
                n => (n, 8u8),
            };

            if actual_size < header_size as u64 || actual_size > available {
                issues.push(ParseIssue {
                    offset: pos,
                    container,
                    declared: actual_size,
                    available,
                });
                break;
            }

            atoms.push(self.parse_atom(data, pos, actual_size, header_size, atom_type, issues));
            pos += actual_size;
        }

        (atoms, pos)
    }

    fn parse_atom(
        &self,
        data: &[u8],
        offset: u64,
        size: u64,
        header_size: u8,
        atom_type: FourCC,
        issues: &mut Vec<ParseIssue>,
    ) -> ParsedAtom {
        let codec = self.registry.resolve(atom_type);
        let end = offset + size;
        let header_end = offset + header_size as u64;
        let raw_header = data[offset as usize..header_end as usize].to_vec();

        let mut cursor = ByteCursor::window(data, header_end, end);
        let mut fields = FieldMap::new();
        let (mut version, mut flags) = (None, None);

        if codec.full_atom {
            let (v, f) = cursor.read_version_flags();
            fields.set("version", FieldValue::U8(v));
            fields.set("flags", FieldValue::U32(f));
            version = Some(v);
            flags = Some(f);
        }

        let mut children = Vec::new();
        let mut gap = None;

        if codec.container {
            let (parsed, stopped) =
                self.parse_range(data, cursor.position(), end, Some(atom_type), issues);
            children = parsed;
            if stopped < end {
                gap = Some(stopped..end);
            }
        } else {
            if let Some(decode) = codec.decode {
                decode(&mut cursor, version.unwrap_or(0), &mut fields);
            }
            if !cursor.is_empty() {
                fields.set(TRAILING_DATA, FieldValue::Bytes(cursor.read_rest().to_vec()));
            }
        }

        ParsedAtom {
            atom_type,
            offset,
            size,
            header_size,
            raw_header,
            is_container: codec.container,
            is_full_atom: codec.full_atom,
            version,
            flags,
            fields,
            children,
            gap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{atom, full_atom};

    fn parse(data: &[u8]) -> AtomTree {
        AtomParser::new(&Registry::standard()).parse(data)
    }

    #[test]
    fn test_parse_flat_atoms() {
        let mut data = atom(b"ftyp", b"qt  \0\0\x02\0qt  ");
        data.extend(atom(b"free", &[0; 4]));

        let tree = parse(&data);
        assert_eq!(tree.atoms.len(), 2);
        assert!(tree.is_complete());

        let ftyp = &tree.atoms[0];
        assert_eq!(ftyp.size, 20);
        assert_eq!(ftyp.fields.code("major_brand"), Some(FourCC(*b"qt  ")));
        assert_eq!(ftyp.fields.u32("minor_version"), Some(0x200));

        let free = &tree.atoms[1];
        assert_eq!(free.offset, 20);
        assert_eq!(free.fields.bytes("raw_data"), Some(&[0u8; 4][..]));
    }

    #[test]
    fn test_parse_nested_containers() {
        let stco = full_atom(b"stco", 0, 0, &[0, 0, 0, 1, 0, 0, 0, 0x30]);
        let stbl = atom(b"stbl", &stco);
        let minf = atom(b"minf", &stbl);
        let data = atom(b"moov", &minf);

        let tree = parse(&data);
        let moov = tree.top(FourCC::MOOV).unwrap();
        assert!(moov.is_container);
        let stco = tree.find(FourCC::STCO).unwrap();
        assert_eq!(stco.offset, 24);
        assert_eq!(stco.version, Some(0));
        assert_eq!(stco.fields.u32("entry_count"), Some(1));
        assert_eq!(
            stco.field("chunk_offsets"),
            Some(&FieldValue::U32s(vec![0x30]))
        );
        assert_eq!(moov.accounted_size(), moov.size);
    }

    #[test]
    fn test_extended_size_header() {
        let mut data = vec![0, 0, 0, 1];
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&20u64.to_be_bytes());
        data.extend_from_slice(&[1, 2, 3, 4]);

        let tree = parse(&data);
        let mdat = &tree.atoms[0];
        assert_eq!(mdat.header_size, 16);
        assert_eq!(mdat.size, 20);
        assert_eq!(mdat.raw_header.len(), 16);
        assert_eq!(mdat.data_offset(), 16);
    }

    #[test]
    fn test_zero_size_extends_to_end() {
        let mut data = atom(b"ftyp", b"isom\0\0\0\0");
        data.extend_from_slice(&[0, 0, 0, 0]);
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&[9; 10]);

        let tree = parse(&data);
        let mdat = tree.top(FourCC::MDAT).unwrap();
        assert_eq!(mdat.size, 18);
        assert_eq!(mdat.end(), data.len() as u64);
    }

    #[test]
    fn test_oversized_child_stops_container_and_records_issue() {
        let good = atom(b"free", &[0; 4]);
        let mut bad = vec![0, 0, 0, 0x40];
        bad.extend_from_slice(b"junk");
        let mut body = good.clone();
        body.extend(bad);
        let data = atom(b"udta", &body);

        let tree = parse(&data);
        let udta = &tree.atoms[0];
        assert_eq!(udta.children.len(), 1);
        assert_eq!(udta.gap, Some(20..28));
        assert_eq!(udta.accounted_size(), udta.size);

        assert_eq!(tree.issues.len(), 1);
        let issue = &tree.issues[0];
        assert_eq!(issue.offset, 20);
        assert_eq!(issue.container, Some(FourCC::UDTA));
        assert_eq!(issue.declared, 0x40);
        assert_eq!(issue.available, 8);
    }

    #[test]
    fn test_short_tail_becomes_gap_without_issue() {
        // udta with a four-byte terminator after its last child
        let mut body = atom(b"free", &[]);
        body.extend_from_slice(&[0; 4]);
        let data = atom(b"udta", &body);

        let tree = parse(&data);
        assert!(tree.is_complete());
        assert_eq!(tree.atoms[0].gap, Some(16..20));
    }

    #[test]
    fn test_leaf_leftovers_become_trailing_data() {
        // smhd with two extra bytes after its reserved field
        let data = full_atom(b"smhd", 0, 0, &[0x01, 0x00, 0, 0, 0xaa, 0xbb]);
        let tree = parse(&data);
        let smhd = &tree.atoms[0];
        assert_eq!(smhd.fields.f64("balance"), Some(1.0));
        assert_eq!(smhd.fields.bytes(TRAILING_DATA), Some(&[0xaa, 0xbb][..]));
    }

    #[test]
    fn test_full_atom_container_consumes_version_flags() {
        let hdlr = full_atom(b"hdlr", 0, 0, &[0; 24]);
        let data = full_atom(b"meta", 0, 0, &hdlr);

        let tree = parse(&data);
        let meta = &tree.atoms[0];
        assert!(meta.is_full_atom);
        assert_eq!(meta.children.len(), 1);
        assert_eq!(meta.children[0].offset, 12);
        assert_eq!(meta.accounted_size(), meta.size);
    }
}
