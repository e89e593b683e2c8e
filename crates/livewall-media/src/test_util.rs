//! Byte builders shared by unit tests.

/// A plain atom with an 8-byte header.
pub fn atom(atom_type: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + body.len());
    out.extend_from_slice(&((8 + body.len()) as u32).to_be_bytes());
    out.extend_from_slice(atom_type);
    out.extend_from_slice(body);
    out
}

/// A full atom: version and flags precede the body.
pub fn full_atom(atom_type: &[u8; 4], version: u8, flags: u32, body: &[u8]) -> Vec<u8> {
    let mut payload = vec![version];
    payload.extend_from_slice(&flags.to_be_bytes()[1..]);
    payload.extend_from_slice(body);
    atom(atom_type, &payload)
}

/// Concatenate big-endian u32 values.
pub fn be32(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}
