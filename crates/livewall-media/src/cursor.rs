//! Big-endian byte cursor and write helpers.
//!
//! Reads are lenient: asking for more bytes than remain yields zero (or an
//! empty slice) and leaves the position untouched. Decoders rely on this to
//! keep going over slightly short atoms; anything that does layout math must
//! check [`ByteCursor::remaining`] itself.

use crate::atom::FourCC;
use bytes::BufMut;

const FIXED_16_16: f64 = 65536.0;
const FIXED_8_8: f64 = 256.0;
const FIXED_2_30: f64 = 1_073_741_824.0;

/// Identity matrix in `a b u c d v tx ty w` order.
pub const IDENTITY_MATRIX: [f64; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

/// Sequential reader over a window of a buffer.
///
/// Positions are absolute offsets into the underlying buffer, so a cursor
/// restricted to one atom still reports file offsets.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> ByteCursor<'a> {
    /// Cursor over the whole buffer.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            end: data.len(),
        }
    }

    /// Cursor over `[start, end)`, clamped to the buffer.
    pub fn window(data: &'a [u8], start: u64, end: u64) -> Self {
        let end = clamp_offset(end, data.len());
        let start = clamp_offset(start, end);
        Self {
            data,
            pos: start,
            end,
        }
    }

    pub fn position(&self) -> u64 {
        self.pos as u64
    }

    pub fn end(&self) -> u64 {
        self.end as u64
    }

    pub fn remaining(&self) -> usize {
        self.end - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Move to an absolute position, clamped to the window end.
    pub fn seek(&mut self, pos: u64) {
        self.pos = clamp_offset(pos, self.end);
    }

    pub fn skip(&mut self, n: usize) {
        self.pos = self.pos.saturating_add(n).min(self.end);
    }

    /// Read `n` bytes, or nothing if fewer remain.
    pub fn read_bytes(&mut self, n: usize) -> &'a [u8] {
        if n > self.remaining() {
            return &[];
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        out
    }

    /// Everything up to the window end.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let out = &self.data[self.pos..self.end];
        self.pos = self.end;
        out
    }

    fn read_array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        let bytes = self.read_bytes(N);
        if bytes.len() == N {
            out.copy_from_slice(bytes);
        }
        out
    }

    pub fn read_u8(&mut self) -> u8 {
        self.read_array::<1>()[0]
    }

    pub fn read_u16(&mut self) -> u16 {
        u16::from_be_bytes(self.read_array())
    }

    /// 24-bit value, as used by full-atom flags.
    pub fn read_u24(&mut self) -> u32 {
        let [a, b, c] = self.read_array::<3>();
        u32::from_be_bytes([0, a, b, c])
    }

    pub fn read_u32(&mut self) -> u32 {
        u32::from_be_bytes(self.read_array())
    }

    pub fn read_u64(&mut self) -> u64 {
        u64::from_be_bytes(self.read_array())
    }

    pub fn read_i8(&mut self) -> i8 {
        self.read_u8() as i8
    }

    pub fn read_i16(&mut self) -> i16 {
        i16::from_be_bytes(self.read_array())
    }

    pub fn read_i32(&mut self) -> i32 {
        i32::from_be_bytes(self.read_array())
    }

    pub fn read_i64(&mut self) -> i64 {
        i64::from_be_bytes(self.read_array())
    }

    pub fn read_fourcc(&mut self) -> FourCC {
        FourCC(self.read_array())
    }

    /// Unsigned 16.16 fixed point.
    pub fn read_fixed_16_16(&mut self) -> f64 {
        self.read_u32() as f64 / FIXED_16_16
    }

    /// Unsigned 8.8 fixed point.
    pub fn read_fixed_8_8(&mut self) -> f64 {
        self.read_u16() as f64 / FIXED_8_8
    }

    /// Signed 8.8 fixed point.
    pub fn read_signed_fixed_8_8(&mut self) -> f64 {
        self.read_i16() as f64 / FIXED_8_8
    }

    /// 2.30 fixed point.
    pub fn read_fixed_2_30(&mut self) -> f64 {
        self.read_u32() as f64 / FIXED_2_30
    }

    /// Nine-element signed matrix; every third element is 2.30, the rest 16.16.
    pub fn read_matrix(&mut self) -> [f64; 9] {
        let mut m = [0.0; 9];
        for (i, slot) in m.iter_mut().enumerate() {
            let scale = if i % 3 == 2 { FIXED_2_30 } else { FIXED_16_16 };
            *slot = self.read_i32() as f64 / scale;
        }
        m
    }

    /// Fixed-length string, cut at the first NUL.
    pub fn read_string(&mut self, len: usize) -> String {
        let bytes = self.read_bytes(len);
        let bytes = match bytes.iter().position(|&b| b == 0) {
            Some(nul) => &bytes[..nul],
            None => bytes,
        };
        String::from_utf8_lossy(bytes).into_owned()
    }

    /// Length-prefixed string.
    pub fn read_pascal_string(&mut self) -> String {
        let len = self.read_u8() as usize;
        self.read_string(len)
    }

    /// Null-terminated string; consumes the terminator when present.
    pub fn read_c_string(&mut self) -> String {
        let rest = &self.data[self.pos..self.end];
        let len = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        let out = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.pos += (len + 1).min(rest.len());
        out
    }

    /// Version byte and 24-bit flags of a full atom.
    pub fn read_version_flags(&mut self) -> (u8, u32) {
        let version = self.read_u8();
        (version, self.read_u24())
    }

    /// Declared entry count capped by what can actually be present.
    pub fn bounded_count(&self, declared: u32, entry_size: usize) -> usize {
        let fits = self.remaining() / entry_size.max(1);
        (declared as usize).min(fits)
    }
}

fn clamp_offset(offset: u64, limit: usize) -> usize {
    usize::try_from(offset).map_or(limit, |o| o.min(limit))
}

/// Writers for the atom-specific encodings on top of [`BufMut`].
pub trait AtomWriteExt: BufMut {
    fn put_fourcc(&mut self, code: FourCC) {
        self.put_slice(&code.0);
    }

    fn put_u24(&mut self, value: u32) {
        self.put_slice(&value.to_be_bytes()[1..]);
    }

    fn put_version_flags(&mut self, version: u8, flags: u32) {
        self.put_u8(version);
        self.put_u24(flags);
    }

    fn put_fixed_16_16(&mut self, value: f64) {
        self.put_u32((value * FIXED_16_16) as u32);
    }

    fn put_fixed_8_8(&mut self, value: f64) {
        self.put_u16((value * FIXED_8_8) as u16);
    }

    fn put_signed_fixed_8_8(&mut self, value: f64) {
        self.put_i16((value * FIXED_8_8) as i16);
    }

    fn put_fixed_2_30(&mut self, value: f64) {
        self.put_u32((value * FIXED_2_30) as u32);
    }

    fn put_matrix(&mut self, matrix: &[f64; 9]) {
        for (i, &value) in matrix.iter().enumerate() {
            let scale = if i % 3 == 2 { FIXED_2_30 } else { FIXED_16_16 };
            self.put_i32((value * scale) as i32);
        }
    }

    fn put_zeros(&mut self, n: usize) {
        self.put_bytes(0, n);
    }

    /// Length-prefixed string, truncated to 255 bytes.
    fn put_pascal_string(&mut self, value: &str) {
        let bytes = &value.as_bytes()[..value.len().min(255)];
        self.put_u8(bytes.len() as u8);
        self.put_slice(bytes);
    }
}

impl<B: BufMut + ?Sized> AtomWriteExt for B {}
