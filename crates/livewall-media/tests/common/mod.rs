//! Synthetic QuickTime movies for integration tests.

#![allow(dead_code)]

pub fn atom(atom_type: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = ((8 + body.len()) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(atom_type);
    out.extend_from_slice(body);
    out
}

pub fn full_atom(atom_type: &[u8; 4], version: u8, flags: u32, body: &[u8]) -> Vec<u8> {
    let mut payload = vec![version];
    payload.extend_from_slice(&flags.to_be_bytes()[1..]);
    payload.extend_from_slice(body);
    atom(atom_type, &payload)
}

pub fn be32(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// Unity matrix in 16.16 / 2.30 fixed point.
pub fn unity_matrix() -> Vec<u8> {
    be32(&[0x10000, 0, 0, 0, 0x10000, 0, 0, 0, 0x4000_0000])
}

/// Length-prefixed HEVC sample whose NAL header carries `temporal_id`.
pub fn hevc_sample(temporal_id: u8) -> Vec<u8> {
    vec![0, 0, 0, 2, 0x02, temporal_id + 1]
}

/// Builder for a single-track HEVC movie laid out as ftyp, mdat, moov.
pub struct MovieBuilder {
    temporal_ids: Vec<u8>,
    samples_per_chunk: u32,
    leading_free: usize,
    handler_subtype: [u8; 4],
    with_ctts: bool,
    width: u32,
    height: u32,
}

impl Default for MovieBuilder {
    fn default() -> Self {
        Self {
            temporal_ids: vec![0, 1],
            samples_per_chunk: 2,
            leading_free: 0,
            handler_subtype: *b"vide",
            with_ctts: false,
            width: 1920,
            height: 1080,
        }
    }
}

impl MovieBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temporal_ids(mut self, ids: &[u8]) -> Self {
        self.temporal_ids = ids.to_vec();
        self
    }

    pub fn samples_per_chunk(mut self, count: u32) -> Self {
        self.samples_per_chunk = count;
        self
    }

    /// Put a `free` atom of `len` payload bytes between ftyp and mdat.
    pub fn leading_free(mut self, len: usize) -> Self {
        self.leading_free = len;
        self
    }

    pub fn handler_subtype(mut self, subtype: &[u8; 4]) -> Self {
        self.handler_subtype = *subtype;
        self
    }

    pub fn with_ctts(mut self) -> Self {
        self.with_ctts = true;
        self
    }

    pub fn ftyp(&self) -> Vec<u8> {
        atom(b"ftyp", b"qt  \0\0\0\0qt  ")
    }

    /// Offset of the first sample in the built file.
    pub fn content_start(&self) -> u32 {
        let free = if self.leading_free > 0 {
            8 + self.leading_free
        } else {
            0
        };
        (self.ftyp().len() + free + 8) as u32
    }

    pub fn build(&self) -> Vec<u8> {
        let samples: Vec<Vec<u8>> = self.temporal_ids.iter().map(|&t| hevc_sample(t)).collect();
        let sizes: Vec<u32> = samples.iter().map(|s| s.len() as u32).collect();

        let mut chunk_offsets = Vec::new();
        let mut offset = self.content_start();
        for chunk in sizes.chunks(self.samples_per_chunk.max(1) as usize) {
            chunk_offsets.push(offset);
            offset += chunk.iter().sum::<u32>();
        }

        let mut data = self.ftyp();
        if self.leading_free > 0 {
            data.extend(atom(b"free", &vec![0; self.leading_free]));
        }
        data.extend(atom(b"mdat", &samples.concat()));
        data.extend(self.moov(&sizes, &chunk_offsets));
        data
    }

    fn moov(&self, sizes: &[u32], chunk_offsets: &[u32]) -> Vec<u8> {
        let sample_count = sizes.len() as u32;

        let mut mvhd = be32(&[0, 0, 600, sample_count * 20, 0x10000]);
        mvhd.extend_from_slice(&[1, 0]);
        mvhd.extend_from_slice(&[0; 10]);
        mvhd.extend(unity_matrix());
        mvhd.extend(be32(&[0, 0, 0, 0, 0, 0, 2]));

        let mut tkhd = be32(&[0, 0, 1, 0, sample_count * 20]);
        tkhd.extend_from_slice(&[0; 16]);
        tkhd.extend(unity_matrix());
        tkhd.extend(be32(&[self.width << 16, self.height << 16]));

        let elst = be32(&[1, sample_count * 20, 512, 0x10000]);

        let mut mdhd = be32(&[0, 0, 600, sample_count * 20]);
        mdhd.extend_from_slice(&[0x55, 0xC4, 0, 0]);

        let mut stsd_entry = be32(&[16]);
        stsd_entry.extend_from_slice(b"hvc1");
        stsd_entry.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 1]);

        let mut stbl = full_atom(b"stsd", 0, 0, &[be32(&[1]), stsd_entry].concat());
        stbl.extend(full_atom(b"stts", 0, 0, &be32(&[1, sample_count, 20])));
        stbl.extend(full_atom(b"stss", 0, 0, &be32(&[1, 1])));
        if self.with_ctts {
            stbl.extend(full_atom(b"ctts", 0, 0, &be32(&[2, 1, 40, 1, 20])));
        }
        stbl.extend(full_atom(
            b"stsc",
            0,
            0,
            &be32(&[1, 1, self.samples_per_chunk, 1]),
        ));
        let mut stsz = be32(&[0, sample_count]);
        stsz.extend(be32(sizes));
        stbl.extend(full_atom(b"stsz", 0, 0, &stsz));
        let mut stco = be32(&[chunk_offsets.len() as u32]);
        stco.extend(be32(chunk_offsets));
        stbl.extend(full_atom(b"stco", 0, 0, &stco));

        let dref = full_atom(b"dref", 0, 0, &[be32(&[1]), full_atom(b"alis", 0, 1, &[])].concat());

        let mut minf = full_atom(b"vmhd", 0, 1, &[0; 8]);
        minf.extend(handler(b"dhlr", b"url "));
        minf.extend(atom(b"dinf", &dref));
        minf.extend(atom(b"stbl", &stbl));

        let mut mdia = full_atom(b"mdhd", 0, 0, &mdhd);
        mdia.extend(handler(b"mhlr", &self.handler_subtype));
        mdia.extend(atom(b"minf", &minf));

        let mut trak = full_atom(b"tkhd", 0, 3, &tkhd);
        trak.extend(atom(b"edts", &full_atom(b"elst", 0, 0, &elst)));
        trak.extend(atom(b"mdia", &mdia));

        let mut moov = full_atom(b"mvhd", 0, 0, &mvhd);
        moov.extend(atom(b"trak", &trak));
        atom(b"moov", &moov)
    }
}

fn handler(component_type: &[u8; 4], subtype: &[u8; 4]) -> Vec<u8> {
    let mut body = component_type.to_vec();
    body.extend_from_slice(subtype);
    body.extend_from_slice(b"appl");
    body.extend(be32(&[0, 0]));
    body.push(11);
    body.extend_from_slice(b"VideoHandle");
    full_atom(b"hdlr", 0, 0, &body)
}
