//! HEVC temporal-layer analysis.
//!
//! Every sample of the track is located through the sample tables and the
//! temporal id is read from the header of its first NAL unit. The resulting
//! sequence is reduced to its repeating pattern and nibble-packed for the
//! custom segment map.

use crate::atom::FieldMap;
use crate::codec::{chunk_offsets, sample_sizes};
use thiserror::Error;

/// Length prefix plus the two-byte HEVC NAL header.
const NAL_PREFIX_LEN: usize = 6;

/// Windows checked before a detected period is trusted.
const PATTERN_CHECK_WINDOWS: usize = 5;

/// One sample-to-chunk run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRun {
    /// 1-based index of the first chunk in the run.
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
}

/// The sample tables needed to locate samples in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleTableSnapshot {
    pub sample_sizes: Vec<u32>,
    pub chunk_offsets: Vec<u64>,
    pub chunk_runs: Vec<ChunkRun>,
}

impl SampleTableSnapshot {
    /// Collect the tables from decoded `stsz`, `stsc` and `stco`/`co64` fields.
    pub fn from_fields(stsz: &FieldMap, stsc: &FieldMap, offsets: &FieldMap) -> Self {
        let chunk_runs = stsc
            .records("entries")
            .unwrap_or(&[])
            .iter()
            .map(|entry| ChunkRun {
                first_chunk: entry.u32("first_chunk").unwrap_or(1),
                samples_per_chunk: entry.u32("samples_per_chunk").unwrap_or(0),
            })
            .collect();

        Self {
            sample_sizes: sample_sizes(stsz),
            chunk_offsets: chunk_offsets(offsets),
            chunk_runs,
        }
    }

    /// Samples in each chunk, one entry per chunk offset at most.
    pub fn samples_per_chunk(&self) -> Vec<u32> {
        let total_chunks = self.chunk_offsets.len();
        let mut counts = Vec::with_capacity(total_chunks);

        for (i, run) in self.chunk_runs.iter().enumerate() {
            let end_chunk = self
                .chunk_runs
                .get(i + 1)
                .map_or(total_chunks as u64 + 1, |next| next.first_chunk as u64);
            let length = end_chunk.saturating_sub(run.first_chunk as u64);
            let length = length.min((total_chunks - counts.len().min(total_chunks)) as u64);
            counts.extend(std::iter::repeat(run.samples_per_chunk).take(length as usize));
        }

        counts.truncate(total_chunks);
        counts
    }
}

/// Why a temporal analysis is only partial.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisIncomplete {
    #[error("sample-to-chunk table is empty")]
    EmptySampleToChunk,

    #[error("sample-to-chunk table maps {mapped} samples but the size table lists {listed}")]
    CoverageMismatch { mapped: u64, listed: u64 },

    #[error("{count} samples start too close to the end of the file to read")]
    SamplesOutOfBounds { count: usize },
}

/// Temporal ids of a track plus an optional reason the result is partial.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemporalAnalysis {
    /// One id per sample; -1 where the NAL header could not be read.
    pub temporal_ids: Vec<i32>,
    pub issue: Option<AnalysisIncomplete>,
}

/// Temporal id of a sample starting with a 4-byte length prefix.
///
/// `nuh_temporal_id_plus1` sits in the low three bits of the second NAL
/// header byte; zero is invalid and reported as -1.
pub fn temporal_id(sample: &[u8]) -> i32 {
    match sample.get(5) {
        Some(&b) if sample.len() >= NAL_PREFIX_LEN && b & 0x07 != 0 => (b & 0x07) as i32 - 1,
        _ => -1,
    }
}

/// Read the temporal id of every sample in `data`.
pub fn extract_temporal_ids(data: &[u8], table: &SampleTableSnapshot) -> TemporalAnalysis {
    if table.chunk_runs.is_empty() {
        return TemporalAnalysis {
            temporal_ids: Vec::new(),
            issue: Some(AnalysisIncomplete::EmptySampleToChunk),
        };
    }

    let counts = table.samples_per_chunk();
    let mut ids = Vec::with_capacity(table.sample_sizes.len());
    let mut unreadable = 0usize;
    let mut sizes = table.sample_sizes.iter();

    'chunks: for (&chunk_offset, &samples) in table.chunk_offsets.iter().zip(&counts) {
        let mut pos = chunk_offset;
        for _ in 0..samples {
            let Some(&size) = sizes.next() else {
                break 'chunks;
            };
            let id = usize::try_from(pos)
                .ok()
                .and_then(|start| data.get(start..start.checked_add(NAL_PREFIX_LEN)?))
                .map_or(-1, temporal_id);
            if id == -1 {
                unreadable += 1;
            }
            ids.push(id);
            pos = pos.saturating_add(size as u64);
        }
    }

    let mapped: u64 = counts.iter().map(|&c| c as u64).sum();
    let listed = table.sample_sizes.len() as u64;
    let issue = if mapped != listed {
        Some(AnalysisIncomplete::CoverageMismatch { mapped, listed })
    } else if unreadable > 0 && unreadable == ids.len() {
        Some(AnalysisIncomplete::SamplesOutOfBounds { count: unreadable })
    } else {
        None
    };

    if let Some(issue) = &issue {
        tracing::warn!("Temporal analysis incomplete: {}", issue);
    }
    tracing::debug!(
        "Extracted {} temporal ids ({} unreadable)",
        ids.len(),
        unreadable
    );

    TemporalAnalysis {
        temporal_ids: ids,
        issue,
    }
}

/// Shortest repeating prefix starting at the first base-layer sample.
///
/// The period is the distance between the first two samples with id 0. It
/// is accepted only if the first few periods all match it; otherwise the
/// whole sequence is returned.
pub fn detect_pattern(ids: &[i32]) -> &[i32] {
    let mut bases = ids
        .iter()
        .enumerate()
        .filter_map(|(i, &id)| (id == 0).then_some(i));
    let (Some(first), Some(second)) = (bases.next(), bases.next()) else {
        return ids;
    };

    let period = second - first;
    let candidate = &ids[first..second];
    let limit = ids.len().min(first + period * PATTERN_CHECK_WINDOWS);

    let consistent = (first..limit).step_by(period).all(|start| {
        let window = &ids[start..ids.len().min(start + period)];
        window == &candidate[..window.len()]
    });

    if consistent {
        candidate
    } else {
        ids
    }
}

/// Pack ids two per byte as `id + 1`, high nibble first, clamped to 0..=15.
pub fn pack_nibbles(ids: &[i32]) -> Vec<u8> {
    let nibble = |id: i32| (id + 1).clamp(0, 15) as u8;
    ids.chunks(2)
        .map(|pair| {
            let high = nibble(pair[0]);
            let low = pair.get(1).map_or(0, |&id| nibble(id));
            (high << 4) | low
        })
        .collect()
}

/// Inverse of [`pack_nibbles`] for the first `count` ids.
pub fn unpack_nibbles(packed: &[u8], count: usize) -> Vec<i32> {
    packed
        .iter()
        .flat_map(|&b| [(b >> 4) as i32 - 1, (b & 0x0f) as i32 - 1])
        .take(count)
        .collect()
}

/// Payload for the custom segment map: the packed temporal pattern.
pub fn segment_map_payload(ids: &[i32]) -> Vec<u8> {
    let pattern = detect_pattern(ids);
    tracing::debug!(
        "Temporal pattern length {} over {} samples",
        pattern.len(),
        ids.len()
    );
    pack_nibbles(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hevc_sample(tid_plus1: u8, len: usize) -> Vec<u8> {
        let mut sample = vec![0, 0, 0, (len - 4) as u8, 0x02, tid_plus1];
        sample.resize(len, 0xaa);
        sample
    }

    #[test]
    fn test_temporal_id_from_header() {
        assert_eq!(temporal_id(&[0, 0, 0, 2, 0x02, 0x01]), 0);
        assert_eq!(temporal_id(&[0, 0, 0, 2, 0x02, 0x03]), 2);
        assert_eq!(temporal_id(&[0, 0, 0, 2, 0x02, 0xf8]), -1);
        assert_eq!(temporal_id(&[0, 0, 0, 2, 0x02]), -1);
    }

    #[test]
    fn test_samples_per_chunk_expansion() {
        let table = SampleTableSnapshot {
            sample_sizes: vec![1; 7],
            chunk_offsets: vec![0, 10, 20, 30],
            chunk_runs: vec![
                ChunkRun {
                    first_chunk: 1,
                    samples_per_chunk: 1,
                },
                ChunkRun {
                    first_chunk: 3,
                    samples_per_chunk: 3,
                },
            ],
        };
        assert_eq!(table.samples_per_chunk(), vec![1, 1, 3, 3]);
    }

    #[test]
    fn test_samples_per_chunk_truncates_to_chunk_count() {
        let table = SampleTableSnapshot {
            sample_sizes: vec![],
            chunk_offsets: vec![0, 10],
            chunk_runs: vec![ChunkRun {
                first_chunk: 1,
                samples_per_chunk: 2,
            }],
        };
        assert_eq!(table.samples_per_chunk(), vec![2, 2]);
    }

    #[test]
    fn test_extract_walks_chunks_and_samples() {
        let mut data = vec![0u8; 8];
        data.extend(hevc_sample(1, 10));
        data.extend(hevc_sample(2, 12));
        data.extend(vec![0u8; 4]);
        data.extend(hevc_sample(3, 8));

        let table = SampleTableSnapshot {
            sample_sizes: vec![10, 12, 8],
            chunk_offsets: vec![8, 34],
            chunk_runs: vec![
                ChunkRun {
                    first_chunk: 1,
                    samples_per_chunk: 2,
                },
                ChunkRun {
                    first_chunk: 2,
                    samples_per_chunk: 1,
                },
            ],
        };

        let analysis = extract_temporal_ids(&data, &table);
        assert_eq!(analysis.temporal_ids, vec![0, 1, 2]);
        assert_eq!(analysis.issue, None);
    }

    #[test]
    fn test_extract_short_tail_reads_minus_one() {
        let data = hevc_sample(1, 6);
        let table = SampleTableSnapshot {
            sample_sizes: vec![6, 4],
            chunk_offsets: vec![0],
            chunk_runs: vec![ChunkRun {
                first_chunk: 1,
                samples_per_chunk: 2,
            }],
        };
        let analysis = extract_temporal_ids(&data, &table);
        assert_eq!(analysis.temporal_ids, vec![0, -1]);
        assert_eq!(analysis.issue, None);
    }

    #[test]
    fn test_extract_reports_coverage_mismatch() {
        let data = hevc_sample(1, 6);
        let table = SampleTableSnapshot {
            sample_sizes: vec![6, 6, 6],
            chunk_offsets: vec![0],
            chunk_runs: vec![ChunkRun {
                first_chunk: 1,
                samples_per_chunk: 1,
            }],
        };
        let analysis = extract_temporal_ids(&data, &table);
        assert_eq!(analysis.temporal_ids, vec![0]);
        assert_eq!(
            analysis.issue,
            Some(AnalysisIncomplete::CoverageMismatch {
                mapped: 1,
                listed: 3
            })
        );
    }

    #[test]
    fn test_extract_empty_stsc() {
        let analysis = extract_temporal_ids(&[], &SampleTableSnapshot::default());
        assert!(analysis.temporal_ids.is_empty());
        assert_eq!(analysis.issue, Some(AnalysisIncomplete::EmptySampleToChunk));
    }

    #[test]
    fn test_detect_periodic_pattern() {
        let ids = [0, 1, 1, 1, 0, 1, 1, 1, 0, 1, 1, 1];
        assert_eq!(detect_pattern(&ids), &[0, 1, 1, 1]);
    }

    #[test]
    fn test_detect_pattern_partial_last_window() {
        let ids = [0, 2, 1, 0, 2, 1, 0, 2];
        assert_eq!(detect_pattern(&ids), &[0, 2, 1]);
    }

    #[test]
    fn test_inconsistent_pattern_falls_back_to_whole() {
        let ids = [0, 1, 1, 0, 2, 2];
        assert_eq!(detect_pattern(&ids), &ids);
    }

    #[test]
    fn test_single_base_falls_back_to_whole() {
        let ids = [1, 0, 1, 2];
        assert_eq!(detect_pattern(&ids), &ids);
        assert!(detect_pattern(&[]).is_empty());
    }

    #[test]
    fn test_pack_nibbles() {
        assert_eq!(pack_nibbles(&[0, 1, 1, 1]), vec![0x12, 0x22]);
        assert_eq!(pack_nibbles(&[0, 1, 2]), vec![0x12, 0x30]);
        assert_eq!(pack_nibbles(&[-1, 20]), vec![0x0f]);
        assert!(pack_nibbles(&[]).is_empty());
    }

    #[test]
    fn test_unpack_inverts_pack() {
        let ids = [0, 1, -1, 2, 14, 3, 0];
        assert_eq!(unpack_nibbles(&pack_nibbles(&ids), ids.len()), ids);
    }

    #[test]
    fn test_segment_map_payload_uses_pattern() {
        let ids = [0, 1, 1, 1].repeat(3);
        assert_eq!(segment_map_payload(&ids), vec![0x12, 0x22]);
    }
}
