//! Byte-range chunk planning.
//!
//! Splitting is a pure function of `(file size, chunk size)`: the same inputs
//! always produce the same descriptor list, so a restarted upload re-derives
//! an identical plan. The ranges partition `[0, size)` with no gaps or
//! overlaps.

/// A contiguous byte range of the source file, the unit of upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpec {
    /// 0-based chunk index.
    pub index: u32,
    /// Byte offset of this chunk within the file.
    pub offset: u64,
    /// Length in bytes; equals the chunk size for all but possibly the last.
    pub length: u64,
}

/// Lifecycle of a single chunk within an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Pending,
    InFlight,
    Acked,
    Failed,
}

/// A chunk descriptor plus its scheduling bookkeeping.
#[derive(Debug, Clone)]
pub struct ChunkTask {
    pub spec: ChunkSpec,
    pub attempts: u32,
    pub state: ChunkState,
}

impl ChunkTask {
    pub fn new(spec: ChunkSpec) -> Self {
        Self {
            spec,
            attempts: 0,
            state: ChunkState::Pending,
        }
    }
}

/// Derives the ordered chunk plan for a file of `total_size` bytes.
///
/// Returns `ceil(total_size / chunk_size)` descriptors. An empty file yields
/// an empty plan.
///
/// # Panics
///
/// Panics if `chunk_size` is 0, or if the plan would need more than
/// `u32::MAX` chunks (the range of the chunk index type).
pub fn plan_chunks(total_size: u64, chunk_size: u64) -> Vec<ChunkSpec> {
    assert!(chunk_size > 0, "chunk_size must be greater than 0");

    let count = total_size.div_ceil(chunk_size);
    assert!(
        count <= u64::from(u32::MAX),
        "chunk plan exceeds u32::MAX chunks"
    );
    (0..count)
        .map(|i| {
            let offset = i * chunk_size;
            ChunkSpec {
                index: i as u32,
                offset,
                length: chunk_size.min(total_size - offset),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Asserts that a plan exactly partitions [0, total_size).
    fn assert_partitions(specs: &[ChunkSpec], total_size: u64, chunk_size: u64) {
        let expected_count = total_size.div_ceil(chunk_size);
        assert_eq!(specs.len() as u64, expected_count);

        let mut cursor = 0u64;
        for (i, spec) in specs.iter().enumerate() {
            assert_eq!(spec.index as usize, i);
            assert_eq!(spec.offset, cursor, "gap or overlap at chunk {}", i);
            assert!(spec.length > 0, "zero-length chunk {}", i);
            cursor += spec.length;
        }
        assert_eq!(cursor, total_size, "plan does not cover the whole file");
    }

    #[test]
    fn exact_multiple_splits_evenly() {
        let specs = plan_chunks(4096, 1024);
        assert_eq!(specs.len(), 4);
        assert!(specs.iter().all(|s| s.length == 1024));
        assert_partitions(&specs, 4096, 1024);
    }

    #[test]
    fn trailing_remainder_shortens_last_chunk() {
        let specs = plan_chunks(2500, 1024);
        assert_eq!(specs.len(), 3);
        assert_eq!(specs[0].length, 1024);
        assert_eq!(specs[1].length, 1024);
        assert_eq!(specs[2].length, 452);
        assert_partitions(&specs, 2500, 1024);
    }

    #[test]
    fn file_smaller_than_chunk_is_single_chunk() {
        let specs = plan_chunks(10, 1024);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0], ChunkSpec { index: 0, offset: 0, length: 10 });
    }

    #[test]
    fn empty_file_yields_empty_plan() {
        assert!(plan_chunks(0, 1024).is_empty());
    }

    #[test]
    fn ten_megabytes_at_one_megabyte_is_ten_chunks() {
        let mib = 1024 * 1024;
        let specs = plan_chunks(10 * mib, mib);
        assert_eq!(specs.len(), 10);
        assert_partitions(&specs, 10 * mib, mib);
    }

    #[test]
    fn partition_holds_across_awkward_size_pairs() {
        for total_size in [1u64, 2, 1023, 1024, 1025, 4097, 65_537] {
            for chunk_size in [1u64, 7, 512, 1024, 100_000] {
                let specs = plan_chunks(total_size, chunk_size);
                assert_partitions(&specs, total_size, chunk_size);
            }
        }
    }

    #[test]
    fn plan_is_deterministic() {
        assert_eq!(plan_chunks(2500, 1024), plan_chunks(2500, 1024));
    }

    #[test]
    #[should_panic(expected = "chunk_size must be greater than 0")]
    fn zero_chunk_size_panics() {
        let _ = plan_chunks(100, 0);
    }

    #[test]
    #[should_panic(expected = "chunk plan exceeds u32::MAX chunks")]
    fn oversized_plan_is_rejected_before_allocation() {
        let _ = plan_chunks(u64::MAX, 1);
    }

    #[test]
    fn new_task_starts_pending_with_no_attempts() {
        let task = ChunkTask::new(ChunkSpec { index: 0, offset: 0, length: 8 });
        assert_eq!(task.state, ChunkState::Pending);
        assert_eq!(task.attempts, 0);
    }
}
