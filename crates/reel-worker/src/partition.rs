//! Work partitioning across independent worker processes.
//!
//! Row `i` belongs to worker `i mod T`. The assignment is stateless, so any
//! number of workers can start in any order without coordination.

use sha2::{Digest, Sha256};

use reel_models::InputRow;

use crate::error::{WorkerError, WorkerResult};

/// Non-numeric worker ids hash into `[0, HASHED_INDEX_SPACE)`.
pub const HASHED_INDEX_SPACE: u32 = 10_000;

/// Derive a worker index from the raw `WORKER_ID` value.
///
/// Numeric ids are used as-is. Anything else (pod names, UUIDs) is hashed
/// with SHA-256 into `[0, HASHED_INDEX_SPACE)`, which is stable across
/// processes and platforms. Blank ids are rejected.
pub fn derive_worker_index(raw: &str) -> WorkerResult<u32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(WorkerError::config_error("WORKER_ID is empty"));
    }

    if let Ok(index) = trimmed.parse::<u32>() {
        return Ok(index);
    }

    let digest = Sha256::digest(trimmed.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    Ok((u64::from_be_bytes(bytes) % HASHED_INDEX_SPACE as u64) as u32)
}

/// Position of this worker among `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerSlot {
    index: u32,
    total: u32,
}

impl WorkerSlot {
    /// Slot `index` of `total`. `index` must be below `total`.
    pub fn new(index: u32, total: u32) -> WorkerResult<Self> {
        if total == 0 {
            return Err(WorkerError::config_error("TOTAL_WORKERS must be at least 1"));
        }
        if index >= total {
            return Err(WorkerError::config_error(format!(
                "worker index {} out of range for {} workers",
                index, total
            )));
        }
        Ok(Self { index, total })
    }

    /// Slot for a raw worker id: the derived index reduced modulo `total`.
    ///
    /// Two hashed ids can land in the same slot; deployments that need an
    /// exact cover should use numeric ids `0..total`.
    pub fn from_raw(raw: &str, total: u32) -> WorkerResult<Self> {
        if total == 0 {
            return Err(WorkerError::config_error("TOTAL_WORKERS must be at least 1"));
        }
        let derived = derive_worker_index(raw)?;
        if derived >= total {
            tracing::warn!(
                worker_id = raw,
                derived,
                total,
                "Worker index reduced modulo worker count"
            );
        }
        Self::new(derived % total, total)
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// The highest slot runs the merge step.
    pub fn is_merger(&self) -> bool {
        self.index + 1 == self.total
    }

    pub fn owns(&self, row_index: usize) -> bool {
        row_index % self.total as usize == self.index as usize
    }
}

impl std::fmt::Display for WorkerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.index, self.total)
    }
}

/// A row together with its position in the full input list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedRow {
    pub index: usize,
    pub row: InputRow,
}

/// Rows owned by `slot`, in input order.
pub fn partition(rows: &[InputRow], slot: WorkerSlot) -> Vec<AssignedRow> {
    rows.iter()
        .enumerate()
        .filter(|(i, _)| slot.owns(*i))
        .map(|(index, row)| AssignedRow {
            index,
            row: row.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn rows(n: usize) -> Vec<InputRow> {
        (0..n)
            .map(|i| InputRow::new(&format!("https://site{}.com", i), None, "tech").unwrap())
            .collect()
    }

    #[test]
    fn test_numeric_worker_id() {
        assert_eq!(derive_worker_index("0").unwrap(), 0);
        assert_eq!(derive_worker_index(" 7 ").unwrap(), 7);
    }

    #[test]
    fn test_hashed_worker_id_is_stable_and_bounded() {
        let a = derive_worker_index("worker-7f9c2ba4-e88f").unwrap();
        let b = derive_worker_index("worker-7f9c2ba4-e88f").unwrap();
        assert_eq!(a, b);
        assert!(a < HASHED_INDEX_SPACE);

        for id in ["pod-a", "pod-b", "550e8400-e29b-41d4-a716-446655440000", "-1"] {
            assert!(derive_worker_index(id).unwrap() < HASHED_INDEX_SPACE);
        }
    }

    #[test]
    fn test_empty_worker_id_rejected() {
        assert!(derive_worker_index("").is_err());
        assert!(derive_worker_index("   ").is_err());
    }

    #[test]
    fn test_slot_validation() {
        assert!(WorkerSlot::new(0, 0).is_err());
        assert!(WorkerSlot::new(2, 2).is_err());
        assert!(WorkerSlot::from_raw("3", 0).is_err());
        assert_eq!(WorkerSlot::from_raw("5", 4).unwrap().index(), 1);
        assert!(WorkerSlot::new(3, 4).unwrap().is_merger());
        assert!(!WorkerSlot::new(0, 4).unwrap().is_merger());
    }

    #[test]
    fn test_single_worker_takes_everything() {
        let all = rows(7);
        let mine = partition(&all, WorkerSlot::new(0, 1).unwrap());
        assert_eq!(mine.len(), 7);
        assert!(mine.iter().zip(&all).all(|(a, r)| &a.row == r));
    }

    #[test]
    fn test_partitions_are_disjoint_and_cover() {
        for n in [0usize, 1, 5, 17, 64] {
            for t in 1u32..=6 {
                let all = rows(n);
                let mut seen = HashSet::new();
                for w in 0..t {
                    let part = partition(&all, WorkerSlot::new(w, t).unwrap());
                    for assigned in part {
                        assert_eq!(assigned.index % t as usize, w as usize);
                        assert!(seen.insert(assigned.index), "row assigned twice");
                    }
                }
                assert_eq!(seen.len(), n);
            }
        }
    }

    #[test]
    fn test_partition_deterministic() {
        let all = rows(20);
        let slot = WorkerSlot::new(1, 3).unwrap();
        assert_eq!(partition(&all, slot), partition(&all, slot));
    }

    #[test]
    fn test_two_worker_split() {
        let all = rows(4);
        let w0: Vec<usize> = partition(&all, WorkerSlot::new(0, 2).unwrap())
            .iter()
            .map(|a| a.index)
            .collect();
        let w1: Vec<usize> = partition(&all, WorkerSlot::new(1, 2).unwrap())
            .iter()
            .map(|a| a.index)
            .collect();
        assert_eq!(w0, vec![0, 2]);
        assert_eq!(w1, vec![1, 3]);
    }
}
