//! Batch Planner (spec.md §4.6): a pure greedy function bounding a batch by
//! file count and byte size.

use lakehouse_registry::TableFile;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone, Copy, Debug)]
pub struct PlannerLimits {
    pub max_files_per_batch: usize,
    pub min_batch_size_bytes: i64,
    pub max_batch_size_bytes: i64,
}

impl Default for PlannerLimits {
    fn default() -> Self {
        Self {
            max_files_per_batch: 10,
            min_batch_size_bytes: 100 * 1024 * 1024,
            max_batch_size_bytes: 1024 * 1024 * 1024,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchStatus {
    Pending,
}

#[derive(Clone, Debug)]
pub struct Batch {
    pub id: String,
    pub created_at_unix_nanos: u128,
    pub status: BatchStatus,
    pub files: Vec<TableFile>,
}

impl Batch {
    pub fn total_size(&self) -> i64 {
        self.files.iter().map(|f| f.file_size).sum()
    }

    pub fn total_rows(&self) -> i64 {
        self.files.iter().map(|f| f.row_count).sum()
    }
}

/// `Plan(files) -> [batch]` (spec.md §4.6 algorithm), with `min_batch_size_bytes`
/// reconciled against spec.md §8 scenario 4's explicit "file-count rule wins
/// before the byte-size rule": an eager close the instant a batch crosses
/// `min_batch_size_bytes` would instead make the byte rule win for any batch
/// of same-ish-sized files (twelve 50 MiB files would close every 2 files
/// against a 100 MiB minimum, never reaching the 10-file cap). Resolved by
/// applying `min_batch_size_bytes` only at the tail: it does not force an
/// early close while the batch is still below `max_files_per_batch` and
/// `max_batch_size_bytes`; instead, an under-sized trailing batch is folded
/// into its predecessor so a run doesn't end on a needlessly tiny batch.
///
/// 1. Accumulate files in order into the current batch.
/// 2. Close and emit before adding a file that would exceed
///    `max_files_per_batch` or `max_batch_size_bytes`.
/// 3. Emit any non-empty trailing batch at end of input.
/// 4. If that trailing batch is under `min_batch_size_bytes` and a previous
///    batch exists, merge it backward as long as the combined file count
///    still respects `max_files_per_batch` (the hard cap); the merge may
///    push the combined batch slightly past `max_batch_size_bytes`, which is
///    the same tolerance property P7 already allows for a single file.
pub fn plan(files: Vec<TableFile>, limits: PlannerLimits) -> Vec<Batch> {
    let mut closed: Vec<(Vec<TableFile>, i64)> = Vec::new();
    let mut current: Vec<TableFile> = Vec::new();
    let mut current_size: i64 = 0;

    for file in files {
        let would_exceed_count = current.len() + 1 > limits.max_files_per_batch;
        let would_exceed_bytes = current_size + file.file_size > limits.max_batch_size_bytes;
        if !current.is_empty() && (would_exceed_count || would_exceed_bytes) {
            closed.push((std::mem::take(&mut current), current_size));
            current_size = 0;
        }

        current_size += file.file_size;
        current.push(file);
    }

    if !current.is_empty() {
        closed.push((current, current_size));
    }

    if closed.len() >= 2 {
        let tail_size = closed.last().unwrap().1;
        if tail_size < limits.min_batch_size_bytes {
            let prev_len = closed[closed.len() - 2].0.len();
            let tail_len = closed.last().unwrap().0.len();
            if prev_len + tail_len <= limits.max_files_per_batch {
                let (mut tail_files, tail_size) = closed.pop().unwrap();
                let (prev_files, prev_size) = closed.last_mut().unwrap();
                prev_files.append(&mut tail_files);
                *prev_size += tail_size;
            }
        }
    }

    closed.into_iter().map(|(files, _)| close_batch(files)).collect()
}

fn close_batch(files: Vec<TableFile>) -> Batch {
    let unix_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos();
    Batch {
        id: format!("batch-{unix_nanos}"),
        created_at_unix_nanos: unix_nanos,
        status: BatchStatus::Pending,
        files,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(id: i64, size: i64) -> TableFile {
        TableFile {
            id,
            table_id: 1,
            file_name: format!("f{id}.parquet"),
            file_path: format!("/data/f{id}.parquet"),
            file_size: size,
            file_type: "parquet".to_string(),
            partition_path: None,
            row_count: 1,
            checksum: None,
            is_compressed: false,
            iceberg_metadata_state: "pending".to_string(),
            created_at: "now".to_string(),
            updated_at: "now".to_string(),
        }
    }

    #[test]
    fn file_count_rule_wins_before_byte_size_rule() {
        // 12 files of 50 MiB each: the planner must emit [10, 2], not
        // size-bounded batches (spec.md §8 scenario 4).
        let files: Vec<TableFile> = (1..=12).map(|i| file(i, 50 * 1024 * 1024)).collect();
        let batches = plan(files, PlannerLimits::default());
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].files.len(), 10);
        assert_eq!(batches[1].files.len(), 2);
    }

    #[test]
    fn min_size_does_not_force_an_early_close_below_the_count_cap() {
        // 120 MiB already clears the 100 MiB minimum after 2 files, but with
        // room left under max_files_per_batch the batch keeps accumulating
        // instead of closing early (file-count rule wins, scenario 4).
        let files = vec![file(1, 60 * 1024 * 1024), file(2, 60 * 1024 * 1024), file(3, 10)];
        let batches = plan(files, PlannerLimits::default());
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].files.len(), 3);
    }

    #[test]
    fn undersized_trailing_batch_is_folded_into_its_predecessor() {
        let limits = PlannerLimits {
            max_files_per_batch: 10,
            min_batch_size_bytes: 100 * 1024 * 1024,
            max_batch_size_bytes: 120 * 1024 * 1024,
        };
        // The first two files fill the 120 MiB byte cap exactly; the third
        // file forces that batch closed. The trailing single file (10 bytes)
        // is far under the 100 MiB minimum and gets merged back into the
        // first batch (count cap has plenty of headroom) rather than shipped
        // as its own tiny batch.
        let files = vec![file(1, 60 * 1024 * 1024), file(2, 60 * 1024 * 1024), file(3, 10)];
        let batches = plan(files, limits);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].files.len(), 3);
    }

    #[test]
    fn undersized_trailing_batch_stays_separate_if_merge_would_exceed_count_cap() {
        let limits = PlannerLimits {
            max_files_per_batch: 2,
            min_batch_size_bytes: 100 * 1024 * 1024,
            max_batch_size_bytes: 1024 * 1024 * 1024,
        };
        let files = vec![
            file(1, 60 * 1024 * 1024),
            file(2, 60 * 1024 * 1024),
            file(3, 10),
            file(4, 10),
        ];
        let batches = plan(files, limits);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].files.len(), 2);
        assert_eq!(batches[1].files.len(), 2);
    }

    #[test]
    fn single_large_file_does_not_close_early_below_two_files() {
        let files = vec![file(1, 200 * 1024 * 1024)];
        let batches = plan(files, PlannerLimits::default());
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].files.len(), 1);
    }

    #[test]
    fn batch_size_bound_is_respected_property_p7() {
        let limits = PlannerLimits {
            max_files_per_batch: 100,
            min_batch_size_bytes: i64::MAX,
            max_batch_size_bytes: 100,
        };
        let files = vec![file(1, 60), file(2, 60), file(3, 60)];
        let batches = plan(files, limits);
        for batch in &batches {
            assert!(batch.total_size() <= limits.max_batch_size_bytes + 60);
            assert!(batch.files.len() <= limits.max_files_per_batch);
        }
    }

    #[test]
    fn empty_input_produces_no_batches() {
        assert!(plan(Vec::new(), PlannerLimits::default()).is_empty());
    }
}
