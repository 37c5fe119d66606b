//! Progress reporting for write-plan execution

use serde::Serialize;

/// Progress update callbacks
///
/// The flashing engine reports per-file progress through this trait while a
/// single binary is being written.
pub trait ProgressCallbacks {
    /// Initialize some progress report
    fn init(&mut self, addr: u32, total: usize);
    /// Update some progress report
    fn update(&mut self, current: usize);
    /// Finish some progress report
    fn finish(&mut self);
}

/// A snapshot of overall write-plan progress, derived per callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlashProgress {
    /// Completion of the whole plan, 0.0..=100.0.
    pub overall_percent: f32,
    /// Zero-based index of the file currently being written.
    pub current_file_index: usize,
    pub total_files: usize,
    pub current_file_name: String,
    /// Completion of the current file, 0.0..=100.0.
    pub current_file_percent: f32,
}

fn percent(done: u64, total: u64) -> f32 {
    if total == 0 {
        return 100.0;
    }
    (done as f64 / total as f64 * 100.0).clamp(0.0, 100.0) as f32
}

impl FlashProgress {
    /// Derive a progress snapshot from cumulative byte counts.
    ///
    /// `cumulative` is the running total of bytes written across the whole
    /// plan so far, including the current file's partial progress. The
    /// caller must only ever add to it, never recompute it per file, which
    /// is what keeps `overall_percent` monotonically non-decreasing.
    pub fn compute(
        cumulative: u64,
        total_plan_bytes: u64,
        file_index: usize,
        total_files: usize,
        file_name: &str,
        file_written: u64,
        file_total: u64,
    ) -> Self {
        FlashProgress {
            overall_percent: percent(cumulative, total_plan_bytes),
            current_file_index: file_index,
            total_files,
            current_file_name: file_name.to_string(),
            current_file_percent: percent(file_written, file_total),
        }
    }
}

/// Adapts per-file [ProgressCallbacks] from the engine into plan-wide
/// [FlashProgress] events.
///
/// Bytes of completed files accumulate in `completed_bytes`; the current
/// file only contributes its in-flight count. Updates fire synchronously
/// from within the write operation, there is no concurrent delivery.
pub(crate) struct PlanTracker<'a> {
    total_plan_bytes: u64,
    total_files: usize,
    completed_bytes: u64,
    file_index: usize,
    file_name: String,
    file_total: u64,
    file_written: u64,
    last_overall: f32,
    sink: &'a mut dyn FnMut(FlashProgress),
}

impl<'a> PlanTracker<'a> {
    pub(crate) fn new(
        total_plan_bytes: u64,
        total_files: usize,
        sink: &'a mut dyn FnMut(FlashProgress),
    ) -> Self {
        PlanTracker {
            total_plan_bytes,
            total_files,
            completed_bytes: 0,
            file_index: 0,
            file_name: String::new(),
            file_total: 0,
            file_written: 0,
            last_overall: 0.0,
            sink,
        }
    }

    /// Mark the next plan entry as the one in flight.
    pub(crate) fn start_file(&mut self, index: usize, name: &str) {
        self.file_index = index;
        self.file_name = name.to_string();
        self.file_total = 0;
        self.file_written = 0;
    }

    fn emit(&mut self) {
        let mut snapshot = FlashProgress::compute(
            self.completed_bytes + self.file_written,
            self.total_plan_bytes,
            self.file_index,
            self.total_files,
            &self.file_name,
            self.file_written,
            self.file_total,
        );
        // guard against engines that briefly report backwards
        snapshot.overall_percent = snapshot.overall_percent.max(self.last_overall);
        self.last_overall = snapshot.overall_percent;
        (self.sink)(snapshot);
    }
}

impl ProgressCallbacks for PlanTracker<'_> {
    fn init(&mut self, _addr: u32, total: usize) {
        self.file_total = total as u64;
        self.file_written = 0;
        self.emit();
    }

    fn update(&mut self, current: usize) {
        self.file_written = (current as u64).min(self.file_total);
        self.emit();
    }

    fn finish(&mut self) {
        self.file_written = self.file_total;
        self.emit();
        self.completed_bytes += self.file_total;
        self.file_written = 0;
        self.file_total = 0;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn compute_derives_percentages() {
        let progress = FlashProgress::compute(150, 600, 1, 3, "partitions.bin", 50, 200);
        assert_eq!(progress.overall_percent, 25.0);
        assert_eq!(progress.current_file_percent, 25.0);
        assert_eq!(progress.current_file_index, 1);
        assert_eq!(progress.total_files, 3);
    }

    #[test]
    fn compute_clamps_overshoot() {
        let progress = FlashProgress::compute(700, 600, 2, 3, "fs.bin", 300, 300);
        assert_eq!(progress.overall_percent, 100.0);
    }

    #[test]
    fn empty_totals_count_as_complete() {
        let progress = FlashProgress::compute(0, 0, 0, 1, "firmware.bin", 0, 0);
        assert_eq!(progress.overall_percent, 100.0);
    }

    #[test]
    fn tracker_accumulates_across_files() {
        let mut seen = Vec::new();
        let mut sink = |p: FlashProgress| seen.push(p);
        let mut tracker = PlanTracker::new(600, 3, &mut sink);

        tracker.start_file(0, "bootloader.bin");
        tracker.init(0x0, 100);
        tracker.update(100);
        tracker.finish();

        tracker.start_file(1, "partitions.bin");
        tracker.init(0x8000, 200);
        tracker.update(50);

        let last = seen.last().unwrap();
        assert_eq!(last.overall_percent, 25.0);
        assert_eq!(last.current_file_index, 1);
        assert_eq!(last.current_file_name, "partitions.bin");
        assert_eq!(last.current_file_percent, 25.0);
    }

    #[test]
    fn overall_percent_never_decreases() {
        let mut seen = Vec::new();
        let mut sink = |p: FlashProgress| seen.push(p.overall_percent);
        let mut tracker = PlanTracker::new(600, 3, &mut sink);

        tracker.start_file(0, "bootloader.bin");
        tracker.init(0x0, 100);
        for step in [10, 40, 40, 100] {
            tracker.update(step);
        }
        tracker.finish();

        tracker.start_file(1, "partitions.bin");
        tracker.init(0x8000, 200);
        for step in [0, 50, 200] {
            tracker.update(step);
        }
        tracker.finish();

        tracker.start_file(2, "spiffs.bin");
        tracker.init(0x290000, 300);
        tracker.update(300);
        tracker.finish();

        for pair in seen.windows(2) {
            assert!(pair[1] >= pair[0], "progress went backwards: {pair:?}");
        }
        assert_eq!(*seen.last().unwrap(), 100.0);
    }
}
