use comfy_table::{Cell, Table};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

/// Process-wide per-stage frame timings.
pub static FRAME_TIMINGS: Lazy<Mutex<StageTimings>> =
    Lazy::new(|| Mutex::new(StageTimings::default()));

#[derive(Debug)]
struct StageStat {
    samples: u32,
    total: Duration,
    min: Duration,
    max: Duration,
    max_at: u32,
}

impl StageStat {
    fn new() -> Self {
        StageStat {
            samples: 0,
            total: Duration::ZERO,
            min: Duration::MAX,
            max: Duration::ZERO,
            max_at: 0,
        }
    }

    fn add(&mut self, sample: Duration) {
        self.samples += 1;
        self.total += sample;
        self.min = self.min.min(sample);
        if sample > self.max {
            self.max = sample;
            self.max_at = self.samples;
        }
    }

    fn mean(&self) -> Duration {
        if self.samples == 0 {
            Duration::ZERO
        } else {
            self.total / self.samples
        }
    }
}

#[derive(Default)]
pub struct StageTimings {
    // insertion order is the order stages run in a frame
    stages: IndexMap<&'static str, StageStat>,
}

impl StageTimings {
    pub fn add(&mut self, stage: &'static str, sample: Duration) {
        self.stages
            .entry(stage)
            .or_insert_with(StageStat::new)
            .add(sample);
    }

    pub fn samples(&self, stage: &str) -> u32 {
        self.stages.get(stage).map(|s| s.samples).unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.stages.clear();
    }

    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table.set_header(vec![
            Cell::new("Stage"),
            Cell::new("Mean"),
            Cell::new("Min"),
            Cell::new("Max@Frame"),
            Cell::new("Samples"),
        ]);
        for (&stage, stat) in &self.stages {
            table.add_row(vec![
                Cell::new(stage),
                Cell::new(format!("{:?}", stat.mean())),
                Cell::new(format!("{:?}", stat.min)),
                Cell::new(format!("{:?}@{}", stat.max, stat.max_at)),
                Cell::new(stat.samples),
            ]);
        }
        table
    }
}

/// Runs `f` and files its wall time under `stage`.
pub fn timed<R>(stage: &'static str, f: impl FnOnce() -> R) -> R {
    let start = Instant::now();
    let result = f();
    let elapsed = start.elapsed();
    if let Ok(mut timings) = FRAME_TIMINGS.lock() {
        timings.add(stage, elapsed);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_track_extremes_in_stage_order() {
        let mut timings = StageTimings::default();
        timings.add("wait", Duration::from_millis(3));
        timings.add("record", Duration::from_millis(1));
        timings.add("wait", Duration::from_millis(9));

        assert_eq!(timings.samples("wait"), 2);
        assert_eq!(timings.samples("record"), 1);
        assert_eq!(timings.samples("missing"), 0);

        let rendered = timings.table().to_string();
        let wait_pos = rendered.find("wait").unwrap();
        let record_pos = rendered.find("record").unwrap();
        assert!(wait_pos < record_pos);
        assert!(rendered.contains("9ms@2"));
    }
}
