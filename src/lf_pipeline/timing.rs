use std::time::{Duration, Instant};

use tracing::info;

#[derive(Debug, Clone)]
pub struct StageTiming {
    pub name: String,
    pub duration: Duration,
}

/// Accumulated wall-clock time per pipeline stage, summed across views.
#[derive(Debug, Default)]
pub struct StageTimings {
    stages: Vec<StageTiming>,
}

impl StageTimings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, duration: Duration) {
        let name = name.into();
        match self.stages.iter_mut().find(|s| s.name == name) {
            Some(stage) => stage.duration += duration,
            None => self.stages.push(StageTiming { name, duration }),
        }
    }

    pub fn get(&self, name: &str) -> Option<Duration> {
        self.stages
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.duration)
    }

    pub fn total(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    pub fn stages(&self) -> &[StageTiming] {
        &self.stages
    }

    pub fn log_summary(&self) {
        let total = self.total().as_secs_f64();
        for stage in &self.stages {
            let ms = stage.duration.as_secs_f64() * 1000.0;
            let share = if total > 0.0 {
                stage.duration.as_secs_f64() / total * 100.0
            } else {
                0.0
            };
            info!("{:<24} {:>10.3}ms ({:>5.1}%)", stage.name, ms, share);
        }
        info!("{:<24} {:>10.3}ms", "total", total * 1000.0);
    }
}

pub struct Timer {
    start: Instant,
    name: &'static str,
}

impl Timer {
    pub fn start(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    pub fn record(self, timings: &mut StageTimings) {
        timings.add(self.name, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_stages_accumulate() {
        let mut timings = StageTimings::new();
        timings.add("warp", Duration::from_millis(3));
        timings.add("merge", Duration::from_millis(2));
        timings.add("warp", Duration::from_millis(4));

        assert_eq!(timings.get("warp"), Some(Duration::from_millis(7)));
        assert_eq!(timings.total(), Duration::from_millis(9));
        assert_eq!(timings.stages().len(), 2);
    }
}
