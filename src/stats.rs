//! Statistics collection and export for the application kernel.
//!
//! [`KernelStats`] is updated by the kernel while it routes interactions and
//! dispatches events, and can be exported as JSON or CSV for run analysis.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use crate::types::{SimTime, TimeDisplay};

/// Counters of one kernel run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KernelStats {
    /// Last granted simulation time
    pub final_time: SimTime,

    /// Time advance grants processed
    pub advance_grants: u64,

    /// Interactions handed to the router
    pub interactions_received: u64,

    /// Interactions dropped without effect
    pub interactions_dropped: u64,

    /// Interactions published to the RTI
    pub interactions_sent: u64,

    /// Events inserted into the queue
    pub events_scheduled: u64,

    /// Events executed by their target
    pub events_processed: u64,

    /// Events whose target unit was gone
    pub events_skipped: u64,

    /// Batches handed to the dispatcher
    pub batches_dispatched: u64,

    /// Largest number of simultaneously registered units
    pub peak_units: usize,

    /// Largest queue length seen after a grant
    pub peak_queue_size: usize,

    /// V2X messages purged from the message cache
    pub messages_purged: u64,

    /// Wall-clock time spent in time advance grants, in milliseconds
    pub wall_time_ms: f64,
}

impl KernelStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events executed per wall-clock second.
    pub fn events_per_second(&self) -> f64 {
        if self.wall_time_ms > 0.0 {
            self.events_processed as f64 / (self.wall_time_ms / 1000.0)
        } else {
            0.0
        }
    }

    /// Exports statistics to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Exports statistics to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Exports statistics as `metric,value` CSV.
    pub fn to_csv(&self) -> String {
        let mut csv = String::from("metric,value\n");
        let rows: [(&str, String); 13] = [
            ("final_time", self.final_time.to_string()),
            ("advance_grants", self.advance_grants.to_string()),
            ("interactions_received", self.interactions_received.to_string()),
            ("interactions_dropped", self.interactions_dropped.to_string()),
            ("interactions_sent", self.interactions_sent.to_string()),
            ("events_scheduled", self.events_scheduled.to_string()),
            ("events_processed", self.events_processed.to_string()),
            ("events_skipped", self.events_skipped.to_string()),
            ("batches_dispatched", self.batches_dispatched.to_string()),
            ("peak_units", self.peak_units.to_string()),
            ("peak_queue_size", self.peak_queue_size.to_string()),
            ("messages_purged", self.messages_purged.to_string()),
            ("wall_time_ms", format!("{:.2}", self.wall_time_ms)),
        ];
        for (metric, value) in rows {
            csv.push_str(metric);
            csv.push(',');
            csv.push_str(&value);
            csv.push('\n');
        }
        csv
    }

    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_csv())
    }

    /// Writes a human-readable summary.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "=== Kernel Statistics ===")?;
        writeln!(w, "Final simulation time: {}", TimeDisplay(self.final_time))?;
        writeln!(w, "Advance grants: {}", self.advance_grants)?;
        writeln!(
            w,
            "Interactions: {} received, {} dropped, {} sent",
            self.interactions_received, self.interactions_dropped, self.interactions_sent
        )?;
        writeln!(
            w,
            "Events: {} scheduled, {} processed, {} skipped in {} batches",
            self.events_scheduled, self.events_processed, self.events_skipped, self.batches_dispatched
        )?;
        writeln!(w, "Peak units: {}, peak queue: {}", self.peak_units, self.peak_queue_size)?;
        writeln!(w, "Purged V2X messages: {}", self.messages_purged)?;
        writeln!(
            w,
            "Wall time: {:.2} ms ({:.0} events/s)",
            self.wall_time_ms,
            self.events_per_second()
        )?;
        Ok(())
    }

    /// Returns the summary as a string.
    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        if self.write_summary(&mut buf).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// A simple timer for measuring wall-clock time.
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Returns elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> KernelStats {
        KernelStats {
            final_time: 2_500_000_000,
            advance_grants: 10,
            interactions_received: 40,
            interactions_dropped: 3,
            events_processed: 100,
            wall_time_ms: 50.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_csv_export() {
        let csv = sample().to_csv();
        assert!(csv.starts_with("metric,value\n"));
        assert!(csv.contains("interactions_dropped,3\n"));
        assert!(csv.contains("wall_time_ms,50.00\n"));
        assert_eq!(csv.lines().count(), 14);
    }

    #[test]
    fn test_json_roundtrip() {
        let stats = sample();
        let json = stats.to_json().unwrap();
        let restored: KernelStats = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, stats);
    }

    #[test]
    fn test_summary() {
        let stats = sample();
        assert!((stats.events_per_second() - 2000.0).abs() < 1e-9);
        let summary = stats.summary();
        assert!(summary.contains("Final simulation time: 2.500000000 s"));
        assert!(summary.contains("Advance grants: 10"));
    }

    #[test]
    fn test_timer() {
        let timer = Timer::start();
        assert!(timer.elapsed_ms() >= 0.0);
    }
}
