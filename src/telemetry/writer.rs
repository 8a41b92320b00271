//! # Telemetry Export
//!
//! Writes collected samples as JSON Lines and summarizes a collection run.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::info;

use super::protocol::TelemetrySample;
use crate::error::Result;

/// Statistics for one collection run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectionSummary {
    /// Number of samples
    pub count: usize,
    /// Seconds between the first and last sample
    pub elapsed_s: f64,
    /// Average milliseconds per sample
    pub avg_sample_ms: f64,
}

impl std::fmt::Display for CollectionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} packets in {:.2} seconds. Avg sample time = {:.2} ms/sample",
            self.count, self.elapsed_s, self.avg_sample_ms
        )
    }
}

/// Summarize a run; `None` for an empty slice
pub fn summarize(samples: &[TelemetrySample]) -> Option<CollectionSummary> {
    let first = samples.first()?;
    let last = samples.last()?;

    let elapsed_s = (last.capture_time - first.capture_time)
        .num_microseconds()
        .unwrap_or(i64::MAX) as f64
        / 1_000_000.0;

    Some(CollectionSummary {
        count: samples.len(),
        elapsed_s,
        avg_sample_ms: 1000.0 * elapsed_s / samples.len() as f64,
    })
}

/// Write one JSON object per sample, one per line
pub fn write_jsonl<W: Write>(mut writer: W, samples: &[TelemetrySample]) -> Result<()> {
    for sample in samples {
        serde_json::to_writer(&mut writer, sample)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Write samples to a JSONL file, replacing it if present
pub fn write_jsonl_file<P: AsRef<Path>>(path: P, samples: &[TelemetrySample]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    write_jsonl(BufWriter::new(file), samples)?;
    info!("Wrote {} samples to {}", samples.len(), path.display());
    Ok(())
}
