//! Kernel wakelock table reader.
//!
//! The kernel exposes a line-oriented table: a header line, then one line
//! per wakelock with tab-separated fields `name count expire_count
//! wake_count active_since total_time`, where `total_time` is nanoseconds.
//! Parsing is tolerant by line (a malformed row is skipped, never fatal)
//! and a missing file means "no data this cycle", not an error.

use std::path::{Path, PathBuf};

use tracing::debug;

/// One row of the kernel table, times already converted to microseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakelockSample {
    pub name: String,
    pub count: u32,
    pub total_time_us: u64,
}

/// Polls a `/proc/wakelocks`-style file.
pub struct KernelWakelockReader {
    path: PathBuf,
}

impl KernelWakelockReader {
    pub const DEFAULT_PATH: &'static str = "/proc/wakelocks";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the raw table. `None` when the file is absent or unreadable;
    /// the caller keeps its previous state in that case.
    pub fn read_table(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Some(text),
            Err(err) => {
                debug!(path = %self.path.display(), %err, "kernel wakelock table unavailable");
                None
            }
        }
    }
}

/// Parse the table text into samples, skipping the header line.
///
/// Nanoseconds are converted to microseconds with round-to-nearest, the
/// same rounding the summary codec uses for its millisecond storage.
pub fn parse_wakelock_table(text: &str) -> Vec<WakelockSample> {
    let mut samples = Vec::new();
    for line in text.lines().skip(1) {
        if let Some(sample) = parse_line(line) {
            samples.push(sample);
        }
    }
    samples
}

fn parse_line(line: &str) -> Option<WakelockSample> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 6 {
        return None;
    }
    let name = fields[0].trim().trim_matches('"');
    if name.is_empty() {
        return None;
    }
    let count: u32 = fields[1].trim().parse().ok()?;
    let total_time_ns: u64 = fields[5].trim().parse().ok()?;
    Some(WakelockSample {
        name: name.to_string(),
        count,
        total_time_us: (total_time_ns + 500) / 1000,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "name\tcount\texpire_count\twake_count\tactive_since\ttotal_time\n\
\"PowerManagerService\"\t104\t0\t0\t0\t6220984375\n\
\"radio-interface\"\t37\t0\t0\t0\t1771843750\n";

    #[test]
    fn parses_rows_and_skips_header() {
        let samples = parse_wakelock_table(TABLE);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].name, "PowerManagerService");
        assert_eq!(samples[0].count, 104);
        assert_eq!(samples[0].total_time_us, 6_220_984);
        assert_eq!(samples[1].name, "radio-interface");
    }

    #[test]
    fn rounds_nanoseconds_to_nearest_microsecond() {
        let text = "header\nwl\t1\t0\t0\t0\t1499\nwl2\t1\t0\t0\t0\t1500\n";
        let samples = parse_wakelock_table(text);
        assert_eq!(samples[0].total_time_us, 1);
        assert_eq!(samples[1].total_time_us, 2);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let text = "header\n\
not enough fields\n\
wl\tnot_a_number\t0\t0\t0\t100\n\
\t9\t0\t0\t0\t100\n\
good\t2\t0\t0\t0\t2000\n";
        let samples = parse_wakelock_table(text);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].name, "good");
    }

    #[test]
    fn empty_table_yields_no_samples() {
        assert!(parse_wakelock_table("header only\n").is_empty());
        assert!(parse_wakelock_table("").is_empty());
    }

    #[test]
    fn missing_file_reads_as_no_data() {
        let reader = KernelWakelockReader::new("/nonexistent/coulomb-wakelocks");
        assert!(reader.read_table().is_none());
    }
}
