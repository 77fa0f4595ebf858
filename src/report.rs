use std::ffi::OsStr;
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use csv::Writer;
use serde::{Deserialize, Serialize};

use crate::error::TraceNetError;
use crate::people::HealthCounts;

/// What one run leaves behind.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub daily_counts: Vec<HealthCounts>,
    pub quarantine_audit: Vec<u8>,
}

/// Results of a batch of runs with the same parameters.
///
/// `history_quarantine` holds each run's quarantine audit, padded with -1 so that every row has
/// the same length.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationResults {
    pub history_s: Vec<Vec<usize>>,
    pub history_e: Vec<Vec<usize>>,
    pub history_i: Vec<Vec<usize>>,
    pub history_r: Vec<Vec<usize>>,
    pub history_quarantine: Vec<Vec<i8>>,
    pub num_days: usize,
    pub n_total: usize,
}

/// Mean health counts over all runs on one day.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct MeanCounts {
    pub susceptible: f64,
    pub exposed: f64,
    pub infected: f64,
    pub removed: f64,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct DailyCountsRow {
    run: usize,
    day: usize,
    susceptible: usize,
    exposed: usize,
    infected: usize,
    removed: usize,
}

// Checks that the path has the expected extension and creates its parent directories.
fn generate_validate_filepath(path: &Path, extension: &str) -> Result<File, TraceNetError> {
    if path.extension().and_then(OsStr::to_str) != Some(extension) {
        return Err(TraceNetError::InvalidArgument(format!(
            "{} must be a .{extension} file",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    Ok(File::create(path)?)
}

impl SimulationResults {
    #[must_use]
    pub fn from_records(records: &[RunRecord], num_days: usize, n_total: usize) -> Self {
        let history = |field: fn(&HealthCounts) -> usize| -> Vec<Vec<usize>> {
            records
                .iter()
                .map(|record| record.daily_counts.iter().map(field).collect())
                .collect()
        };

        let width = records
            .iter()
            .map(|record| record.quarantine_audit.len())
            .max()
            .unwrap_or(0)
            .max(num_days);
        let history_quarantine = records
            .iter()
            .map(|record| {
                let mut row: Vec<i8> = record
                    .quarantine_audit
                    .iter()
                    .map(|&flag| i8::from(flag != 0))
                    .collect();
                row.resize(width, -1);
                row
            })
            .collect();

        SimulationResults {
            history_s: history(|counts| counts.susceptible),
            history_e: history(|counts| counts.exposed),
            history_i: history(|counts| counts.infected),
            history_r: history(|counts| counts.removed),
            history_quarantine,
            num_days,
            n_total,
        }
    }

    #[must_use]
    pub fn runs(&self) -> usize {
        self.history_s.len()
    }

    /// Per-day means over the runs that reached that day.
    #[must_use]
    pub fn mean_daily_counts(&self) -> Vec<MeanCounts> {
        #[allow(clippy::cast_precision_loss)]
        let mean = |history: &[Vec<usize>], day: usize| -> f64 {
            let values: Vec<usize> = history.iter().filter_map(|run| run.get(day).copied()).collect();
            if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<usize>() as f64 / values.len() as f64
            }
        };
        (0..self.num_days)
            .map(|day| MeanCounts {
                susceptible: mean(&self.history_s, day),
                exposed: mean(&self.history_e, day),
                infected: mean(&self.history_i, day),
                removed: mean(&self.history_r, day),
            })
            .collect()
    }

    /// Fraction of imposed quarantines that hit an exposed or infected person, over all runs.
    /// `None` if nobody was quarantined.
    #[must_use]
    pub fn quarantine_precision(&self) -> Option<f64> {
        let flags: Vec<i8> = self
            .history_quarantine
            .iter()
            .flatten()
            .copied()
            .filter(|&flag| flag >= 0)
            .collect();
        if flags.is_empty() {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let precision = flags.iter().filter(|&&flag| flag == 1).count() as f64 / flags.len() as f64;
        Some(precision)
    }

    /// Writes the results as one JSON object.
    ///
    /// # Errors
    /// Returns an error if `path` is not a `.json` file or cannot be written.
    pub fn write_json(&self, path: &Path) -> Result<(), TraceNetError> {
        let file = generate_validate_filepath(path, "json")?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Writes one CSV row per run and day: `run,day,susceptible,exposed,infected,removed`.
    ///
    /// # Errors
    /// Returns an error if `path` is not a `.csv` file or cannot be written.
    pub fn write_daily_counts_csv(&self, path: &Path) -> Result<(), TraceNetError> {
        let file = generate_validate_filepath(path, "csv")?;
        let mut writer = Writer::from_writer(file);
        for run in 0..self.runs() {
            for day in 0..self.history_s[run].len() {
                writer.serialize(DailyCountsRow {
                    run,
                    day,
                    susceptible: self.history_s[run][day],
                    exposed: self.history_e[run][day],
                    infected: self.history_i[run][day],
                    removed: self.history_r[run][day],
                })?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use tempfile::tempdir;

    fn counts(susceptible: usize, exposed: usize, infected: usize, removed: usize) -> HealthCounts {
        HealthCounts {
            susceptible,
            exposed,
            infected,
            removed,
        }
    }

    fn records() -> Vec<RunRecord> {
        vec![
            RunRecord {
                daily_counts: vec![counts(9, 0, 1, 0), counts(8, 1, 1, 0), counts(8, 0, 1, 1)],
                quarantine_audit: vec![1, 0],
            },
            RunRecord {
                daily_counts: vec![counts(9, 0, 1, 0), counts(9, 0, 0, 1), counts(9, 0, 0, 1)],
                quarantine_audit: vec![1, 1, 0, 1, 1],
            },
        ]
    }

    #[test]
    fn histories_and_padding() {
        let results = SimulationResults::from_records(&records(), 3, 10);
        assert_eq!(results.runs(), 2);
        assert_eq!(results.history_s, vec![vec![9, 8, 8], vec![9, 9, 9]]);
        assert_eq!(results.history_r[1], vec![0, 1, 1]);
        // Padded to the longest audit, which is longer than the run.
        assert_eq!(
            results.history_quarantine,
            vec![vec![1, 0, -1, -1, -1], vec![1, 1, 0, 1, 1]]
        );

        let short_audits = SimulationResults::from_records(&records()[..1], 3, 10);
        assert_eq!(short_audits.history_quarantine, vec![vec![1, 0, -1]]);
    }

    #[test]
    fn means_and_precision() {
        let results = SimulationResults::from_records(&records(), 3, 10);
        let means = results.mean_daily_counts();
        assert_eq!(means.len(), 3);
        assert_abs_diff_eq!(means[1].susceptible, 8.5);
        assert_abs_diff_eq!(means[2].removed, 1.0);
        assert_abs_diff_eq!(means[1].infected, 0.5);
        assert_abs_diff_eq!(results.quarantine_precision().unwrap(), 5.0 / 7.0);

        let empty = SimulationResults::from_records(&[RunRecord::default()], 0, 10);
        assert!(empty.quarantine_precision().is_none());
    }

    #[test]
    fn write_and_read_json() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("simulation_results.json");
        let results = SimulationResults::from_records(&records(), 3, 10);
        results.write_json(&path).unwrap();

        let file = File::open(&path).unwrap();
        let value: serde_json::Value = serde_json::from_reader(file).unwrap();
        assert_eq!(value["num_days"], 3);
        assert_eq!(value["n_total"], 10);
        assert_eq!(value["history_quarantine"][0][4], -1);

        let read_back: SimulationResults =
            serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(read_back, results);
    }

    #[test]
    fn write_daily_counts_csv() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("daily_counts.csv");
        let results = SimulationResults::from_records(&records(), 3, 10);
        results.write_daily_counts_csv(&path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec!["run", "day", "susceptible", "exposed", "infected", "removed"]
        );
        let rows: Vec<DailyCountsRow> = reader.deserialize().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 6);
        assert_eq!(
            rows[4],
            DailyCountsRow {
                run: 1,
                day: 1,
                susceptible: 9,
                exposed: 0,
                infected: 0,
                removed: 1,
            }
        );
    }

    #[test]
    fn wrong_extension_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let results = SimulationResults::from_records(&records(), 3, 10);
        assert!(matches!(
            results.write_json(&temp_dir.path().join("results.csv")),
            Err(TraceNetError::InvalidArgument(_))
        ));
        assert!(matches!(
            results.write_daily_counts_csv(&temp_dir.path().join("counts.tsv")),
            Err(TraceNetError::InvalidArgument(_))
        ));
    }
}
