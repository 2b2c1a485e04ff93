// tablevault/src/orchestrator/report.rs
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

use super::task::Outcome;
use crate::errors::Result;

/// Folds outcomes as they arrive; `seal` turns it into a `Report`.
#[derive(Debug, Default)]
pub struct ReportBuilder {
    succeeded: BTreeSet<String>,
    failed: BTreeMap<String, String>,
}

impl ReportBuilder {
    pub fn record(&mut self, outcome: Outcome) {
        if outcome.is_success() {
            self.succeeded.insert(outcome.id().to_string());
        } else {
            self.failed
                .insert(outcome.id().to_string(), outcome.detail().to_string());
        }
    }

    pub fn seal(self, elapsed: Duration) -> Report {
        Report {
            succeeded: self.succeeded,
            failed: self.failed,
            elapsed,
        }
    }
}

/// Order-independent summary of one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    succeeded: BTreeSet<String>,
    failed: BTreeMap<String, String>,
    elapsed: Duration,
}

#[derive(Serialize)]
struct ReportJson<'a> {
    operation: &'a str,
    total: usize,
    succeeded: &'a BTreeSet<String>,
    failed: &'a BTreeMap<String, String>,
    elapsed_seconds: f64,
}

impl Report {
    pub fn succeeded(&self) -> &BTreeSet<String> {
        &self.succeeded
    }

    pub fn failed(&self) -> &BTreeMap<String, String> {
        &self.failed
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn log_summary(&self, operation: &str) {
        for (table, detail) in &self.failed {
            error!(table = %table, "{} failed: {}", operation, detail);
        }
        if self.failed.is_empty() {
            info!(
                "✓ {} finished: all {} table(s) succeeded",
                operation,
                self.succeeded.len()
            );
        } else {
            let names: Vec<&str> = self.failed.keys().map(String::as_str).collect();
            warn!(
                "{} finished: {} succeeded, {} failed: {}",
                operation,
                self.succeeded.len(),
                self.failed.len(),
                names.join(", ")
            );
        }
        info!(
            "{} took {:.2}s in total",
            operation,
            self.elapsed.as_secs_f64()
        );
    }

    pub fn write_json(&self, operation: &str, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let json = ReportJson {
            operation,
            total: self.total(),
            succeeded: &self.succeeded,
            failed: &self.failed,
            elapsed_seconds: self.elapsed.as_secs_f64(),
        };
        serde_json::to_writer_pretty(file, &json)?;
        info!("Report written to {}", path.display());
        Ok(())
    }
}
