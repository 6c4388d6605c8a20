// Terminal progress reporting
// Purpose: multi-row progress display for batch runs - one refreshing row
// per in-flight database plus an aggregate bar. indicatif degrades to
// no-op drawing when stderr is not a TTY; tracing carries the plain-log
// path either way.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

pub struct ProgressReporter {
    multi: MultiProgress,
    overall: ProgressBar,
}

impl ProgressReporter {
    pub fn new(total_databases: u64) -> Self {
        let multi = MultiProgress::new();
        let overall = multi.add(ProgressBar::new(total_databases));
        overall.set_style(
            ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} databases {msg}")
                .expect("static template"),
        );
        Self { multi, overall }
    }

    /// Add a row for one database run
    pub fn database_started(&self, name: &str) -> DatabaseProgress {
        let bar = self.multi.insert_before(&self.overall, ProgressBar::new_spinner());
        bar.set_style(
            ProgressStyle::with_template("{spinner} {prefix}: {msg}").expect("static template"),
        );
        bar.set_prefix(name.to_string());
        bar.set_message("starting");
        bar.enable_steady_tick(Duration::from_millis(120));
        tracing::info!("{}: starting", name);
        DatabaseProgress { bar, name: name.to_string() }
    }

    /// Count a database that needed no row (skip-existing mode)
    pub fn database_skipped(&self, name: &str) {
        self.overall.inc(1);
        tracing::info!("{}: skipped, dossier exists", name);
    }

    pub fn database_finished(&self, progress: DatabaseProgress, status: &str) {
        progress.bar.finish_and_clear();
        self.overall.inc(1);
        tracing::info!("{}: {}", progress.name, status);
    }

    pub fn finish(&self, message: &str) {
        self.overall.finish_with_message(message.to_string());
    }
}

pub struct DatabaseProgress {
    bar: ProgressBar,
    name: String,
}

impl DatabaseProgress {
    /// Update the phase text shown on this database's row
    pub fn set_phase(&self, phase: &str) {
        self.bar.set_message(phase.to_string());
        tracing::debug!("{}: {}", self.name, phase);
    }
}
