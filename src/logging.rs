//! Leveled logging seam used throughout the reconciliation engine.
//!
//! Levels are part of the observable contract: a `notice` about "no patches
//! to apply or clean" means the run did nothing, a `warning` flags a known
//! limitation, `debug` carries the planner's reasoning.

use std::cell::RefCell;
use std::fmt;

/// Target used for notice-level records forwarded to the `log` facade.
pub const NOTICE_TARGET: &str = "patchset::notice";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Notice,
    Warning,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Notice => "notice",
            Level::Warning => "warning",
        };
        f.write_str(name)
    }
}

/// Sink for engine log lines.
pub trait Logger {
    fn log(&self, level: Level, message: &str);

    fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }

    fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    fn notice(&self, message: &str) {
        self.log(Level::Notice, message);
    }

    fn warning(&self, message: &str) {
        self.log(Level::Warning, message);
    }
}

/// Forwards to the `log` crate facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogLogger;

impl Logger for LogLogger {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::Debug => log::debug!("{message}"),
            Level::Info => log::info!("{message}"),
            Level::Notice => log::info!(target: NOTICE_TARGET, "{message}"),
            Level::Warning => log::warn!("{message}"),
        }
    }
}

/// Keeps every record in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    records: RefCell<Vec<(Level, String)>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(Level, String)> {
        self.records.borrow().clone()
    }

    /// Messages logged at exactly `level`.
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.records
            .borrow()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Whether any record at `level` contains `needle`.
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.records
            .borrow()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }

    pub fn clear(&self) {
        self.records.borrow_mut().clear();
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: Level, message: &str) {
        self.records.borrow_mut().push((level, message.to_string()));
    }
}
