//! ## Printing Module
//!
//! This module is only here to make logging in the terminal easier to read.
//! It prints in appropriate colors depending on the level, and gives the ledger a nice table format.
//!
//! A [Logger] is handed to every task when it is created. It carries the module tag of the task
//! and the level switches read at start-up, so nothing here touches global state.
use std::fmt::Display;
use std::time::SystemTime;

use ansi_term::Colour::{self, Cyan, Green, Purple, Red, White, Yellow};
use unicode_width::UnicodeWidthStr;

use crate::ledger::LedgerEntry;
use crate::types::Call;

/// Structured fields attached to a log line, printed as `key=value`.
pub type Fields<'a> = &'a [(&'a str, &'a dyn Display)];

/// Switches for each print level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintConfig {
    /// Enable/disable printing of errors
    pub err: bool,
    /// Enable/disable printing of warnings
    pub warn: bool,
    /// Enable/disable printing of success messages
    pub ok: bool,
    /// Enable/disable printing of general info
    pub info: bool,
    /// Enable/disable printing of the ledger table on each gossip round
    pub ledger: bool,
}

impl Default for PrintConfig {
    fn default() -> Self {
        PrintConfig { err: true, warn: true, ok: true, info: true, ledger: false }
    }
}

impl PrintConfig {
    /// Every level turned off. Used by tests.
    pub fn silent() -> Self {
        PrintConfig { err: false, warn: false, ok: false, info: false, ledger: false }
    }

    /// Debug mode: only error messages
    pub fn debug() -> Self {
        PrintConfig { err: true, ..PrintConfig::silent() }
    }
}

/// Colour-coded terminal logger, tagged with the module that owns it.
#[derive(Debug, Clone)]
pub struct Logger {
    module: &'static str,
    switches: PrintConfig,
}

impl Logger {
    /// Creates a logger for the main task.
    pub fn new(switches: PrintConfig) -> Self {
        Logger { module: "MAIN", switches }
    }

    /// A logger that prints nothing.
    pub fn silent() -> Self {
        Logger::new(PrintConfig::silent())
    }

    /// Returns a copy of this logger tagged with another module name.
    pub fn module(&self, module: &'static str) -> Logger {
        Logger { module, switches: self.switches }
    }

    /// The level switches of this logger.
    pub fn switches(&self) -> PrintConfig {
        self.switches
    }

    fn line(&self, msg: &str, fields: Fields) -> String {
        let mut out = format!("{:<15}{}", self.module, msg);
        for (key, value) in fields {
            out.push_str(&format!("  {}={}", key, value));
        }
        out
    }

    /// Prints an error message in red to the terminal.
    ///
    /// ## Terminal output
    /// - "\[ERROR\]:   {module} {msg}  key=value ..."
    pub fn err(&self, msg: &str, fields: Fields) {
        if self.switches.err {
            println!("{}{}\n", Red.paint("[ERROR]:   "), Red.paint(self.line(msg, fields)));
        }
    }

    /// Prints a warning message in yellow to the terminal.
    ///
    /// ## Terminal output
    /// - "\[WARNING\]: {module} {msg}  key=value ..."
    pub fn warn(&self, msg: &str, fields: Fields) {
        if self.switches.warn {
            println!("{}{}\n", Yellow.paint("[WARNING]: "), Yellow.paint(self.line(msg, fields)));
        }
    }

    /// Prints a success message in green to the terminal.
    ///
    /// ## Terminal output
    /// - "\[OK\]:      {module} {msg}  key=value ..."
    pub fn ok(&self, msg: &str, fields: Fields) {
        if self.switches.ok {
            println!("{}{}\n", Green.paint("[OK]:      "), Green.paint(self.line(msg, fields)));
        }
    }

    /// Prints an informational message in light blue to the terminal.
    ///
    /// ## Terminal output
    /// - "\[INFO\]:    {module} {msg}  key=value ..."
    pub fn info(&self, msg: &str, fields: Fields) {
        let light_blue = Colour::RGB(102, 178, 255);
        if self.switches.info {
            println!("{}{}\n", light_blue.paint("[INFO]:    "), light_blue.paint(self.line(msg, fields)));
        }
    }

    /// Prints an info line carrying the fields of a call.
    pub fn call(&self, msg: &str, call: &Call) {
        let owner = call.owner.as_deref().unwrap_or("-");
        self.info(msg, &[
            ("kind", &format!("{:?}", call.kind)),
            ("floor", &call.floor),
            ("dir", &format!("{:?}", call.dir)),
            ("owner", &owner),
        ]);
    }

    /// Logs the local ledger to the terminal as a table.
    ///
    /// # Parameters
    /// - `rows`: `(bucket, slot, entry)` for every non-tombstone slot.
    ///
    /// # Behavior
    /// - Exits early unless the `ledger` switch is on.
    /// - Shows bucket, floor, owner and how long ago the order was assigned.
    pub fn ledger(&self, rows: &[(String, String, LedgerEntry)]) {
        if !self.switches.ledger {
            return;
        }
        println!("{}", Purple.bold().paint("┌──────────────────────────────────────────────────┐"));
        println!("{}", Purple.bold().paint("│                   ORDER LEDGER                   │"));
        println!("{}", Purple.bold().paint("└──────────────────────────────────────────────────┘"));
        println!("┌────────────┬───────┬──────────────────┬──────────┐");
        println!("{}", White.bold().paint("│ Bucket     │ Floor │ Owner            │ Age      │"));
        println!("├────────────┼───────┼──────────────────┼──────────┤");
        if rows.is_empty() {
            println!("│ {} │", pad_text("(empty)", 48));
        }
        let now = SystemTime::now();
        for (bucket, slot, entry) in rows {
            let age = now
                .duration_since(entry.assign_time)
                .map(|d| format!("{:.1}s", d.as_secs_f64()))
                .unwrap_or_else(|_| "future".to_string());
            println!(
                "│ {} │ {} │ {} │ {} │",
                Cyan.paint(pad_text(bucket, 10)),
                pad_text(slot, 5),
                pad_text(&entry.owner_id, 16),
                pad_text(&age, 8),
            );
        }
        println!("└────────────┴───────┴──────────────────┴──────────┘");
    }
}

/// Pads `text` with spaces until it is `width` columns wide on screen.
fn pad_text(text: &str, width: usize) -> String {
    let visible_width = UnicodeWidthStr::width(text);
    let padding = width.saturating_sub(visible_width);
    format!("{}{}", text, " ".repeat(padding))
}
