// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Providers let the engine run in different contexts by plugging in
//! implementations of core services. Logging is the one service the
//! engine needs: a unit test wants `println!`, a daemon wants its
//! `slog` drain.

use core::fmt;
use core::fmt::Display;

/// A logging provider logs messages to some destination based on the
/// context in which the engine is running.
///
/// Logging levels are provided by [`LogLevel`]. These levels will map
/// to the underlying provider with varying degrees of success.
pub trait LogProvider: Send + Sync {
    /// Log a message at the specified level.
    fn log(&self, level: LogLevel, msg: &str);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogLevel {
    Note,
    Warn,
    Error,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let level_s = match self {
            Self::Note => "[NOTE]",
            Self::Warn => "[WARN]",
            Self::Error => "[ERROR]",
        };
        write!(f, "{level_s}")
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PrintlnLog;

impl LogProvider for PrintlnLog {
    fn log(&self, level: LogLevel, msg: &str) {
        println!("{level} {msg}");
    }
}

impl LogProvider for slog::Logger {
    fn log(&self, level: LogLevel, msg: &str) {
        match level {
            LogLevel::Note => slog::info!(self, "{}", msg),
            LogLevel::Warn => slog::warn!(self, "{}", msg),
            LogLevel::Error => slog::error!(self, "{}", msg),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;

    struct Capture(Arc<Mutex<Vec<String>>>);

    impl slog::Drain for Capture {
        type Ok = ();
        type Err = slog::Never;

        fn log(
            &self,
            record: &slog::Record,
            _values: &slog::OwnedKVList,
        ) -> Result<(), slog::Never> {
            let line =
                format!("{} {}", record.level().as_short_str(), record.msg());
            self.0.lock().unwrap().push(line);
            Ok(())
        }
    }

    #[test]
    fn slog_levels() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let log = slog::Logger::root(Capture(lines.clone()), slog::o!());
        let provider: &dyn LogProvider = &log;

        provider.log(LogLevel::Note, "port up");
        provider.log(LogLevel::Error, "port gone");

        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "INFO port up");
        assert_eq!(lines[1], "ERRO port gone");
    }
}
