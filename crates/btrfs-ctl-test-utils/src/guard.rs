// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! RAII wrapper that finalizes a [`TestLogger`] for the test attributes.

use std::path::{Path, PathBuf};

use crate::logging::Outcome;
use crate::{TestLogError, TestLogger};

/// Finalizes the log on success when asked to, and as a failure if the test
/// unwinds or returns without reporting.
pub struct TestLoggerGuard {
    logger: TestLogger,
    completed: bool,
}

impl TestLoggerGuard {
    pub fn new(test_name: &str) -> Result<Self, TestLogError> {
        Ok(Self {
            logger: TestLogger::new(test_name)?,
            completed: false,
        })
    }

    pub fn logger(&mut self) -> &mut TestLogger {
        &mut self.logger
    }

    pub fn finish_success(mut self) -> Result<PathBuf, TestLogError> {
        self.completed = true;
        self.logger.finalize(Outcome::Success)
    }

    pub fn finish_failure<S: AsRef<str>>(mut self, message: S) -> Result<PathBuf, TestLogError> {
        self.completed = true;
        self.logger.finalize(Outcome::Failure(message.as_ref()))
    }

    pub fn log_path(&self) -> &Path {
        self.logger.log_path()
    }
}

impl Drop for TestLoggerGuard {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let reason = if std::thread::panicking() {
            "test panicked"
        } else {
            "test exited without calling finish_success()"
        };
        if let Err(err) = self.logger.finalize(Outcome::Failure(reason)) {
            eprintln!(
                "failed to finalize TestLogger in Drop for {}: {}",
                self.logger.log_path().display(),
                err
            );
        }
    }
}
