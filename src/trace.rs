// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Gate per-operation trace logging on an environment pattern.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::env;

use glob::Pattern;
use log::warn;

/// Environment variable naming the operation trace pattern.
pub const TRACE_ENV: &str = "BINDMAPFS_TRACE";

/// Operation-name filter for developer tracing.
///
/// The pattern uses standard glob syntax (`*`, `?`, character classes) and is
/// matched against operation names such as `getattr` or `readdir`. An unset
/// variable disables tracing entirely. This is a developer facility, not a
/// stable interface.
#[derive(Debug, Clone, Default)]
pub struct TraceFilter {
    pattern: Option<Pattern>,
}

impl TraceFilter {
    /// Build the filter from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let raw = env::var(TRACE_ENV).ok().filter(|value| !value.is_empty());
        Self {
            pattern: raw.as_deref().and_then(compile),
        }
    }

    /// Build a filter from an explicit pattern.
    #[must_use]
    pub fn with_pattern(pattern: &str) -> Self {
        Self {
            pattern: compile(pattern),
        }
    }

    /// Returns true when the named operation should be traced.
    #[must_use]
    pub fn enabled(&self, operation: &str) -> bool {
        self.pattern
            .as_ref()
            .is_some_and(|pattern| pattern.matches(operation))
    }
}

fn compile(pattern: &str) -> Option<Pattern> {
    match Pattern::new(pattern) {
        Ok(compiled) => Some(compiled),
        Err(err) => {
            warn!("invalid {TRACE_ENV} pattern {pattern}: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    fn literal_and_wildcard_patterns() {
        assert!(TraceFilter::with_pattern("getattr").enabled("getattr"));
        assert!(!TraceFilter::with_pattern("getattr").enabled("setattr"));
        assert!(TraceFilter::with_pattern("*").enabled("anything"));
        assert!(TraceFilter::with_pattern("read*").enabled("readdir"));
        assert!(TraceFilter::with_pattern("*dir").enabled("opendir"));
        assert!(TraceFilter::with_pattern("?pen").enabled("open"));
        assert!(!TraceFilter::with_pattern("read?").enabled("read"));
    }

    #[test]
    fn filter_without_pattern_is_disabled() {
        let filter = TraceFilter::default();
        assert!(!filter.enabled("getattr"));
        let filter = TraceFilter::with_pattern("get*");
        assert!(filter.enabled("getattr"));
        assert!(!filter.enabled("readdir"));
    }

    #[test]
    fn invalid_pattern_disables_tracing() {
        let filter = TraceFilter::with_pattern("[");
        assert!(!filter.enabled("getattr"));
    }

    #[test]
    #[serial]
    fn filter_reads_environment() {
        env::set_var(TRACE_ENV, "mk*");
        let filter = TraceFilter::from_env();
        assert!(filter.enabled("mkdir"));
        assert!(!filter.enabled("unlink"));
        env::remove_var(TRACE_ENV);
        let filter = TraceFilter::from_env();
        assert!(!filter.enabled("mkdir"));
    }
}
