use std::io::IsTerminal;

use anyhow::{Context, Result, bail};

pub(crate) const DEFAULT_MAX_DIAGNOSTICS_PER_FILE: usize = 500;
pub(crate) const MAX_DIAGNOSTICS_ENV: &str = "SARIFLENS_MAX_DIAGNOSTICS";
pub(crate) const BATCH_ENV: &str = "SARIFLENS_BATCH";

/// User-level settings for a loading session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Settings {
    pub(crate) max_diagnostics_per_file: usize,
    /// Prompt for files that cannot be found.
    pub(crate) interactive: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_diagnostics_per_file: DEFAULT_MAX_DIAGNOSTICS_PER_FILE,
            interactive: false,
        }
    }
}

impl Settings {
    /// Defaults, overridden by the process environment.
    pub(crate) fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), std::io::stdin().is_terminal())
    }

    fn from_lookup<F>(lookup: F, stdin_is_terminal: bool) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self {
            interactive: stdin_is_terminal,
            ..Self::default()
        };
        if let Some(value) = lookup(MAX_DIAGNOSTICS_ENV) {
            settings.max_diagnostics_per_file = parse_max_diagnostics(&value)
                .with_context(|| format!("invalid {MAX_DIAGNOSTICS_ENV}"))?;
        }
        if let Some(value) = lookup(BATCH_ENV) {
            let batch = parse_flag(&value).with_context(|| format!("invalid {BATCH_ENV}"))?;
            if batch {
                settings.interactive = false;
            }
        }
        Ok(settings)
    }

    /// Apply command-line overrides on top of the environment.
    pub(crate) fn with_overrides(mut self, max_diagnostics: Option<usize>, batch: bool) -> Self {
        if let Some(max) = max_diagnostics {
            self.max_diagnostics_per_file = max;
        }
        if batch {
            self.interactive = false;
        }
        self
    }
}

pub(crate) fn parse_max_diagnostics(value: &str) -> Result<usize> {
    let max: usize = value
        .trim()
        .parse()
        .with_context(|| format!("not a number: {value}"))?;
    if max == 0 {
        bail!("must be at least 1");
    }
    Ok(max)
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got {other}"),
    }
}
