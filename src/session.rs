use tracing::info;

use crate::config::Settings;

/// Context handed to collection entry points.
#[derive(Debug, Default)]
pub(crate) struct Session {
    pub(crate) settings: Settings,
    pub(crate) progress: Progress,
}

impl Session {
    pub(crate) fn new(settings: Settings) -> Self {
        Self {
            settings,
            progress: Progress,
        }
    }
}

/// Advisory progress reporting. Updates never affect the pipeline.
#[derive(Debug, Default)]
pub(crate) struct Progress;

impl Progress {
    pub(crate) fn report(&self, document: &str, message: &str) {
        info!(target: "sariflens::progress", "{document}: {message}");
    }
}
