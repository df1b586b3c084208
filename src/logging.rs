use tracing::info_span;
use tracing_subscriber::EnvFilter;

/// Install the stderr log subscriber.
///
/// `RUST_LOG` wins when set; otherwise `--verbose` selects debug output.
pub(crate) fn init_logging(verbose: bool) {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if verbose {
        EnvFilter::new("sariflens=debug")
    } else {
        EnvFilter::new("sariflens=info")
    };

    // A subscriber may already be installed when called more than once.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Run a pipeline phase inside an info span.
pub(crate) fn with_span<T, F>(phase: &str, subject: &str, f: F) -> T
where
    F: FnOnce() -> T,
{
    let span = info_span!("phase", name = phase, subject = subject);
    let _guard = span.enter();
    f()
}
