//! Logging to stderr.

use anyhow::Context as _;

/// A [`clap::Args`] struct for options controlling log output to stderr.
#[derive(Clone, Debug, clap::Args)]
pub(crate) struct LoggingArgs {
    /// Additional logging to stderr, including a status report every tick.
    #[arg(long = "verbose", short = 'v')]
    pub verbose: bool,

    /// Remove timestamps from logs so that they are closer to deterministic.
    #[arg(long = "simplify-log-format", hide = true)]
    pub simplify_log_format: bool,
}

/// Install a [`log`] global logger based on user-provided `options`.
pub(crate) fn install(options: &LoggingArgs) -> Result<(), anyhow::Error> {
    use log::LevelFilter::{Debug, Error, Info, Off};

    let &LoggingArgs {
        verbose,
        simplify_log_format,
    } = options;

    let stderr_logger = simplelog::WriteLogger::new(
        if verbose { Debug } else { Info },
        // Note: This has no target filters because `SimLogger` calls `standard_filter`.
        simplelog::ConfigBuilder::new()
            .set_target_level(Off)
            .set_location_level(Off)
            .set_time_level(if simplify_log_format { Off } else { Error })
            .build(),
        std::io::stderr(),
    );
    let max_level = simplelog::SharedLogger::level(&*stderr_logger);

    log::set_boxed_logger(Box::new(SimLogger { stderr_logger }))
        .context("failed to initialize logging")?;
    log::set_max_level(max_level);
    Ok(())
}

/// Returns whether a log record should be shown. Only our own crates' records are.
fn standard_filter(metadata: &log::Metadata<'_>) -> bool {
    metadata.target().starts_with("meshstream")
}

/// [`log::Log`] implementation that [`install()`] registers globally.
struct SimLogger {
    stderr_logger: Box<simplelog::WriteLogger<std::io::Stderr>>,
}

impl log::Log for SimLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        standard_filter(metadata) && self.stderr_logger.enabled(metadata)
    }

    fn log(&self, record: &log::Record<'_>) {
        if standard_filter(record.metadata()) {
            self.stderr_logger.log(record);
        }
    }

    fn flush(&self) {
        self.stderr_logger.flush();
    }
}
