use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "storykeep=info";

/// Install the global subscriber.
///
/// Events go to a daily log file under `log_dir`; with `verbose` they are
/// mirrored to stderr. Keep the returned guard alive until exit so buffered
/// lines are flushed.
pub fn init(log_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
  let filter = EnvFilter::try_from_env("STORYKEEP_LOG")
    .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

  let appender = tracing_appender::rolling::daily(log_dir, "storykeep.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let file_layer = fmt::layer().with_writer(writer).with_ansi(false);
  let stderr_layer = verbose.then(|| {
    fmt::layer()
      .with_writer(std::io::stderr)
      .with_target(false)
      .boxed()
  });

  tracing_subscriber::registry()
    .with(filter)
    .with(file_layer)
    .with(stderr_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to initialise logging: {}", e))?;

  Ok(guard)
}
