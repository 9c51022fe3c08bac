mod api;
mod app;
mod cache;
mod clock;
mod commands;
mod config;
mod db;
mod error;
mod http;
mod logging;
mod push;
mod store;
mod sync;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "storykeep")]
#[command(about = "Share geotagged stories, online or off")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/storykeep/config.yaml)
  #[arg(short, long, env = "STORYKEEP_CONFIG")]
  config: Option<PathBuf>,

  /// Also log to stderr
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let data_dir = config.data_dir()?;

  let _log_guard = logging::init(&data_dir, args.verbose)?;
  tracing::debug!(data_dir = %data_dir.display(), "starting");

  // Build the services and run the command
  let app = app::App::new(config, &data_dir)?;
  app.run(args.command).await?;

  Ok(())
}
