//! Subcommands and their arguments
use clap::Subcommand;
use std::path::PathBuf;

use crate::store::FavoriteSort;

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Create an account
  Register {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    /// Falls back to STORYKEEP_PASSWORD
    #[arg(long)]
    password: Option<String>,
  },

  /// Sign in and remember the session
  Login {
    #[arg(long)]
    email: String,
    /// Falls back to STORYKEEP_PASSWORD
    #[arg(long)]
    password: Option<String>,
  },

  /// Forget the stored session
  Logout,

  /// List stories (only those with a location unless --all)
  Stories {
    #[arg(long)]
    all: bool,
  },

  /// Show one story
  Story { id: String },

  /// Share a new story; queued for later if the network is down
  Post {
    #[arg(short, long)]
    description: String,
    /// Image file (jpg, png, gif or webp, at most 1 MB)
    #[arg(short, long)]
    photo: PathBuf,
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    lat: Option<f64>,
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    lon: Option<f64>,
    /// Post without signing in
    #[arg(long)]
    guest: bool,
  },

  /// Manage saved stories
  #[command(subcommand)]
  #[command(visible_alias = "fav")]
  Favorites(FavoritesCommand),

  /// Inspect queued submissions
  #[command(subcommand)]
  Pending(PendingCommand),

  /// Deliver queued submissions
  Sync {
    /// Act as a deferred sync signal with this tag
    #[arg(long)]
    tag: Option<String>,
    /// Keep running and sync whenever the network comes back
    #[arg(long)]
    watch: bool,
  },

  /// Manage push notifications
  #[command(subcommand)]
  Push(PushCommand),

  /// Render a push payload the way it would be shown
  Notify {
    /// JSON payload file; omit for an empty message
    #[arg(long)]
    payload: Option<PathBuf>,
    /// Notification action to simulate clicking
    #[arg(long)]
    action: Option<String>,
  },

  /// Fetch a URL through the offline cache
  Fetch {
    url: url::Url,
    /// Treat the request as an image load
    #[arg(long)]
    image: bool,
    /// Write the body to this file
    #[arg(short, long)]
    out: Option<PathBuf>,
  },

  /// Purge expired offline copies and cache entries
  Maintain,
}

#[derive(Subcommand, Debug)]
pub enum FavoritesCommand {
  /// Save a story
  Add { id: String },
  /// Remove a saved story
  #[command(visible_alias = "rm")]
  Remove { id: String },
  #[command(visible_alias = "ls")]
  List {
    /// newest, oldest or name
    #[arg(long, default_value = "newest")]
    sort: FavoriteSort,
  },
  /// Match name or description, ignoring case
  Search { query: String },
}

#[derive(Subcommand, Debug)]
pub enum PendingCommand {
  #[command(visible_alias = "ls")]
  List,
  /// Drop one queued submission
  Discard { id: i64 },
  /// Drop every queued submission
  Clear,
}

#[derive(Subcommand, Debug)]
pub enum PushCommand {
  Subscribe,
  Unsubscribe,
  Status,
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser, Debug)]
  struct Cli {
    #[command(subcommand)]
    command: Command,
  }

  fn parse(args: &[&str]) -> Command {
    Cli::try_parse_from(std::iter::once("storykeep").chain(args.iter().copied()))
      .unwrap()
      .command
  }

  #[test]
  fn test_post_accepts_negative_coordinates() {
    match parse(&["post", "-d", "At the beach", "-p", "a.jpg", "--lat", "-8.4", "--lon", "115.2"]) {
      Command::Post { lat, lon, guest, .. } => {
        assert_eq!(lat, Some(-8.4));
        assert_eq!(lon, Some(115.2));
        assert!(!guest);
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn test_post_requires_both_coordinates() {
    let result = Cli::try_parse_from(["storykeep", "post", "-d", "x", "-p", "a.jpg", "--lat", "1"]);
    assert!(result.is_err());
  }

  #[test]
  fn test_favorites_sort_parses() {
    match parse(&["fav", "ls", "--sort", "Name"]) {
      Command::Favorites(FavoritesCommand::List { sort }) => assert_eq!(sort, FavoriteSort::Name),
      other => panic!("unexpected {:?}", other),
    }
    assert!(Cli::try_parse_from(["storykeep", "favorites", "list", "--sort", "rating"]).is_err());
  }

  #[test]
  fn test_sync_tag() {
    match parse(&["sync", "--tag", "sync-stories"]) {
      Command::Sync { tag, watch } => {
        assert_eq!(tag.as_deref(), Some("sync-stories"));
        assert!(!watch);
      }
      other => panic!("unexpected {:?}", other),
    }
  }
}
