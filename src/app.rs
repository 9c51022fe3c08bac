use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::api::{NewStory, Photo, Story, StoryApi};
use crate::cache::{CacheStorage, CachingTransport, NoopCacheStorage, RouteTable, SqliteCacheStorage};
use crate::clock::{Clock, SystemClock};
use crate::commands::{Command, FavoritesCommand, PendingCommand, PushCommand};
use crate::config::Config;
use crate::db::Database;
use crate::error::Error;
use crate::http::{Destination, ReqwestTransport, Request, ResponseSource, Transport};
use crate::push::{NotificationContent, PushManager, PushState, StoredPushPlatform};
use crate::store::{FavoriteRecord, Store};
use crate::sync::{self, ConnectivityMonitor, SyncOutcome, SyncReconciler, SyncTrigger};

type Network = Arc<ReqwestTransport>;
type Api = Arc<StoryApi<CachingTransport<Network>>>;

/// Composition root: owns every service and runs one command against them.
pub struct App {
  config: Config,
  store: Arc<Store>,
  api: Api,
  sync: SyncReconciler<Api>,
  push: PushManager<StoredPushPlatform, Api>,
}

impl App {
  pub fn new(config: Config, data_dir: &Path) -> Result<Self> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(Store::new(
      Database::at(data_dir.join("stories.db")),
      clock.clone(),
    ));

    let storage: Arc<dyn CacheStorage> = if config.cache.enabled {
      match SqliteCacheStorage::open(&data_dir.join("cache.db")) {
        Ok(storage) => Arc::new(storage),
        Err(e) => {
          tracing::warn!(error = %e, "offline cache unavailable, running network-only");
          Arc::new(NoopCacheStorage)
        }
      }
    } else {
      Arc::new(NoopCacheStorage)
    };

    let network: Network = Arc::new(ReqwestTransport::new()?);
    let routes = RouteTable::standard(&config.api.base_url, &config.cache);
    let api = Arc::new(StoryApi::new(
      config.api.base_url.clone(),
      CachingTransport::new(network, storage, routes, clock),
    ));

    let sync = SyncReconciler::new(store.clone(), api.clone());
    let push = PushManager::new(
      StoredPushPlatform::new(config.push.clone(), store.clone()),
      api.clone(),
      store.clone(),
      config.push.vapid_public_key.clone(),
    );

    Ok(Self {
      config,
      store,
      api,
      sync,
      push,
    })
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    if needs_network(&command) {
      self.sync_on_start().await;
    }

    match command {
      Command::Register {
        name,
        email,
        password,
      } => {
        let password = resolve_password(password)?;
        let message = self.api.register(&name, &email, &password).await?;
        println!("{}", message);
      }
      Command::Login { email, password } => {
        let password = resolve_password(password)?;
        let session = self.api.login(&email, &password).await?;
        self.store.save_session(&session).await?;
        println!("Signed in as {}", session.name);
      }
      Command::Logout => {
        self.store.clear_session().await?;
        println!("Signed out");
      }
      Command::Stories { all } => self.list_stories(!all).await?,
      Command::Story { id } => self.show_story(&id).await?,
      Command::Post {
        description,
        photo,
        lat,
        lon,
        guest,
      } => self.post(description, &photo, lat, lon, guest).await?,
      Command::Favorites(command) => self.favorites(command).await?,
      Command::Pending(command) => self.pending(command).await?,
      Command::Sync { tag, watch } => {
        if watch {
          self.watch().await?;
        } else {
          self.sync_now(tag).await?;
        }
      }
      Command::Push(command) => self.push(command).await?,
      Command::Notify { payload, action } => {
        let bytes = match payload {
          Some(path) => Some(
            tokio::fs::read(&path)
              .await
              .map_err(|e| eyre!("Failed to read payload {}: {}", path.display(), e))?,
          ),
          None => None,
        };
        let content = NotificationContent::from_payload(bytes.as_deref());
        println!("{}", content);
        match content.click_target(action.as_deref()) {
          Some(url) => println!("click opens {}", url),
          None => println!("click dismisses"),
        }
      }
      Command::Fetch { url, image, out } => self.fetch(url, image, out.as_deref()).await?,
      Command::Maintain => {
        let stories = self
          .store
          .prune_cached_stories(self.config.offline.retention())
          .await?;
        let entries = self.api.transport().purge_expired()?;
        println!(
          "Removed {} offline stories and {} cache entries",
          stories, entries
        );
      }
    }

    Ok(())
  }

  /// Bearer token for API calls: the environment override, else the stored session.
  async fn token(&self) -> Result<String> {
    if let Some(token) = Config::token_override() {
      return Ok(token);
    }
    match self.store.session().await? {
      Some(session) => Ok(session.token),
      None => Err(Error::Unauthenticated.into()),
    }
  }

  async fn online(&self) -> bool {
    sync::probe(self.api.transport().inner(), &self.config.api.base_url).await
  }

  /// Deliver anything queued before running a network command.
  async fn sync_on_start(&self) {
    if !self.config.sync.on_start {
      return;
    }
    match self.store.pending_count().await {
      Ok(0) => return,
      Ok(_) => {}
      Err(e) => {
        tracing::warn!(error = %e, "could not read pending uploads");
        return;
      }
    }

    let online = self.online().await;
    match self.sync.trigger(SyncTrigger::PageLoad, online).await {
      Ok(SyncOutcome::Completed(report)) => {
        if !report.synced.is_empty() {
          eprintln!("Synced {} queued stories", report.synced.len());
        }
        if !report.is_drained() {
          eprintln!("{} stories waiting to sync", report.remaining);
        }
      }
      Ok(_) => {}
      Err(e) => tracing::warn!(error = %e, "start-up sync failed"),
    }
  }

  async fn list_stories(&self, with_location: bool) -> Result<()> {
    let token = self.token().await?;
    match self.api.get_stories(&token, with_location).await {
      Ok(stories) => {
        if let Err(e) = self.store.cache_stories(&stories).await {
          tracing::warn!(error = %e, "could not keep offline copies");
        }
        if stories.is_empty() {
          println!("No stories yet");
        }
        for story in &stories {
          print_story_line(story);
        }
        Ok(())
      }
      Err(e) if e.is_retryable() => {
        let cached = self.store.list_cached_stories().await?;
        if cached.is_empty() {
          return Err(e.into());
        }
        eprintln!("Offline: showing {} saved copies", cached.len());
        for copy in cached
          .iter()
          .filter(|c| !with_location || c.story.lat.is_some())
        {
          print_story_line(&copy.story);
        }
        Ok(())
      }
      Err(e) => Err(e.into()),
    }
  }

  async fn show_story(&self, id: &str) -> Result<()> {
    let token = self.token().await?;
    let story = match self.api.get_story(&token, id).await {
      Ok(story) => {
        if let Err(e) = self.store.cache_stories(std::slice::from_ref(&story)).await {
          tracing::warn!(error = %e, "could not keep offline copy");
        }
        story
      }
      Err(e) if e.is_retryable() => match self.offline_copy(id).await? {
        Some(story) => {
          eprintln!("Offline: showing saved copy");
          story
        }
        None => return Err(e.into()),
      },
      Err(e) => return Err(e.into()),
    };

    print_story(&story);
    if self.store.is_favorite(id).await.unwrap_or(false) {
      println!("  ★ in favorites");
    }
    Ok(())
  }

  /// A locally kept copy of a story: favorites first, then offline copies.
  async fn offline_copy(&self, id: &str) -> Result<Option<Story>> {
    if let Some(favorite) = self.store.get_favorite(id).await? {
      return Ok(Some(favorite.story));
    }
    Ok(self.store.get_cached_story(id).await?.map(|c| c.story))
  }

  async fn post(
    &self,
    description: String,
    photo: &Path,
    lat: Option<f64>,
    lon: Option<f64>,
    guest: bool,
  ) -> Result<()> {
    let bytes = tokio::fs::read(photo)
      .await
      .map_err(|e| eyre!("Failed to read photo {}: {}", photo.display(), e))?;
    let file_name = photo
      .file_name()
      .and_then(|n| n.to_str())
      .unwrap_or("photo.jpg");

    let story = NewStory {
      description: description.trim().to_string(),
      photo: Photo::from_file(file_name, bytes)?,
      lat,
      lon,
    };
    story.validate()?;

    let token = if guest { None } else { Some(self.token().await?) };
    match self.api.add_story(token.as_deref(), &story).await {
      Ok(message) => println!("{}", message),
      Err(e) if e.is_retryable() => {
        tracing::info!(error = %e, "network unavailable, queueing story");
        let local_id = self
          .store
          .enqueue_pending_upload(&story, token.as_deref())
          .await
          .map_err(|storage| eyre!("{} (and it could not be queued: {})", e, storage))?;
        println!("Offline: story queued as #{} and will be sent on the next sync", local_id);
      }
      Err(e) => return Err(e.into()),
    }
    Ok(())
  }

  async fn favorites(&self, command: FavoritesCommand) -> Result<()> {
    match command {
      FavoritesCommand::Add { id } => {
        let story = match self.store.get_cached_story(&id).await? {
          Some(copy) => copy.story,
          None => {
            let token = self.token().await?;
            self.api.get_story(&token, &id).await?
          }
        };
        let record = self.store.add_favorite(&story).await?;
        println!("Saved \"{}\" by {}", short(&record.story.description), record.story.name);
      }
      FavoritesCommand::Remove { id } => {
        self.store.remove_favorite(&id).await?;
        println!("Removed {}", id);
      }
      FavoritesCommand::List { sort } => {
        print_favorites(&self.store.list_favorites(sort).await?);
      }
      FavoritesCommand::Search { query } => {
        print_favorites(&self.store.search_favorites(&query).await?);
      }
    }
    Ok(())
  }

  async fn pending(&self, command: PendingCommand) -> Result<()> {
    match command {
      PendingCommand::List => {
        let pending = self.store.list_pending_uploads().await?;
        if pending.is_empty() {
          println!("Nothing waiting to sync");
        }
        for upload in pending {
          println!(
            "#{:<4} {}  {}  ({} bytes{})",
            upload.local_id,
            upload.timestamp.format("%Y-%m-%d %H:%M"),
            short(&upload.description),
            upload.photo.bytes.len(),
            if upload.auth_token.is_none() { ", guest" } else { "" }
          );
        }
      }
      PendingCommand::Discard { id } => {
        if self.store.delete_pending_upload(id).await? {
          println!("Discarded #{}", id);
        } else {
          return Err(eyre!("No queued story #{}", id));
        }
      }
      PendingCommand::Clear => {
        let removed = self.store.clear_pending_uploads().await?;
        println!("Discarded {} queued stories", removed);
      }
    }
    Ok(())
  }

  async fn sync_now(&self, tag: Option<String>) -> Result<()> {
    let trigger = match tag {
      Some(tag) => SyncTrigger::Background { tag },
      None => SyncTrigger::Manual,
    };
    let online = self.online().await;

    match self.sync.trigger(trigger, online).await? {
      SyncOutcome::Completed(report) => {
        for (id, reason) in &report.failed {
          println!("#{} failed: {}", id, reason);
        }
        println!(
          "Synced {}, {} still waiting",
          report.synced.len(),
          report.remaining
        );
      }
      SyncOutcome::AlreadyRunning => println!("A sync is already running"),
      SyncOutcome::Skipped => println!("Nothing to do"),
    }
    Ok(())
  }

  /// Probe the API periodically and sync on every reconnect until interrupted.
  async fn watch(&self) -> Result<()> {
    let monitor = ConnectivityMonitor::new(false);
    let period = Duration::from_secs(self.config.sync.probe_interval_secs.max(1));
    let probe_url = &self.config.api.base_url;
    println!("Watching connectivity every {}s, Ctrl-C to stop", period.as_secs());

    tokio::select! {
      _ = monitor.poll(self.api.transport().inner(), probe_url, period) => {}
      _ = self.sync.run_on_reconnect(monitor.subscribe()) => {}
      _ = tokio::signal::ctrl_c() => {}
    }
    tracing::info!(online = monitor.is_online(), "stopped watching connectivity");
    Ok(())
  }

  async fn push(&self, command: PushCommand) -> Result<()> {
    match command {
      PushCommand::Subscribe => {
        let token = self.token().await?;
        let subscription = self.push.subscribe(&token).await?;
        println!("Subscribed ({})", subscription.endpoint);
      }
      PushCommand::Unsubscribe => {
        let token = self.token().await?;
        let was_subscribed = self.push.is_subscribed().await?;
        self.push.unsubscribe(&token).await?;
        if was_subscribed {
          println!("Unsubscribed");
        } else {
          println!("No active subscription");
        }
      }
      PushCommand::Status => {
        match self.push.state().await? {
          PushState::Subscribed(subscription) => println!("Subscribed ({})", subscription.endpoint),
          PushState::Unsubscribed => println!("Not subscribed"),
        }
        let enabled = self.store.push_enabled().await?;
        println!("Preference: {}", if enabled { "on" } else { "off" });
      }
    }
    Ok(())
  }

  async fn fetch(&self, url: url::Url, image: bool, out: Option<&Path>) -> Result<()> {
    let destination = if image {
      Destination::Image
    } else {
      Destination::Data
    };
    let response = self
      .api
      .transport()
      .send(Request::get(url).with_destination(destination))
      .await?;

    let source = match response.source {
      ResponseSource::Network => "network",
      ResponseSource::Cache => "cache",
    };
    println!(
      "{} from {}, {} bytes{}",
      response.status,
      source,
      response.body.len(),
      response
        .content_type
        .as_deref()
        .map(|t| format!(" ({})", t))
        .unwrap_or_default()
    );

    if let Some(path) = out {
      tokio::fs::write(path, &response.body)
        .await
        .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;
    }
    Ok(())
  }
}

/// Commands that talk to the API and so benefit from draining the queue first.
fn needs_network(command: &Command) -> bool {
  matches!(
    command,
    Command::Stories { .. }
      | Command::Story { .. }
      | Command::Post { .. }
      | Command::Favorites(FavoritesCommand::Add { .. })
      | Command::Push(PushCommand::Subscribe | PushCommand::Unsubscribe)
  )
}

fn resolve_password(password: Option<String>) -> Result<String> {
  match password {
    Some(password) => Ok(password),
    None => Config::get_password(),
  }
}

fn short(text: &str) -> String {
  const MAX: usize = 60;
  let line = text.lines().next().unwrap_or_default();
  if line.chars().count() > MAX {
    format!("{}…", line.chars().take(MAX).collect::<String>())
  } else {
    line.to_string()
  }
}

fn location(story: &Story) -> String {
  match (story.lat, story.lon) {
    (Some(lat), Some(lon)) => format!("{:.4}, {:.4}", lat, lon),
    _ => "-".to_string(),
  }
}

fn print_story_line(story: &Story) {
  println!(
    "{}  {}  {:<16} {}",
    story.id,
    story.created_at.format("%Y-%m-%d"),
    story.name,
    short(&story.description)
  );
}

fn print_story(story: &Story) {
  println!("{} by {}", story.id, story.name);
  println!("  posted   {}", story.created_at.format("%Y-%m-%d %H:%M UTC"));
  println!("  location {}", location(story));
  println!("  photo    {}", story.photo_url);
  println!();
  println!("{}", story.description);
}

fn print_favorites(favorites: &[FavoriteRecord]) {
  if favorites.is_empty() {
    println!("No favorites");
  }
  for favorite in favorites {
    println!(
      "{}  saved {}  {:<16} {}",
      favorite.story.id,
      favorite.saved_at.format("%Y-%m-%d"),
      favorite.story.name,
      short(&favorite.story.description)
    );
  }
}
