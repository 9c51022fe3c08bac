use serde_json::Value;
use std::fmt;

const DEFAULT_TITLE: &str = "Story Keep";
const DEFAULT_ICON: &str = "/images/icon-192x192.png";
const DEFAULT_BADGE: &str = "/images/icon-72x72.png";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
}

/// What gets shown for a delivered push message.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationContent {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub image: Option<String>,
  pub tag: String,
  pub data: Value,
  pub actions: Vec<NotificationAction>,
}

/// Non-empty string at `key`, if there is one.
fn text(value: &Value, key: &str) -> Option<String> {
  value
    .get(key)
    .and_then(Value::as_str)
    .filter(|s| !s.is_empty())
    .map(str::to_string)
}

fn object(value: &Value, key: &str) -> Option<Value> {
  value.get(key).filter(|v| v.is_object()).cloned()
}

/// Actions that name both an action and a title; anything else is skipped.
fn actions(options: &Value) -> Option<Vec<NotificationAction>> {
  let list = options.get("actions")?.as_array()?;
  Some(
    list
      .iter()
      .filter_map(|entry| {
        Some(NotificationAction {
          action: text(entry, "action")?,
          title: text(entry, "title")?,
        })
      })
      .collect(),
  )
}

fn root_url() -> Value {
  serde_json::json!({ "url": "/" })
}

impl Default for NotificationContent {
  /// Shown when the message carries no payload or one that cannot be read.
  fn default() -> Self {
    Self {
      title: DEFAULT_TITLE.to_string(),
      body: "You have a new notification".to_string(),
      icon: DEFAULT_ICON.to_string(),
      badge: DEFAULT_BADGE.to_string(),
      image: None,
      tag: "storykeep-notification".to_string(),
      data: root_url(),
      actions: Vec::new(),
    }
  }
}

impl NotificationContent {
  pub fn from_payload(payload: Option<&[u8]>) -> Self {
    let Some(bytes) = payload else {
      return Self::default();
    };

    let payload: Value = match serde_json::from_slice(bytes) {
      Ok(payload) => payload,
      Err(e) => {
        tracing::warn!(error = %e, "malformed push payload, showing default notification");
        return Self::default();
      }
    };

    let options = payload.get("options").cloned().unwrap_or(Value::Null);
    Self {
      title: text(&payload, "title").unwrap_or_else(|| DEFAULT_TITLE.to_string()),
      body: text(&options, "body")
        .or_else(|| text(&payload, "body"))
        .unwrap_or_else(|| "New story available".to_string()),
      icon: text(&options, "icon").unwrap_or_else(|| DEFAULT_ICON.to_string()),
      badge: text(&options, "badge").unwrap_or_else(|| DEFAULT_BADGE.to_string()),
      image: text(&options, "image"),
      tag: text(&options, "tag").unwrap_or_else(|| "storykeep".to_string()),
      data: object(&options, "data")
        .or_else(|| object(&payload, "data"))
        .unwrap_or_else(root_url),
      actions: actions(&options).unwrap_or_else(|| {
        vec![
          NotificationAction {
            action: "open".to_string(),
            title: "View story".to_string(),
          },
          NotificationAction {
            action: "close".to_string(),
            title: "Dismiss".to_string(),
          },
        ]
      }),
    }
  }

  /// URL to open when the notification is clicked with `action`.
  /// `None` means the click only dismisses it.
  pub fn click_target(&self, action: Option<&str>) -> Option<String> {
    match action {
      None | Some("") | Some("open") => Some(
        self
          .data
          .get("url")
          .and_then(Value::as_str)
          .filter(|url| !url.is_empty())
          .unwrap_or("/")
          .to_string(),
      ),
      Some(_) => None,
    }
  }
}

impl fmt::Display for NotificationContent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "{}", self.title)?;
    writeln!(f, "  {}", self.body)?;
    if let Some(image) = &self.image {
      writeln!(f, "  image: {}", image)?;
    }
    write!(f, "  [{}]", self.tag)?;
    for action in &self.actions {
      write!(f, " ({}: {})", action.action, action.title)?;
    }
    Ok(())
  }
}
