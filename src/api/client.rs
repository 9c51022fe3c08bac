use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;

use super::types::{
  ApiEnvelope, ApiLoginResponse, ApiStoriesResponse, ApiStoryResponse, LoginResult, NewStory,
  Story,
};
use crate::error::{Error, Result};
use crate::http::{Body, FormPart, Method, PartValue, Request, Response, Transport};
use crate::push::{PushSubscription, SubscriptionRegistry};
use crate::store::PendingUpload;
use crate::sync::StoryUploader;

/// Story API client over any transport.
pub struct StoryApi<T> {
  base_url: Url,
  transport: T,
}

impl<T: Transport> StoryApi<T> {
  pub fn new(base_url: Url, transport: T) -> Self {
    Self {
      base_url,
      transport,
    }
  }

  pub fn transport(&self) -> &T {
    &self.transport
  }

  fn url(&self, path: &str) -> Result<Url> {
    let joined = format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path);
    Url::parse(&joined).map_err(|e| Error::Validation(format!("Invalid API url {}: {}", joined, e)))
  }

  /// Send and decode a JSON body, turning non-2xx answers into [`Error::Server`].
  async fn send_json<R: DeserializeOwned>(&self, request: Request, fallback: &str) -> Result<R> {
    let response = self.transport.send(request).await?;
    check_status(&response, fallback)?;
    response.json().map_err(|e| Error::Server {
      status: response.status,
      message: format!("{}: unreadable response ({})", fallback, e),
    })
  }

  /// Send a request whose outcome is decided by status alone.
  /// Returns the server's message when the body carries one.
  async fn send_accepted(&self, request: Request, fallback: &str) -> Result<Option<String>> {
    let response = self.transport.send(request).await?;
    check_status(&response, fallback)?;
    Ok(
      response
        .json::<ApiEnvelope>()
        .ok()
        .and_then(|envelope| envelope.message)
        .filter(|m| !m.is_empty()),
    )
  }

  /// Create an account. Returns the server's confirmation message.
  pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<String> {
    let request = Request::new(Method::Post, self.url("register")?).with_body(Body::Json(json!({
      "name": name,
      "email": email,
      "password": password,
    })));
    let message = self.send_accepted(request, "Registration failed").await?;
    Ok(message.unwrap_or_else(|| "User created".to_string()))
  }

  pub async fn login(&self, email: &str, password: &str) -> Result<LoginResult> {
    let request = Request::new(Method::Post, self.url("login")?).with_body(Body::Json(json!({
      "email": email,
      "password": password,
    })));
    let response: ApiLoginResponse = self.send_json(request, "Login failed").await?;
    Ok(response.login_result)
  }

  /// All stories; with `with_location` only those carrying coordinates.
  pub async fn get_stories(&self, token: &str, with_location: bool) -> Result<Vec<Story>> {
    let mut url = self.url("stories")?;
    url
      .query_pairs_mut()
      .append_pair("location", if with_location { "1" } else { "0" });

    let request = Request::get(url).with_bearer(token);
    let response: ApiStoriesResponse = self.send_json(request, "Failed to fetch stories").await?;
    Ok(response.list_story)
  }

  pub async fn get_story(&self, token: &str, id: &str) -> Result<Story> {
    let request = Request::get(self.url(&format!("stories/{}", id))?).with_bearer(token);
    let response: ApiStoryResponse = self
      .send_json(request, "Failed to fetch story detail")
      .await?;
    Ok(response.story)
  }

  /// Submit a story. Without a token it is posted as a guest.
  pub async fn add_story(&self, token: Option<&str>, story: &NewStory) -> Result<String> {
    let mut parts = vec![
      FormPart::text("description", story.description.clone()),
      FormPart {
        name: "photo".to_string(),
        value: PartValue::File {
          bytes: story.photo.bytes.clone(),
          file_name: story.photo.file_name.clone(),
          mime: story.photo.mime.clone(),
        },
      },
    ];
    if let (Some(lat), Some(lon)) = (story.lat, story.lon) {
      parts.push(FormPart::text("lat", lat.to_string()));
      parts.push(FormPart::text("lon", lon.to_string()));
    }

    let request = match token {
      Some(token) => Request::new(Method::Post, self.url("stories")?).with_bearer(token),
      None => Request::new(Method::Post, self.url("stories/guest")?),
    }
    .with_body(Body::Multipart(parts));

    let message = self.send_accepted(request, "Failed to add story").await?;
    Ok(message.unwrap_or_else(|| "Story created".to_string()))
  }

  pub async fn subscribe_notifications(
    &self,
    token: &str,
    subscription: &PushSubscription,
  ) -> Result<()> {
    let request = Request::new(Method::Post, self.url("notifications/subscribe")?)
      .with_bearer(token)
      .with_body(Body::Json(json!({
        "endpoint": subscription.endpoint,
        "keys": subscription.keys,
      })));
    self
      .send_accepted(request, "Failed to send subscription to server")
      .await?;
    Ok(())
  }

  pub async fn unsubscribe_notifications(
    &self,
    token: &str,
    subscription: &PushSubscription,
  ) -> Result<()> {
    let request = Request::new(Method::Delete, self.url("notifications/subscribe")?)
      .with_bearer(token)
      .with_body(Body::Json(json!({ "endpoint": subscription.endpoint })));
    self
      .send_accepted(request, "Failed to remove subscription from server")
      .await?;
    Ok(())
  }
}

#[async_trait]
impl<T: Transport> StoryUploader for StoryApi<T> {
  async fn upload(&self, upload: &PendingUpload) -> Result<()> {
    let message = self
      .add_story(upload.auth_token.as_deref(), &upload.to_new_story())
      .await?;
    tracing::info!(local_id = upload.local_id, %message, "synced queued story");
    Ok(())
  }
}

#[async_trait]
impl<T: Transport> SubscriptionRegistry for StoryApi<T> {
  async fn register_subscription(
    &self,
    token: &str,
    subscription: &PushSubscription,
  ) -> Result<()> {
    self.subscribe_notifications(token, subscription).await
  }

  async fn unregister_subscription(
    &self,
    token: &str,
    subscription: &PushSubscription,
  ) -> Result<()> {
    self.unsubscribe_notifications(token, subscription).await
  }
}

/// Map a non-2xx response to [`Error::Server`], preferring the server's own message.
fn check_status(response: &Response, fallback: &str) -> Result<()> {
  if response.is_success() {
    return Ok(());
  }

  let message = response
    .json::<ApiEnvelope>()
    .ok()
    .and_then(|envelope| envelope.message)
    .filter(|m| !m.is_empty())
    .unwrap_or_else(|| fallback.to_string());

  Err(Error::Server {
    status: response.status,
    message,
  })
}
