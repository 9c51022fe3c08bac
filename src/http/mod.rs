//! Minimal request/response model shared by the network transport, the
//! caching layer and the API client.

mod reqwest_transport;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use url::Url;

use crate::error::Result;

pub use reqwest_transport::ReqwestTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Post,
  Delete,
}

/// What the requester intends to do with the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Destination {
  /// JSON or other data consumed by code
  #[default]
  Data,
  /// Image shown to the user
  Image,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PartValue {
  Text(String),
  File {
    bytes: Vec<u8>,
    file_name: String,
    mime: String,
  },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormPart {
  pub name: String,
  pub value: PartValue,
}

impl FormPart {
  pub fn text(name: &str, value: impl Into<String>) -> Self {
    Self {
      name: name.to_string(),
      value: PartValue::Text(value.into()),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
  #[default]
  Empty,
  Json(serde_json::Value),
  Multipart(Vec<FormPart>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub destination: Destination,
  pub bearer: Option<String>,
  pub body: Body,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      destination: Destination::Data,
      bearer: None,
      body: Body::Empty,
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::Get, url)
  }

  pub fn with_bearer(mut self, token: &str) -> Self {
    self.bearer = Some(token.to_string());
    self
  }

  pub fn with_body(mut self, body: Body) -> Self {
    self.body = body;
    self
  }

  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = destination;
    self
  }
}

/// Where a response was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  Network,
  Cache,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
  /// HTTP status; 0 for opaque responses
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
  pub source: ResponseSource,
}

impl Response {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
    serde_json::from_slice(&self.body)
  }
}

/// Anything that can carry a request to the network (or pretend to).
///
/// Errors are reserved for failures to get any answer at all; an HTTP error
/// status is still an `Ok` response.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn send(&self, request: Request) -> Result<Response>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
  async fn send(&self, request: Request) -> Result<Response> {
    (**self).send(request).await
  }
}
