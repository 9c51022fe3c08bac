use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};

use super::{Body, FormPart, Method, PartValue, Request, Response, ResponseSource, Transport};
use crate::error::{Error, Result};

/// Transport over the real network.
#[derive(Clone)]
pub struct ReqwestTransport {
  client: reqwest::Client,
}

impl ReqwestTransport {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("storykeep/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

    Ok(Self { client })
  }
}

fn to_form(parts: Vec<FormPart>) -> Result<Form> {
  let mut form = Form::new();
  for part in parts {
    form = match part.value {
      PartValue::Text(value) => form.text(part.name, value),
      PartValue::File {
        bytes,
        file_name,
        mime,
      } => {
        let file = Part::bytes(bytes)
          .file_name(file_name)
          .mime_str(&mime)
          .map_err(|e| Error::Validation(format!("Invalid photo type '{}': {}", mime, e)))?;
        form.part(part.name, file)
      }
    };
  }
  Ok(form)
}

#[async_trait]
impl Transport for ReqwestTransport {
  async fn send(&self, request: Request) -> Result<Response> {
    let method = match request.method {
      Method::Get => reqwest::Method::GET,
      Method::Post => reqwest::Method::POST,
      Method::Delete => reqwest::Method::DELETE,
    };

    let mut builder = self.client.request(method, request.url.clone());
    if let Some(token) = &request.bearer {
      builder = builder.bearer_auth(token);
    }
    builder = match request.body {
      Body::Empty => builder,
      Body::Json(value) => builder.json(&value),
      Body::Multipart(parts) => builder.multipart(to_form(parts)?),
    };

    let response = builder.send().await?;
    let status = response.status().as_u16();
    let content_type = response
      .headers()
      .get(CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(String::from);
    let body = response.bytes().await?.to_vec();

    tracing::debug!(url = %request.url, status, "network response");

    Ok(Response {
      status,
      content_type,
      body,
      source: ResponseSource::Network,
    })
  }
}
