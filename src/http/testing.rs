use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{Request, Response, ResponseSource, Transport};
use crate::error::{Error, Result};

/// Transport replaying scripted outcomes and recording what it was asked.
/// Once the script runs out every request fails as unreachable.
#[derive(Default)]
pub struct ScriptedTransport {
  outcomes: Mutex<VecDeque<Result<Response>>>,
  seen: Mutex<Vec<Request>>,
}

impl ScriptedTransport {
  pub fn push(&self, outcome: Result<Response>) {
    self.outcomes.lock().unwrap().push_back(outcome);
  }

  pub fn calls(&self) -> usize {
    self.seen.lock().unwrap().len()
  }

  pub fn requests(&self) -> Vec<Request> {
    self.seen.lock().unwrap().clone()
  }
}

pub fn respond(status: u16, body: &str) -> Result<Response> {
  Ok(Response {
    status,
    content_type: Some("application/json".into()),
    body: body.as_bytes().to_vec(),
    source: ResponseSource::Network,
  })
}

pub fn offline() -> Result<Response> {
  Err(Error::Network("connection refused".into()))
}

#[async_trait]
impl Transport for ScriptedTransport {
  async fn send(&self, request: Request) -> Result<Response> {
    self.seen.lock().unwrap().push(request);
    self
      .outcomes
      .lock()
      .unwrap()
      .pop_front()
      .unwrap_or_else(offline)
  }
}
