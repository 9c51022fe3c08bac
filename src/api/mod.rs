//! Client for the Story REST API.

mod client;
mod types;

pub use client::StoryApi;
pub use types::{LoginResult, NewStory, Photo, Story};
