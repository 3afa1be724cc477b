//! HTTP Handlers

mod job;
mod ping;
mod synthesis;
mod websocket;

pub use job::*;
pub use ping::*;
pub use synthesis::*;
pub use websocket::*;
