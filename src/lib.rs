pub mod db;
pub mod error;
pub mod settings;
pub mod utils;
pub mod hashtags;
pub mod profiles;
pub mod posts;
pub mod comments;
pub mod reactions;
pub mod resources;
pub mod ai_client;
pub mod http_server;

pub use error::{GenieError, Result};
