//! Shared helpers: URL canonicalization and the User-Agent list.

pub mod url_utils;
pub mod user_agents;

pub use url_utils::clean_url;
pub use user_agents::UserAgents;
