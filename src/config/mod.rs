mod server;

pub use server::{MEMORY_SEARCH_URL, SearchConfig, ServerConfig, UpstreamConfig};
