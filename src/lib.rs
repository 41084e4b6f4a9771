pub mod admin;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetchers;
pub mod refresh;
pub mod testing; // Scripted upstream transport for tests
pub mod types;
pub mod upstream;
pub mod utils;

pub use cache::CacheClient;
pub use config::Config;
pub use error::{DashboardError, Result};
pub use fetchers::DashboardData;
pub use types::{DataSource, Fetched};
