pub mod check_config;
pub mod health;
pub mod serve;
pub mod version;

pub use check_config::CheckConfig;
pub use health::Health;
pub use serve::Serve;
pub use version::Version;
