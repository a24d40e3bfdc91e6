// Configuration loading

pub mod credentials;
pub mod error;
pub mod settings;

pub use credentials::{AppStoreCredentials, ResolvedAppStoreCredentials, resolve_stripe_key};
pub use error::ConfigError;
pub use settings::{DateColumn, Settings};
