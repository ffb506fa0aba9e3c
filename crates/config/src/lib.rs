pub mod connectors;
pub mod credentials;
pub mod env;
pub mod tracing_init;

pub use connectors::{ConnectorConfig, ProviderKind, SyncConfig};
pub use credentials::CredentialRef;
pub use env::AppConfig;
pub use tracing_init::init_tracing;
