pub mod auth;
pub mod credentials;

pub use auth::GcpAuth;
pub use credentials::{CredentialError, ServiceAccountKey};
