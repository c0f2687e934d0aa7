pub mod api;
pub mod error;
#[cfg(test)]
pub mod fake;
pub mod gateway;
pub mod google;
pub mod models;

pub use error::HealthcareError;
#[cfg(test)]
pub use fake::FakeHealthcareApi;
pub use gateway::HealthcareGateway;
pub use google::GoogleHealthcareApi;

#[cfg(test)]
mod tests;
