pub mod analysis;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

#[cfg(test)]
pub(crate) mod test_support;

pub use analysis::*;
pub use error::*;
pub use models::*;
pub use services::*;
