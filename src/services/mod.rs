pub mod executor;
pub mod index_rename;
pub mod log_sync;
pub mod postgres; // Bundled PostgreSQL executor
pub mod profile;
pub mod registry;
pub mod session;

pub use executor::*;
pub use index_rename::*;
pub use log_sync::*;
pub use postgres::*;
pub use profile::*;
pub use registry::*;
pub use session::*;
