pub mod classification;
pub mod context;
pub mod dialect;
pub mod log_entry;
pub mod query;
pub mod table_ref;

pub use classification::*;
pub use context::*;
pub use dialect::*;
pub use log_entry::*;
pub use query::*;
pub use table_ref::*;
