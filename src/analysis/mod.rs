// Text analysis of SQL scripts: identifier canonicalization, dotted reference
// parsing and the regex-driven statement classifier. Nothing here does I/O.

pub mod classifier;
pub mod identifier;
pub mod patterns;
pub mod reference;
pub mod scanner;

pub use classifier::{classify, query_creates_table, query_drops_table, query_renames_table};
pub use identifier::{canonicalize, requote};
pub use reference::{parse_table_ref, split_reference};
