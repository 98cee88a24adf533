pub mod local_store;
pub mod memory;
pub mod sqlite;
pub mod types;


pub use local_store::*;
pub use memory::*;
pub use sqlite::*;
pub use types::*;
