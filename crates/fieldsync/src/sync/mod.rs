pub mod engine;
pub mod http_remote;
pub mod outcome;
pub mod remote;

#[cfg(test)]
mod engine_pbt;

pub use engine::*;
pub use http_remote::*;
pub use outcome::*;
pub use remote::*;
