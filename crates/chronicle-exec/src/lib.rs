pub mod adapters;
pub mod contracts;
pub mod host;

pub use adapters::*;
pub use contracts::*;
pub use host::*;
