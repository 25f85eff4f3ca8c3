pub mod circuit;
pub mod dead_letter;
pub mod idempotency;
pub mod mode;

pub use circuit::*;
pub use dead_letter::*;
pub use idempotency::*;
pub use mode::*;
