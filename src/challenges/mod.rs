mod restart;
mod store;

pub use restart::*;
pub use store::*;
