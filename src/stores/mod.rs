mod memory;
mod redis;

pub use self::redis::*;
pub use memory::*;
