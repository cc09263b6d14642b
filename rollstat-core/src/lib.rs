mod clock;
mod window;

pub mod error;
pub mod stats;

pub use clock::*;
pub use window::*;
