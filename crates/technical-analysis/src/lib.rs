pub mod fibonacci;
pub mod indicators;
pub mod trend;
pub mod volume;
pub mod weekly_tail;

#[cfg(test)]
mod indicators_tests;

pub use fibonacci::*;
pub use indicators::*;
pub use trend::*;
pub use volume::*;
pub use weekly_tail::*;
