pub mod correlation;
pub mod timing;

pub use correlation::*;
pub use timing::*;
