pub mod input;
pub mod request;
pub mod response;
pub mod version;

pub use input::*;
pub use request::*;
pub use response::*;
pub use version::*;
