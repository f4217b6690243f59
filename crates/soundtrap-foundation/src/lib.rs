pub mod error;
pub mod format;
pub mod shutdown;

pub use error::*;
pub use format::*;
pub use shutdown::*;
