pub mod device;
pub mod input;
pub mod monitor;

pub use device::*;
pub use input::*;
pub use monitor::*;
