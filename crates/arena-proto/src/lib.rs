pub mod command;
pub mod device;
pub mod param;

pub use command::{Ack, Command};
pub use device::{Device, DeviceMode, DeviceState, DeviceType};
pub use param::Parameter;

/// Lowest device address on the bus.
pub const FIRST_ADDRESS: u8 = 1;
/// Highest device address on the bus.
pub const LAST_ADDRESS: u8 = 31;
