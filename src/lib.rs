//! Host-side programmer for the VuXboot serial bootloader
//!
//! The library opens a session with a device running VuXboot, reads its
//! memory geometry, and programs flash and EEPROM with a diff-and-apply
//! algorithm that transfers only changed pages or bytes and verifies every
//! write by reading it back.
//!
//! The [`cli`] module carries the argument structs and file handling used by
//! the `vuxprog` binary; everything else is usable as a library against any
//! [`connection::Transport`] implementation.

pub mod cli;
pub mod connection;
pub mod error;
pub mod flasher;
pub mod ihex;
pub mod program;
pub mod progress;

pub use connection::{SerialTransport, Transport};
pub use error::Error;
pub use flasher::{DeviceProfile, Flasher, WriteProtocol};
pub use program::{program_eeprom, program_flash, read_flash};
