//! Protocol module containing the outbound command codec and the inbound
//! notification decoder.

pub mod command;
pub mod notification;

pub use command::{build_command, checksum, CommandFrame, DeskCommand, MemorySlot, INIT_FRAME};
pub use notification::{decode_notification, DeskEvent, FrameError};
