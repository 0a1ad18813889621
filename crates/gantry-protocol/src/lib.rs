#![warn(missing_docs)]

//! gantry-protocol: the wire protocol spoken to physical nodes.
//!
//! Three layers, bottom up:
//! - [`crc`]: table-driven CRC-8 integrity checking.
//! - [`template`]: the packet template codec turning field-name→value maps
//!   into byte sequences and back.
//! - [`frame`]: frame building (start byte, address, port, length, CRC) and
//!   the byte-oriented receive-side frame reader.

pub mod crc;
pub mod frame;
pub mod template;

pub use crc::Crc8;
pub use frame::{Frame, FrameReader, TransmitMode};
pub use template::{FieldMap, FieldSpec, FieldValue, PacketTemplate};
