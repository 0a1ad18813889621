use std::io;

use thiserror::Error;

/// Convenience alias over [`ErrorKind`].
pub type Result<T> = std::result::Result<T, ErrorKind>;

/// Errors that may occur across the gantry stack.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Underlying transport I/O failed.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
    /// A template field was absent from the value map at encode time.
    #[error("missing field `{0}` in packet values")]
    MissingField(&'static str),
    /// A value did not fit the fixed width reserved for its field.
    #[error("value {value} overflows field `{field}` of {width} byte(s)")]
    FieldOverflow {
        /// Name of the offending field.
        field: &'static str,
        /// The value that did not fit.
        value: u64,
        /// Field width in bytes.
        width: usize,
    },
    /// A byte or text value did not match its field's fixed width.
    #[error("field `{field}` expects {expected} byte(s), got {got}")]
    FieldLength {
        /// Name of the offending field.
        field: &'static str,
        /// Width the template reserves.
        expected: usize,
        /// Length of the value provided.
        got: usize,
    },
    /// A caller supplied a value for a length field; lengths are computed.
    #[error("length field `{0}` must not be supplied; it is computed at encode time")]
    LengthProvided(&'static str),
    /// Inbound bytes were shorter than the template's fixed minimum.
    #[error("packet too short: needed {needed} bytes, got {got}")]
    ShortPacket {
        /// Minimum bytes the template requires.
        needed: usize,
        /// Bytes actually available.
        got: usize,
    },
    /// A decoded field was accessed as the wrong type.
    #[error("field `{field}` is not a {expected}")]
    WrongFieldType {
        /// Name of the field.
        field: &'static str,
        /// The type the accessor expected.
        expected: &'static str,
    },
    /// A field name was absent from a decoded packet.
    #[error("field `{0}` not present in decoded packet")]
    NoSuchField(&'static str),
    /// An action was modified after it was released for transmission.
    #[error("action already released; payload can no longer be modified")]
    ActionReleased,
    /// An action exhausted its retry budget without observing a response.
    #[error("no response on port {port} after {attempts} attempt(s)")]
    RetriesExhausted {
        /// Port the request was sent on.
        port: u8,
        /// Attempts made before giving up.
        attempts: u32,
    },
    /// The owning interface has shut down.
    #[error("interface has shut down")]
    InterfaceClosed,
    /// No port binding exists for the requested port number.
    #[error("port {0} is not bound on this node")]
    PortUnbound(u8),
    /// The port has no inbound template, so no response can be awaited.
    #[error("port {0} does not expect a response")]
    NoResponseBound(u8),
    /// No collision-free address could be generated.
    #[error("address space exhausted after {0} attempts")]
    AddressExhausted(u32),
    /// A node reported an unexpected run mode during bootloading.
    #[error("node in unexpected mode: expected {expected}, got {got}")]
    WrongMode {
        /// The run mode the operation required.
        expected: char,
        /// The run mode the node reported.
        got: char,
    },
    /// A node rejected or ignored a bootloader command.
    #[error("bootloader command rejected: expected response code {expected}, got {got}")]
    BootloadRefused {
        /// Expected response code.
        expected: u8,
        /// Response code actually received.
        got: u8,
    },
    /// A paged write echoed the wrong page number.
    #[error("page write mismatch: sent page {sent}, node echoed {echoed}")]
    PageMismatch {
        /// Page number transmitted.
        sent: u16,
        /// Page number echoed by the node.
        echoed: u16,
    },
    /// Read-back verification found a page differing from the source image.
    #[error("verify failed: page {0} differs from source image")]
    VerifyMismatch(u16),
    /// The node does not report a valid application after programming.
    #[error("node reports no valid application")]
    AppInvalid,
    /// A node acknowledged a request negatively.
    #[error("node refused the request on port {0}")]
    CommandRefused(u8),
    /// A firmware image file could not be parsed.
    #[error("hex parse error at line {line}: {reason}")]
    HexParse {
        /// 1-based line number in the hex file.
        line: usize,
        /// What went wrong.
        reason: String,
    },
    /// A vector did not match the length a kinematics stage expects.
    #[error("vector length mismatch: expected {expected}, got {got}")]
    VectorLength {
        /// Length the transform was built for.
        expected: usize,
        /// Length of the vector provided.
        got: usize,
    },
    /// Adjacent elements of a chain disagree about units.
    #[error("element chain unit mismatch: `{upstream}` feeds `{downstream}`")]
    UnitMismatch {
        /// Output units of the upstream element.
        upstream: &'static str,
        /// Input units of the downstream element.
        downstream: &'static str,
    },
}
