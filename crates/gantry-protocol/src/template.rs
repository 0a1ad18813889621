//! Packet template codec.
//!
//! A [`PacketTemplate`] is an ordered list of typed field specifications. It
//! owns no data, only shape: applying a field-name→value map to a template
//! yields an encoded byte sequence, and slicing inbound bytes against the
//! same template yields the map back. Both directions are pure transforms.

use std::{
    collections::HashMap,
    io::{Cursor, Read},
};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use gantry_core::error::{ErrorKind, Result};

/// A single decoded or to-be-encoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// An unsigned integer, at most 8 bytes wide on the wire.
    Uint(u64),
    /// A raw byte run.
    Bytes(Vec<u8>),
    /// A text string.
    Text(String),
}

/// A field-name→value mapping consumed and produced by the codec.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    values: HashMap<&'static str, FieldValue>,
}

impl FieldMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing any prior one under the same name.
    pub fn insert(&mut self, name: &'static str, value: FieldValue) {
        self.values.insert(name, value);
    }

    /// Builder-style insertion of an integer field.
    pub fn with_uint(mut self, name: &'static str, value: u64) -> Self {
        self.insert(name, FieldValue::Uint(value));
        self
    }

    /// Builder-style insertion of a byte-run field.
    pub fn with_bytes(mut self, name: &'static str, value: Vec<u8>) -> Self {
        self.insert(name, FieldValue::Bytes(value));
        self
    }

    /// Builder-style insertion of a text field.
    pub fn with_text(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.insert(name, FieldValue::Text(value.into()));
        self
    }

    /// Returns whether a field of the given name is present.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Typed accessor for an integer field.
    pub fn uint(&self, name: &'static str) -> Result<u64> {
        match self.values.get(name) {
            Some(FieldValue::Uint(value)) => Ok(*value),
            Some(_) => Err(ErrorKind::WrongFieldType { field: name, expected: "uint" }),
            None => Err(ErrorKind::NoSuchField(name)),
        }
    }

    /// Typed accessor for a byte-run field.
    pub fn bytes(&self, name: &'static str) -> Result<&[u8]> {
        match self.values.get(name) {
            Some(FieldValue::Bytes(value)) => Ok(value),
            Some(_) => Err(ErrorKind::WrongFieldType { field: name, expected: "byte run" }),
            None => Err(ErrorKind::NoSuchField(name)),
        }
    }

    /// Typed accessor for a text field.
    pub fn text(&self, name: &'static str) -> Result<&str> {
        match self.values.get(name) {
            Some(FieldValue::Text(value)) => Ok(value),
            Some(_) => Err(ErrorKind::WrongFieldType { field: name, expected: "text" }),
            None => Err(ErrorKind::NoSuchField(name)),
        }
    }

    /// Number of fields present.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns whether the map holds no fields.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Specification of one field within a packet template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSpec {
    /// Fixed-width big-endian unsigned integer, 1..=8 bytes.
    Uint {
        /// Field name.
        name: &'static str,
        /// Width in bytes.
        width: usize,
    },
    /// Raw byte run; unbounded (`None`) runs consume the remaining input.
    Bytes {
        /// Field name.
        name: &'static str,
        /// Width in bytes, or `None` for unbounded.
        width: Option<usize>,
    },
    /// Text; unbounded (`None`) text consumes the remaining input.
    Text {
        /// Field name.
        name: &'static str,
        /// Width in bytes, or `None` for unbounded.
        width: Option<usize>,
    },
    /// One byte holding the total encoded length of all fields after it.
    /// Computed at encode time, skipped at decode time.
    Length {
        /// Field name.
        name: &'static str,
    },
}

impl FieldSpec {
    /// Returns the field's name.
    pub fn name(&self) -> &'static str {
        match self {
            FieldSpec::Uint { name, .. }
            | FieldSpec::Bytes { name, .. }
            | FieldSpec::Text { name, .. }
            | FieldSpec::Length { name } => name,
        }
    }

    fn is_unbounded(&self) -> bool {
        matches!(
            self,
            FieldSpec::Bytes { width: None, .. } | FieldSpec::Text { width: None, .. }
        )
    }

    fn fixed_width(&self) -> usize {
        match self {
            FieldSpec::Uint { width, .. } => *width,
            FieldSpec::Bytes { width, .. } | FieldSpec::Text { width, .. } => width.unwrap_or(0),
            FieldSpec::Length { .. } => 1,
        }
    }
}

/// An ordered, immutable list of field specifications.
///
/// Template shape is a programmer-supplied constant, so shape violations
/// (more than one length field, an unbounded field that is not last, a zero
/// or over-wide integer) panic at construction rather than surfacing as
/// runtime results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketTemplate {
    fields: Vec<FieldSpec>,
}

impl PacketTemplate {
    /// Builds a template from ordered field specifications.
    ///
    /// # Panics
    /// On malformed shape; see the type-level documentation.
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        let mut length_fields = 0;
        for (index, field) in fields.iter().enumerate() {
            if let FieldSpec::Uint { name, width } = field {
                assert!(
                    (1..=8).contains(width),
                    "integer field `{}` must be 1..=8 bytes wide, got {}",
                    name,
                    width
                );
            }
            if let FieldSpec::Length { .. } = field {
                length_fields += 1;
            }
            if field.is_unbounded() {
                assert!(
                    index == fields.len() - 1,
                    "unbounded field `{}` must be the last field",
                    field.name()
                );
            }
        }
        assert!(length_fields <= 1, "a template may hold at most one length field");
        Self { fields }
    }

    /// An empty template: encodes to no bytes, decodes to an empty map.
    pub fn empty() -> Self {
        Self { fields: Vec::new() }
    }

    /// Returns the ordered field specifications.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// The minimum number of bytes a valid encoding of this template holds.
    pub fn min_encoded_len(&self) -> usize {
        self.fields.iter().map(FieldSpec::fixed_width).sum()
    }

    /// Encodes a field map into a byte sequence.
    ///
    /// Fails if a required field is absent, a value does not fit its fixed
    /// width, or a value was supplied for the computed length field.
    pub fn encode(&self, values: &FieldMap) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(self.min_encoded_len());
        let mut length_position = None;

        for field in &self.fields {
            match field {
                FieldSpec::Uint { name, width } => {
                    let value = values.uint(name).map_err(|_| ErrorKind::MissingField(name))?;
                    if *width < 8 && value >= 1u64 << (8 * width) {
                        return Err(ErrorKind::FieldOverflow { field: name, value, width: *width });
                    }
                    buffer.write_uint::<BigEndian>(value, *width)?;
                }
                FieldSpec::Bytes { name, width } => {
                    let value = values.bytes(name).map_err(|_| ErrorKind::MissingField(name))?;
                    if let Some(expected) = width {
                        if value.len() != *expected {
                            return Err(ErrorKind::FieldLength {
                                field: name,
                                expected: *expected,
                                got: value.len(),
                            });
                        }
                    }
                    buffer.extend_from_slice(value);
                }
                FieldSpec::Text { name, width } => {
                    let value = values.text(name).map_err(|_| ErrorKind::MissingField(name))?;
                    if let Some(expected) = width {
                        if value.len() != *expected {
                            return Err(ErrorKind::FieldLength {
                                field: name,
                                expected: *expected,
                                got: value.len(),
                            });
                        }
                    }
                    buffer.extend_from_slice(value.as_bytes());
                }
                FieldSpec::Length { name } => {
                    if values.contains(name) {
                        return Err(ErrorKind::LengthProvided(name));
                    }
                    length_position = Some((*name, buffer.len()));
                    buffer.push(0); // patched below
                }
            }
        }

        if let Some((name, position)) = length_position {
            let trailing = buffer.len() - position - 1;
            if trailing > u8::MAX as usize {
                return Err(ErrorKind::FieldOverflow {
                    field: name,
                    value: trailing as u64,
                    width: 1,
                });
            }
            buffer[position] = trailing as u8;
        }

        Ok(buffer)
    }

    /// Decodes a byte sequence into a field map, discarding any leftover.
    pub fn decode(&self, bytes: &[u8]) -> Result<FieldMap> {
        self.decode_partial(bytes).map(|(fields, _)| fields)
    }

    /// Decodes a byte sequence into a field map plus the undecoded leftover.
    ///
    /// A template ending in an unbounded field always consumes all input;
    /// otherwise the leftover is whatever trails the last fixed field.
    pub fn decode_partial<'a>(&self, bytes: &'a [u8]) -> Result<(FieldMap, &'a [u8])> {
        let needed = self.min_encoded_len();
        if bytes.len() < needed {
            return Err(ErrorKind::ShortPacket { needed, got: bytes.len() });
        }

        let mut fields = FieldMap::new();
        let mut cursor = Cursor::new(bytes);

        for field in &self.fields {
            match field {
                FieldSpec::Uint { name, width } => {
                    let value = cursor
                        .read_uint::<BigEndian>(*width)
                        .map_err(|_| ErrorKind::ShortPacket { needed, got: bytes.len() })?;
                    fields.insert(name, FieldValue::Uint(value));
                }
                FieldSpec::Bytes { name, width } => {
                    let value = Self::read_run(&mut cursor, *width, needed)?;
                    fields.insert(name, FieldValue::Bytes(value));
                }
                FieldSpec::Text { name, width } => {
                    let value = Self::read_run(&mut cursor, *width, needed)?;
                    fields.insert(name, FieldValue::Text(String::from_utf8_lossy(&value).into_owned()));
                }
                FieldSpec::Length { .. } => {
                    // The declared length is framing metadata, not payload.
                    cursor.set_position(cursor.position() + 1);
                }
            }
        }

        let consumed = cursor.position() as usize;
        Ok((fields, &bytes[consumed..]))
    }

    fn read_run(cursor: &mut Cursor<&[u8]>, width: Option<usize>, needed: usize) -> Result<Vec<u8>> {
        let available = cursor.get_ref().len() - cursor.position() as usize;
        let take = width.unwrap_or(available);
        let mut value = vec![0u8; take];
        cursor
            .read_exact(&mut value)
            .map_err(|_| ErrorKind::ShortPacket { needed, got: cursor.get_ref().len() })?;
        Ok(value)
    }
}
