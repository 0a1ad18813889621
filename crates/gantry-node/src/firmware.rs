//! Firmware images and Intel HEX parsing.

use std::{fs, path::Path};

use tracing::debug;

use gantry_core::{
    constants::BOOTLOADER_PAGE_SIZE,
    error::{ErrorKind, Result},
};

/// A contiguous firmware image ready for paged upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    data: Vec<u8>,
}

impl FirmwareImage {
    /// Wraps raw image bytes.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Parses an Intel HEX file from disk.
    pub fn from_hex_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_hex_str(&text)
    }

    /// Parses Intel HEX text.
    ///
    /// Handles data, end-of-file and extended segment/linear address
    /// records; start-address records are ignored. Data must be address-
    /// contiguous within each addressing segment.
    pub fn from_hex_str(text: &str) -> Result<Self> {
        let mut data = Vec::new();
        let mut base = 0usize;
        let mut next_address: Option<usize> = None;

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            let record = HexRecord::parse(trimmed, line)?;
            match record.kind {
                0 => {
                    let location = base + record.offset as usize;
                    match next_address {
                        Some(expected) if expected != location => {
                            return Err(ErrorKind::HexParse {
                                line,
                                reason: format!(
                                    "address gap: expected {:#06x}, got {:#06x}",
                                    expected, location
                                ),
                            });
                        }
                        _ => {}
                    }
                    next_address = Some(location + record.data.len());
                    data.extend_from_slice(&record.data);
                }
                1 => break,
                2 => {
                    base = segment_base(&record, line)? * 16;
                    next_address = None;
                }
                4 => {
                    base = segment_base(&record, line)? << 16;
                    next_address = None;
                }
                3 | 5 => debug!(line, kind = record.kind, "ignoring start-address record"),
                kind => {
                    return Err(ErrorKind::HexParse {
                        line,
                        reason: format!("unknown record type {}", kind),
                    });
                }
            }
        }

        Ok(Self { data })
    }

    /// The raw image bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Image size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the image holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Slices the image into fixed-size bootloader pages, zero-filling the
    /// tail page.
    pub fn pages(&self) -> Vec<Vec<u8>> {
        self.data
            .chunks(BOOTLOADER_PAGE_SIZE)
            .map(|chunk| {
                let mut page = chunk.to_vec();
                page.resize(BOOTLOADER_PAGE_SIZE, 0);
                page
            })
            .collect()
    }
}

struct HexRecord {
    kind: u8,
    offset: u16,
    data: Vec<u8>,
}

impl HexRecord {
    fn parse(line: &str, line_no: usize) -> Result<Self> {
        let hex = line.strip_prefix(':').ok_or_else(|| ErrorKind::HexParse {
            line: line_no,
            reason: "record does not start with ':'".to_owned(),
        })?;
        if hex.len() % 2 != 0 {
            return Err(ErrorKind::HexParse {
                line: line_no,
                reason: "odd number of hex digits".to_owned(),
            });
        }

        let bytes = (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
            .collect::<std::result::Result<Vec<u8>, _>>()
            .map_err(|_| ErrorKind::HexParse {
                line: line_no,
                reason: "invalid hex digit".to_owned(),
            })?;
        if bytes.len() < 5 {
            return Err(ErrorKind::HexParse {
                line: line_no,
                reason: "record too short".to_owned(),
            });
        }

        let length = bytes[0] as usize;
        if bytes.len() != length + 5 {
            return Err(ErrorKind::HexParse {
                line: line_no,
                reason: format!("declared {} data bytes, found {}", length, bytes.len() - 5),
            });
        }
        if bytes.iter().fold(0u8, |sum, &b| sum.wrapping_add(b)) != 0 {
            return Err(ErrorKind::HexParse {
                line: line_no,
                reason: "record checksum mismatch".to_owned(),
            });
        }

        Ok(Self {
            kind: bytes[3],
            offset: u16::from_be_bytes([bytes[1], bytes[2]]),
            data: bytes[4..4 + length].to_vec(),
        })
    }
}

fn segment_base(record: &HexRecord, line: usize) -> Result<usize> {
    if record.data.len() != 2 {
        return Err(ErrorKind::HexParse {
            line,
            reason: "address record must carry two data bytes".to_owned(),
        });
    }
    Ok(u16::from_be_bytes([record.data[0], record.data[1]]) as usize)
}
