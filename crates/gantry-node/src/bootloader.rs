//! The firmware upload state machine.
//!
//! Built entirely on the standard port calls: reset into the bootloader,
//! start the load, write every page (the node must echo each page number
//! back), re-read and byte-compare every page, then start the application
//! and confirm the node reports a valid one. Any violation aborts the whole
//! upload; there is no partial-success state.

use tracing::{debug, info};

use gantry_core::error::{ErrorKind, Result};
use gantry_protocol::FieldMap;

use crate::{
    firmware::FirmwareImage,
    standard::{ports, RunMode, StandardNode},
};

/// Bootloader command: begin accepting pages.
pub const COMMAND_START_BOOTLOAD: u8 = 0;
/// Bootloader command: jump to the application.
pub const COMMAND_START_APPLICATION: u8 = 1;
/// Command code carried by every paged write.
pub const COMMAND_PAGE_WRITE: u8 = 2;
/// Response code confirming the bootload started.
pub const RESPONSE_BOOTLOAD_STARTED: u8 = 5;
/// Response code confirming the application started.
pub const RESPONSE_APPLICATION_STARTED: u8 = 9;
/// Response code confirming one page write.
pub const RESPONSE_PAGE_WRITTEN: u8 = 1;

impl StandardNode {
    /// Uploads and verifies a firmware image, leaving the node running it.
    pub fn load_program(&self, image: &FirmwareImage) -> Result<()> {
        let status = self.status()?;
        if status.mode == RunMode::Application {
            self.reset()?;
            let status = self.status()?;
            if status.mode != RunMode::Bootloader {
                return Err(ErrorKind::WrongMode {
                    expected: RunMode::Bootloader.status_char(),
                    got: status.mode.status_char(),
                });
            }
        }

        self.command(COMMAND_START_BOOTLOAD, RESPONSE_BOOTLOAD_STARTED)?;

        let pages = image.pages();
        info!(node = self.node().name(), pages = pages.len(), "writing program");
        for (number, page) in pages.iter().enumerate() {
            self.write_page(number as u16, page)?;
        }

        debug!(node = self.node().name(), "verifying program");
        for (number, page) in pages.iter().enumerate() {
            let number = number as u16;
            if self.read_page(number)? != *page {
                return Err(ErrorKind::VerifyMismatch(number));
            }
        }

        self.command(COMMAND_START_APPLICATION, RESPONSE_APPLICATION_STARTED)?;

        let status = self.status()?;
        if status.mode != RunMode::Application {
            return Err(ErrorKind::WrongMode {
                expected: RunMode::Application.status_char(),
                got: status.mode.status_char(),
            });
        }
        if !status.app_valid {
            return Err(ErrorKind::AppInvalid);
        }
        info!(node = self.node().name(), "program loaded");
        Ok(())
    }

    /// Writes one page; the node must echo the page number back.
    pub fn write_page(&self, number: u16, page: &[u8]) -> Result<()> {
        let request = FieldMap::new()
            .with_uint("command_code", u64::from(COMMAND_PAGE_WRITE))
            .with_uint("page_number", u64::from(number))
            .with_bytes("write_data", page.to_vec());
        let response = self.node().call(ports::BOOTLOADER_WRITE, request)?;

        let code = response.uint("response_code")? as u8;
        if code != RESPONSE_PAGE_WRITTEN {
            return Err(ErrorKind::BootloadRefused { expected: RESPONSE_PAGE_WRITTEN, got: code });
        }
        let echoed = response.uint("page_number")? as u16;
        if echoed != number {
            return Err(ErrorKind::PageMismatch { sent: number, echoed });
        }
        Ok(())
    }

    /// Reads one page back from the node's program memory.
    pub fn read_page(&self, number: u16) -> Result<Vec<u8>> {
        let request = FieldMap::new().with_uint("page_number", u64::from(number));
        let response = self.node().call(ports::BOOTLOADER_READ, request)?;
        Ok(response.bytes("read_data")?.to_vec())
    }

    fn command(&self, command_code: u8, expected_response: u8) -> Result<()> {
        let request = FieldMap::new().with_uint("command_code", u64::from(command_code));
        let response = self.node().call(ports::BOOTLOADER_COMMAND, request)?;
        let code = response.uint("response_code")? as u8;
        if code != expected_response {
            return Err(ErrorKind::BootloadRefused { expected: expected_response, got: code });
        }
        Ok(())
    }
}
