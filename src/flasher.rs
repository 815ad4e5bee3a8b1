//! Device session for the VuXboot bootloader protocol
//!
//! A [`Flasher`] exclusively owns one transport for its lifetime and runs the
//! synchronous command/response protocol on it: identify handshake, flash page
//! and EEPROM transfers, reset. Exactly one command is in flight at a time and
//! nothing is retried; any failure aborts the current operation.

use std::time::Duration;

use clap::ValueEnum;
use log::debug;
use strum::Display;

use crate::{
    connection::{Transport, DEFAULT_TIMEOUT},
    error::{Error, ProtocolError},
};

const SIGNATURE: &[u8; 3] = b"VuX";
const STATUS_OK: u8 = b'.';

const CMD_IDENTIFY: u8 = b's';
const CMD_READ_FLASH: u8 = b'r';
const CMD_WRITE_FLASH: u8 = b'w';
const CMD_READ_EEPROM: u8 = b'R';
const CMD_WRITE_EEPROM: u8 = b'W';
const CMD_RESET: u8 = b'q';

/// Memory geometry reported by the identify handshake. Immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProfile {
    pub has_eeprom: bool,
    pub eeprom_bytes: u32,
    pub page_words: u8,
    pub flash_pages: u32,
    pub boot_pages: u32,
}

impl DeviceProfile {
    /// Size of one flash page in bytes, the smallest write granularity.
    pub fn page_bytes(&self) -> usize {
        self.page_words as usize * 2
    }

    /// Pages available to the application, excluding the trailing bootloader
    /// region.
    pub fn app_pages(&self) -> u32 {
        self.flash_pages - self.boot_pages
    }
}

/// Flash-page write handshake variant.
///
/// Two incompatible ack sequences exist across firmware revisions, so the
/// variant is an explicit session parameter rather than a hard-coded choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, ValueEnum)]
#[strum(serialize_all = "kebab-case")]
pub enum WriteProtocol {
    /// Header and payload in one frame, then a single status byte.
    #[default]
    SingleAck,
    /// Header first, wait for an ack, then the payload and a second status.
    DoubleAck,
}

/// One programming session with a device in its bootloader.
pub struct Flasher {
    transport: Box<dyn Transport>,
    write_protocol: WriteProtocol,
    timeout: Duration,
    profile: Option<DeviceProfile>,
}

impl Flasher {
    pub fn new(transport: Box<dyn Transport>, write_protocol: WriteProtocol) -> Self {
        Flasher {
            transport,
            write_protocol,
            timeout: DEFAULT_TIMEOUT,
            profile: None,
        }
    }

    /// Per-read deadline for device responses.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Geometry of the identified device, if the handshake has completed.
    pub fn profile(&self) -> Option<&DeviceProfile> {
        self.profile.as_ref()
    }

    /// Write raw bytes to the port, outside of any protocol framing. Used to
    /// send an application-defined sequence that drops the device into its
    /// bootloader before the handshake.
    pub fn write_raw(&mut self, data: &[u8]) -> Result<(), Error> {
        self.transport.write_all(data)?;
        Ok(())
    }

    /// Run the identify handshake and populate the device profile.
    ///
    /// On any failure the session stays unidentified and no memory operation
    /// will run.
    pub fn identify(&mut self) -> Result<&DeviceProfile, Error> {
        self.transport.write_all(&[CMD_IDENTIFY])?;

        let mut handshake: Vec<u8> = Vec::with_capacity(8);

        let signature = self.read_array::<3>()?;
        if &signature != SIGNATURE {
            return Err(ProtocolError::BadSignature(signature).into());
        }
        handshake.extend_from_slice(&signature);

        let device_type = self.read_byte()?;
        handshake.push(device_type);

        let (has_eeprom, eeprom_size_exp) = match device_type {
            b'f' => (false, 0),
            b'e' => {
                let exp = self.read_byte()?;
                handshake.push(exp);
                (true, exp)
            }
            other => return Err(ProtocolError::BadDeviceType(other).into()),
        };

        let geometry = self.read_array::<3>()?;
        handshake.extend_from_slice(&geometry);
        let [page_words, flash_pages_exp, boot_pages] = geometry;

        let received = self.read_byte()?;
        let computed = handshake.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        // The checksum is the two's complement of the running sum, the same
        // sum-to-zero convention the Intel-HEX records use.
        if computed.wrapping_add(received) != 0 {
            return Err(ProtocolError::BadChecksum { computed, received }.into());
        }

        // A zero page size makes every later size computation degenerate, and
        // the exponents must stay inside u32 range before they are shifted.
        if page_words == 0 {
            return Err(ProtocolError::GeometryOutOfRange {
                field: "page size",
                value: page_words,
            }
            .into());
        }
        if flash_pages_exp >= 32 {
            return Err(ProtocolError::GeometryOutOfRange {
                field: "flash page count exponent",
                value: flash_pages_exp,
            }
            .into());
        }
        if has_eeprom && eeprom_size_exp >= 32 {
            return Err(ProtocolError::GeometryOutOfRange {
                field: "EEPROM size exponent",
                value: eeprom_size_exp,
            }
            .into());
        }

        let profile = DeviceProfile {
            has_eeprom,
            eeprom_bytes: if has_eeprom { 1u32 << eeprom_size_exp } else { 0 },
            page_words,
            flash_pages: 1u32 << flash_pages_exp,
            boot_pages: boot_pages as u32,
        };
        if profile.boot_pages > profile.flash_pages {
            return Err(ProtocolError::BadGeometry {
                boot: profile.boot_pages,
                flash: profile.flash_pages,
            }
            .into());
        }

        debug!("identified device: {profile:?}");
        Ok(self.profile.insert(profile))
    }

    /// Read one flash page back from the device.
    pub fn read_flash_page(&mut self, page: u32) -> Result<Vec<u8>, Error> {
        let profile = self.require_profile()?;
        if page >= profile.flash_pages {
            return Err(Error::PageOutOfRange {
                page,
                pages: profile.flash_pages,
            });
        }
        let page_bytes = profile.page_bytes();

        let mut request = vec![CMD_READ_FLASH];
        request.extend_from_slice(&(page as u16).to_le_bytes());
        self.transport.write_all(&request)?;

        let mut data = vec![0; page_bytes];
        self.transport.read_exact(&mut data, self.timeout)?;
        Ok(data)
    }

    /// Write one flash page, using the ack sequence the session was
    /// configured with.
    pub fn write_flash_page(&mut self, page: u32, data: &[u8]) -> Result<(), Error> {
        let profile = self.require_profile()?;
        if page >= profile.flash_pages {
            return Err(Error::PageOutOfRange {
                page,
                pages: profile.flash_pages,
            });
        }
        if data.len() != profile.page_bytes() {
            return Err(Error::PageSizeMismatch {
                expected: profile.page_bytes(),
                got: data.len(),
            });
        }

        let mut header = vec![CMD_WRITE_FLASH];
        header.extend_from_slice(&(page as u16).to_le_bytes());

        match self.write_protocol {
            WriteProtocol::SingleAck => {
                header.extend_from_slice(data);
                self.transport.write_all(&header)?;
            }
            WriteProtocol::DoubleAck => {
                self.transport.write_all(&header)?;
                if self.read_byte()? != STATUS_OK {
                    return Err(Error::FlashWriteFailed { page });
                }
                self.transport.write_all(data)?;
            }
        }

        if self.read_byte()? != STATUS_OK {
            return Err(Error::FlashWriteFailed { page });
        }
        Ok(())
    }

    /// Read the entire EEPROM.
    pub fn read_eeprom(&mut self) -> Result<Vec<u8>, Error> {
        let profile = self.require_profile()?;
        if !profile.has_eeprom {
            return Err(Error::NoEeprom);
        }
        let size = profile.eeprom_bytes as usize;

        self.transport.write_all(&[CMD_READ_EEPROM])?;

        let mut data = vec![0; size];
        self.transport.read_exact(&mut data, self.timeout)?;
        Ok(data)
    }

    /// Write a single EEPROM byte.
    pub fn write_eeprom_byte(&mut self, address: u32, byte: u8) -> Result<(), Error> {
        let profile = self.require_profile()?;
        if !profile.has_eeprom {
            return Err(Error::NoEeprom);
        }
        if address >= profile.eeprom_bytes {
            return Err(Error::EepromAddressOutOfRange {
                address,
                size: profile.eeprom_bytes,
            });
        }

        let mut request = vec![CMD_WRITE_EEPROM];
        request.extend_from_slice(&(address as u16).to_le_bytes());
        request.push(byte);
        self.transport.write_all(&request)?;

        if self.read_byte()? != STATUS_OK {
            return Err(Error::EepromWriteFailed { address });
        }
        Ok(())
    }

    /// Reset the device. Fire-and-forget, the bootloader does not reply.
    pub fn reset(&mut self) -> Result<(), Error> {
        self.transport.write_all(&[CMD_RESET])?;
        Ok(())
    }

    /// Close the session and release the transport.
    pub fn into_transport(self) -> Box<dyn Transport> {
        self.transport
    }

    fn require_profile(&self) -> Result<DeviceProfile, Error> {
        self.profile.ok_or(Error::NotIdentified)
    }

    fn read_byte(&mut self) -> Result<u8, Error> {
        Ok(self.read_array::<1>()?[0])
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let mut buf = [0; N];
        self.transport.read_exact(&mut buf, self.timeout)?;
        Ok(buf)
    }
}
