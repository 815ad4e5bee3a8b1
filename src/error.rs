//! Library and application errors

use std::io;

use miette::Diagnostic;
use thiserror::Error;

/// All possible errors returned by vuxprog
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Error while communicating with the device")]
    #[diagnostic(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Codec(#[from] CodecError),

    #[error("The device has not been identified yet")]
    #[diagnostic(
        code(vuxprog::not_identified),
        help("Call identify() before issuing memory operations")
    )]
    NotIdentified,

    #[error("The device has no EEPROM")]
    #[diagnostic(code(vuxprog::no_eeprom))]
    NoEeprom,

    #[error("Flash page {page} is out of range, device has {pages} pages")]
    #[diagnostic(code(vuxprog::page_out_of_range))]
    PageOutOfRange { page: u32, pages: u32 },

    #[error("EEPROM address {address} is out of range, device has {size} bytes")]
    #[diagnostic(code(vuxprog::eeprom_address_out_of_range))]
    EepromAddressOutOfRange { address: u32, size: u32 },

    #[error("Flash page payload is {got} bytes, device pages are {expected} bytes")]
    #[diagnostic(code(vuxprog::page_size_mismatch))]
    PageSizeMismatch { expected: usize, got: usize },

    #[error("Device refused to write flash page {page}")]
    #[diagnostic(code(vuxprog::flash_write_failed))]
    FlashWriteFailed { page: u32 },

    #[error("Device refused to write EEPROM byte at {address:#06x}")]
    #[diagnostic(code(vuxprog::eeprom_write_failed))]
    EepromWriteFailed { address: u32 },

    #[error("Verification of flash page {page} failed after writing it")]
    #[diagnostic(
        code(vuxprog::verify_failed),
        help("The device is left partially programmed; retry the whole write")
    )]
    VerifyFailed { page: u32 },

    #[error("Verification of EEPROM contents failed after writing")]
    #[diagnostic(code(vuxprog::eeprom_verify_failed))]
    EepromVerifyFailed,

    #[error(
        "Image is {image_pages} pages long but only {app_pages} pages are free before the bootloader region"
    )]
    #[diagnostic(
        code(vuxprog::bootloader_overwrite),
        help("Writing it would overwrite the bootloader and likely brick the device. \
              Pass `--force` if you really know what you are doing")
    )]
    BootloaderOverwrite { image_pages: u32, app_pages: u32 },

    #[error("EEPROM image is {got} bytes but the device only has {size} bytes")]
    #[diagnostic(code(vuxprog::eeprom_image_too_big))]
    EepromImageTooBig { got: usize, size: usize },

    #[error("Failed to open file: {0}")]
    #[diagnostic(code(vuxprog::file_open))]
    FileOpenError(String, #[source] io::Error),
}

impl From<serialport::Error> for Error {
    fn from(err: serialport::Error) -> Self {
        Self::Connection(err.into())
    }
}

/// Transport-level errors
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum ConnectionError {
    #[error("Timed out after {timeout:?} while waiting for {expected} bytes ({received} received)")]
    #[diagnostic(
        code(vuxprog::timeout),
        help("Make sure the device is in its bootloader and the port is correct")
    )]
    ReadTimeout {
        expected: usize,
        received: usize,
        timeout: std::time::Duration,
    },

    #[error("Short write, the port accepted {written} of {expected} bytes")]
    #[diagnostic(code(vuxprog::short_write))]
    IncompleteWrite { written: usize, expected: usize },

    #[error("Serial port error")]
    #[diagnostic(code(vuxprog::serial_error))]
    Serial(#[from] serialport::Error),

    #[error("I/O error on the serial channel")]
    #[diagnostic(code(vuxprog::io_error))]
    Io(#[from] io::Error),
}

/// Handshake and framing errors; the session is unusable after one of these
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    #[error("Wrong signature: expected \"VuX\", received {0:02x?}")]
    #[diagnostic(
        code(vuxprog::bad_signature),
        help("The device on the other end does not speak the VuXboot protocol")
    )]
    BadSignature([u8; 3]),

    #[error("Wrong device type byte: {0:#04x}")]
    #[diagnostic(code(vuxprog::bad_device_type))]
    BadDeviceType(u8),

    #[error("Handshake checksum mismatch: computed {computed:#04x}, received {received:#04x}")]
    #[diagnostic(code(vuxprog::bad_handshake_checksum))]
    BadChecksum { computed: u8, received: u8 },

    #[error("Device reports {boot} boot pages but only {flash} flash pages")]
    #[diagnostic(code(vuxprog::bad_geometry))]
    BadGeometry { boot: u32, flash: u32 },

    #[error("Device reports an unusable {field}: {value}")]
    #[diagnostic(code(vuxprog::geometry_out_of_range))]
    GeometryOutOfRange { field: &'static str, value: u8 },
}

/// Intel-HEX decoding errors, with 1-based line numbers
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum CodecError {
    #[error("Malformed record on line {line}")]
    #[diagnostic(
        code(vuxprog::ihex::malformed_record),
        help("Records start with ':' and contain an odd number of at least 11 characters")
    )]
    MalformedRecord { line: usize },

    #[error("Record on line {line} declares {declared} payload bytes but contains {got}")]
    #[diagnostic(code(vuxprog::ihex::length_mismatch))]
    LengthMismatch {
        line: usize,
        declared: usize,
        got: usize,
    },

    #[error("Record checksum mismatch on line {line}")]
    #[diagnostic(code(vuxprog::ihex::bad_checksum))]
    BadChecksum { line: usize },

    #[error("Unknown record type {kind:#04x} on line {line}")]
    #[diagnostic(code(vuxprog::ihex::unknown_record_type))]
    UnknownRecordType { line: usize, kind: u8 },

    #[error("Origin record on line {line} has a {got}-byte payload, expected 4")]
    #[diagnostic(code(vuxprog::ihex::bad_origin))]
    BadOrigin { line: usize, got: usize },

    #[error("File ended without an end-of-file record")]
    #[diagnostic(code(vuxprog::ihex::truncated))]
    Truncated,

    #[error("Image is {len} bytes, but records can only address 64 KiB")]
    #[diagnostic(
        code(vuxprog::ihex::image_too_large),
        help("Write the image as raw binary instead")
    )]
    ImageTooLarge { len: usize },
}
