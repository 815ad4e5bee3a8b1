//! CLI utilities for the vuxprog binary
//!
//! Argument structs, the serial connect helper, and file loading/saving in
//! either Intel-HEX or raw binary form. No stability guaranties apply.

use std::{
    fs,
    path::{Path, PathBuf},
};

use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use miette::{IntoDiagnostic, Result, WrapErr};
use serialport::FlowControl;
use strum::Display;

use crate::{
    connection::SerialTransport,
    error::Error,
    flasher::{DeviceProfile, Flasher, WriteProtocol},
    ihex, program,
    progress::ProgressCallbacks,
};

/// On-disk representation of a memory image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Display)]
#[strum(serialize_all = "lowercase")]
pub enum FileFormat {
    /// Intel-HEX text records
    #[default]
    Ihex,
    /// Exact byte dump
    Binary,
}

#[derive(Debug, Args)]
pub struct ConnectArgs {
    /// Serial port connected to target device
    #[arg(short = 's', long)]
    pub serial: String,
    /// Baud rate of the bootloader
    #[arg(long, default_value_t = 9600)]
    pub baud: u32,
    /// Flash-write ack sequence spoken by the device firmware
    #[arg(long, value_enum, default_value_t = WriteProtocol::SingleAck)]
    pub write_protocol: WriteProtocol,
    /// Byte sequence to send first, to drop the device into its bootloader
    #[arg(short = 'i', long)]
    pub init: Option<String>,
}

#[derive(Debug, Args)]
pub struct FlashReadArgs {
    /// File to save the flash contents to
    pub file: PathBuf,
    /// File format
    #[arg(short = 'f', long, value_enum, default_value_t)]
    pub format: FileFormat,
    /// Also dump the reserved bootloader region
    #[arg(short = 'a', long)]
    pub all: bool,
    /// Reset the device afterwards
    #[arg(short = 'r', long)]
    pub reset: bool,

    #[command(flatten)]
    pub connect_args: ConnectArgs,
}

#[derive(Debug, Args)]
pub struct FlashWriteArgs {
    /// Image to program
    pub file: PathBuf,
    /// File format
    #[arg(short = 'f', long, value_enum, default_value_t)]
    pub format: FileFormat,
    /// Allow overwriting the bootloader region
    #[arg(short = 'F', long)]
    pub force: bool,
    /// Reset the device after successful programming
    #[arg(short = 'r', long)]
    pub reset: bool,

    #[command(flatten)]
    pub connect_args: ConnectArgs,
}

#[derive(Debug, Args)]
pub struct EepromArgs {
    /// File to read from or save to
    pub file: PathBuf,
    /// File format
    #[arg(short = 'f', long, value_enum, default_value_t)]
    pub format: FileFormat,
    /// Reset the device afterwards
    #[arg(short = 'r', long)]
    pub reset: bool,

    #[command(flatten)]
    pub connect_args: ConnectArgs,
}

/// Open the serial port, optionally send the bootloader-entry sequence, and
/// run the identify handshake.
pub fn connect(args: &ConnectArgs) -> Result<Flasher> {
    println!("Serial port: {}", args.serial);

    let serial = serialport::new(&args.serial, args.baud)
        .flow_control(FlowControl::None)
        .open()
        .map_err(Error::from)
        .wrap_err_with(|| format!("Failed to open serial port {}", args.serial))?;

    let mut flasher = Flasher::new(
        Box::new(SerialTransport::new(serial)),
        args.write_protocol,
    );

    if let Some(init) = &args.init {
        debug!("sending bootloader-entry sequence ({} bytes)", init.len());
        flasher.write_raw(init.as_bytes())?;
    }

    let profile = *flasher.identify()?;
    print_device_info(&profile);

    Ok(flasher)
}

fn print_device_info(profile: &DeviceProfile) {
    println!("Device capabilities:");
    if profile.has_eeprom {
        println!("  EEPROM:        {} bytes", profile.eeprom_bytes);
    }
    println!("  Page size:     {} words", profile.page_words);
    println!("  Flash size:    {} pages", profile.flash_pages);
    println!("  Reserved area: {} pages (at end)", profile.boot_pages);
}

pub fn flash_read(args: FlashReadArgs) -> Result<()> {
    let mut flasher = connect(&args.connect_args)?;

    let image = program::read_flash(&mut flasher, args.all, &mut CliProgress::default())?;
    save_image(&args.file, args.format, image)?;

    finish(&mut flasher, args.reset)
}

pub fn flash_write(args: FlashWriteArgs) -> Result<()> {
    let mut flasher = connect(&args.connect_args)?;

    let image = load_image(&args.file, args.format)?;
    let changed =
        program::program_flash(&mut flasher, &image, args.force, &mut CliProgress::default())?;
    println!("Wrote {changed} pages");

    finish(&mut flasher, args.reset)
}

pub fn eeprom_read(args: EepromArgs) -> Result<()> {
    let mut flasher = connect(&args.connect_args)?;

    let image = flasher.read_eeprom()?;
    save_image(&args.file, args.format, image)?;

    finish(&mut flasher, args.reset)
}

pub fn eeprom_write(args: EepromArgs) -> Result<()> {
    let mut flasher = connect(&args.connect_args)?;

    let image = load_image(&args.file, args.format)?;
    let changed = program::program_eeprom(&mut flasher, &image, &mut CliProgress::default())?;
    println!("Wrote {changed} bytes");

    finish(&mut flasher, args.reset)
}

pub fn reset(args: ConnectArgs) -> Result<()> {
    let mut flasher = connect(&args)?;
    finish(&mut flasher, true)
}

fn finish(flasher: &mut Flasher, reset: bool) -> Result<()> {
    if reset {
        println!("Resetting device...");
        flasher.reset()?;
    }
    Ok(())
}

/// Load a memory image from disk in the selected format.
pub fn load_image(path: &Path, format: FileFormat) -> Result<Vec<u8>> {
    let data = fs::read(path)
        .map_err(|e| Error::FileOpenError(path.display().to_string(), e))?;

    match format {
        FileFormat::Binary => Ok(data),
        FileFormat::Ihex => {
            let text = String::from_utf8(data)
                .into_diagnostic()
                .wrap_err("HEX files must be valid text")?;
            Ok(ihex::decode(&text).map_err(Error::from)?)
        }
    }
}

/// Save a memory image to disk in the selected format. HEX output is padded
/// with `0xFF` to the 16-byte record granularity first.
pub fn save_image(path: &Path, format: FileFormat, mut image: Vec<u8>) -> Result<()> {
    let data = match format {
        FileFormat::Binary => image,
        FileFormat::Ihex => {
            image.resize(image.len().div_ceil(16) * 16, 0xff);
            ihex::encode(&image).map_err(Error::from)?.into_bytes()
        }
    };

    fs::write(path, data)
        .map_err(|e| Error::FileOpenError(path.display().to_string(), e))?;
    Ok(())
}

/// Progress bar drawn while transferring pages or bytes.
#[derive(Default)]
pub struct CliProgress {
    bar: Option<ProgressBar>,
}

impl ProgressCallbacks for CliProgress {
    fn init(&mut self, operation: &str, total: usize) {
        let bar = ProgressBar::new(total as u64)
            .with_message(operation.to_string())
            .with_style(
                ProgressStyle::with_template("[{elapsed_precise}] [{bar:40}] {pos:>4}/{len:4} {msg}")
                    .unwrap()
                    .progress_chars("=> "),
            );
        self.bar = Some(bar);
    }

    fn update(&mut self, current: usize) {
        if let Some(bar) = &self.bar {
            bar.set_position(current as u64);
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}
