use clap::{Parser, Subcommand};
use miette::Result;
use vuxprog::cli::{
    eeprom_read, eeprom_write, flash_read, flash_write, reset, ConnectArgs, EepromArgs,
    FlashReadArgs, FlashWriteArgs,
};

#[derive(Debug, Parser)]
#[command(about, version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    subcommand: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Dump the flash contents to a file
    #[command(visible_alias = "fr")]
    FlashRead(FlashReadArgs),
    /// Program an image into flash, writing only the pages that differ
    #[command(visible_alias = "fw")]
    FlashWrite(FlashWriteArgs),
    /// Dump the EEPROM contents to a file
    #[command(visible_alias = "er")]
    EepromRead(EepromArgs),
    /// Program an image into the EEPROM, writing only the bytes that differ
    #[command(visible_alias = "ew")]
    EepromWrite(EepromArgs),
    /// Leave the bootloader and start the application
    #[command(visible_alias = "r")]
    Reset(ConnectArgs),
}

fn main() -> Result<()> {
    miette::set_panic_hook();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.subcommand {
        Commands::FlashRead(args) => flash_read(args),
        Commands::FlashWrite(args) => flash_write(args),
        Commands::EepromRead(args) => eeprom_read(args),
        Commands::EepromWrite(args) => eeprom_write(args),
        Commands::Reset(args) => reset(args),
    }
}
