// Licensed under the Apache-2.0 license

use clap::{Parser, Subcommand, ValueEnum};
use clap_num::maybe_hex;
use pdc_config::MemoryMap;
use std::path::PathBuf;

mod cargo;
mod header;
mod image;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Xtask {
    #[command(subcommand)]
    xtask: Commands,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum Platform {
    #[default]
    Stm32,
}

impl Platform {
    fn memory_map(self) -> &'static MemoryMap {
        match self {
            Platform::Stm32 => &pdc_config_stm32::MEMORY_MAP,
        }
    }

    fn boot_package(self) -> &'static str {
        match self {
            Platform::Stm32 => "pdc-boot-stm32",
        }
    }

    fn target(self) -> &'static str {
        match self {
            Platform::Stm32 => "thumbv7em-none-eabihf",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build the bootloader binary for a board
    BootBuild {
        #[arg(long, value_enum, default_value_t)]
        platform: Platform,
    },
    /// Commands related to application images
    Image {
        #[command(subcommand)]
        subcommand: ImageCommands,
    },
    /// Commands related to staging region contents
    Staging {
        #[command(subcommand)]
        subcommand: StagingCommands,
    },
    /// Run clippy on all targets
    Clippy,
    /// Check that all files are formatted
    Format,
    /// Check cargo lock
    CargoLock,
    /// Run tests
    Test,
    /// Run pre-check-in checks
    Precheckin,
    /// Check files for Apache license header
    HeaderCheck,
    /// Add Apache license header to files where it is missing
    HeaderFix,
}

#[derive(Subcommand)]
enum ImageCommands {
    /// Wrap a raw application binary into a firmware image
    Create {
        /// Application binary linked for the primary slot
        #[arg(long, value_name = "BIN", required = true)]
        input: PathBuf,

        /// Image version, e.g. "1.4.0+311"
        #[arg(long, value_name = "VERSION", required = true)]
        version: String,

        /// Path to the output image file
        #[arg(long, value_name = "OUTPUT", required = true)]
        output: PathBuf,

        #[arg(long, value_enum, default_value_t)]
        platform: Platform,
    },
    /// Verify an existing firmware image
    Verify {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(long, value_enum, default_value_t)]
        platform: Platform,
    },
}

#[derive(Subcommand)]
enum StagingCommands {
    /// Produce staging region contents for a firmware image
    Create {
        /// Firmware image created with `image create`
        #[arg(long, value_name = "IMAGE", required = true)]
        input: PathBuf,

        #[arg(long, value_name = "OUTPUT", required = true)]
        output: PathBuf,

        #[arg(long, value_enum, default_value_t)]
        platform: Platform,
    },
    /// Verify staging region contents
    Verify {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Offset of the staging region in the file
        #[arg(long, value_name = "OFFSET", value_parser = maybe_hex::<u32>, default_value_t = 0)]
        offset: u32,

        #[arg(long, value_enum, default_value_t)]
        platform: Platform,
    },
}

fn main() {
    let cli = Xtask::parse();
    let result = match &cli.xtask {
        Commands::BootBuild { platform } => {
            cargo::boot_build(platform.boot_package(), platform.target())
        }
        Commands::Image { subcommand } => match subcommand {
            ImageCommands::Create {
                input,
                version,
                output,
                platform,
            } => image::create(input, version, output, platform.memory_map()),
            ImageCommands::Verify { file, platform } => {
                image::verify(file, platform.memory_map())
            }
        },
        Commands::Staging { subcommand } => match subcommand {
            StagingCommands::Create {
                input,
                output,
                platform,
            } => image::staging_create(input, output, platform.memory_map()),
            StagingCommands::Verify {
                file,
                offset,
                platform,
            } => image::staging_verify(file, *offset, platform.memory_map()),
        },
        Commands::Clippy => cargo::clippy(),
        Commands::Format => cargo::format(),
        Commands::CargoLock => cargo::cargo_lock(),
        Commands::Test => cargo::test(),
        Commands::Precheckin => cargo::precheckin(),
        Commands::HeaderFix => header::fix(),
        Commands::HeaderCheck => header::check(),
    };
    result.unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });
}
