use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use env_logger::Env;

use flatfs::consts::{
    DEFAULT_BLOCK_COUNT, DEFAULT_BLOCK_SIZE, DEFAULT_JOURNAL_PATH, DEFAULT_MAX_FILES,
    DEFAULT_VOLUME_PATH,
};
use flatfs::journal::Journal;
use flatfs::shell::Shell;
use flatfs::util::format::pretty_size_from_bytes;
use flatfs::{FlatFS, Geometry, VolumeConfig};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Flat-file filesystem in a single image, with a write-ahead journal"
)]
struct Args {
    /// Volume image path
    #[arg(short, long, default_value = DEFAULT_VOLUME_PATH)]
    volume: PathBuf,

    /// Journal path
    #[arg(short, long, default_value = DEFAULT_JOURNAL_PATH)]
    journal: PathBuf,

    /// Do not fsync the journal after each record
    #[arg(long)]
    no_sync: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive shell (the default)
    Shell,
    /// Create a fresh volume, discarding any existing one
    Format {
        #[arg(long, default_value_t = DEFAULT_BLOCK_COUNT)]
        blocks: u32,
        #[arg(long, default_value_t = DEFAULT_MAX_FILES)]
        max_files: u32,
        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block_size: usize,
    },
    /// Serve the volume through FUSE
    #[cfg(feature = "fuse")]
    Mount { mountpoint: PathBuf },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> flatfs::Result<()> {
    let mut config = VolumeConfig::new(&args.volume, &args.journal);
    config.sync_journal = !args.no_sync;

    match args.command.unwrap_or(Command::Shell) {
        Command::Shell => {
            let fs = FlatFS::from_config(&config)?;
            Shell::new(fs).run(io::stdin().lock(), &mut io::stdout())?;
        }
        Command::Format { blocks, max_files, block_size } => {
            let geometry = Geometry::new(block_size, blocks, max_files);
            let journal = Journal::new(&config.journal_path, config.sync_journal);
            FlatFS::create_at(&config.volume_path, journal, geometry)?;
            println!(
                "Formatted {}: {} blocks of {} bytes ({}), {} file slots",
                config.volume_path.display(),
                blocks,
                block_size,
                pretty_size_from_bytes(geometry.capacity_bytes()),
                max_files
            );
        }
        #[cfg(feature = "fuse")]
        Command::Mount { mountpoint } => {
            let fs = FlatFS::from_config(&config)?;
            flatfs::fuse::mount(fs, &mountpoint)?;
        }
    }
    Ok(())
}
