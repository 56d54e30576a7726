//! criarc CLI - CRI Middleware container tool
//!
//! A Pure Rust utility for AFS2 wave banks, CPK packages and CRILAYLA frames.

mod commands;
mod utils;

use clap::{Parser, Subcommand};
use commands::{
    cmd_create, cmd_decompress, cmd_detect, cmd_extract, cmd_info, cmd_list, cmd_replace,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "criarc")]
#[command(author, version, about = "CRI Middleware container tool - Pure Rust AWB/CPK utility")]
#[command(long_about = "
criarc reads and writes CRI Middleware containers.
Supported formats: AFS2 (.awb), CPK (.cpk), CRILAYLA frames

Examples:
  criarc list voice.awb
  criarc list data.cpk --json
  criarc extract data.cpk -o out -I '*.usm'
  criarc info data.cpk
  criarc create bank.awb 0001.hca 0002.hca --alignment 32
  criarc replace data.cpk movie/op.usm new_op.usm -o patched.cpk
  criarc decompress packed.bin plain.bin
")]
struct Cli {
    /// Log debug output (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List contents of an archive
    #[command(alias = "l")]
    List {
        /// Archive file to list
        archive: PathBuf,

        /// Show sizes
        #[arg(short, long)]
        long: bool,

        /// Output as JSON (machine-readable)
        #[arg(short, long)]
        json: bool,

        /// Include only entries matching pattern (glob syntax: *.hca, bgm/*)
        #[arg(short = 'I', long)]
        include: Vec<String>,

        /// Exclude entries matching pattern (glob syntax)
        #[arg(short = 'X', long)]
        exclude: Vec<String>,
    },

    /// Extract entries from an archive
    #[command(alias = "x")]
    Extract {
        /// Archive file to extract
        archive: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Entries to extract (all if empty)
        files: Vec<String>,

        /// Include only entries matching pattern (glob syntax)
        #[arg(short = 'I', long)]
        include: Vec<String>,

        /// Exclude entries matching pattern (glob syntax)
        #[arg(short = 'X', long)]
        exclude: Vec<String>,

        /// Show progress bar
        #[arg(short = 'P', long)]
        progress: bool,
    },

    /// Show information about a file
    #[command(alias = "i")]
    Info {
        /// File to inspect
        archive: PathBuf,
    },

    /// Detect file format
    Detect {
        /// File to detect
        file: PathBuf,
    },

    /// Create a new AFS2 wave bank
    #[command(alias = "c")]
    Create {
        /// Output archive file
        archive: PathBuf,

        /// Files to add, in cue order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Payload alignment in bytes
        #[arg(short, long, default_value_t = 0x20)]
        alignment: u32,
    },

    /// Replace one entry of an archive with a file
    Replace {
        /// Archive to modify
        archive: PathBuf,

        /// Entry name as shown by `list`
        entry: String,

        /// Replacement file
        file: PathBuf,

        /// Output archive (must differ from the input)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Decompress a raw CRILAYLA frame
    Decompress {
        /// Compressed input
        input: PathBuf,

        /// Decompressed output
        output: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::List {
            archive,
            long,
            json,
            include,
            exclude,
        } => cmd_list(&archive, long, json, &include, &exclude),
        Commands::Extract {
            archive,
            output,
            files,
            include,
            exclude,
            progress,
        } => cmd_extract(&archive, &output, &files, &include, &exclude, progress),
        Commands::Info { archive } => cmd_info(&archive),
        Commands::Detect { file } => cmd_detect(&file),
        Commands::Create {
            archive,
            files,
            alignment,
        } => cmd_create(&archive, &files, alignment),
        Commands::Replace {
            archive,
            entry,
            file,
            output,
        } => cmd_replace(&archive, &entry, &file, &output),
        Commands::Decompress { input, output } => cmd_decompress(&input, &output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
