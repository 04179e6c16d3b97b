use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Packs content trees into XP4 archive sets and patch generations
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Arg {
    #[arg(global = true, action = ArgAction::SetTrue, short, long)]
    /// Print backtrace on error
    pub backtrace: bool,
    #[arg(global = true, action = ArgAction::SetTrue, short, long)]
    /// Do not print progress
    pub quiet: bool,
    #[command(subcommand)]
    /// Command
    pub command: Command,
}

fn parse_size_arg(s: &str) -> Result<u64, String> {
    parse_size::parse_size(s).map_err(|e| e.to_string())
}

#[derive(Args, Debug, Clone)]
pub struct ClassArgs {
    #[arg(long)]
    /// Additional class list, applied after the built-in rules
    pub class_file: Option<PathBuf>,
    #[arg(long, action = ArgAction::SetTrue)]
    /// Do not use the built-in class list
    pub no_default_classes: bool,
}

#[derive(Args, Debug, Clone)]
pub struct WriteArgs {
    #[arg(short, long, value_parser = parse_size_arg)]
    /// Split into volumes of at most this size, e.g. 650MiB
    pub split: Option<u64>,
    #[arg(long, action = ArgAction::SetTrue)]
    /// Store the index without compression
    pub raw_index: bool,
    #[arg(short, long, default_value_t = 6, value_parser = clap::value_parser!(u32).range(0..=9))]
    /// zlib compression level
    pub level: u32,
}

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    /// Base volume of the archive set, e.g. data.xp4
    pub archive: PathBuf,
    #[arg(short, long)]
    /// Directory to pack. Defaults to the directory recorded in the archive
    pub target: Option<PathBuf>,
    #[command(flatten)]
    pub classes: ClassArgs,
    #[command(flatten)]
    pub write: WriteArgs,
    #[arg(short, long, action = ArgAction::SetTrue)]
    /// Discard the existing archive set and write a new base archive
    pub force_new: bool,
    #[arg(short = 'n', long, action = ArgAction::SetTrue)]
    /// Only print the change list
    pub dry_run: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    /// Print the change list as JSON
    pub json: bool,
}

#[derive(Subcommand, Debug)]
/// Commands
pub enum Command {
    /// Build a base archive, or a patch generation if the archive exists
    Build(BuildArgs),
    /// Show what a build would change
    Diff {
        /// Base volume of the archive set
        archive: PathBuf,
        #[arg(short, long)]
        /// Directory to compare against
        target: Option<PathBuf>,
        #[command(flatten)]
        classes: ClassArgs,
        #[arg(long, action = ArgAction::SetTrue)]
        /// Print the change list as JSON
        json: bool,
    },
    /// List the records of every volume
    List {
        /// Base volume of the archive set
        archive: PathBuf,
        #[arg(long, action = ArgAction::SetTrue)]
        /// Print as JSON
        json: bool,
    },
    /// Extract the merged content of an archive set
    Extract {
        /// Base volume of the archive set
        archive: PathBuf,
        /// Output directory
        output: PathBuf,
    },
    /// Rewrite all generations of an archive set into a new base archive
    Compact {
        /// Base volume of the archive set
        archive: PathBuf,
        /// Base volume of the new archive set
        output: PathBuf,
        #[command(flatten)]
        write: WriteArgs,
    },
}

pub fn parse_args() -> Arg {
    Arg::parse()
}
