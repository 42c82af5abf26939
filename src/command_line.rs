/// Parse the main command-line
///
use std::path::PathBuf;

use clap::{Parser, Subcommand};

// This is the help blurb:
/// Prepare boot images for the FSTK firmware stitcher and run it, or inspect
/// and build the images it works with.
#[derive(Debug, Parser)]
#[command(version, long_about, verbatim_doc_comment)]
pub struct Args {
    /// Display more information (use multiple times to increase verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stitch images into a firmware blob
    Stitch(StitchArgs),
    /// Display the OSIP header of a stitched blob
    Inspect(InspectArgs),
    /// Build an OS image from a bootstub, a kernel, a command line and a
    /// ramdisk
    Osimage(OsimageArgs),
}

/// Arguments of the stitch command
#[derive(Debug, clap::Args)]
pub struct StitchArgs {
    /// Silicon stepping, for example B0 or C0
    #[arg(short, long)]
    pub stepping: String,

    /// Directory receiving the temporary configuration files
    #[arg(short, long, value_name = "dir")]
    pub tmpdir: PathBuf,

    /// Sign the images
    #[arg(long)]
    pub signed: bool,

    /// Directory containing the signing keys
    #[arg(short, long, value_name = "dir")]
    pub keydir: PathBuf,

    /// Output firmware blob
    #[arg(short, long, value_name = "file")]
    pub output: PathBuf,

    /// Path to the stitcher executable
    #[arg(short = 'f', long, value_name = "file")]
    pub fstk: PathBuf,

    /// Config file. Can be specified multiple times to provide overlays.
    /// For example: -c steppings.toml -c local.toml
    #[arg(short, long, verbatim_doc_comment, value_name = "file")]
    pub config: Vec<PathBuf>,

    /// Write the computed layout in JSON
    #[arg(long, value_name = "file")]
    pub layout_json: Option<PathBuf>,

    /// Don't remove the generated configuration files
    #[arg(long)]
    pub keep_temps: bool,

    /// Images to stitch, in order (.bin, .fv or .img)
    #[arg(required = true, value_name = "image")]
    pub images: Vec<PathBuf>,
}

/// Arguments of the inspect command
#[derive(Debug, clap::Args)]
pub struct InspectArgs {
    /// Stitched firmware blob
    #[arg(value_name = "file")]
    pub blob: PathBuf,

    /// Extract each image into this directory
    #[arg(long, value_name = "dir")]
    pub extract: Option<PathBuf>,
}

/// Arguments of the osimage command
#[derive(Debug, clap::Args)]
pub struct OsimageArgs {
    /// Bootstub binary
    #[arg(short, long, value_name = "file")]
    pub bootstub: PathBuf,

    /// Kernel bzImage binary
    #[arg(short, long, value_name = "file")]
    pub kernel: PathBuf,

    /// Kernel command line file (max 511 bytes)
    #[arg(short, long, value_name = "file")]
    pub cmdline: PathBuf,

    /// Ramdisk
    #[arg(short, long, value_name = "file")]
    pub ramdisk: PathBuf,

    /// Output OS image
    #[arg(short, long, value_name = "file")]
    pub output: PathBuf,
}
