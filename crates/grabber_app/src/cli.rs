use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

pub const DEFAULT_CONFIG_PATH: &str = "grabber.ron";

#[derive(Parser, Debug)]
#[command(name = "grabber", version, about = "Collect images from web pages and save them")]
pub struct Cli {
    #[arg(long, global = true, help = "Output machine-readable JSON")]
    pub json: bool,
    #[arg(
        long,
        global = true,
        default_value = DEFAULT_CONFIG_PATH,
        help = "Configuration file (RON)"
    )]
    pub config: PathBuf,
    #[arg(long, short, global = true, help = "Log debug details to stderr")]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the image candidates of a page (URL or local HTML file).
    Scan {
        page: String,
        #[arg(long, value_enum, default_value_t = ScanMode::All)]
        mode: ScanMode,
        /// Reference image for `--mode same-size`.
        #[arg(long)]
        like: Option<String>,
        /// Add the listed candidates to the selection.
        #[arg(long, default_value_t = false)]
        select: bool,
    },
    /// Inspect or change the stored selection.
    Select {
        #[command(subcommand)]
        action: SelectAction,
    },
    /// Download the selection (or the URLs of `--request`).
    Export(ExportArgs),
}

#[derive(Subcommand, Debug)]
pub enum SelectAction {
    List,
    Toggle { url: String },
    Add {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    Clear,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ScanMode {
    All,
    Large,
    SameSize,
}

#[derive(clap::Args, Debug, Default)]
pub struct ExportArgs {
    /// Bundle everything into one ZIP archive.
    #[arg(long)]
    pub archive: bool,
    #[arg(long, help = "original, jpeg, png, webp or bmp")]
    pub format: Option<String>,
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: Option<u8>,
    #[arg(long)]
    pub folder: Option<String>,
    #[arg(long, help = "auto, sequential or custom")]
    pub naming: Option<String>,
    #[arg(long, help = "Custom naming template ({site}, {title}, {index})")]
    pub template: Option<String>,
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub batch_size: Option<u64>,
    #[arg(long)]
    pub delay_ms: Option<u64>,
    #[arg(long)]
    pub low_perf: bool,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub site: Option<String>,
    /// Export request JSON file; its fields override config defaults.
    #[arg(long)]
    pub request: Option<PathBuf>,
}
