use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// Disk image to create and format
    #[arg(long, short)]
    pub image: PathBuf,

    /// Directory whose files are copied into the image root
    #[arg(long, short)]
    pub source: Option<PathBuf>,

    /// Dump the file system state afterwards
    #[arg(long, short)]
    pub print: bool,
}
