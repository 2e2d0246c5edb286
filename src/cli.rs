use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Input .json project file (scripts + content records)
    pub input: PathBuf,
    /// Output directory
    pub output: PathBuf,
}
