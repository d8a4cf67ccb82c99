//! assetry cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; assetry ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[clap(flatten)]
    pub options: OptionArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve a document and print the merged result
    ///
    /// The document is looked up by path first, then by file name anywhere in the tree.
    Resolve(ResolveCommand),

    /// List files of a location
    #[command(alias = "ls")]
    List(ListCommand),

    /// Pack a location into a single archive
    Pack(PackCommand),

    /// Serve a location over http
    Serve(ServeCommand),
}

/// Maps onto the context options
#[derive(Parser, Debug)]
pub struct OptionArgs {
    /// Longest `Base` chain that is followed
    #[clap(long = "max-depth", global(true), default_value_t = 10)]
    pub max_depth: usize,

    /// Document extension (without the dot)
    #[clap(long = "extension", global(true), default_value = "hcl")]
    pub extension: String,
}

#[derive(Parser, Debug)]
pub struct ResolveCommand {
    /// Directory, url, `.bin` archive or `netcode` location
    pub location: String,

    /// Path or name of the document, the extension may be left out
    pub document: String,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct ListCommand {
    pub location: String,

    /// Only list files whose name matches this glob
    #[clap(short = 'p', long = "pattern")]
    pub pattern: Option<String>,
}

#[derive(Parser, Debug)]
pub struct PackCommand {
    pub location: String,

    /// Archive to write
    pub output: PathBuf,
}

#[derive(Parser, Debug)]
pub struct ServeCommand {
    pub location: String,

    #[clap(short = 'a', long = "addr", default_value = "127.0.0.1:8080")]
    pub addr: SocketAddr,

    /// Answer the root url with a packed archive instead of a listing
    #[clap(long = "packed")]
    pub packed: bool,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
    Hcl,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
            OutputFormat::Hcl => f.write_str("hcl"),
        }
    }
}
