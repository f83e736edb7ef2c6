use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "fsn", about = "FSN storage node: local object storage tools", version)]
pub struct Cli {
    /// Node configuration file. Without one a single in-memory shard is
    /// used.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a file as an object, splitting it if needed
    Put(PutArgs),
    /// Read an object payload, assembling split objects
    Get(GetArgs),
    /// Show an object header
    Head(HeadArgs),
    /// Inhume an object
    Delete(AddressArgs),
    /// Search a container
    Select(SelectArgs),
    /// List stored addresses
    List(ListArgs),
    /// Show containers and their sizes
    Containers,
    /// Show shard state
    Shards,
    /// Remove inhumed objects from disk
    Gc,
    /// Run one policer pass against the configured containers
    Police,
}

#[derive(Args)]
pub struct PutArgs {
    /// Container id (hex)
    #[arg(long)]
    pub container: String,
    /// Owner id (hex), null when omitted
    #[arg(long)]
    pub owner: Option<String>,
    /// Attribute as KEY=VALUE; may be repeated
    #[arg(short, long = "attribute")]
    pub attributes: Vec<String>,
    /// Payload file
    pub file: PathBuf,
}

#[derive(Args)]
pub struct GetArgs {
    /// Object address as `<container>/<object>`
    pub address: String,
    /// Write the payload here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Byte range as OFFSET:LENGTH
    #[arg(long)]
    pub range: Option<String>,
}

#[derive(Args)]
pub struct HeadArgs {
    pub address: String,
    /// Do not resolve split objects to their parent header
    #[arg(long)]
    pub raw: bool,
}

#[derive(Args)]
pub struct AddressArgs {
    pub address: String,
}

#[derive(Args)]
pub struct SelectArgs {
    /// Container id (hex)
    pub container: String,
    /// Attribute equality filter KEY=VALUE; may be repeated
    #[arg(short, long = "attribute")]
    pub attributes: Vec<String>,
    /// Only user-visible objects
    #[arg(long)]
    pub root: bool,
    /// Only physically stored objects
    #[arg(long)]
    pub phy: bool,
}

#[derive(Args)]
pub struct ListArgs {
    #[arg(short = 'n', long, default_value = "100")]
    pub limit: usize,
}
