use clap::{Args, Parser, Subcommand};

use ferry_protocol::DEFAULT_PORT;

#[derive(Parser)]
#[command(
    name = "ferry",
    about = "Block-upload client for the ferry file service",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Upload a file and verify the stored copy
    Upload(UploadArgs),
}

#[derive(Args)]
pub struct UploadArgs {
    /// File to upload
    pub file: String,

    /// Server host name or address
    #[arg(long)]
    pub server: String,

    /// Account identifier; the login password is derived from it
    #[arg(long)]
    pub id: String,

    /// Server TCP port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Give up if the server takes longer than this per response
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}
