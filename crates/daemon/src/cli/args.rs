pub use clap::Parser;

use url::Url;

#[derive(Parser, Debug)]
#[command(name = "canopy")]
#[command(about = "Serve data trees over HTTP, driven by a configuration file")]
pub struct Args {
    /// Base URL of a running server, used by `health`
    #[arg(long, global = true, default_value = "http://localhost:8000")]
    pub remote: Url,

    #[command(subcommand)]
    pub command: crate::Command,
}
