//! Flag surface for the single-URL / playlist download tool.
//!
//! A flat derive-`Parser` with no subcommands: the original engine exposes
//! one binary with `-u`/`-m`/`-o`/`-config`/`-plugin`/`-genCfg` flags, not a
//! subcommand tree.

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "hls-dl")]
#[command(about = "Resumable HTTP / HLS download manager", long_about = None)]
pub struct Cli {
    /// YAML config file path. Defaults to the XDG config dir, writing a
    /// default file there if none exists.
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Direct HTTP/HTTPS URL to download.
    #[arg(short = 'u', long = "url", value_name = "URL")]
    pub url: Option<String>,

    /// HLS playlist (.m3u8) URL to download. Takes precedence over --url.
    #[arg(short = 'm', long = "m3u", value_name = "URL")]
    pub m3u: Option<String>,

    /// Output file (direct download) or directory (playlist download).
    #[arg(short = 'o', long = "output", value_name = "PATH")]
    pub output: Option<String>,

    /// Post-playlist decoder plugin binary, invoked over a local RPC after
    /// a playlist download completes. Payload shape only; launching the
    /// plugin process is out of scope.
    #[arg(long = "plugin", value_name = "PATH")]
    pub plugin: Option<PathBuf>,

    /// Emit a demo YAML config to stdout and exit.
    #[arg(long = "gen-cfg")]
    pub gen_cfg: bool,
}
