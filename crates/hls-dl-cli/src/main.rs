mod cli;
mod progress;

use anyhow::{bail, Result};
use clap::Parser;
use cli::Cli;
use hls_dl_core::config::{self, Config, DownloadConfig};
use hls_dl_core::job::DownloadJob;
use hls_dl_core::playlist::PlaylistJob;
use hls_dl_core::progress_sink::ProgressSink;
use hls_dl_core::task::Task;
use progress::IndicatifSink;
use std::sync::Arc;
use url::Url;

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    if args.gen_cfg {
        match Config::default().to_yaml() {
            Ok(yaml) => print!("{yaml}"),
            Err(err) => {
                eprintln!("hls-dl error: {err:#}");
                std::process::exit(1);
            }
        }
        return;
    }

    let cfg = match &args.config {
        Some(path) => config::load_from_path(path),
        None => config::load_or_init(),
    };
    let cfg = match cfg {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("hls-dl error: {err:#}");
            std::process::exit(1);
        }
    };

    if hls_dl_core::logging::init_logging(&cfg.log).is_err() {
        hls_dl_core::logging::init_logging_stderr(&cfg.log);
    }

    if let Err(err) = tokio::task::spawn_blocking(move || run(args, cfg.download))
        .await
        .unwrap()
    {
        eprintln!("hls-dl error: {err:#}");
        std::process::exit(1);
    }
}

fn run(args: Cli, download_cfg: DownloadConfig) -> Result<()> {
    let cfg = Arc::new(download_cfg);
    let sink: Arc<dyn ProgressSink> = Arc::new(IndicatifSink::new());

    if let Some(m3u) = args.m3u {
        let playlist_url = Url::parse(&m3u)?;
        let dir = hls_dl_core::playlist::resolve_output_dir(&playlist_url, args.output.as_deref());
        let job = PlaylistJob::new(playlist_url, dir, cfg, Some(sink));
        job.start()?;

        if let Some(plugin) = args.plugin {
            tracing::info!(plugin = %plugin.display(), "plugin invocation is out of scope, skipping");
        }
        return Ok(());
    }

    if let Some(url) = args.url {
        let file_name = args.output.unwrap_or_else(|| default_file_name(&url));
        let job = DownloadJob::new(url, file_name, false, cfg, Some(sink));
        job.start()?;
        return Ok(());
    }

    bail!("at least one of --url or --m3u must be provided");
}

/// Derives an output filename from the URL's last path segment, falling
/// back to a generic name for URLs with no usable path component.
fn default_file_name(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.path_segments().and_then(|mut s| s.next_back()).map(str::to_string))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "download".to_string())
}
