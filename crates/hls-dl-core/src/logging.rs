//! Logging init: file under a configured (or XDG-default) state dir, or
//! graceful fallback to stderr, parameterized by
//! [`crate::config::LogConfig`] (`log.dir`, `log.level`).

use crate::config::LogConfig;
use anyhow::Result;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Writer that is either a file or stderr (used when file clone fails).
enum FileOrStderr {
    File(std::fs::File),
    Stderr,
}

impl io::Write for FileOrStderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            FileOrStderr::File(f) => f.write(buf),
            FileOrStderr::Stderr => io::stderr().lock().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            FileOrStderr::File(f) => f.flush(),
            FileOrStderr::Stderr => io::stderr().lock().flush(),
        }
    }
}

fn env_filter(level: &str) -> EnvFilter {
    let default = if level.is_empty() {
        "info,hls_dl=debug".to_string()
    } else {
        format!("{level},hls_dl={level}")
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Initializes structured logging to `<log.dir>/hls-dl.log`, or
/// `~/.local/state/hls-dl/hls-dl.log` when `log.dir` is empty. Returns
/// `Err` on failure (e.g. an unwritable directory) so the caller can fall
/// back to [`init_logging_stderr`].
pub fn init_logging(cfg: &LogConfig) -> Result<()> {
    let log_dir: PathBuf = if cfg.dir.is_empty() {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("hls-dl")?;
        xdg_dirs.get_state_home().join("hls-dl")
    } else {
        PathBuf::from(&cfg.dir)
    };

    fs::create_dir_all(&log_dir)?;
    let log_file_path = log_dir.join(format!("{}.log", crate::util::app_name()));

    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file_path)?;

    struct FileMakeWriter(std::fs::File);

    impl<'a> MakeWriter<'a> for FileMakeWriter {
        type Writer = FileOrStderr;

        fn make_writer(&'a self) -> Self::Writer {
            self.0
                .try_clone()
                .map(FileOrStderr::File)
                .unwrap_or(FileOrStderr::Stderr)
        }
    }

    let writer: BoxMakeWriter = BoxMakeWriter::new(FileMakeWriter(file));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(&cfg.level))
        .with_writer(writer)
        .with_ansi(false)
        .init();

    tracing::info!("logging initialized at {}", log_file_path.display());

    Ok(())
}

/// Initializes logging to stderr only (no file). Use when
/// [`init_logging`] fails so the CLI doesn't crash over an unwritable log
/// directory.
pub fn init_logging_stderr(cfg: &LogConfig) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(&cfg.level))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}
