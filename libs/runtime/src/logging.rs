use crate::config::{LoggingConfig, Section};
use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::{filter::Targets, fmt, Layer};

use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};

// -------- level helpers --------

fn parse_tracing_level(s: &str) -> Option<Level> {
    match s.to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        "off" | "none" => None,
        _ => Some(Level::INFO),
    }
}

// -------- rotating writer --------

#[derive(Clone)]
struct RotWriter(Arc<Mutex<FileRotate<AppendTimestamp>>>);

impl<'a> fmt::MakeWriter<'a> for RotWriter {
    type Writer = RotWriterHandle;
    fn make_writer(&'a self) -> Self::Writer {
        RotWriterHandle(self.0.clone())
    }
}

#[derive(Clone)]
struct RotWriterHandle(Arc<Mutex<FileRotate<AppendTimestamp>>>);

impl Write for RotWriterHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().unwrap().flush()
    }
}

/// Resolve a log file path against `base_dir`; absolute paths pass
/// through.
fn resolve_log_path(file: &str, base_dir: &Path) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

fn create_rotating_writer(section: &Section, base_dir: &Path) -> Option<RotWriter> {
    if section.file.trim().is_empty() {
        return None;
    }
    let log_path = resolve_log_path(&section.file, base_dir);
    if let Some(parent) = log_path.parent() {
        if std::fs::create_dir_all(parent).is_err() {
            eprintln!("Failed to create log directory {}", parent.display());
            return None;
        }
    }
    let max_bytes = section.max_size_mb.unwrap_or(100) * 1024 * 1024;
    let rot = FileRotate::new(
        &log_path,
        AppendTimestamp::default(FileLimit::Age(chrono::Duration::days(7))),
        ContentLimit::BytesSurpassed(max_bytes as usize),
        Compression::None,
        #[cfg(unix)]
        None,
    );
    Some(RotWriter(Arc::new(Mutex::new(rot))))
}

/// Target filter: explicit subsystem sections at their level, everything
/// else at the "default" section's level.
fn build_targets(cfg: &LoggingConfig, level_of: impl Fn(&Section) -> &str) -> Targets {
    let default_level = cfg
        .get("default")
        .and_then(|s| parse_tracing_level(level_of(s)))
        .map(LevelFilter::from_level)
        .unwrap_or(LevelFilter::OFF);

    let mut targets = Targets::new().with_default(default_level);
    for (subsystem, section) in cfg.iter().filter(|(k, _)| k.as_str() != "default") {
        let level = parse_tracing_level(level_of(section))
            .map(LevelFilter::from_level)
            .unwrap_or(LevelFilter::OFF);
        targets = targets.with_target(subsystem.clone(), level);
    }
    targets
}

// -------- public init --------

/// Initialize logging from configuration: a console layer filtered by the
/// per-subsystem console levels, plus a JSON rotating-file layer when the
/// "default" section names a file.
pub fn init_logging_from_config(cfg: &LoggingConfig, base_dir: &Path) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Registry};

    // Bridge `log` → `tracing` before installing the subscriber.
    let _ = tracing_log::LogTracer::init();

    if cfg.is_empty() {
        init_default_logging();
        return;
    }

    let ansi = atty::is(atty::Stream::Stdout);
    let console_layer = fmt::layer()
        .with_ansi(ansi)
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(build_targets(cfg, |s| &s.console_level));

    let file_writer = cfg
        .get("default")
        .and_then(|section| create_rotating_writer(section, base_dir));

    match file_writer {
        Some(writer) => {
            let file_layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_target(true)
                .with_level(true)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .with_writer(writer)
                .with_filter(build_targets(cfg, |s| {
                    if s.file_level.is_empty() {
                        &s.console_level
                    } else {
                        &s.file_level
                    }
                }));
            let _ = Registry::default()
                .with(console_layer)
                .with(file_layer)
                .try_init();
        }
        None => {
            let _ = Registry::default().with(console_layer).try_init();
        }
    }
}

fn init_default_logging() {
    let _ = fmt()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn section(console: &str, file: &str, file_level: &str) -> Section {
        Section {
            console_level: console.into(),
            file: file.into(),
            file_level: file_level.into(),
            max_size_mb: None,
        }
    }

    #[test]
    fn levels_parse_with_off_and_fallback() {
        assert_eq!(parse_tracing_level("debug"), Some(Level::DEBUG));
        assert_eq!(parse_tracing_level("WARN"), Some(Level::WARN));
        assert_eq!(parse_tracing_level("off"), None);
        assert_eq!(parse_tracing_level("bogus"), Some(Level::INFO));
    }

    #[test]
    fn log_paths_resolve_against_base_dir() {
        let base = Path::new("/srv/schemat");
        assert_eq!(
            resolve_log_path("logs/x.log", base),
            PathBuf::from("/srv/schemat/logs/x.log")
        );
        assert_eq!(resolve_log_path("/var/log/x.log", base), PathBuf::from("/var/log/x.log"));
    }

    #[test]
    fn rotating_writer_skips_empty_file() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(create_rotating_writer(&section("info", "", ""), tmp.path()).is_none());
        assert!(create_rotating_writer(&section("info", "logs/a.log", ""), tmp.path()).is_some());
    }

    #[test]
    fn targets_cover_default_and_subsystems() {
        let mut cfg: LoggingConfig = HashMap::new();
        cfg.insert("default".into(), section("info", "", ""));
        cfg.insert("objkit".into(), section("trace", "", ""));

        // Smoke check: the builder accepts the table without panicking.
        let _ = build_targets(&cfg, |s| &s.console_level);
    }
}
