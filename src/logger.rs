use chrono::Local;
use fern::Dispatch;
use log::LevelFilter;
use std::fs;
use std::path::Path;

/// Initializes the global logger with console output only.
///
/// Log level is controlled by the `RUST_LOG` environment variable
/// (`RUST_LOG=debug clusterflow execute ...`). If `RUST_LOG` is not set, it defaults to `info`.
///
/// Stage processes are started by the external scheduler with stdout and stderr redirected
/// to the stage log target, so console output is what ends up in the per-stage log.
pub fn init() {
    apply(base_config().chain(console_config()), None);
}

/// Same as [`init`], but additionally appends plain-text records to `log_file`.
pub fn init_with_file(log_file: &Path) {
    if let Some(parent) = log_file.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("Failed to create log directory at '{}': {}", parent.display(), e);
        }
    }

    let file_config = Dispatch::new().format(|out, message, record| {
        out.finish(format_args!("[{} {} {}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), record.level(), record.target(), message))
    });

    match fern::log_file(log_file) {
        Ok(file) => apply(base_config().chain(console_config()).chain(file_config.chain(file)), Some(log_file)),
        Err(e) => {
            eprintln!("Failed to open log file '{}': {}", log_file.display(), e);
            init();
        }
    }
}

fn base_config() -> Dispatch {
    // Get the log level from RUST_LOG, defaulting to "info" (RUST_LOG=debug or RUST_LOG=warn)
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let log_level_filter = log_level.parse::<LevelFilter>().unwrap_or(LevelFilter::Info);

    Dispatch::new().level(log_level_filter).level_for("serde", LevelFilter::Warn).level_for("uuid", LevelFilter::Warn)
}

fn console_config() -> Dispatch {
    Dispatch::new()
        .format(|out, message, record| {
            let colors = fern::colors::ColoredLevelConfig::new()
                .error(fern::colors::Color::Red)
                .warn(fern::colors::Color::Yellow)
                .info(fern::colors::Color::Green)
                .debug(fern::colors::Color::Blue)
                .trace(fern::colors::Color::BrightBlack);

            out.finish(format_args!(
                "[{} {} {}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .chain(std::io::stderr())
}

fn apply(config: Dispatch, log_file: Option<&Path>) {
    config.apply().unwrap_or_else(|e| {
        eprintln!("Failed to apply logger configuration: {}", e);
    });

    match log_file {
        Some(path) => log::debug!("Logger initialized. Logging to console and '{}'.", path.display()),
        None => log::debug!("Logger initialized. Logging to console."),
    }
}
