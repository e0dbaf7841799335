//! `log4rs` initialization for embedders that want the mapper's logs on disk or console.
//!
//! The library only logs through the `log` facade; nothing here runs unless called.

use std::path::{Path, PathBuf};

use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;

/// Target used by the `dev6!` macro.
pub const DEV6_TARGET: &str = "nexus_map::dev6";
pub const LOG_DIR_ENV: &str = "NEXUSMAP_LOG_DIR";
pub const LOG_LEVEL_ENV: &str = "NEXUSMAP_LOG_LEVEL";
pub const LOG_RETENTION_ENV: &str = "NEXUSMAP_LOG_RETENTION";
pub const DEV6_ENV: &str = "NEXUSMAP_DEV6";

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_SIZE: u64 = 10 * 1024 * 1024;

/// Initializes from a `log4rs` YAML file.
///
/// # Errors
/// Returns an error if the file cannot be read or a logger is already installed.
pub fn init_file(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    log4rs::init_file(path, log4rs::config::Deserializers::default())?;
    Ok(())
}

/// Logs to stderr at `level` (`error|warn|info|debug|trace`, default `info`).
///
/// # Errors
/// Returns an error if the config is invalid or a logger is already installed.
pub fn init_console(level: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let console = ConsoleAppender::builder()
        .target(log4rs::append::console::Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console)))
        .build(Root::builder().appender("console").build(parse_level(level)))?;
    log4rs::init_config(config)?;
    Ok(())
}

/// Rolling `mapper.log` under `dir` (current directory if `None`), keeping `retention` rolled
/// files (default 7). With `dev6`, developer traces go to a separate `dev6.log`.
///
/// # Errors
/// Returns an error if the directory cannot be created or a logger is already installed.
pub fn init_rolling(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<u32>,
    dev6: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let base = match dir {
        Some(d) => d.to_path_buf(),
        None => std::env::current_dir()?,
    };
    std::fs::create_dir_all(&base)?;
    let keep = retention.unwrap_or(7);
    let level = parse_level(level);

    let mut builder = Config::builder()
        .appender(Appender::builder().build("app", Box::new(rolling(&base, "mapper", keep)?)));
    builder = if dev6 {
        builder
            .appender(Appender::builder().build("dev6", Box::new(rolling(&base, "dev6", keep)?)))
            .logger(
                Logger::builder().appender("dev6").additive(false).build(DEV6_TARGET, LevelFilter::Trace),
            )
    } else {
        builder.logger(Logger::builder().additive(false).build(DEV6_TARGET, LevelFilter::Off))
    };
    let config = builder.build(Root::builder().appender("app").build(level))?;
    log4rs::init_config(config)?;
    Ok(())
}

/// [`init_rolling`] driven by `NEXUSMAP_LOG_DIR`, `NEXUSMAP_LOG_LEVEL`,
/// `NEXUSMAP_LOG_RETENTION` and `NEXUSMAP_DEV6`.
///
/// # Errors
/// See [`init_rolling`].
pub fn init_from_env() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::var(LOG_DIR_ENV).ok().map(PathBuf::from);
    let level = std::env::var(LOG_LEVEL_ENV).ok();
    let retention = std::env::var(LOG_RETENTION_ENV).ok().and_then(|s| s.parse::<u32>().ok());
    let dev6 = std::env::var(DEV6_ENV)
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);
    init_rolling(dir.as_deref(), level.as_deref(), retention, dev6)
}

fn rolling(
    base: &Path,
    stem: &str,
    keep: u32,
) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", base.join(format!("{stem}.{{}}.log")).display()), keep)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
    Ok(RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(base.join(format!("{stem}.log")), Box::new(policy))?)
}

/// Unknown names fall back to `info`.
#[must_use]
pub fn parse_level(level: Option<&str>) -> LevelFilter {
    match level.unwrap_or("info").to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}
