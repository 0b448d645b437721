//! Stderr logging for the pipeline binaries.
//!
//! Lines look like `[  12.345s  WARN pipeline] dispatch failed: ...`, time
//! counted from installation. Records from this workspace's crates pass at
//! the requested level; third-party crates (image decoders and the like) are
//! capped at `warn` so `-vvv` stays readable.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

/// Module-path prefix shared by every crate of the pipeline.
const OWN_TARGET_PREFIX: &str = "pallet_vision";

/// Ceiling for records coming from other crates.
const FOREIGN_MAX_LEVEL: Level = Level::Warn;

struct PipelineLogger {
    level: LevelFilter,
    started: Instant,
}

impl PipelineLogger {
    fn admits(&self, target: &str, level: Level) -> bool {
        if level > self.level {
            return false;
        }
        target.starts_with(OWN_TARGET_PREFIX) || level <= FOREIGN_MAX_LEVEL
    }
}

/// Last path segment of a module target, e.g. `pipeline`.
fn short_target(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}

impl Log for PipelineLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.admits(metadata.target(), metadata.level())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "[{:8.3}s {:>5} {}] {}",
            elapsed,
            record.level(),
            short_target(record.target()),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<PipelineLogger> = OnceLock::new();

/// Install the stderr logger. Later calls keep the first level.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| PipelineLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Map a `-v` count onto a level: warnings by default, then info, debug, trace.
pub fn verbosity_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

#[cfg(any(feature = "tracing", test))]
/// `EnvFilter` directive equivalent to the stderr logger's policy.
fn default_directive(level: LevelFilter) -> String {
    let level = level.to_string().to_lowercase();
    format!(
        "warn,pallet_vision={level},pallet_vision_core={level},pallet_vision_detector={level}"
    )
}

/// Install a `tracing-subscriber` (span close events included).
///
/// `RUST_LOG` wins when set; otherwise the same per-crate policy as
/// [`init_with_level`] applies at `level`.
#[cfg(feature = "tracing")]
pub fn init_tracing(level: LevelFilter, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_timer(fmt::time::Uptime::default());
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder.finish().try_init()
    };
}
