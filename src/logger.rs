//! A minimal `log` backend for host builds. On the device, `EspLogger` is used
//! instead.
//!
//! Records from the station's own targets (`aqi_station`, `apc1`, and the
//! `aqi::` targets) are shown down to `Debug`; everything else is limited to
//! `Warn`.
use log::{Level, LevelFilter, Log, Metadata, Record};

const OWN_TARGETS: [&str; 3] = ["aqi_station", "apc1", "aqi"];

static LOGGER: TargetLogger = TargetLogger {
    own: LevelFilter::Debug,
    others: LevelFilter::Warn,
};

pub fn init() -> Result<(), log::SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(LOGGER.own.max(LOGGER.others));
    Ok(())
}

#[derive(Debug)]
struct TargetLogger {
    own: LevelFilter,
    others: LevelFilter,
}

impl TargetLogger {
    fn filter_for(&self, target: &str) -> LevelFilter {
        if is_own_target(target) {
            self.own
        } else {
            self.others
        }
    }
}

impl Log for TargetLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.filter_for(metadata.target())
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        eprintln!("{} {}: {}", level_str(record.level()), record.target(), record.args());
    }

    fn flush(&self) {}
}

/// `target` is one of ours, or a module path beneath one of ours.
fn is_own_target(target: &str) -> bool {
    OWN_TARGETS.iter().any(|own| match target.strip_prefix(own) {
        Some(rest) => rest.is_empty() || rest.starts_with("::"),
        None => false,
    })
}

fn level_str(level: Level) -> &'static str {
    match level {
        Level::Error => "[x]",
        Level::Warn => "[!]",
        Level::Info => "[i]",
        Level::Debug => "[?]",
        Level::Trace => "[.]",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled(target: &str, level: Level) -> bool {
        LOGGER.enabled(&Metadata::builder().target(target).level(level).build())
    }

    #[test]
    fn own_targets_log_debug() {
        assert!(enabled("aqi_station::wifi", Level::Debug));
        assert!(enabled("aqi::sensor", Level::Debug));
        assert!(enabled("apc1", Level::Info));
        assert!(!enabled("aqi_station::wifi", Level::Trace));
    }

    #[test]
    fn other_targets_only_warn() {
        assert!(enabled("esp_idf_svc::wifi", Level::Warn));
        assert!(!enabled("esp_idf_svc::wifi", Level::Info));
        // a shared prefix isn't enough
        assert!(!enabled("aqi_stationary", Level::Info));
        assert!(!enabled("apc10::driver", Level::Info));
    }

    #[test]
    fn levels_have_distinct_prefixes() {
        let prefixes = [
            Level::Error,
            Level::Warn,
            Level::Info,
            Level::Debug,
            Level::Trace,
        ]
        .map(level_str);
        for (i, prefix) in prefixes.iter().enumerate() {
            assert!(!prefixes[i + 1..].contains(prefix), "{prefix} repeats");
        }
    }
}
