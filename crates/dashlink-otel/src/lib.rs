//! Tracing setup shared by the dashlink binaries.

use once_cell::sync::OnceCell;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

/// Target used by the server's per-request access lines.
pub const ACCESS_TARGET: &str = "http.access";

static ACCESS_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Where console output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Console {
    #[default]
    Stdout,
    /// Keeps stdout free for program output (the terminal watcher).
    Stderr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Minutely,
    Hourly,
    Daily,
}

impl Rotation {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "hourly" => Rotation::Hourly,
            "minutely" => Rotation::Minutely,
            _ => Rotation::Daily,
        }
    }
}

/// Rolling file sink for `http.access` lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRoll {
    pub dir: String,
    pub prefix: String,
    pub rotation: Rotation,
}

impl AccessRoll {
    /// Read `DASHLINK_ACCESS_LOG_ROLL` and friends; `None` unless rolling is on.
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if lookup("DASHLINK_ACCESS_LOG_ROLL").as_deref() != Some("1") {
            return None;
        }
        let dir = lookup("DASHLINK_ACCESS_LOG_DIR")
            .or_else(|| lookup("DASHLINK_LOGS_DIR"))
            .unwrap_or_else(|| "logs".to_string());
        let prefix = lookup("DASHLINK_ACCESS_LOG_PREFIX").unwrap_or_else(|| "http-access".into());
        let rotation = lookup("DASHLINK_ACCESS_LOG_ROTATION")
            .map(|r| Rotation::parse(&r))
            .unwrap_or(Rotation::Daily);
        Some(Self {
            dir,
            prefix,
            rotation,
        })
    }

    fn writer(&self) -> tracing_appender::rolling::RollingFileAppender {
        match self.rotation {
            Rotation::Hourly => tracing_appender::rolling::hourly(&self.dir, &self.prefix),
            Rotation::Minutely => tracing_appender::rolling::minutely(&self.dir, &self.prefix),
            Rotation::Daily => tracing_appender::rolling::daily(&self.dir, &self.prefix),
        }
    }
}

pub fn init() {
    init_with(Console::Stdout);
}

pub fn init_with(console: Console) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = match console {
        Console::Stdout => fmt::layer().boxed(),
        Console::Stderr => fmt::layer().with_writer(std::io::stderr).boxed(),
    };
    let registry = tracing_subscriber::registry().with(fmt_layer.with_filter(filter));
    match AccessRoll::from_lookup(|key| std::env::var(key).ok()) {
        Some(roll) => {
            if std::fs::create_dir_all(&roll.dir).is_err() {
                tracing::warn!(directory = %roll.dir, "failed to create access log directory");
            }
            let (nb, guard) = tracing_appender::non_blocking(roll.writer());
            let _ = ACCESS_GUARD.set(guard);
            let targets = Targets::new().with_target(ACCESS_TARGET, tracing::Level::INFO);
            let access_layer = fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(nb)
                .with_filter(targets);
            let _ = registry.with(access_layer).try_init();
        }
        None => {
            let _ = registry.try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn rolling_is_off_by_default() {
        assert_eq!(AccessRoll::from_lookup(lookup(&[])), None);
        assert_eq!(
            AccessRoll::from_lookup(lookup(&[("DASHLINK_ACCESS_LOG_ROLL", "true")])),
            None
        );
    }

    #[test]
    fn rolling_settings_fall_back_to_logs_dir() {
        let roll = AccessRoll::from_lookup(lookup(&[
            ("DASHLINK_ACCESS_LOG_ROLL", "1"),
            ("DASHLINK_LOGS_DIR", "/var/log/dashlink"),
            ("DASHLINK_ACCESS_LOG_ROTATION", "Hourly"),
        ]))
        .expect("enabled");
        assert_eq!(roll.dir, "/var/log/dashlink");
        assert_eq!(roll.prefix, "http-access");
        assert_eq!(roll.rotation, Rotation::Hourly);
    }

    #[test]
    fn unknown_rotation_is_daily() {
        assert_eq!(Rotation::parse("weekly"), Rotation::Daily);
    }
}
