/* Logger initialization */
use std::{any::Any, panic, thread};

use tracing::{error, level_filters::LevelFilter};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{AppConfig, CargoEnv};

pub struct LoggerGuards {
    pub _tracing_guard: WorkerGuard,
    pub _sentry_guard: Option<sentry::ClientInitGuard>,
}

pub struct Logger {}

impl Logger {
    /// installs the global subscriber and panic hook, keep the guards alive until exit
    pub fn init(config: &AppConfig) -> LoggerGuards {
        let (writer, tracing_guard) = log_writer(config.cargo_env);
        let sentry_guard = config
            .sentry_dsn
            .clone()
            .map(|dsn| init_sentry(dsn, config.cargo_env));

        let registry = tracing_subscriber::registry()
            .with(level_filter(config.debug))
            .with(tracing_subscriber::fmt::layer().with_writer(writer));

        match sentry_guard {
            Some(_) => registry.with(sentry_tracing::layer()).init(),
            None => registry.init(),
        }

        panic::set_hook(Box::new(|info| {
            let current = thread::current();
            let location = info
                .location()
                .map(|l| format!("{}:{}", l.file(), l.line()))
                .unwrap_or_else(|| "unknown".to_string());

            error!(
                target: "panic",
                thread = current.name().unwrap_or("unnamed"),
                location = %location,
                "{}\n{:?}",
                panic_message(info.payload()),
                backtrace::Backtrace::new()
            );
        }));

        LoggerGuards {
            _tracing_guard: tracing_guard,
            _sentry_guard: sentry_guard,
        }
    }
}

/// DEBUG=true turns on the per-line rewrite and cache chatter
fn level_filter(debug: bool) -> LevelFilter {
    if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    }
}

// dev logs go to stdout, production to a daily rolling file
fn log_writer(cargo_env: CargoEnv) -> (NonBlocking, WorkerGuard) {
    match cargo_env {
        CargoEnv::Development => tracing_appender::non_blocking(std::io::stdout()),
        CargoEnv::Production => {
            tracing_appender::non_blocking(tracing_appender::rolling::daily("logs", "daily.log"))
        }
    }
}

fn environment_name(cargo_env: CargoEnv) -> &'static str {
    match cargo_env {
        CargoEnv::Development => "development",
        CargoEnv::Production => "production",
    }
}

fn init_sentry(dsn: String, cargo_env: CargoEnv) -> sentry::ClientInitGuard {
    sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(environment_name(cargo_env).into()),
            attach_stacktrace: true,
            ..Default::default()
        },
    ))
}

/// panics carry either a literal or a formatted string, anything else is opaque
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_selects_the_level() {
        assert_eq!(level_filter(true), LevelFilter::DEBUG);
        assert_eq!(level_filter(false), LevelFilter::INFO);
    }

    #[test]
    fn sentry_environment_follows_cargo_env() {
        assert_eq!(environment_name(CargoEnv::Development), "development");
        assert_eq!(environment_name(CargoEnv::Production), "production");
    }

    #[test]
    fn panic_payloads_become_messages() {
        let literal: Box<dyn Any + Send> = Box::new("static boom");
        assert_eq!(panic_message(literal.as_ref()), "static boom");

        let formatted: Box<dyn Any + Send> = Box::new(format!("boom {}", 7));
        assert_eq!(panic_message(formatted.as_ref()), "boom 7");

        let opaque: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(opaque.as_ref()), "non-string panic payload");
    }
}
