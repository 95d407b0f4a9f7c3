use crate::config::Config;
use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// Client libraries whose records are dropped below TRACE: the database stack,
/// the HTTP stack, the AMQP client and the Redis client.
const NOISY_MODULES: &[&str] = &[
    "sqlx",
    "sea_orm",
    "tower",
    "tracing",
    "hyper",
    "axum",
    "lapin",
    "amq_protocol",
    "redis",
];

pub struct Logger {}

impl Logger {
    /// Installs the global terminal logger at the configured level.
    ///
    /// Fails only if a global logger was already installed.
    pub fn init_logger(config: &Config) -> Result<(), log::SetLoggerError> {
        TermLogger::init(
            config.log_level_filter,
            Self::log_config(config.log_level_filter),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        )
    }

    /// Modules silenced at `level`. Nothing is silenced at TRACE.
    fn ignored_modules(level: LevelFilter) -> &'static [&'static str] {
        if level == LevelFilter::Trace {
            &[]
        } else {
            NOISY_MODULES
        }
    }

    fn log_config(level: LevelFilter) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder.set_time_format_rfc3339();
        for module in Self::ignored_modules(level) {
            builder.add_filter_ignore_str(module);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn broker_and_cache_clients_are_silenced_below_trace() {
        for level in [LevelFilter::Debug, LevelFilter::Info, LevelFilter::Warn] {
            let ignored = Logger::ignored_modules(level);
            for module in ["lapin", "amq_protocol", "redis", "sqlx", "axum"] {
                assert!(ignored.contains(&module), "{module} at {level}");
            }
        }
    }

    #[test]
    fn trace_shows_every_module() {
        assert!(Logger::ignored_modules(LevelFilter::Trace).is_empty());
    }

    #[test]
    fn a_second_logger_cannot_be_installed() {
        let config = Config::parse_from(["heydays", "--log-level-filter", "WARN"]);

        // Another test may have installed the logger already; either way the
        // global logger is set after this call.
        let _ = Logger::init_logger(&config);

        assert!(Logger::init_logger(&config).is_err());
    }
}
