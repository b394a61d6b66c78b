use {
    anyhow::Result,
    serde::{
        Deserialize,
        Serialize,
    },
    std::{
        fs::File,
        path::Path,
        str::FromStr,
        sync::Arc,
    },
    tracing::Level,
    tracing_subscriber::{
        filter::Targets,
        fmt::layer,
        layer::SubscriberExt,
        util::SubscriberInitExt,
        Layer,
    },
};

const CRATE_TARGET: &str = env!("CARGO_CRATE_NAME");

/// Where and how verbosely to log, in a form that can be stored next to the
/// agent config with [`crate::util::write_config`].
///
/// Levels are the usual `tracing` names (`"trace"` through `"error"`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub file_level: String,
    pub stdout_level: String,
    /// Also keep events from other crates (candle, ...), not only the agent's
    /// own construction, update and checkpoint events.
    pub dependencies: bool,
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file_level: "info".to_string(),
            stdout_level: "info".to_string(),
            dependencies: false,
        }
    }
}

/// Keep events of this crate at or above `level`, and those of other crates
/// only when `dependencies` is set.
pub fn target_filter(
    level: &str,
    dependencies: bool,
) -> Result<Targets> {
    let level = Level::from_str(level)?;
    let filter = Targets::new().with_target(CRATE_TARGET, level);
    Ok(if dependencies {
        filter.with_default(level)
    } else {
        filter
    })
}

/// Log to `path` and to stdout, each with its own filter.
///
/// Fails if a level does not parse or if a global subscriber has already been
/// installed.
pub fn setup_logging(
    path: &dyn AsRef<Path>,
    config: &LoggingConfig,
) -> Result<()> {
    let file_filter = target_filter(&config.file_level, config.dependencies)?;
    let stdout_filter = target_filter(&config.stdout_level, config.dependencies)?;
    let log_file = Arc::new(File::create(path)?);

    tracing_subscriber::registry()
        .with(
            layer()
                .with_writer(log_file)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            layer()
                .pretty()
                .with_line_number(true)
                .with_thread_ids(false)
                .with_target(false)
                .with_filter(stdout_filter),
        )
        .try_init()?;

    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_events_pass_at_the_configured_level() {
        let filter = target_filter("debug", false).unwrap();
        assert!(filter.would_enable("ddpg_core::agents::ddpg", &Level::DEBUG));
        assert!(!filter.would_enable("ddpg_core::agents::ddpg", &Level::TRACE));
    }

    #[test]
    fn dependency_events_are_opt_in() {
        let quiet = target_filter("info", false).unwrap();
        assert!(!quiet.would_enable("candle_core::tensor", &Level::WARN));

        let verbose = target_filter("info", true).unwrap();
        assert!(verbose.would_enable("candle_core::tensor", &Level::WARN));
        assert!(!verbose.would_enable("candle_core::tensor", &Level::DEBUG));
    }

    #[test]
    fn unknown_levels_are_rejected() {
        assert!(target_filter("chatty", false).is_err());
    }
}
