use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initializes the global `tracing` subscriber for a binary's `main`.
///
/// `env_filter` is a `tracing-subscriber` directive string (e.g. `"info"` or
/// `"treb=debug,info"`); it is combined with the `RUST_LOG` environment
/// variable when present, with `RUST_LOG` taking precedence. Everything at
/// `stderr_threshold` and above is duplicated to stderr so operators
/// tailing a log file still see fatal conditions on the terminal.
pub fn initialize(env_filter: &str, stderr_threshold: ::tracing::Level) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(env_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stdout);
    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(tracing_subscriber::filter::LevelFilter::from_level(
            stderr_threshold,
        ));

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(stderr_layer)
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_does_not_panic_when_called_once() {
        // Subsequent calls in the same process would error on the global
        // subscriber already being set; `try_init` swallows that, so calling
        // this from multiple test binaries is safe.
        initialize("debug", ::tracing::Level::WARN);
    }
}
