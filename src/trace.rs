use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Installs the global subscriber, logging as text or JSON at `levels`
/// (an `EnvFilter` directive). Records emitted through `log`, as sqlx does,
/// are forwarded too.
///
/// Only the first call has an effect, so tests may call it repeatedly.
pub fn init(color: bool, json: bool, levels: &str) {
    let filter = EnvFilter::try_new(levels).unwrap_or_else(|error| {
        eprintln!("Invalid log level directive {levels:?}: {error}. Using \"info\".");
        EnvFilter::new("info")
    });

    let result = if json {
        FmtSubscriber::builder()
            .with_env_filter(filter)
            .json()
            .flatten_event(true)
            .try_init()
    } else {
        FmtSubscriber::builder()
            .with_ansi(color)
            .with_env_filter(filter)
            .try_init()
    };

    if let Err(error) = result {
        debug!(message = "Tracing was already initialized.", %error);
    }
}
