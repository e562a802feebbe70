use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static TRACING_INIT: OnceLock<()> = OnceLock::new();

fn build_env_filter_from(seqrun_log: Option<&str>, rust_log: Option<&str>) -> EnvFilter {
    let default = || EnvFilter::new("info");

    if let Some(v) = seqrun_log {
        return EnvFilter::try_new(v).unwrap_or_else(|_| default());
    }
    if let Some(v) = rust_log {
        return EnvFilter::try_new(v).unwrap_or_else(|_| default());
    }
    default()
}

fn build_env_filter() -> EnvFilter {
    build_env_filter_from(
        std::env::var("SEQRUN_UPLOAD_LOG").ok().as_deref(),
        std::env::var("RUST_LOG").ok().as_deref(),
    )
}

/// Initializes JSON structured logging on stderr. Idempotent: later calls in
/// the same process are no-ops, so both the CLI and integration tests can
/// call it freely.
pub fn init_logging() {
    TRACING_INIT.get_or_init(|| {
        let env_filter = build_env_filter();

        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .with_writer(std::io::stderr);

        let subscriber = tracing_subscriber::registry().with(env_filter).with(layer);
        let _ = subscriber.try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_info_default_filter_directive() {
        let filter = build_env_filter_from(None, None);
        assert_eq!(format!("{filter}"), "info");
    }

    #[test]
    fn prefers_seqrun_log_over_rust_log() {
        let filter = build_env_filter_from(Some("warn"), Some("trace"));
        assert_eq!(format!("{filter}"), "warn");
    }
}
