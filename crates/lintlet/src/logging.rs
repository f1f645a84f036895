//! Tracing setup for binaries that host a controller or a worker.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter directive for a `LINTLET_LOG` value. Unknown or missing means info.
fn level_directive(level: Option<&str>) -> String {
    let base_level = match level {
        Some("debug") => "debug",
        Some("warn") | Some("warning") => "warn",
        Some("error") => "error",
        _ => "info",
    };
    format!("lintlet={base_level}")
}

fn default_filter() -> EnvFilter {
    let level = std::env::var("LINTLET_LOG").ok();
    EnvFilter::new(level_directive(level.as_deref()))
}

/// Initialize tracing with LINTLET_LOG and LOG_FORMAT support.
///
/// `RUST_LOG` wins when set. Output always goes to stderr, since a worker
/// process owns stdout for framing. Calling this twice is harmless.
pub fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        default_filter()
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lintlet_log_selects_crate_level() {
        assert_eq!(level_directive(Some("debug")), "lintlet=debug");
        assert_eq!(level_directive(Some("warning")), "lintlet=warn");
        assert_eq!(level_directive(Some("warn")), "lintlet=warn");
        assert_eq!(level_directive(Some("error")), "lintlet=error");
        assert_eq!(level_directive(Some("info")), "lintlet=info");
    }

    #[test]
    fn unknown_or_missing_level_falls_back_to_info() {
        assert_eq!(level_directive(None), "lintlet=info");
        assert_eq!(level_directive(Some("verbose")), "lintlet=info");
        assert_eq!(level_directive(Some("DEBUG")), "lintlet=info");
    }
}
