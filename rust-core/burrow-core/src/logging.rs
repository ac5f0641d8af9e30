//! # Logging
//!
//! `tracing` subscriber setup. `RUST_LOG` wins when set; otherwise burrow
//! logs at `info`.

use tracing_subscriber::EnvFilter;

/// Filter applied when `RUST_LOG` is unset
pub const DEFAULT_DIRECTIVE: &str = "burrow_core=info,info";

/// Install the global `fmt` subscriber
///
/// `json` switches to one JSON object per line. Returns `false` if a global
/// subscriber was already installed, which leaves the existing one in place.
pub fn init_tracing(json: bool) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        let _ = init_tracing(true);
        assert!(!init_tracing(false));
    }
}
