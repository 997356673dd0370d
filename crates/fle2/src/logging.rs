//! Process-wide `tracing` subscriber bootstrap.

use std::sync::OnceLock;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::FLE2_LOGGING_STANDARD;

const LOGGING_BEAD_ID: &str = "bd-fle2.10";

/// Directive used when neither the caller nor `RUST_LOG` supplies one.
pub const DEFAULT_FILTER: &str = "fle2=info,fle2_core=info,fle2_state=warn";

static INSTALLED: OnceLock<bool> = OnceLock::new();

/// Install a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `filter` (or [`DEFAULT_FILTER`] when `None`).
///
/// Safe to call repeatedly: only the first call does anything. Returns
/// whether that call managed to install the global subscriber; `false` means
/// another subscriber was already in place.
pub fn init_tracing(filter: Option<&str>) -> bool {
    *INSTALLED.get_or_init(|| {
        let fallback = filter.unwrap_or(DEFAULT_FILTER);
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
        let installed = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .try_init()
            .is_ok();
        if installed {
            info!(
                bead_id = LOGGING_BEAD_ID,
                logging_standard = FLE2_LOGGING_STANDARD,
                fallback,
                "tracing subscriber installed"
            );
        }
        installed
    })
}

/// Whether [`init_tracing`] has run in this process.
pub fn tracing_initialized() -> bool {
    INSTALLED.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let first = init_tracing(Some("fle2=debug"));
        assert!(tracing_initialized());
        assert_eq!(init_tracing(None), first);
        assert_eq!(init_tracing(Some("off")), first);
    }
}
