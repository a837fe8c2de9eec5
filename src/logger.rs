use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::EnvFilter;

static QUIET_MODE: AtomicBool = AtomicBool::new(false);

pub fn set_quiet_mode(quiet: bool) {
    QUIET_MODE.store(quiet, Ordering::Relaxed);
}

pub fn is_quiet() -> bool {
    QUIET_MODE.load(Ordering::Relaxed)
}

/// Default filter directive for the given switches. `RUST_LOG` wins when set.
pub fn default_directive(quiet: bool, verbose: bool) -> &'static str {
    match (quiet, verbose) {
        (true, _) => "warn",
        (false, true) => "img_variants=debug,info",
        (false, false) => "info",
    }
}

/// Install the global tracing subscriber. Safe to call more than once; later
/// calls only update the quiet switch.
pub fn init(quiet: bool, verbose: bool, json: bool) {
    set_quiet_mode(quiet);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(quiet, verbose)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(true, true), "warn");
        assert_eq!(default_directive(false, true), "img_variants=debug,info");
        assert_eq!(default_directive(false, false), "info");
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init(false, false, false);
        init(true, false, false);
        assert!(is_quiet());
        set_quiet_mode(false);
    }
}
