//! Logging setup. As a library, `reposcan` never installs a global logger on
//! its own; callers wire up `log` however fits their application. This module
//! only offers a convenience initializer for tests and doc examples.

use std::sync::Once;

static INIT: Once = Once::new();

/// Install an `env_logger` instance suitable for test output. Safe to call from
/// many tests; only the first call takes effect.
pub fn init_for_tests() {
    INIT.call_once(|| {
        let _ = env_logger::Builder::from_default_env()
            .is_test(true)
            .filter_level(log::LevelFilter::Debug)
            .try_init();
    });
}
