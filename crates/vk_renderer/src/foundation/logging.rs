//! Logging utilities and structured logging support

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system
///
/// Honors `RUST_LOG` when set and defaults to `info` otherwise.
pub fn init() {
    builder().init();
}

fn builder() -> env_logger::Builder {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_verbosity_is_info() {
        std::env::remove_var("RUST_LOG");
        let logger = builder().build();
        assert_eq!(logger.filter(), log::LevelFilter::Info);
    }
}
