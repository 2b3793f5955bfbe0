//! Process-wide logging setup.

/// Install `env_logger`, honouring `RUST_LOG` and defaulting to `info`.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    let env = env_logger::Env::default().default_filter_or("info");
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}
