//! Log setup for the CLI
//!
//! Everything goes to stderr so stdout stays free for reports. `RUST_LOG`
//! overrides the level passed on the command line.

use butterfly_common::{Error, Result};
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).map_err(|e| Error::invalid_config(format!("Invalid log level: {e}")))?,
    };

    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false);
    let result = if json {
        builder.json().with_thread_ids(true).try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|_| Error::invalid_config("Logging already initialized"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_level() {
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(init_logging("butterfly_contract=loudest", false).is_err());
        }
    }
}
