use crate::{errors::Error, Result};

/// Initialize tracing for the server.
///
/// Default: info for our crates, warn for everything else. `RUST_LOG`
/// overrides the filter.
pub fn init(service_name: &str, json: bool) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,gim=info,gim_core=info,gim_api=info,{service_name}=info"
        ))
    });

    let builder = fmt().with_env_filter(filter).with_target(false);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.with_ansi(true).try_init()
    };

    installed.map_err(|e| Error::Config(format!("logging already initialized: {e}")))
}
