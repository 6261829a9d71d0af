// Environment configuration (shared by the library and the CLI)
pub mod config;

pub mod error;

// Marker extraction from captured text
pub mod marker;

// Wire protocol and inter-context transport
pub mod protocol;
pub mod transport;

// Persisted key-value state
pub mod persistence;

// The three execution contexts
pub mod coordinator;
pub mod foreground;
pub mod privileged;

pub mod runtime;

#[cfg(test)]
pub mod test_utils;

use tracing_subscriber::EnvFilter;

/// Install the stderr log subscriber; `RUST_LOG` wins over `verbose`
pub fn init_tracing(verbose: bool) {
    let default = if verbose {
        "marker_bridge=debug,marker_bridge_lib=debug"
    } else {
        "marker_bridge=info,marker_bridge_lib=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
