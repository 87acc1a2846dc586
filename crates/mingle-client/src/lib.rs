//! # mingle-client
//!
//! Client core of the Mingle messenger: session and presence, realtime
//! synchronization of chat lists, threads and reactions, and the commands
//! behind every user action. Rendering is left to whoever consumes the
//! [`events::UiEvent`] stream.

pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod presence;
pub mod screens;
pub mod session;
pub mod state;
pub mod sync;

#[cfg(test)]
mod fixtures;

use tracing_subscriber::{fmt, EnvFilter};

pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use events::{ChannelSink, EventSink, UiEvent};
pub use session::{SessionContext, SessionState};
pub use state::{AppState, Services};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Calling it twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mingle_client=debug,mingle_store=info,warn"));

    let installed = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Starting Mingle client core");
    }
}
