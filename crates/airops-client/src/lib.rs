//! # airops-client
//!
//! Real-time conversation sync for the airport-operations messaging client.
//!
//! A [`SyncSession`] ties together the REST API ([`api`]), the socket
//! connection (`airops-net`) and the live caches (`airops-cache`). Socket
//! notifications are applied by the [`router`]; local actions go out through
//! the [`dispatcher`]. UI layers read state through the session and listen
//! to its [`SessionEvent`]s.

pub mod api;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod router;
pub mod session;
pub mod state;
pub mod token;

use tracing_subscriber::{fmt, EnvFilter};

pub use api::{HttpApi, MessagingApi, NewGroup, NewMessage, Page, Pagination};
pub use config::ClientConfig;
pub use error::{ApiError, DispatchError, SessionError};
pub use events::SessionEvent;
pub use session::SyncSession;
pub use state::LiveState;
pub use token::SessionTokenStore;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("airops_client=debug,airops_net=info,airops_cache=info,warn")
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
