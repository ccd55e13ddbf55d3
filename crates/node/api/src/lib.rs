//! Local HTTP API of the Wayfare node runner.
//!
//! | Route | Method | Description |
//! |-------|--------|-------------|
//! | `/health` | GET | Liveness and live peer count |
//! | `/peers` | GET | Every known peer, revoked ones included |
//! | `/peers` | POST | Register a wallet, returns the client config once |
//! | `/peers/{wallet}` | GET | One peer |
//! | `/peers/{wallet}` | DELETE | Revoke a peer |

mod error;
mod handlers;
mod server;

pub use error::ApiError;
pub use handlers::{HealthResponse, RegisterPeerRequest, RegisterPeerResponse};
pub use server::{ApiState, router, serve};
