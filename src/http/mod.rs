//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, panic capture)
//!     → orchestrator.rs (body limit, deadline, version negotiation, transformation legs)
//!         → request.rs (context, version detection, body parse)
//!         → upstream.rs (forward to the single upstream)
//!         → response.rs (headers, JSON error bodies)
//!     → Send to client
//! ```

pub mod orchestrator;
pub mod request;
pub mod response;
pub mod server;
pub mod upstream;

pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use request::{RequestContext, X_REQUEST_ID};
pub use response::GatewayError;
pub use server::{AppState, HttpServer};
