//! Model Context Protocol (MCP) gateway over HTTP.
//!
//! Exposes the ads analytics tools to AI assistants as JSON-RPC 2.0 over a
//! single HTTP endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         MCP Gateway                          │
//! │                                                              │
//! │   ┌─────────────┐    ┌──────────────┐    ┌──────────────┐    │
//! │   │  Transport  │───▶│  Dispatcher  │───▶│   Registry   │    │
//! │   │   (axum)    │    │  (JSON-RPC)  │    │   (tools)    │    │
//! │   └─────────────┘    └──────────────┘    └──────────────┘    │
//! │                        │    │    │                           │
//! │            ┌───────────┘    │    └───────────┐               │
//! │            ▼                ▼                ▼               │
//! │   ┌──────────────┐  ┌──────────────┐  ┌──────────────┐       │
//! │   │  Negotiator  │  │   AuthGate   │  │   Resolver   │       │
//! │   └──────────────┘  └──────────────┘  └──────────────┘       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! Versions are negotiated per request from the configured supported list;
//! the default list is `2024-11-05`.

pub mod auth;
pub mod dispatcher;
pub mod negotiation;
pub mod protocol;
pub mod registry;
pub mod transport;

pub use auth::AuthGate;
pub use dispatcher::{DispatchOutcome, RpcDispatcher, ToolCallResult};
pub use negotiation::{NegotiatedSession, NegotiationError, ProtocolNegotiator};
pub use protocol::{ErrorCode, JsonRpcError, JsonRpcResponse, RequestId, PROTOCOL_VERSION_HEADER};
pub use registry::{ToolDescriptor, ToolKind, ToolRegistry};
pub use transport::{router, shutdown_signal};
