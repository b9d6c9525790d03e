//! ads-mcp-gateway: MCP gateway for an advertising-analytics reporting API
//!
//! This library exposes a remote reporting API as Model Context Protocol tools
//! over JSON-RPC 2.0 on HTTP.
//!
//! # Architecture
//!
//! The gateway owns the protocol surface. The upstream owns the data:
//!
//! - **Negotiation**: pick a mutually supported protocol version
//! - **Registry**: a static, ordered catalog of tools with public/private flags
//! - **Authorisation**: shared-secret gating of private tools
//! - **Resolution**: account names and aliases to canonical numeric ids
//! - **Invocation**: retry with backoff for transient upstream failures
//!
//! The upstream (not this crate) handles query construction and KPI
//! arithmetic; the gateway only calls tools by name.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//! - [`mcp`]: MCP protocol, dispatch, and HTTP transport
//! - [`resolver`]: Account identifier resolution and alias cache
//! - [`upstream`]: Tool backend seam, status classification, retry

pub mod config;
pub mod error;
pub mod mcp;
pub mod resolver;
pub mod upstream;
