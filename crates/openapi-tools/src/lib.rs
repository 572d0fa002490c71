//! OpenAPI collaborators for `apibridge-mcp`.
//!
//! This crate covers everything on the far side of the tool registry:
//! - fetching and parsing `OpenAPI` v3 documents ([`spec`])
//! - converting a document into named operation groups ([`convert`])
//! - executing a converted operation against a backend ([`client`])
//!
//! It knows nothing about tool naming, the merged catalog, or the MCP wire format.

pub mod client;
pub mod convert;
pub mod error;
pub mod resolver;
pub mod spec;
