//! Secure HTTP tool: outbound requests carrying vault-managed secrets.
//!
//! The agent writes `{alias}` where a secret belongs. The tool checks the
//! credential's host list, the agent's network policy and the credential's
//! placement rules, substitutes the secret, sends the request and scrubs
//! the secret out of everything that comes back.

pub mod placement;
pub mod redact;
pub mod tool;
pub mod transport;

pub use redact::{Redactor, REDACTED};
pub use tool::{SecureHttpTool, SecureRequest};
pub use transport::{HttpTransport, InboundResponse, OutboundRequest, ReqwestTransport, TransportError};
