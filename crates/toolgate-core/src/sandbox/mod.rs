//! Sandbox: the opaque remote execution capability.
//!
//! Tools never talk to a VM directly; they go through
//! [`SandboxCapability`], which runs a command or reads/writes a file in a
//! named sandbox. The VM lifecycle behind it is somebody else's problem.
//!
//! # Modules
//!
//! - [`capability`]: `SandboxCapability`, `ExecOptions`, `ExecOutput`
//! - [`local`]: `LocalShellSandbox` (host `sh -c` + `tokio::fs`)
//! - [`error`]: `SandboxIoError` / `SandboxResult`

pub mod capability;
pub mod error;
pub mod local;

pub use capability::{ExecOptions, ExecOutput, SandboxCapability};
pub use error::{SandboxIoError, SandboxResult};
pub use local::{LocalShellSandbox, LOCAL_TIMEOUT_EXIT_CODE};
