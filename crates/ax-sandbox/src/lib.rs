//! C10 — sandbox abstraction. Every backend spawns the agent process with a
//! minimal, scoped environment and returns a handle the completion pipeline
//! drains and waits on; none of them ever forward host credentials.

pub mod backend;
pub mod env;
pub mod error;
pub mod namespace;
pub mod subprocess;
pub mod types;

pub use backend::SandboxBackend;
pub use error::{Result, SandboxError};
pub use namespace::NamespaceBackend;
pub use subprocess::SubprocessBackend;
pub use types::{SandboxConfig, SandboxExit, SandboxHandle, SandboxWaiter, ALLOWED_ENV_VARS};
