//! Effect interpreter trait.
//!
//! # Example (mock for testing)
//!
//! ```ignore
//! struct FailingHost;
//!
//! impl HostInterpreter for FailingHost {
//!     type Error = HostApiError;
//!
//!     async fn interpret(&self, _effect: HostEffect) -> Result<HostResponse, Self::Error> {
//!         Err(HostApiError::with_status(500, "boom"))
//!     }
//! }
//! ```

use std::fmt::Display;
use std::future::Future;

use super::host::{HostEffect, HostResponse};

/// Interprets host effects against the source-control host API.
pub trait HostInterpreter {
    /// The error type returned by this interpreter.
    type Error: Display + Send;

    /// Execute a host effect and return its response.
    fn interpret(
        &self,
        effect: HostEffect,
    ) -> impl Future<Output = Result<HostResponse, Self::Error>> + Send;
}
