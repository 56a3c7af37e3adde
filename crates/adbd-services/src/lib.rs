//! Concrete `LocalEndpoint` implementations reachable from an `OPEN`
//! request, and the `ServiceDispatcher` that routes to them.
//!
//! Only `sink:<n>` and `source:<n>` have concrete factories here; every
//! other syntactically valid service name (shell, sync, exec, reverse,
//! jdwp, dev, dev-raw, reconnect, spin) resolves to `ServiceError::Unknown`,
//! same as it would against the bare `adbd-core` `NullDispatcher`.

mod sink;
mod source;

use adbd_core::dispatcher::ServiceDispatcher;
use adbd_core::error::{PolicyError, ServiceError};
use adbd_core::socket::LocalEndpoint;
use adbd_wire::service_request::{self, ServiceRequest};
use tracing::debug;

pub use sink::SinkService;
pub use source::SourceService;

/// Resolves `OPEN` requests to the concrete services this crate ships.
///
/// In locked mode, `sink:<n>`/`source:<n>` -- the only services this build
/// can actually start -- are refused with `ServiceError::Policy` rather than
/// started, the same "command forbidden in locked mode" refusal a real
/// locked device applies to diagnostic services.
pub struct AdbServiceDispatcher {
    locked: bool,
}

impl AdbServiceDispatcher {
    pub fn new() -> Self {
        Self { locked: false }
    }

    /// A dispatcher that refuses every service it would otherwise start.
    pub fn locked() -> Self {
        Self { locked: true }
    }
}

impl Default for AdbServiceDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceDispatcher for AdbServiceDispatcher {
    fn open(&self, raw: &[u8]) -> Result<Box<dyn LocalEndpoint>, ServiceError> {
        let request =
            service_request::parse(raw).ok_or_else(|| ServiceError::Unknown("<unparseable>".to_string()))?;
        match request {
            ServiceRequest::Sink(_) | ServiceRequest::Source(_) if self.locked => {
                Err(PolicyError(format!("{request:?} is forbidden while locked")).into())
            }
            ServiceRequest::Sink(n) => Ok(Box::new(SinkService::new(n))),
            ServiceRequest::Source(n) => Ok(Box::new(SourceService::new(n))),
            other => {
                debug!(request = ?other, "no concrete service for this request");
                Err(ServiceError::Unknown(format!("{other:?}")))
            }
        }
    }
}
