//! Seam between a transport's inbound `OPEN` handling and whatever actually
//! starts a named service.
//!
//! The two concrete factories named in the protocol -- a file-descriptor
//! handed to a helper thread or subprocess, versus an in-process socket
//! implemented directly against [`LocalEndpoint`] -- both resolve to the
//! same [`LocalEndpoint`] trait object here; `adbd-services` is where the
//! two constructors actually differ.

use adbd_wire::service_request::ServiceRequest;

use crate::error::ServiceError;
use crate::socket::LocalEndpoint;

pub trait ServiceDispatcher: Send + Sync {
    /// Parses and resolves a service name into a freshly started endpoint.
    /// `raw` is the undecoded `OPEN` payload (still NUL-terminated); parse
    /// failures and unresolvable prefixes are both `ServiceError::Unknown`.
    fn open(&self, raw: &[u8]) -> Result<Box<dyn LocalEndpoint>, ServiceError>;
}

/// A dispatcher with no registered services; every request resolves to
/// `ServiceError::Unknown`. Useful as a placeholder before `adbd-services`
/// is wired in, and in core-only tests.
pub struct NullDispatcher;

impl ServiceDispatcher for NullDispatcher {
    fn open(&self, raw: &[u8]) -> Result<Box<dyn LocalEndpoint>, ServiceError> {
        let name = adbd_wire::service_request::parse(raw)
            .map(describe)
            .unwrap_or_else(|| String::from("<unparseable>"));
        Err(ServiceError::Unknown(name))
    }
}

fn describe(request: ServiceRequest) -> String {
    format!("{request:?}")
}
