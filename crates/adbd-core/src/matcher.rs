//! Target-match query grammar used to find a transport by a human-typed
//! selector (serial, devpath, `product:`/`model:`/`device:`, or `tcp:`/`udp:`
//! host[:port] forms for network transports).

/// Whether a transport is a local network link (serial looks like
/// `host:port`) or a physical USB link. Only local transports match the
/// `tcp:`/`udp:` query forms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    Usb,
    LocalTcp,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetIdentity<'a> {
    pub kind: TransportKind,
    pub serial: &'a str,
    pub devpath: &'a str,
    pub product: &'a str,
    pub model: &'a str,
    pub device: &'a str,
}

/// Splits a `host:port` serial into its host part, or `None` if there's no
/// colon (e.g. a USB serial number).
fn host_of(serial: &str) -> Option<&str> {
    serial.rsplit_once(':').map(|(host, _)| host)
}

fn port_of(serial: &str) -> Option<&str> {
    serial.rsplit_once(':').map(|(_, port)| port)
}

pub fn matches_target(id: &TargetIdentity<'_>, query: &str) -> bool {
    if let Some(rest) = query.strip_prefix("product:") {
        return id.product == rest;
    }
    if let Some(rest) = query.strip_prefix("model:") {
        return id.model == rest;
    }
    if let Some(rest) = query.strip_prefix("device:") {
        return id.device == rest;
    }
    if let Some(rest) = query.strip_prefix("tcp:").or_else(|| query.strip_prefix("udp:")) {
        if id.kind != TransportKind::LocalTcp {
            return false;
        }
        return matches_host_port(id.serial, rest);
    }

    // Bare string: serial, devpath, or (for local transports) the host
    // portion of a host:port serial.
    if query == id.serial || query == id.devpath {
        return true;
    }
    if id.kind == TransportKind::LocalTcp {
        if let Some(host) = host_of(id.serial) {
            return host == query;
        }
    }
    false
}

fn matches_host_port(serial: &str, query: &str) -> bool {
    let (query_host, query_port) = match query.rsplit_once(':') {
        Some((h, p)) => (h, Some(p)),
        None => (query, None),
    };
    let Some(serial_host) = host_of(serial) else { return false };
    if serial_host != query_host {
        return false;
    }
    match query_port {
        Some(p) => port_of(serial) == Some(p),
        None => true,
    }
}
