//! Parsing of the UTF-8, NUL-terminated service name carried in an `OPEN`
//! payload.

/// A parsed `OPEN` service request. `Other` preserves the raw name for
/// prefixes this build recognises syntactically but has no concrete factory
/// for (shell, sync, exec, ...): see `adbd-services` for which of these
/// resolve to a running service versus `ServiceError::Unknown`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServiceRequest {
    Shell { args: Vec<String>, command: Option<String> },
    Sync,
    Exec(String),
    Reverse(String),
    Jdwp(u32),
    Dev(String),
    DevRaw(String),
    Sink(u64),
    Source(u64),
    Reconnect,
    Spin,
    Other(String),
}

/// Strips a single trailing NUL, as carried literally in `OPEN` payloads.
fn trim_nul(raw: &[u8]) -> &[u8] {
    match raw.split_last() {
        Some((0, rest)) => rest,
        _ => raw,
    }
}

pub fn parse(raw: &[u8]) -> Option<ServiceRequest> {
    let name = std::str::from_utf8(trim_nul(raw)).ok()?;
    Some(parse_str(name))
}

pub fn parse_str(name: &str) -> ServiceRequest {
    if name == "reconnect" {
        return ServiceRequest::Reconnect;
    }
    if name == "spin" {
        return ServiceRequest::Spin;
    }
    if name == "shell" || name.starts_with("shell:") || name.starts_with("shell,") {
        let rest = &name["shell".len()..];
        let (args_part, command) = match rest.split_once(':') {
            Some((a, c)) => (a, if c.is_empty() { None } else { Some(c.to_string()) }),
            None => (rest, None),
        };
        let args = args_part
            .trim_start_matches(',')
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        return ServiceRequest::Shell { args, command };
    }
    if name == "sync:" || name == "sync" {
        return ServiceRequest::Sync;
    }
    if let Some(cmd) = name.strip_prefix("exec:") {
        return ServiceRequest::Exec(cmd.to_string());
    }
    if let Some(spec) = name.strip_prefix("reverse:") {
        return ServiceRequest::Reverse(spec.to_string());
    }
    if let Some(pid) = name.strip_prefix("jdwp:") {
        if let Ok(pid) = pid.parse() {
            return ServiceRequest::Jdwp(pid);
        }
    }
    if let Some(path) = name.strip_prefix("dev-raw:") {
        return ServiceRequest::DevRaw(path.to_string());
    }
    if let Some(path) = name.strip_prefix("dev:") {
        return ServiceRequest::Dev(path.to_string());
    }
    if let Some(n) = name.strip_prefix("sink:") {
        if let Ok(n) = n.parse() {
            return ServiceRequest::Sink(n);
        }
    }
    if let Some(n) = name.strip_prefix("source:") {
        if let Ok(n) = n.parse() {
            return ServiceRequest::Source(n);
        }
    }
    ServiceRequest::Other(name.to_string())
}
