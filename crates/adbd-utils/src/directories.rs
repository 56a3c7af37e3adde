use std::path::PathBuf;

use directories::BaseDirs;
use tracing::warn;

/// Base directory the daemon stores its persisted state under.
///
/// Falls back to `/tmp/<app_name>` if the platform's data-dir can't be
/// resolved (e.g. `$HOME` unset), rather than failing daemon startup.
pub fn local_share_dir<S: AsRef<str>>(app_name: S) -> PathBuf {
    let Some(base_dirs) = BaseDirs::new() else {
        warn!("couldn't find basedirs, storing data in /tmp/<app_name>");
        return PathBuf::from(format!("/tmp/{}", app_name.as_ref()));
    };
    base_dirs.data_dir().join(app_name.as_ref())
}

/// Directory holding the trusted-host-key store consulted by the auth
/// provider.
pub fn keys_dir<S: AsRef<str>>(app_name: S) -> PathBuf {
    local_share_dir(app_name).join("keys")
}

pub fn logs_dir<S: AsRef<str>>(app_name: S) -> PathBuf {
    local_share_dir(app_name).join("logs")
}
