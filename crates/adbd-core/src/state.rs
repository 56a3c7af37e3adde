/// Lifecycle state of a `Transport`, mirrored over the device-listing
/// channel as the strings in [`ConnectionState::as_str`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authorizing,
    Unauthorized,
    NoPermission,
    Detached,
    Offline,
    Bootloader,
    Device,
    Host,
    Recovery,
    Sideload,
    Rescue,
}

impl ConnectionState {
    pub const fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authorizing => "authorizing",
            ConnectionState::Unauthorized => "unauthorized",
            ConnectionState::NoPermission => "noperm",
            ConnectionState::Detached => "detached",
            ConnectionState::Offline => "offline",
            ConnectionState::Bootloader => "bootloader",
            ConnectionState::Device => "device",
            ConnectionState::Host => "host",
            ConnectionState::Recovery => "recovery",
            ConnectionState::Sideload => "sideload",
            ConnectionState::Rescue => "rescue",
        }
    }

    /// No outbound packets are admitted once this is true; see
    /// `Transport::kick`.
    pub const fn is_offline(self) -> bool {
        matches!(self, ConnectionState::Offline)
    }
}
