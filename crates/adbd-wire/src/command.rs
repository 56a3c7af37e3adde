/// Four-byte little-endian ASCII command tags used on the wire.
///
/// `magic` for a given command is always `command ^ 0xffff_ffff`; this is
/// checked on every inbound header, not just recomputed on send.
const fn tag(b: [u8; 4]) -> u32 {
    (b[0] as u32) | ((b[1] as u32) << 8) | ((b[2] as u32) << 16) | ((b[3] as u32) << 24)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Command {
    Cnxn = CNXN,
    Auth = AUTH,
    Open = OPEN,
    Okay = OKAY,
    Clse = CLSE,
    Wrte = WRTE,
    Sync = SYNC,
    Stls = STLS,
}

pub const CNXN: u32 = tag(*b"CNXN");
pub const AUTH: u32 = tag(*b"AUTH");
pub const OPEN: u32 = tag(*b"OPEN");
pub const OKAY: u32 = tag(*b"OKAY");
pub const CLSE: u32 = tag(*b"CLSE");
pub const WRTE: u32 = tag(*b"WRTE");
pub const SYNC: u32 = tag(*b"SYNC");
pub const STLS: u32 = tag(*b"STLS");

impl Command {
    pub const fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            CNXN => Command::Cnxn,
            AUTH => Command::Auth,
            OPEN => Command::Open,
            OKAY => Command::Okay,
            CLSE => Command::Clse,
            WRTE => Command::Wrte,
            SYNC => Command::Sync,
            STLS => Command::Stls,
            _ => return None,
        })
    }

    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    pub const fn magic(self) -> u32 {
        self.as_u32() ^ 0xffff_ffff
    }
}

/// `AUTH` sub-types, carried in `arg0` of an `AUTH` packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum AuthType {
    Token = 1,
    Signature = 2,
    RsaPublicKey = 3,
}

impl AuthType {
    pub const fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            1 => AuthType::Token,
            2 => AuthType::Signature,
            3 => AuthType::RsaPublicKey,
            _ => return None,
        })
    }
}
