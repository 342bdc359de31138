//! RDP protocol types
pub const TPKT_VERSION: u8 = 3;
pub const X224_CONNECTION_REQUEST: u8 = 0xe0;
pub const X224_CONNECTION_CONFIRM: u8 = 0xd0;

/// Offset of the X.224 TPDU code in the first client PDU
pub const MESSAGE_TYPE_OFFSET: usize = 5;
/// Offset where the routing token / cookie starts in a Connection Request
pub const TOKEN_OFFSET: usize = 11;

pub const CR: u8 = 0x0d;
pub const LF: u8 = 0x0a;

pub const DEFAULT_MAX_TOKEN_LEN: usize = 512;

pub const COOKIE_MSTSHASH_PREFIX: &str = "Cookie: mstshash=";
pub const COOKIE_MSTS_PREFIX: &str = "Cookie: msts=";
