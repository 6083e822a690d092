// Constants shared across the engine

/// Calling convention: arguments pushed on the stack, count last
pub const FUNC_STACK_ARGS: u8 = 0xC0;
/// Calling convention: arguments copied into locals
pub const FUNC_LOCAL_ARGS: u8 = 0xC1;

/// String type bytes
pub const STRING_C: u8 = 0xE0;
pub const STRING_COMPRESSED: u8 = 0xE1;
pub const STRING_UNICODE: u8 = 0xE2;

/// Value stored at a save site after a successful restore
pub const RESTORED: u32 = 0xFFFF_FFFF;

/// Offset from `ram_start` of the `self` global, unless `accelparam 6` overrides it
pub const SELF_OFFSET: u32 = 16;

/// Output channel selected at startup
pub const DEFAULT_CHANNEL: &str = "MAIN";

/// fyrecall codes
pub mod fyre {
    pub const READ_LINE: u32 = 1;
    pub const READ_KEY: u32 = 2;
    pub const TO_LOWER: u32 = 3;
    pub const TO_UPPER: u32 = 4;
    pub const CHANNEL: u32 = 5;
    pub const SET_VENEER: u32 = 6;
    pub const TRANSITION_REQUESTED: u32 = 7;
    pub const SET_STYLE: u32 = 8;
}

/// Glk selectors handled by the output shim
pub mod glk {
    pub const PUT_CHAR: u32 = 0x80;
    pub const PUT_CHAR_STREAM: u32 = 0x81;
    pub const PUT_STRING: u32 = 0x82;
    pub const PUT_STRING_STREAM: u32 = 0x83;
    pub const PUT_BUFFER: u32 = 0x84;
    pub const PUT_BUFFER_STREAM: u32 = 0x85;
    pub const PUT_CHAR_UNI: u32 = 0x128;
    pub const PUT_STRING_UNI: u32 = 0x129;
    pub const PUT_BUFFER_UNI: u32 = 0x12A;
}

/// Pack a four-letter channel name into its 32-bit form
pub const fn channel_code(name: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*name)
}

/// Unpack a 32-bit channel code
pub fn channel_name(code: u32) -> String {
    code.to_be_bytes().iter().map(|&b| b as char).collect()
}
