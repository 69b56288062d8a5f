// Message type tags. Every request tag `n` is answered with tag `n + 1`.
pub const WSERVER_SHUTDOWN_REQUEST_TYPE: u8 = 0;
pub const WSERVER_SNR_UPDATE_REQUEST_TYPE: u8 = 1;
pub const WSERVER_SNR_UPDATE_RESPONSE_TYPE: u8 = 2;
pub const WSERVER_DEL_BY_MAC_REQUEST_TYPE: u8 = 3;
pub const WSERVER_DEL_BY_MAC_RESPONSE_TYPE: u8 = 4;
pub const WSERVER_DEL_BY_ID_REQUEST_TYPE: u8 = 5;
pub const WSERVER_DEL_BY_ID_RESPONSE_TYPE: u8 = 6;
pub const WSERVER_ADD_REQUEST_TYPE: u8 = 7;
pub const WSERVER_ADD_RESPONSE_TYPE: u8 = 8;
pub const WSERVER_ERRPROB_UPDATE_REQUEST_TYPE: u8 = 9;
pub const WSERVER_ERRPROB_UPDATE_RESPONSE_TYPE: u8 = 10;
pub const WSERVER_SPECPROB_UPDATE_REQUEST_TYPE: u8 = 11;
pub const WSERVER_SPECPROB_UPDATE_RESPONSE_TYPE: u8 = 12;
pub const WSERVER_POSITION_UPDATE_REQUEST_TYPE: u8 = 13;
pub const WSERVER_POSITION_UPDATE_RESPONSE_TYPE: u8 = 14;
pub const WSERVER_TXPOWER_UPDATE_REQUEST_TYPE: u8 = 15;
pub const WSERVER_TXPOWER_UPDATE_RESPONSE_TYPE: u8 = 16;
pub const WSERVER_GAUSSIAN_RANDOM_UPDATE_REQUEST_TYPE: u8 = 17;
pub const WSERVER_GAUSSIAN_RANDOM_UPDATE_RESPONSE_TYPE: u8 = 18;
pub const WSERVER_GAIN_UPDATE_REQUEST_TYPE: u8 = 19;
pub const WSERVER_GAIN_UPDATE_RESPONSE_TYPE: u8 = 20;
pub const WSERVER_HEIGHT_UPDATE_REQUEST_TYPE: u8 = 21;
pub const WSERVER_HEIGHT_UPDATE_RESPONSE_TYPE: u8 = 22;

// Response status codes
pub const WUPDATE_SUCCESS: u8 = 0;
pub const WUPDATE_INTF_NOTFOUND: u8 = 1;
pub const WUPDATE_INTF_DUPLICATE: u8 = 2;
pub const WUPDATE_WRONG_MODE: u8 = 3;

// Field sizes (bytes); all multi-byte fields are big-endian
pub const TAG_LEN: usize = 1;
pub const MAC_LEN: usize = 6;
pub const INT_LEN: usize = 4;
pub const FLOAT_LEN: usize = 4;
pub const STATUS_LEN: usize = 1;

/// Packet sizes × data rates in the per-station error probability matrix.
pub const SPECPROB_SIZES: usize = 12;
pub const SPECPROB_RATES: usize = 12;
pub const SPECPROB_LEN: usize = SPECPROB_SIZES * SPECPROB_RATES;

/// Probabilities travel as `p · 2^31` in an i32.
pub const FIXED_POINT_SCALE: f64 = 2147483648.0;

pub const DEFAULT_SOCKET_PATH: &str = "/var/run/wmediumd.sock";
