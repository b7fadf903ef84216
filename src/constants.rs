pub const LOG_BYTES_IN_KBYTE: u8 = 10;
pub const BYTES_IN_KBYTE: usize = 1 << LOG_BYTES_IN_KBYTE;

pub const LOG_BYTES_IN_LONG: u8 = 3;
pub const BYTES_IN_LONG: usize = 1 << LOG_BYTES_IN_LONG;

/// Frontier and output buffers hold 64 KiB worth of values in memory
pub const DEFAULT_CHUNK_LEN: usize = (64 * BYTES_IN_KBYTE) / BYTES_IN_LONG;

/// Largest chunk length accepted from a persisted buffer, 128 MiB of values
pub const MAX_CHUNK_LEN: usize = 1 << 24;

/// Offset of the first object in a `DumpGraph`; offset 0 means "no object"
pub const DUMP_BASE_OFFSET: u64 = 0x10;

/// Objects are laid out at word granularity in a `DumpGraph`
pub const OBJECT_ALIGNMENT: u64 = BYTES_IN_LONG as u64;
