// System related constants

// Define constants using static or const
// Imported into sys_calls file

// the root cage, the only one allowed to halt
pub const INIT_CAGEID: u64 = 1;
// live cages, init included
pub const MAX_CAGES: usize = 32;

// join outcomes at the i32 boundary
pub const JOIN_NORMAL: i32 = 1;
pub const JOIN_ABNORMAL: i32 = 0;
