// File system related constants

// Define constants using static or const
// Imported into fs_calls file

// Console handles, bound at cage creation
pub const STDIN_FILENO: i32 = 0;
pub const STDOUT_FILENO: i32 = 1;

// first handle get_next_fd hands out; 0 and 1 are never reused
pub const STARTINGFD: i32 = 2;
// per cage, the two console handles included
pub const MAXOPENFILES: i32 = 14;

pub const MAX_NAME_LENGTH: usize = 256;

// file object ids start here so 0 never names a real object
pub const FIRSTOBJECTID: usize = 1;

// largest byte count one read or write syscall moves
pub const MAX_TRANSFER: usize = i32::MAX as usize;
