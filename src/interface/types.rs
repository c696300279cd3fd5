use std::ffi::CStr;

use crate::interface::errnos::{SysError, SysResult};

/// # Safety
/// `cstr` must point to a NUL terminated string that outlives `'a`.
pub unsafe fn charstar_to_ruststr<'a>(cstr: *const i8) -> Result<&'a str, std::str::Utf8Error> {
    return CStr::from_ptr(cstr as *const _).to_str();
}

//redefining the Arg union to maintain the flow of the program
#[derive(Clone, Copy)]
#[repr(C)]
pub union Arg {
    pub dispatch_int: i32,
    pub dispatch_uint: u32,
    pub dispatch_long: i64,
    pub dispatch_ulong: u64,
    pub dispatch_usize: usize, //For lengths, as in read and write
    pub dispatch_cbuf: *const u8, //Typically corresponds to an immutable void* pointer as in write
    pub dispatch_mutcbuf: *mut u8, //Typically corresponds to a mutable void* pointer as in read
    pub dispatch_cstr: *const i8, //Typically corresponds to a passed in string of type char*, as in open
    pub dispatch_cstrarr: *const *const i8, //A NULL terminated char* array, as the argv of exec
    pub dispatch_intptr: *mut i32, //Where join stores the child's exit status
}

impl Arg {
    pub fn int(value: i32) -> Arg {
        // zero the wide fields first so get_int can see the upper half is clean
        let mut arg = Arg { dispatch_ulong: 0 };
        arg.dispatch_int = value;
        arg
    }

    pub fn size(value: usize) -> Arg {
        Arg {
            dispatch_usize: value,
        }
    }

    pub fn null() -> Arg {
        Arg { dispatch_ulong: 0 }
    }
}

fn invalid(message: &str) -> SysError {
    log::debug!(target: "safedesc::syscall", "dispatcher: {}", message);
    SysError::InvalidArgument
}

pub fn get_int(union_argument: Arg) -> SysResult<i32> {
    let data = unsafe { union_argument.dispatch_int };
    let mut type_checker = Arg { dispatch_long: 0 };
    //turn part of the union into 0xffffffff, but, Rust
    //does not like just using the hex value so we are forced to use
    //a value of -1
    type_checker.dispatch_int = -1;
    if (unsafe { union_argument.dispatch_long } & !unsafe { type_checker.dispatch_long }) == 0 {
        return Ok(data);
    }
    return Err(invalid("input data not valid"));
}

pub fn get_usize(union_argument: Arg) -> SysResult<usize> {
    //should not return an error
    return Ok(unsafe { union_argument.dispatch_usize });
}

pub fn get_cbuf(union_argument: Arg) -> SysResult<*const u8> {
    let data = unsafe { union_argument.dispatch_cbuf };
    if !data.is_null() {
        return Ok(data);
    }
    return Err(invalid("null input buffer"));
}

pub fn get_mutcbuf(union_argument: Arg) -> SysResult<*mut u8> {
    let data = unsafe { union_argument.dispatch_mutcbuf };
    if !data.is_null() {
        return Ok(data);
    }
    return Err(invalid("null output buffer"));
}

pub fn get_intptr<'a>(union_argument: Arg) -> SysResult<&'a mut i32> {
    let pointer = unsafe { union_argument.dispatch_intptr };
    if !pointer.is_null() {
        return Ok(unsafe { &mut *pointer });
    }
    return Err(invalid("null status pointer"));
}

pub fn get_cstr<'a>(union_argument: Arg) -> SysResult<&'a str> {
    //first we check that the pointer is not null
    //and then we check so that we can get data from the memory
    let pointer = unsafe { union_argument.dispatch_cstr };
    if !pointer.is_null() {
        if let Ok(ret_data) = unsafe { charstar_to_ruststr(pointer) } {
            return Ok(ret_data);
        } else {
            return Err(invalid("could not parse input data to a string"));
        }
    }
    return Err(invalid("null string"));
}

pub fn get_cstrarr<'a>(union_argument: Arg) -> SysResult<Vec<&'a str>> {
    //walk the pointers until the terminating null, parsing each one
    let mut pointer = unsafe { union_argument.dispatch_cstrarr };
    let mut data_vector: Vec<&str> = Vec::new();

    if !pointer.is_null() {
        while unsafe { !(*pointer).is_null() } {
            if let Ok(character_bytes) = unsafe { charstar_to_ruststr(*pointer) } {
                data_vector.push(character_bytes);
                pointer = pointer.wrapping_offset(1);
            } else {
                return Err(invalid("could not parse input data to string"));
            }
        }
        return Ok(data_vector);
    }
    return Err(invalid("null string array"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn int_rejects_dirty_upper_half() {
        assert_eq!(get_int(Arg::int(-7)), Ok(-7));
        let wide = Arg {
            dispatch_long: 1 << 40,
        };
        assert_eq!(get_int(wide), Err(SysError::InvalidArgument));
    }

    #[test]
    fn pointer_args_reject_null() {
        assert!(get_cbuf(Arg::null()).is_err());
        assert!(get_mutcbuf(Arg::null()).is_err());
        assert!(get_cstr(Arg::null()).is_err());
        assert!(get_cstrarr(Arg::null()).is_err());
        assert!(get_intptr(Arg::null()).is_err());
    }

    #[test]
    fn cstrarr_stops_at_null() {
        let prog = CString::new("echo").unwrap();
        let word = CString::new("hi").unwrap();
        let argv = [prog.as_ptr() as *const i8, word.as_ptr() as *const i8, std::ptr::null()];
        let arg = Arg {
            dispatch_cstrarr: argv.as_ptr(),
        };
        assert_eq!(get_cstrarr(arg).unwrap(), vec!["echo", "hi"]);
        let name = Arg {
            dispatch_cstr: prog.as_ptr() as *const i8,
        };
        assert_eq!(get_cstr(name).unwrap(), "echo");
    }
}
