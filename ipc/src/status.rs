//! Status codes returned in the response header
//!
//! Failures are negated POSIX error numbers (Linux numbering).

pub const OK: i64 = 0;

pub const ENOENT: i64 = 2;
pub const EIO: i64 = 5;
pub const EACCES: i64 = 13;
pub const EEXIST: i64 = 17;
pub const ENOTDIR: i64 = 20;
pub const EISDIR: i64 = 21;
pub const EINVAL: i64 = 22;
pub const ENOSPC: i64 = 28;
pub const ENAMETOOLONG: i64 = 36;
pub const ENOSYS: i64 = 38;
pub const ELOOP: i64 = 40;

/// Human-readable name of an error status, for logs
pub fn describe(status: i64) -> &'static str {
    match -status {
        0 => "success",
        ENOENT => "no such file or directory",
        EIO => "I/O error",
        EACCES => "permission denied",
        EEXIST => "file exists",
        ENOTDIR => "not a directory",
        EISDIR => "is a directory",
        EINVAL => "invalid argument",
        ENOSPC => "no space left on device",
        ENAMETOOLONG => "file name too long",
        ENOSYS => "function not implemented",
        ELOOP => "too many levels of symbolic links",
        _ if status > 0 => "success",
        _ => "unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        assert_eq!(describe(-EACCES), "permission denied");
        assert_eq!(describe(OK), "success");
        assert_eq!(describe(512), "success");
        assert_eq!(describe(-999), "unknown error");
    }
}
