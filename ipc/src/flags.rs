//! Open flags and mode bits as carried on the wire

use bitflags::bitflags;

bitflags! {
    /// `open()` flags
    ///
    /// Read and write access are independent bits, so `O_RDWR` is their union.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        const O_RDONLY = 0x0001;
        const O_WRONLY = 0x0002;
        const O_RDWR = Self::O_RDONLY.bits() | Self::O_WRONLY.bits();
        const O_APPEND = 0x0004;
        const O_CREAT = 0x0008;
        const O_EXCL = 0x0010;
        const O_TRUNC = 0x0020;
        const O_NONBLOCK = 0x0040;
        const O_CLOEXEC = 0x0080;
        const O_DIRECTORY = 0x0100;
    }
}

impl OpenFlags {
    pub fn wants_read(self) -> bool {
        self.contains(Self::O_RDONLY)
    }

    pub fn wants_write(self) -> bool {
        self.contains(Self::O_WRONLY)
    }
}

/// Mode type and permission bits (`st_mode` layout)
pub mod mode {
    pub const S_IFMT: u32 = 0o170000;
    pub const S_IFSOCK: u32 = 0o140000;
    pub const S_IFLNK: u32 = 0o120000;
    pub const S_IFREG: u32 = 0o100000;
    pub const S_IFBLK: u32 = 0o060000;
    pub const S_IFDIR: u32 = 0o040000;
    pub const S_IFCHR: u32 = 0o020000;
    pub const S_IFIFO: u32 = 0o010000;

    pub const S_ISUID: u32 = 0o4000;
    pub const S_ISGID: u32 = 0o2000;
    pub const S_ISVTX: u32 = 0o1000;

    pub const S_IRUSR: u32 = 0o400;
    pub const S_IWUSR: u32 = 0o200;
    pub const S_IXUSR: u32 = 0o100;
    pub const S_IRGRP: u32 = 0o040;
    pub const S_IWGRP: u32 = 0o020;
    pub const S_IXGRP: u32 = 0o010;
    pub const S_IROTH: u32 = 0o004;
    pub const S_IWOTH: u32 = 0o002;
    pub const S_IXOTH: u32 = 0o001;

    pub fn is_reg(mode: u32) -> bool {
        mode & S_IFMT == S_IFREG
    }

    pub fn is_dir(mode: u32) -> bool {
        mode & S_IFMT == S_IFDIR
    }

    pub fn is_lnk(mode: u32) -> bool {
        mode & S_IFMT == S_IFLNK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rdwr_is_union() {
        let flags = OpenFlags::O_RDWR;
        assert!(flags.wants_read());
        assert!(flags.wants_write());
        assert!(!OpenFlags::O_RDONLY.wants_write());
    }

    #[test]
    fn test_unknown_bits_are_dropped() {
        let flags = OpenFlags::from_bits_truncate(0x8000_0009);
        assert_eq!(flags, OpenFlags::O_RDONLY | OpenFlags::O_CREAT);
    }

    #[test]
    fn test_mode_type_predicates() {
        assert!(mode::is_reg(mode::S_IFREG | 0o644));
        assert!(mode::is_dir(mode::S_IFDIR | 0o755));
        assert!(mode::is_lnk(mode::S_IFLNK | 0o777));
        assert!(!mode::is_dir(mode::S_IFREG));
    }
}
