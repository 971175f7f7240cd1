//! Message header and command codes
//!
//! Every frame starts with a [`MessageHeader`]. Syscall-style commands
//! extend it with a request id ([`SyscallHeader`]). A response is the
//! request frame sent back with `response` set and `status` filled in.

use crate::wire::{WireError, WireReader, WireWriter};
use core_types::Pid;
use std::fmt;

/// Maximum length of a path field, NUL terminator included
pub const MAX_FILE_PATH: usize = 2048;

/// Default upper bound on a single frame
pub const SERVER_MAX_SIZE: usize = 0x8000;

/// Command codes understood by servers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CommandCode {
    Log = 0x0000,
    SysInfo = 0x0001,
    Rand = 0x0002,
    Io = 0x0003,
    ProcessIo = 0x0004,
    ProcessList = 0x0005,
    ProcessStatus = 0x0006,
    Framebuffer = 0x0007,

    Stat = 0x8000,
    Fsync = 0x8001,
    Mount = 0x8002,
    Umount = 0x8003,
    Open = 0x8004,
    Read = 0x8005,
    Write = 0x8006,
    Ioctl = 0x8007,
    Opendir = 0x8008,
    Readdir = 0x8009,
    Chmod = 0x800A,
    Chown = 0x800B,
    Link = 0x800C,
    Mkdir = 0x800D,
    Utime = 0x800E,
    Exec = 0x800F,
    Chdir = 0x8010,
    Chroot = 0x8011,
    Mmap = 0x8012,
    Msync = 0x8013,
    Unlink = 0x8014,
    Symlink = 0x8015,
    Readlink = 0x8016,

    Irq = 0xC000,

    /// Sent once by a server to announce it is ready for requests
    Ready = 0x4444,
}

impl CommandCode {
    pub fn from_u16(code: u16) -> Option<Self> {
        use CommandCode::*;
        Some(match code {
            0x0000 => Log,
            0x0001 => SysInfo,
            0x0002 => Rand,
            0x0003 => Io,
            0x0004 => ProcessIo,
            0x0005 => ProcessList,
            0x0006 => ProcessStatus,
            0x0007 => Framebuffer,
            0x8000 => Stat,
            0x8001 => Fsync,
            0x8002 => Mount,
            0x8003 => Umount,
            0x8004 => Open,
            0x8005 => Read,
            0x8006 => Write,
            0x8007 => Ioctl,
            0x8008 => Opendir,
            0x8009 => Readdir,
            0x800A => Chmod,
            0x800B => Chown,
            0x800C => Link,
            0x800D => Mkdir,
            0x800E => Utime,
            0x800F => Exec,
            0x8010 => Chdir,
            0x8011 => Chroot,
            0x8012 => Mmap,
            0x8013 => Msync,
            0x8014 => Unlink,
            0x8015 => Symlink,
            0x8016 => Readlink,
            0xC000 => Irq,
            0x4444 => Ready,
            _ => return None,
        })
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Whether the command carries a [`SyscallHeader`]
    pub fn is_syscall(self) -> bool {
        (0x8000..=0x8016).contains(&self.as_u16())
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:#06x})", self, self.as_u16())
    }
}

/// Common header of every message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Raw command code (kept raw so unknown commands can still be answered)
    pub command: u16,
    /// Total frame length in bytes
    pub length: u64,
    /// false for requests, true for responses
    pub response: bool,
    /// Time spent handling the request, in ms (responses only)
    pub latency: u64,
    /// 0 on success, negative errno on failure (responses only)
    pub status: i64,
    /// Process that issued the request
    pub requester: Pid,
}

impl MessageHeader {
    /// Encoded size in bytes
    pub const SIZE: usize = 40;

    /// Offset of the length field within the header
    pub const LENGTH_OFFSET: usize = 8;

    pub fn request(command: CommandCode, requester: Pid) -> Self {
        Self {
            command: command.as_u16(),
            length: 0,
            response: false,
            latency: 0,
            status: 0,
            requester,
        }
    }

    pub fn code(&self) -> Option<CommandCode> {
        CommandCode::from_u16(self.command)
    }

    /// Turns a request header into the matching response header
    pub fn into_response(mut self, status: i64, latency: u64) -> Self {
        self.response = true;
        self.status = status;
        self.latency = latency;
        self
    }

    pub fn encode(&self, w: &mut WireWriter) {
        w.put_u16(self.command);
        w.put_u8(self.response as u8);
        w.put_zeros(5);
        w.put_u64(self.length);
        w.put_u64(self.latency);
        w.put_i64(self.status);
        w.put_i32(self.requester);
        w.put_zeros(4);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        let command = r.get_u16()?;
        let response = r.get_u8()? != 0;
        r.skip(5)?;
        let length = r.get_u64()?;
        let latency = r.get_u64()?;
        let status = r.get_i64()?;
        let requester = r.get_i32()?;
        r.skip(4)?;
        Ok(Self {
            command,
            length,
            response,
            latency,
            status,
            requester,
        })
    }

    /// Decodes just the header of a frame
    pub fn peek(frame: &[u8]) -> Result<Self, WireError> {
        Self::decode(&mut WireReader::new(frame))
    }
}

/// Header of syscall-style commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallHeader {
    pub header: MessageHeader,
    /// Syscall request id, echoed in the response
    pub id: u16,
}

impl SyscallHeader {
    /// Encoded size in bytes
    pub const SIZE: usize = MessageHeader::SIZE + 8;

    pub fn request(command: CommandCode, requester: Pid, id: u16) -> Self {
        Self {
            header: MessageHeader::request(command, requester),
            id,
        }
    }

    pub fn encode(&self, w: &mut WireWriter) {
        self.header.encode(w);
        w.put_u16(self.id);
        w.put_zeros(6);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        let header = MessageHeader::decode(r)?;
        let id = r.get_u16()?;
        r.skip(6)?;
        Ok(Self { header, id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_code_mapping() {
        assert_eq!(CommandCode::from_u16(0x8004), Some(CommandCode::Open));
        assert_eq!(CommandCode::from_u16(0x8016), Some(CommandCode::Readlink));
        assert_eq!(CommandCode::from_u16(0x4444), Some(CommandCode::Ready));
        assert_eq!(CommandCode::from_u16(0x9999), None);
        assert_eq!(CommandCode::Symlink.as_u16(), 0x8015);
    }

    #[test]
    fn test_syscall_classification() {
        assert!(CommandCode::Stat.is_syscall());
        assert!(CommandCode::Readlink.is_syscall());
        assert!(!CommandCode::Log.is_syscall());
        assert!(!CommandCode::Ready.is_syscall());
    }

    #[test]
    fn test_header_is_forty_bytes() {
        let mut w = WireWriter::new();
        MessageHeader::request(CommandCode::Open, 7).encode(&mut w);
        assert_eq!(w.len(), MessageHeader::SIZE);

        let mut w = WireWriter::new();
        SyscallHeader::request(CommandCode::Open, 7, 3).encode(&mut w);
        assert_eq!(w.len(), SyscallHeader::SIZE);
    }

    #[test]
    fn test_response_header_carries_negative_status() {
        let header = MessageHeader::request(CommandCode::Open, 42).into_response(-13, 5);
        let mut w = WireWriter::new();
        header.encode(&mut w);
        let bytes = w.finish();

        let decoded = MessageHeader::peek(&bytes).unwrap();
        assert!(decoded.response);
        assert_eq!(decoded.status, -13);
        assert_eq!(decoded.latency, 5);
        assert_eq!(decoded.requester, 42);
        assert_eq!(decoded.code(), Some(CommandCode::Open));
    }
}
