//! Syscall command payloads
//!
//! Each command is a fixed-layout record following a [`SyscallHeader`].
//! The same record type is used for the request and for its response:
//! a server fills in the result fields, sets the status and sends the
//! record back.

use crate::message::{CommandCode, MessageHeader, SyscallHeader, MAX_FILE_PATH};
use crate::wire::{WireError, WireReader, WireWriter};
use core_types::{Credentials, Gid, Pid, Uid};

/// Capacity of a directory-entry name field, NUL terminator included
pub const MAX_NAME_FIELD: usize = 512;

/// Encoding shared by every syscall record
pub trait SyscallMessage: Sized {
    fn syscall_header(&self) -> &SyscallHeader;
    fn syscall_header_mut(&mut self) -> &mut SyscallHeader;
    fn encode_fields(&self, w: &mut WireWriter) -> Result<(), WireError>;
    fn decode_fields(header: SyscallHeader, r: &mut WireReader<'_>) -> Result<Self, WireError>;

    /// Encodes the record into a frame, filling in the length field
    fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut w = WireWriter::with_capacity(SyscallHeader::SIZE + MAX_FILE_PATH * 2);
        self.syscall_header().encode(&mut w);
        self.encode_fields(&mut w)?;
        let length = w.len() as u64;
        w.patch_u64(MessageHeader::LENGTH_OFFSET, length);
        Ok(w.finish())
    }

    fn decode(frame: &[u8]) -> Result<Self, WireError> {
        let mut r = WireReader::new(frame);
        let header = SyscallHeader::decode(&mut r)?;
        if header.header.length != frame.len() as u64 {
            return Err(WireError::LengthMismatch {
                declared: header.header.length,
                actual: frame.len(),
            });
        }
        Self::decode_fields(header, &mut r)
    }

    /// Marks the record as a response carrying `status`
    fn respond(&mut self, status: i64, latency: u64) {
        let header = self.syscall_header_mut();
        header.header = header.header.into_response(status, latency);
    }

    fn status(&self) -> i64 {
        self.syscall_header().header.status
    }
}

fn put_creds(w: &mut WireWriter, uid: Uid, gid: Gid) {
    w.put_u32(uid);
    w.put_u32(gid);
}

/// `open()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenCommand {
    pub header: SyscallHeader,
    /// Absolute path as seen by the caller
    pub abspath: String,
    /// Path relative to the device's mountpoint
    pub path: String,
    pub device: String,
    pub flags: u32,
    pub mode: u32,
    pub umask: u32,
    pub uid: Uid,
    pub gid: Gid,
    /// Unique open id assigned by the VFS
    pub id: u64,
    pub char_dev: bool,
}

impl OpenCommand {
    pub fn new(
        requester: Pid,
        device: impl Into<String>,
        path: impl Into<String>,
        flags: u32,
        creds: Credentials,
    ) -> Self {
        let path = path.into();
        Self {
            header: SyscallHeader::request(CommandCode::Open, requester, 0),
            abspath: path.clone(),
            path,
            device: device.into(),
            flags,
            mode: 0,
            umask: 0,
            uid: creds.uid,
            gid: creds.gid,
            id: 0,
            char_dev: false,
        }
    }

    pub fn with_mode(mut self, mode: u32, umask: u32) -> Self {
        self.mode = mode;
        self.umask = umask;
        self
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.uid, self.gid)
    }
}

impl SyscallMessage for OpenCommand {
    fn syscall_header(&self) -> &SyscallHeader {
        &self.header
    }

    fn syscall_header_mut(&mut self) -> &mut SyscallHeader {
        &mut self.header
    }

    fn encode_fields(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_str(&self.abspath, MAX_FILE_PATH)?;
        w.put_str(&self.path, MAX_FILE_PATH)?;
        w.put_str(&self.device, MAX_FILE_PATH)?;
        w.put_u32(self.flags);
        w.put_u32(self.mode);
        w.put_u32(self.umask);
        put_creds(w, self.uid, self.gid);
        w.put_u64(self.id);
        w.put_bool(self.char_dev);
        Ok(())
    }

    fn decode_fields(header: SyscallHeader, r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            header,
            abspath: r.get_str(MAX_FILE_PATH)?,
            path: r.get_str(MAX_FILE_PATH)?,
            device: r.get_str(MAX_FILE_PATH)?,
            flags: r.get_u32()?,
            mode: r.get_u32()?,
            umask: r.get_u32()?,
            uid: r.get_u32()?,
            gid: r.get_u32()?,
            id: r.get_u64()?,
            char_dev: r.get_bool()?,
        })
    }
}

/// `read()` and `write()`
///
/// `data` trails the fixed fields: the payload for a write request, the
/// bytes read for a read response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RwCommand {
    pub header: SyscallHeader,
    /// Request no response
    pub silent: bool,
    pub path: String,
    pub device: String,
    pub id: u64,
    pub flags: u32,
    pub uid: Uid,
    pub gid: Gid,
    pub position: i64,
    pub length: u64,
    pub data: Vec<u8>,
}

impl RwCommand {
    pub fn read(
        requester: Pid,
        device: impl Into<String>,
        path: impl Into<String>,
        position: i64,
        length: u64,
        creds: Credentials,
    ) -> Self {
        Self {
            header: SyscallHeader::request(CommandCode::Read, requester, 0),
            silent: false,
            path: path.into(),
            device: device.into(),
            id: 0,
            flags: 0,
            uid: creds.uid,
            gid: creds.gid,
            position,
            length,
            data: Vec::new(),
        }
    }

    pub fn write(
        requester: Pid,
        device: impl Into<String>,
        path: impl Into<String>,
        position: i64,
        data: Vec<u8>,
        creds: Credentials,
    ) -> Self {
        let mut cmd = Self::read(requester, device, path, position, data.len() as u64, creds);
        cmd.header = SyscallHeader::request(CommandCode::Write, requester, 0);
        cmd.data = data;
        cmd
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.uid, self.gid)
    }
}

impl SyscallMessage for RwCommand {
    fn syscall_header(&self) -> &SyscallHeader {
        &self.header
    }

    fn syscall_header_mut(&mut self) -> &mut SyscallHeader {
        &mut self.header
    }

    fn encode_fields(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_bool(self.silent);
        w.put_str(&self.path, MAX_FILE_PATH)?;
        w.put_str(&self.device, MAX_FILE_PATH)?;
        w.put_u64(self.id);
        w.put_u32(self.flags);
        put_creds(w, self.uid, self.gid);
        w.put_i64(self.position);
        w.put_u64(self.length);
        w.put_bytes(&self.data);
        Ok(())
    }

    fn decode_fields(header: SyscallHeader, r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            header,
            silent: r.get_bool()?,
            path: r.get_str(MAX_FILE_PATH)?,
            device: r.get_str(MAX_FILE_PATH)?,
            id: r.get_u64()?,
            flags: r.get_u32()?,
            uid: r.get_u32()?,
            gid: r.get_u32()?,
            position: r.get_i64()?,
            length: r.get_u64()?,
            data: r.rest().to_vec(),
        })
    }
}

/// Result record of `stat()`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatBuffer {
    pub ino: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: Uid,
    pub gid: Gid,
    pub size: u64,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
    pub blksize: u64,
    pub blocks: u64,
}

impl StatBuffer {
    fn encode(&self, w: &mut WireWriter) {
        w.put_u64(self.ino);
        w.put_u32(self.mode);
        w.put_u64(self.nlink);
        put_creds(w, self.uid, self.gid);
        w.put_u64(self.size);
        w.put_u64(self.atime);
        w.put_u64(self.mtime);
        w.put_u64(self.ctime);
        w.put_u64(self.blksize);
        w.put_u64(self.blocks);
    }

    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            ino: r.get_u64()?,
            mode: r.get_u32()?,
            nlink: r.get_u64()?,
            uid: r.get_u32()?,
            gid: r.get_u32()?,
            size: r.get_u64()?,
            atime: r.get_u64()?,
            mtime: r.get_u64()?,
            ctime: r.get_u64()?,
            blksize: r.get_u64()?,
            blocks: r.get_u64()?,
        })
    }
}

/// `stat()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatCommand {
    pub header: SyscallHeader,
    /// Device the path lives on
    pub source: String,
    pub path: String,
    pub uid: Uid,
    pub gid: Gid,
    pub buffer: StatBuffer,
}

impl StatCommand {
    pub fn new(
        requester: Pid,
        device: impl Into<String>,
        path: impl Into<String>,
        creds: Credentials,
    ) -> Self {
        Self {
            header: SyscallHeader::request(CommandCode::Stat, requester, 0),
            source: device.into(),
            path: path.into(),
            uid: creds.uid,
            gid: creds.gid,
            buffer: StatBuffer::default(),
        }
    }
}

impl SyscallMessage for StatCommand {
    fn syscall_header(&self) -> &SyscallHeader {
        &self.header
    }

    fn syscall_header_mut(&mut self) -> &mut SyscallHeader {
        &mut self.header
    }

    fn encode_fields(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_str(&self.source, MAX_FILE_PATH)?;
        w.put_str(&self.path, MAX_FILE_PATH)?;
        put_creds(w, self.uid, self.gid);
        self.buffer.encode(w);
        Ok(())
    }

    fn decode_fields(header: SyscallHeader, r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            header,
            source: r.get_str(MAX_FILE_PATH)?,
            path: r.get_str(MAX_FILE_PATH)?,
            uid: r.get_u32()?,
            gid: r.get_u32()?,
            buffer: StatBuffer::decode(r)?,
        })
    }
}

/// `fsync()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsyncCommand {
    pub header: SyscallHeader,
    pub path: String,
    pub device: String,
    pub id: u64,
    pub uid: Uid,
    pub gid: Gid,
}

impl FsyncCommand {
    pub fn new(
        requester: Pid,
        device: impl Into<String>,
        path: impl Into<String>,
        creds: Credentials,
    ) -> Self {
        Self {
            header: SyscallHeader::request(CommandCode::Fsync, requester, 0),
            path: path.into(),
            device: device.into(),
            id: 0,
            uid: creds.uid,
            gid: creds.gid,
        }
    }
}

impl SyscallMessage for FsyncCommand {
    fn syscall_header(&self) -> &SyscallHeader {
        &self.header
    }

    fn syscall_header_mut(&mut self) -> &mut SyscallHeader {
        &mut self.header
    }

    fn encode_fields(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_str(&self.path, MAX_FILE_PATH)?;
        w.put_str(&self.device, MAX_FILE_PATH)?;
        w.put_u64(self.id);
        put_creds(w, self.uid, self.gid);
        Ok(())
    }

    fn decode_fields(header: SyscallHeader, r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            header,
            path: r.get_str(MAX_FILE_PATH)?,
            device: r.get_str(MAX_FILE_PATH)?,
            id: r.get_u64()?,
            uid: r.get_u32()?,
            gid: r.get_u32()?,
        })
    }
}

/// `mkdir()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MkdirCommand {
    pub header: SyscallHeader,
    pub path: String,
    pub device: String,
    pub uid: Uid,
    pub gid: Gid,
    pub mode: u32,
    pub umask: u32,
}

impl MkdirCommand {
    pub fn new(
        requester: Pid,
        device: impl Into<String>,
        path: impl Into<String>,
        mode: u32,
        creds: Credentials,
    ) -> Self {
        Self {
            header: SyscallHeader::request(CommandCode::Mkdir, requester, 0),
            path: path.into(),
            device: device.into(),
            uid: creds.uid,
            gid: creds.gid,
            mode,
            umask: 0,
        }
    }
}

impl SyscallMessage for MkdirCommand {
    fn syscall_header(&self) -> &SyscallHeader {
        &self.header
    }

    fn syscall_header_mut(&mut self) -> &mut SyscallHeader {
        &mut self.header
    }

    fn encode_fields(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_str(&self.path, MAX_FILE_PATH)?;
        w.put_str(&self.device, MAX_FILE_PATH)?;
        put_creds(w, self.uid, self.gid);
        w.put_u32(self.mode);
        w.put_u32(self.umask);
        Ok(())
    }

    fn decode_fields(header: SyscallHeader, r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            header,
            path: r.get_str(MAX_FILE_PATH)?,
            device: r.get_str(MAX_FILE_PATH)?,
            uid: r.get_u32()?,
            gid: r.get_u32()?,
            mode: r.get_u32()?,
            umask: r.get_u32()?,
        })
    }
}

/// `link()` and `symlink()`
///
/// For a symlink `old_path` is the link target text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCommand {
    pub header: SyscallHeader,
    pub old_path: String,
    pub new_path: String,
    pub device: String,
    pub uid: Uid,
    pub gid: Gid,
}

impl LinkCommand {
    fn with_code(
        code: CommandCode,
        requester: Pid,
        device: impl Into<String>,
        old_path: impl Into<String>,
        new_path: impl Into<String>,
        creds: Credentials,
    ) -> Self {
        Self {
            header: SyscallHeader::request(code, requester, 0),
            old_path: old_path.into(),
            new_path: new_path.into(),
            device: device.into(),
            uid: creds.uid,
            gid: creds.gid,
        }
    }

    pub fn link(
        requester: Pid,
        device: impl Into<String>,
        old_path: impl Into<String>,
        new_path: impl Into<String>,
        creds: Credentials,
    ) -> Self {
        Self::with_code(CommandCode::Link, requester, device, old_path, new_path, creds)
    }

    pub fn symlink(
        requester: Pid,
        device: impl Into<String>,
        target: impl Into<String>,
        link_path: impl Into<String>,
        creds: Credentials,
    ) -> Self {
        Self::with_code(CommandCode::Symlink, requester, device, target, link_path, creds)
    }
}

impl SyscallMessage for LinkCommand {
    fn syscall_header(&self) -> &SyscallHeader {
        &self.header
    }

    fn syscall_header_mut(&mut self) -> &mut SyscallHeader {
        &mut self.header
    }

    fn encode_fields(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_str(&self.old_path, MAX_FILE_PATH)?;
        w.put_str(&self.new_path, MAX_FILE_PATH)?;
        w.put_str(&self.device, MAX_FILE_PATH)?;
        put_creds(w, self.uid, self.gid);
        Ok(())
    }

    fn decode_fields(header: SyscallHeader, r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            header,
            old_path: r.get_str(MAX_FILE_PATH)?,
            new_path: r.get_str(MAX_FILE_PATH)?,
            device: r.get_str(MAX_FILE_PATH)?,
            uid: r.get_u32()?,
            gid: r.get_u32()?,
        })
    }
}

/// `unlink()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlinkCommand {
    pub header: SyscallHeader,
    pub path: String,
    pub device: String,
    pub uid: Uid,
    pub gid: Gid,
}

impl UnlinkCommand {
    pub fn new(
        requester: Pid,
        device: impl Into<String>,
        path: impl Into<String>,
        creds: Credentials,
    ) -> Self {
        Self {
            header: SyscallHeader::request(CommandCode::Unlink, requester, 0),
            path: path.into(),
            device: device.into(),
            uid: creds.uid,
            gid: creds.gid,
        }
    }
}

impl SyscallMessage for UnlinkCommand {
    fn syscall_header(&self) -> &SyscallHeader {
        &self.header
    }

    fn syscall_header_mut(&mut self) -> &mut SyscallHeader {
        &mut self.header
    }

    fn encode_fields(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_str(&self.path, MAX_FILE_PATH)?;
        w.put_str(&self.device, MAX_FILE_PATH)?;
        put_creds(w, self.uid, self.gid);
        Ok(())
    }

    fn decode_fields(header: SyscallHeader, r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            header,
            path: r.get_str(MAX_FILE_PATH)?,
            device: r.get_str(MAX_FILE_PATH)?,
            uid: r.get_u32()?,
            gid: r.get_u32()?,
        })
    }
}

/// `readlink()`; `target` is filled in by the response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadlinkCommand {
    pub header: SyscallHeader,
    pub path: String,
    pub device: String,
    pub uid: Uid,
    pub gid: Gid,
    pub target: String,
}

impl ReadlinkCommand {
    pub fn new(
        requester: Pid,
        device: impl Into<String>,
        path: impl Into<String>,
        creds: Credentials,
    ) -> Self {
        Self {
            header: SyscallHeader::request(CommandCode::Readlink, requester, 0),
            path: path.into(),
            device: device.into(),
            uid: creds.uid,
            gid: creds.gid,
            target: String::new(),
        }
    }
}

impl SyscallMessage for ReadlinkCommand {
    fn syscall_header(&self) -> &SyscallHeader {
        &self.header
    }

    fn syscall_header_mut(&mut self) -> &mut SyscallHeader {
        &mut self.header
    }

    fn encode_fields(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_str(&self.path, MAX_FILE_PATH)?;
        w.put_str(&self.device, MAX_FILE_PATH)?;
        put_creds(w, self.uid, self.gid);
        w.put_str(&self.target, MAX_FILE_PATH)?;
        Ok(())
    }

    fn decode_fields(header: SyscallHeader, r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            header,
            path: r.get_str(MAX_FILE_PATH)?,
            device: r.get_str(MAX_FILE_PATH)?,
            uid: r.get_u32()?,
            gid: r.get_u32()?,
            target: r.get_str(MAX_FILE_PATH)?,
        })
    }
}

/// `chmod()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChmodCommand {
    pub header: SyscallHeader,
    pub path: String,
    pub device: String,
    pub uid: Uid,
    pub gid: Gid,
    pub mode: u32,
}

impl ChmodCommand {
    pub fn new(
        requester: Pid,
        device: impl Into<String>,
        path: impl Into<String>,
        mode: u32,
        creds: Credentials,
    ) -> Self {
        Self {
            header: SyscallHeader::request(CommandCode::Chmod, requester, 0),
            path: path.into(),
            device: device.into(),
            uid: creds.uid,
            gid: creds.gid,
            mode,
        }
    }
}

impl SyscallMessage for ChmodCommand {
    fn syscall_header(&self) -> &SyscallHeader {
        &self.header
    }

    fn syscall_header_mut(&mut self) -> &mut SyscallHeader {
        &mut self.header
    }

    fn encode_fields(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_str(&self.path, MAX_FILE_PATH)?;
        w.put_str(&self.device, MAX_FILE_PATH)?;
        put_creds(w, self.uid, self.gid);
        w.put_u32(self.mode);
        Ok(())
    }

    fn decode_fields(header: SyscallHeader, r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            header,
            path: r.get_str(MAX_FILE_PATH)?,
            device: r.get_str(MAX_FILE_PATH)?,
            uid: r.get_u32()?,
            gid: r.get_u32()?,
            mode: r.get_u32()?,
        })
    }
}

/// `chown()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChownCommand {
    pub header: SyscallHeader,
    pub path: String,
    pub device: String,
    pub uid: Uid,
    pub gid: Gid,
    pub new_uid: Uid,
    pub new_gid: Gid,
}

impl ChownCommand {
    pub fn new(
        requester: Pid,
        device: impl Into<String>,
        path: impl Into<String>,
        new_owner: Credentials,
        creds: Credentials,
    ) -> Self {
        Self {
            header: SyscallHeader::request(CommandCode::Chown, requester, 0),
            path: path.into(),
            device: device.into(),
            uid: creds.uid,
            gid: creds.gid,
            new_uid: new_owner.uid,
            new_gid: new_owner.gid,
        }
    }
}

impl SyscallMessage for ChownCommand {
    fn syscall_header(&self) -> &SyscallHeader {
        &self.header
    }

    fn syscall_header_mut(&mut self) -> &mut SyscallHeader {
        &mut self.header
    }

    fn encode_fields(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_str(&self.path, MAX_FILE_PATH)?;
        w.put_str(&self.device, MAX_FILE_PATH)?;
        put_creds(w, self.uid, self.gid);
        put_creds(w, self.new_uid, self.new_gid);
        Ok(())
    }

    fn decode_fields(header: SyscallHeader, r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            header,
            path: r.get_str(MAX_FILE_PATH)?,
            device: r.get_str(MAX_FILE_PATH)?,
            uid: r.get_u32()?,
            gid: r.get_u32()?,
            new_uid: r.get_u32()?,
            new_gid: r.get_u32()?,
        })
    }
}

/// `utime()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtimeCommand {
    pub header: SyscallHeader,
    pub path: String,
    pub device: String,
    pub uid: Uid,
    pub gid: Gid,
    pub access_time: u64,
    pub modified_time: u64,
}

impl UtimeCommand {
    pub fn new(
        requester: Pid,
        device: impl Into<String>,
        path: impl Into<String>,
        access_time: u64,
        modified_time: u64,
        creds: Credentials,
    ) -> Self {
        Self {
            header: SyscallHeader::request(CommandCode::Utime, requester, 0),
            path: path.into(),
            device: device.into(),
            uid: creds.uid,
            gid: creds.gid,
            access_time,
            modified_time,
        }
    }
}

impl SyscallMessage for UtimeCommand {
    fn syscall_header(&self) -> &SyscallHeader {
        &self.header
    }

    fn syscall_header_mut(&mut self) -> &mut SyscallHeader {
        &mut self.header
    }

    fn encode_fields(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_str(&self.path, MAX_FILE_PATH)?;
        w.put_str(&self.device, MAX_FILE_PATH)?;
        put_creds(w, self.uid, self.gid);
        w.put_u64(self.access_time);
        w.put_u64(self.modified_time);
        Ok(())
    }

    fn decode_fields(header: SyscallHeader, r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            header,
            path: r.get_str(MAX_FILE_PATH)?,
            device: r.get_str(MAX_FILE_PATH)?,
            uid: r.get_u32()?,
            gid: r.get_u32()?,
            access_time: r.get_u64()?,
            modified_time: r.get_u64()?,
        })
    }
}

/// `opendir()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpendirCommand {
    pub header: SyscallHeader,
    pub abspath: String,
    pub path: String,
    pub device: String,
    pub uid: Uid,
    pub gid: Gid,
}

impl OpendirCommand {
    pub fn new(
        requester: Pid,
        device: impl Into<String>,
        path: impl Into<String>,
        creds: Credentials,
    ) -> Self {
        let path = path.into();
        Self {
            header: SyscallHeader::request(CommandCode::Opendir, requester, 0),
            abspath: path.clone(),
            path,
            device: device.into(),
            uid: creds.uid,
            gid: creds.gid,
        }
    }
}

impl SyscallMessage for OpendirCommand {
    fn syscall_header(&self) -> &SyscallHeader {
        &self.header
    }

    fn syscall_header_mut(&mut self) -> &mut SyscallHeader {
        &mut self.header
    }

    fn encode_fields(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_str(&self.abspath, MAX_FILE_PATH)?;
        w.put_str(&self.path, MAX_FILE_PATH)?;
        w.put_str(&self.device, MAX_FILE_PATH)?;
        put_creds(w, self.uid, self.gid);
        Ok(())
    }

    fn decode_fields(header: SyscallHeader, r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            header,
            abspath: r.get_str(MAX_FILE_PATH)?,
            path: r.get_str(MAX_FILE_PATH)?,
            device: r.get_str(MAX_FILE_PATH)?,
            uid: r.get_u32()?,
            gid: r.get_u32()?,
        })
    }
}

/// `readdir()`
///
/// The response fills `entry_ino`/`entry_name`, or sets `end` once
/// `position` is past the last entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaddirCommand {
    pub header: SyscallHeader,
    pub path: String,
    pub device: String,
    pub uid: Uid,
    pub gid: Gid,
    pub position: u64,
    pub end: bool,
    pub entry_ino: u64,
    pub entry_name: String,
}

impl ReaddirCommand {
    pub fn new(
        requester: Pid,
        device: impl Into<String>,
        path: impl Into<String>,
        position: u64,
        creds: Credentials,
    ) -> Self {
        Self {
            header: SyscallHeader::request(CommandCode::Readdir, requester, 0),
            path: path.into(),
            device: device.into(),
            uid: creds.uid,
            gid: creds.gid,
            position,
            end: false,
            entry_ino: 0,
            entry_name: String::new(),
        }
    }
}

impl SyscallMessage for ReaddirCommand {
    fn syscall_header(&self) -> &SyscallHeader {
        &self.header
    }

    fn syscall_header_mut(&mut self) -> &mut SyscallHeader {
        &mut self.header
    }

    fn encode_fields(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_str(&self.path, MAX_FILE_PATH)?;
        w.put_str(&self.device, MAX_FILE_PATH)?;
        put_creds(w, self.uid, self.gid);
        w.put_u64(self.position);
        w.put_bool(self.end);
        w.put_u64(self.entry_ino);
        w.put_str(&self.entry_name, MAX_NAME_FIELD)?;
        Ok(())
    }

    fn decode_fields(header: SyscallHeader, r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            header,
            path: r.get_str(MAX_FILE_PATH)?,
            device: r.get_str(MAX_FILE_PATH)?,
            uid: r.get_u32()?,
            gid: r.get_u32()?,
            position: r.get_u64()?,
            end: r.get_bool()?,
            entry_ino: r.get_u64()?,
            entry_name: r.get_str(MAX_NAME_FIELD)?,
        })
    }
}

/// A decoded request, one variant per command a filesystem server handles
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Open(OpenCommand),
    Read(RwCommand),
    Write(RwCommand),
    Stat(StatCommand),
    Fsync(FsyncCommand),
    Mkdir(MkdirCommand),
    Link(LinkCommand),
    Symlink(LinkCommand),
    Unlink(UnlinkCommand),
    Readlink(ReadlinkCommand),
    Chmod(ChmodCommand),
    Chown(ChownCommand),
    Utime(UtimeCommand),
    Opendir(OpendirCommand),
    Readdir(ReaddirCommand),
}

impl Request {
    /// Decodes a request frame, dispatching on the header's command code
    pub fn decode(frame: &[u8]) -> Result<Self, WireError> {
        let header = MessageHeader::peek(frame)?;
        let code = header
            .code()
            .ok_or(WireError::UnknownCommand(header.command))?;
        Ok(match code {
            CommandCode::Open => Self::Open(OpenCommand::decode(frame)?),
            CommandCode::Read => Self::Read(RwCommand::decode(frame)?),
            CommandCode::Write => Self::Write(RwCommand::decode(frame)?),
            CommandCode::Stat => Self::Stat(StatCommand::decode(frame)?),
            CommandCode::Fsync => Self::Fsync(FsyncCommand::decode(frame)?),
            CommandCode::Mkdir => Self::Mkdir(MkdirCommand::decode(frame)?),
            CommandCode::Link => Self::Link(LinkCommand::decode(frame)?),
            CommandCode::Symlink => Self::Symlink(LinkCommand::decode(frame)?),
            CommandCode::Unlink => Self::Unlink(UnlinkCommand::decode(frame)?),
            CommandCode::Readlink => Self::Readlink(ReadlinkCommand::decode(frame)?),
            CommandCode::Chmod => Self::Chmod(ChmodCommand::decode(frame)?),
            CommandCode::Chown => Self::Chown(ChownCommand::decode(frame)?),
            CommandCode::Utime => Self::Utime(UtimeCommand::decode(frame)?),
            CommandCode::Opendir => Self::Opendir(OpendirCommand::decode(frame)?),
            CommandCode::Readdir => Self::Readdir(ReaddirCommand::decode(frame)?),
            _ => return Err(WireError::UnknownCommand(header.command)),
        })
    }

    pub fn command(&self) -> CommandCode {
        match self {
            Self::Open(_) => CommandCode::Open,
            Self::Read(_) => CommandCode::Read,
            Self::Write(_) => CommandCode::Write,
            Self::Stat(_) => CommandCode::Stat,
            Self::Fsync(_) => CommandCode::Fsync,
            Self::Mkdir(_) => CommandCode::Mkdir,
            Self::Link(_) => CommandCode::Link,
            Self::Symlink(_) => CommandCode::Symlink,
            Self::Unlink(_) => CommandCode::Unlink,
            Self::Readlink(_) => CommandCode::Readlink,
            Self::Chmod(_) => CommandCode::Chmod,
            Self::Chown(_) => CommandCode::Chown,
            Self::Utime(_) => CommandCode::Utime,
            Self::Opendir(_) => CommandCode::Opendir,
            Self::Readdir(_) => CommandCode::Readdir,
        }
    }

    /// Device name the request targets
    pub fn device(&self) -> &str {
        match self {
            Self::Open(c) => &c.device,
            Self::Read(c) | Self::Write(c) => &c.device,
            Self::Stat(c) => &c.source,
            Self::Fsync(c) => &c.device,
            Self::Mkdir(c) => &c.device,
            Self::Link(c) | Self::Symlink(c) => &c.device,
            Self::Unlink(c) => &c.device,
            Self::Readlink(c) => &c.device,
            Self::Chmod(c) => &c.device,
            Self::Chown(c) => &c.device,
            Self::Utime(c) => &c.device,
            Self::Opendir(c) => &c.device,
            Self::Readdir(c) => &c.device,
        }
    }

    /// Encodes the request (or the response it has been turned into)
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        match self {
            Self::Open(c) => c.encode(),
            Self::Read(c) | Self::Write(c) => c.encode(),
            Self::Stat(c) => c.encode(),
            Self::Fsync(c) => c.encode(),
            Self::Mkdir(c) => c.encode(),
            Self::Link(c) | Self::Symlink(c) => c.encode(),
            Self::Unlink(c) => c.encode(),
            Self::Readlink(c) => c.encode(),
            Self::Chmod(c) => c.encode(),
            Self::Chown(c) => c.encode(),
            Self::Utime(c) => c.encode(),
            Self::Opendir(c) => c.encode(),
            Self::Readdir(c) => c.encode(),
        }
    }

    pub fn respond(&mut self, status: i64, latency: u64) {
        match self {
            Self::Open(c) => c.respond(status, latency),
            Self::Read(c) | Self::Write(c) => c.respond(status, latency),
            Self::Stat(c) => c.respond(status, latency),
            Self::Fsync(c) => c.respond(status, latency),
            Self::Mkdir(c) => c.respond(status, latency),
            Self::Link(c) | Self::Symlink(c) => c.respond(status, latency),
            Self::Unlink(c) => c.respond(status, latency),
            Self::Readlink(c) => c.respond(status, latency),
            Self::Chmod(c) => c.respond(status, latency),
            Self::Chown(c) => c.respond(status, latency),
            Self::Utime(c) => c.respond(status, latency),
            Self::Opendir(c) => c.respond(status, latency),
            Self::Readdir(c) => c.respond(status, latency),
        }
    }

    /// Whether the caller asked not to be answered
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Read(c) | Self::Write(c) if c.silent)
    }
}

/// Builds a bare response for a frame that could not be decoded
///
/// Echoes the syscall header when one is present so the caller can match
/// the reply to its request.
pub fn error_reply(frame: &[u8], status: i64, latency: u64) -> Result<Vec<u8>, WireError> {
    let mut r = WireReader::new(frame);
    let mut w = WireWriter::with_capacity(SyscallHeader::SIZE);
    match SyscallHeader::decode(&mut r) {
        Ok(mut header) => {
            header.header = header.header.into_response(status, latency);
            header.header.length = SyscallHeader::SIZE as u64;
            header.encode(&mut w);
        }
        Err(_) => {
            let mut header = MessageHeader::peek(frame)?.into_response(status, latency);
            header.length = MessageHeader::SIZE as u64;
            header.encode(&mut w);
        }
    }
    Ok(w.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status;

    fn creds() -> Credentials {
        Credentials::new(1000, 100)
    }

    #[test]
    fn test_open_frame_length_is_patched() {
        let cmd = OpenCommand::new(9, "sd0", "etc/passwd", 0x1, creds());
        let frame = cmd.encode().unwrap();
        let header = MessageHeader::peek(&frame).unwrap();
        assert_eq!(header.length, frame.len() as u64);
        assert_eq!(header.code(), Some(CommandCode::Open));
        assert!(!header.response);
    }

    #[test]
    fn test_open_response_keeps_request_fields() {
        let mut cmd = OpenCommand::new(9, "sd0", "a", 0x1, creds()).with_mode(0o644, 0o022);
        cmd.respond(-status::EACCES, 3);
        let decoded = OpenCommand::decode(&cmd.encode().unwrap()).unwrap();
        assert_eq!(decoded.status(), -status::EACCES);
        assert!(decoded.header.header.response);
        assert_eq!(decoded.mode, 0o644);
        assert_eq!(decoded.umask, 0o022);
        assert_eq!(decoded.credentials(), creds());
    }

    #[test]
    fn test_write_payload_trails_fixed_fields() {
        let cmd = RwCommand::write(1, "sd0", "log.txt", 16, b"hello".to_vec(), creds());
        let frame = cmd.encode().unwrap();
        assert_eq!(&frame[frame.len() - 5..], b"hello");

        match Request::decode(&frame).unwrap() {
            Request::Write(decoded) => {
                assert_eq!(decoded.data, b"hello");
                assert_eq!(decoded.length, 5);
                assert_eq!(decoded.position, 16);
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_link_and_symlink_share_layout() {
        let link = LinkCommand::link(1, "sd0", "a", "b", creds());
        let symlink = LinkCommand::symlink(1, "sd0", "/a", "c", creds());
        assert!(matches!(
            Request::decode(&link.encode().unwrap()).unwrap(),
            Request::Link(_)
        ));
        match Request::decode(&symlink.encode().unwrap()).unwrap() {
            Request::Symlink(cmd) => {
                assert_eq!(cmd.old_path, "/a");
                assert_eq!(cmd.new_path, "c");
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_readdir_response_fields() {
        let mut cmd = ReaddirCommand::new(1, "sd0", "dir", 2, creds());
        cmd.entry_ino = 77;
        cmd.entry_name = "notes.txt".to_string();
        let decoded = ReaddirCommand::decode(&cmd.encode().unwrap()).unwrap();
        assert_eq!(decoded.entry_ino, 77);
        assert_eq!(decoded.entry_name, "notes.txt");
        assert!(!decoded.end);
    }

    #[test]
    fn test_stat_buffer_survives_encoding() {
        let mut cmd = StatCommand::new(1, "sd0", "a", creds());
        cmd.buffer = StatBuffer {
            ino: 12,
            mode: 0o100644,
            nlink: 2,
            uid: 1,
            gid: 1,
            size: 4096,
            atime: 1,
            mtime: 2,
            ctime: 3,
            blksize: 512,
            blocks: 9,
        };
        let decoded = StatCommand::decode(&cmd.encode().unwrap()).unwrap();
        assert_eq!(decoded.buffer, cmd.buffer);
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let mut frame = UnlinkCommand::new(1, "sd0", "a", creds()).encode().unwrap();
        frame.push(0);
        assert!(matches!(
            UnlinkCommand::decode(&frame),
            Err(WireError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_and_unsupported_commands() {
        let mut w = WireWriter::new();
        SyscallHeader::request(CommandCode::Mount, 1, 5).encode(&mut w);
        let frame = w.finish();
        assert_eq!(
            Request::decode(&frame).unwrap_err(),
            WireError::UnknownCommand(0x8002)
        );

        let reply = error_reply(&frame, -status::ENOSYS, 0).unwrap();
        let mut r = WireReader::new(&reply);
        let header = SyscallHeader::decode(&mut r).unwrap();
        assert_eq!(header.id, 5);
        assert!(header.header.response);
        assert_eq!(header.header.status, -status::ENOSYS);
        assert_eq!(header.header.length, reply.len() as u64);
    }

    #[test]
    fn test_path_too_long_fails_to_encode() {
        let long = "x".repeat(MAX_FILE_PATH);
        let cmd = UnlinkCommand::new(1, "sd0", long, creds());
        assert!(matches!(
            cmd.encode(),
            Err(WireError::StringTooLong { .. })
        ));
    }
}
