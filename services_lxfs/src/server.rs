//! # lxfs Server
//!
//! The receive → process → reply loop. One request is handled to
//! completion before the next is received, and every request produces
//! exactly one reply unless the caller asked for none.

use core_types::Credentials;
use hal::BlockDevice;
use ipc::status::{EINVAL, EIO, ENOSYS};
use ipc::{
    error_reply, CommandCode, MessageHeader, OpenFlags, Request, StatBuffer, WireError,
    WireWriter,
};
use kernel_api::{Clock, KernelError, MessageTransport};
use log::{debug, error, info, warn};
use thiserror::Error;

use crate::block_store::Volume;
use crate::context::OpContext;
use crate::error::{FsError, FsResult};
use crate::mount::MountTable;
use crate::open::{open, OpenRequest};
use crate::ops;

#[derive(Debug, Error)]
pub enum ServerError {
    /// The startup announcement could not be delivered
    #[error("Failed to announce readiness: {0}")]
    Announce(#[source] KernelError),

    #[error("Transport failure: {0}")]
    Transport(#[from] KernelError),
}

/// A filesystem server bound to one transport
pub struct LxfsServer<T: MessageTransport, D: BlockDevice, C: Clock> {
    name: String,
    transport: T,
    mounts: MountTable<D>,
    clock: C,
    max_io: usize,
    handled: u64,
}

impl<T: MessageTransport, D: BlockDevice, C: Clock> LxfsServer<T, D, C> {
    pub fn new(name: impl Into<String>, transport: T, mounts: MountTable<D>, clock: C) -> Self {
        Self {
            name: name.into(),
            transport,
            mounts,
            clock,
            max_io: ipc::SERVER_MAX_SIZE,
            handled: 0,
        }
    }

    /// Caps the bytes returned by one read
    pub fn with_max_io(mut self, max_io: usize) -> Self {
        self.max_io = max_io;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mounts(&self) -> &MountTable<D> {
        &self.mounts
    }

    pub fn mounts_mut(&mut self) -> &mut MountTable<D> {
        &mut self.mounts
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Requests handled so far
    pub fn handled(&self) -> u64 {
        self.handled
    }

    pub fn into_mounts(self) -> MountTable<D> {
        self.mounts
    }

    /// Sends the READY message
    pub fn announce_ready(&mut self) -> Result<(), ServerError> {
        let mut header = MessageHeader::request(CommandCode::Ready, 0);
        header.length = MessageHeader::SIZE as u64;
        let mut w = WireWriter::with_capacity(MessageHeader::SIZE);
        header.encode(&mut w);
        self.transport
            .send(&w.finish())
            .map_err(ServerError::Announce)?;
        info!("{}: ready, serving {} volume(s)", self.name, self.mounts.len());
        Ok(())
    }

    /// Announces readiness, then serves until the transport disconnects
    pub fn run(&mut self) -> Result<(), ServerError> {
        if let Err(err) = self.announce_ready() {
            error!("{}: {}", self.name, err);
            return Err(err);
        }
        while self.serve_one()? {}
        info!("{}: transport closed after {} requests", self.name, self.handled);
        Ok(())
    }

    /// Receives, handles and answers one request
    ///
    /// Returns `false` once the peer has disconnected.
    pub fn serve_one(&mut self) -> Result<bool, ServerError> {
        let frame = match self.transport.receive() {
            Ok(frame) => frame,
            Err(KernelError::Disconnected) => return Ok(false),
            Err(err) => return Err(err.into()),
        };
        if let Some(reply) = self.handle_frame(&frame) {
            self.transport.send(&reply)?;
        }
        Ok(true)
    }

    /// Handles one request frame, returning the reply to send
    pub fn handle_frame(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        let started = self.clock.now();
        self.handled += 1;

        let mut request = match Request::decode(frame) {
            Ok(request) => request,
            Err(err) => {
                let status = match err {
                    WireError::UnknownCommand(code) => {
                        warn!("{}: unsupported command {:#06x}", self.name, code);
                        -ENOSYS
                    }
                    other => {
                        warn!("{}: malformed request: {}", self.name, other);
                        -EINVAL
                    }
                };
                return match error_reply(frame, status, 0) {
                    Ok(reply) => Some(reply),
                    Err(err) => {
                        warn!("{}: dropping unanswerable frame: {}", self.name, err);
                        None
                    }
                };
            }
        };

        let status = self.dispatch(&mut request);
        let latency = self.clock.now().duration_since(started).as_millis();
        if request.is_silent() {
            return None;
        }

        request.respond(status, latency);
        match request.encode() {
            Ok(reply) => Some(reply),
            Err(err) => {
                warn!("{}: reply to {:?} does not encode: {}", self.name, request.command(), err);
                error_reply(frame, -EIO, latency).ok()
            }
        }
    }

    fn dispatch(&mut self, request: &mut Request) -> i64 {
        let now = self.clock.now_secs();
        let max_io = self.max_io;
        let command = request.command();
        let device = request.device().to_string();

        let result = self
            .mounts
            .get_mut(&device)
            .and_then(|vol| execute(vol, request, now, max_io));
        match result {
            Ok(status) => {
                debug!("{}: {:?} on {} -> {}", self.name, command, device, status);
                status
            }
            Err(err) => {
                debug!("{}: {:?} on {} failed: {}", self.name, command, device, err);
                err.errno()
            }
        }
    }
}

fn context<D: BlockDevice>(vol: &Volume<D>, uid: u32, gid: u32, now: u64) -> OpContext {
    OpContext::new(vol, Credentials::new(uid, gid), now)
}

fn position(position: i64) -> FsResult<u64> {
    u64::try_from(position)
        .map_err(|_| FsError::InvalidArgument(format!("negative file position {}", position)))
}

/// Runs one decoded request against its volume, filling in the response
/// fields; returns the success status
fn execute<D: BlockDevice>(
    vol: &mut Volume<D>,
    request: &mut Request,
    now: u64,
    max_io: usize,
) -> FsResult<i64> {
    match request {
        Request::Open(cmd) => {
            let mut ctx = OpContext::new(vol, cmd.credentials(), now);
            let flags = OpenFlags::from_bits_truncate(cmd.flags);
            let req = OpenRequest::new(&cmd.path, flags).with_mode(cmd.mode, cmd.umask);
            let outcome = open(vol, &mut ctx, &req)?;
            cmd.id = outcome.entry().block;
            Ok(0)
        }
        Request::Read(cmd) => {
            let mut ctx = OpContext::new(vol, cmd.credentials(), now);
            let offset = position(cmd.position)?;
            let len = (cmd.length as usize).min(max_io);
            let data = ops::read(vol, &mut ctx, &cmd.path, offset, len)?;
            cmd.length = data.len() as u64;
            cmd.data = data;
            Ok(cmd.length as i64)
        }
        Request::Write(cmd) => {
            let mut ctx = OpContext::new(vol, cmd.credentials(), now);
            let offset = position(cmd.position)?;
            let append = OpenFlags::from_bits_truncate(cmd.flags).contains(OpenFlags::O_APPEND);
            let written = ops::write(vol, &mut ctx, &cmd.path, offset, &cmd.data, append)?;
            cmd.data.clear();
            cmd.length = written as u64;
            Ok(written as i64)
        }
        Request::Stat(cmd) => {
            let mut ctx = context(vol, cmd.uid, cmd.gid, now);
            let meta = ops::stat(vol, &mut ctx, &cmd.path)?;
            cmd.buffer = StatBuffer {
                ino: meta.ino,
                mode: meta.mode,
                nlink: meta.nlink,
                uid: meta.uid,
                gid: meta.gid,
                size: meta.size,
                atime: meta.atime,
                mtime: meta.mtime,
                ctime: meta.ctime,
                blksize: meta.block_size,
                blocks: meta.blocks,
            };
            Ok(0)
        }
        Request::Fsync(_) => ops::fsync(vol).map(|_| 0),
        Request::Mkdir(cmd) => {
            let mut ctx = context(vol, cmd.uid, cmd.gid, now);
            ops::mkdir(vol, &mut ctx, &cmd.path, cmd.mode, cmd.umask).map(|_| 0)
        }
        Request::Link(cmd) => {
            let mut ctx = context(vol, cmd.uid, cmd.gid, now);
            ops::link(vol, &mut ctx, &cmd.old_path, &cmd.new_path).map(|_| 0)
        }
        Request::Symlink(cmd) => {
            let mut ctx = context(vol, cmd.uid, cmd.gid, now);
            ops::symlink(vol, &mut ctx, &cmd.old_path, &cmd.new_path).map(|_| 0)
        }
        Request::Unlink(cmd) => {
            let mut ctx = context(vol, cmd.uid, cmd.gid, now);
            ops::unlink(vol, &mut ctx, &cmd.path).map(|_| 0)
        }
        Request::Readlink(cmd) => {
            let mut ctx = context(vol, cmd.uid, cmd.gid, now);
            cmd.target = ops::readlink(vol, &mut ctx, &cmd.path)?;
            Ok(cmd.target.len() as i64)
        }
        Request::Chmod(cmd) => {
            let mut ctx = context(vol, cmd.uid, cmd.gid, now);
            ops::chmod(vol, &mut ctx, &cmd.path, cmd.mode).map(|_| 0)
        }
        Request::Chown(cmd) => {
            let mut ctx = context(vol, cmd.uid, cmd.gid, now);
            ops::chown(vol, &mut ctx, &cmd.path, cmd.new_uid, cmd.new_gid).map(|_| 0)
        }
        Request::Utime(cmd) => {
            let mut ctx = context(vol, cmd.uid, cmd.gid, now);
            ops::utime(vol, &mut ctx, &cmd.path, cmd.access_time, cmd.modified_time).map(|_| 0)
        }
        Request::Opendir(cmd) => {
            let mut ctx = context(vol, cmd.uid, cmd.gid, now);
            ops::opendir(vol, &mut ctx, &cmd.path).map(|_| 0)
        }
        Request::Readdir(cmd) => {
            let mut ctx = context(vol, cmd.uid, cmd.gid, now);
            match ops::readdir(vol, &mut ctx, &cmd.path, cmd.position)? {
                Some(entry) => {
                    cmd.end = false;
                    cmd.entry_ino = entry.block;
                    cmd.entry_name = entry.name;
                }
                None => {
                    cmd.end = true;
                    cmd.entry_ino = 0;
                    cmd.entry_name.clear();
                }
            }
            Ok(0)
        }
    }
}
