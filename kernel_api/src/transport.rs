//! Message transports
//!
//! A transport moves whole frames between a server and the kernel. Frames
//! are self-delimiting: the header's length field covers the entire
//! message, header included.

use crate::error::KernelError;
use ipc::MessageHeader;
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};

/// Largest frame a stream transport accepts by default
pub const DEFAULT_MAX_FRAME: usize = 0x10_0000;

/// Transport abstraction for frame exchange
pub trait MessageTransport {
    fn send(&mut self, frame: &[u8]) -> Result<(), KernelError>;

    /// Blocks until a whole frame is available
    ///
    /// Returns [`KernelError::Disconnected`] once the peer is gone.
    fn receive(&mut self) -> Result<Vec<u8>, KernelError>;
}

impl<T: MessageTransport + ?Sized> MessageTransport for Box<T> {
    fn send(&mut self, frame: &[u8]) -> Result<(), KernelError> {
        (**self).send(frame)
    }

    fn receive(&mut self) -> Result<Vec<u8>, KernelError> {
        (**self).receive()
    }
}

/// In-memory transport for tests
///
/// Frames pushed with [`push`](Self::push) are handed out in order by
/// `receive`; everything sent is recorded. An empty queue reads as a
/// disconnect.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    inbound: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    fail_sends: bool,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Vec<u8>) {
        self.inbound.push_back(frame);
    }

    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    pub fn take_sent(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.sent)
    }

    /// Makes every subsequent send fail
    pub fn fail_sends(&mut self, fail: bool) {
        self.fail_sends = fail;
    }
}

impl MessageTransport for LoopbackTransport {
    fn send(&mut self, frame: &[u8]) -> Result<(), KernelError> {
        if self.fail_sends {
            return Err(KernelError::SendFailed("loopback send disabled".to_string()));
        }
        self.sent.push(frame.to_vec());
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<u8>, KernelError> {
        self.inbound.pop_front().ok_or(KernelError::Disconnected)
    }
}

/// Frames messages over a byte stream (a pipe, a socket, stdio)
pub struct StreamTransport<R, W> {
    reader: R,
    writer: W,
    max_frame: usize,
}

impl<R: Read, W: Write> StreamTransport<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            max_frame: DEFAULT_MAX_FRAME,
        }
    }

    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }

    /// Fills `buf`, returning false on a clean EOF before the first byte
    fn read_exact_or_eof(&mut self, buf: &mut [u8]) -> Result<bool, KernelError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => {
                    return Err(KernelError::ReceiveFailed(format!(
                        "stream ended after {} of {} bytes",
                        filled,
                        buf.len()
                    )))
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(KernelError::ReceiveFailed(e.to_string())),
            }
        }
        Ok(true)
    }
}

impl<R: Read, W: Write> MessageTransport for StreamTransport<R, W> {
    fn send(&mut self, frame: &[u8]) -> Result<(), KernelError> {
        self.writer
            .write_all(frame)
            .and_then(|_| self.writer.flush())
            .map_err(|e| KernelError::SendFailed(e.to_string()))
    }

    fn receive(&mut self) -> Result<Vec<u8>, KernelError> {
        let mut frame = vec![0u8; MessageHeader::SIZE];
        if !self.read_exact_or_eof(&mut frame)? {
            return Err(KernelError::Disconnected);
        }

        let offset = MessageHeader::LENGTH_OFFSET;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&frame[offset..offset + 8]);
        let length = u64::from_le_bytes(raw);
        if length < MessageHeader::SIZE as u64 || length > self.max_frame as u64 {
            return Err(KernelError::InvalidFrameLength {
                length,
                limit: self.max_frame,
            });
        }

        frame.resize(length as usize, 0);
        if !self.read_exact_or_eof(&mut frame[MessageHeader::SIZE..])? {
            return Err(KernelError::ReceiveFailed(
                "stream ended inside a frame".to_string(),
            ));
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipc::{CommandCode, WireWriter};
    use std::io::Cursor;

    fn frame(code: CommandCode, extra: usize) -> Vec<u8> {
        let mut header = MessageHeader::request(code, 3);
        header.length = (MessageHeader::SIZE + extra) as u64;
        let mut w = WireWriter::new();
        header.encode(&mut w);
        w.put_zeros(extra);
        w.finish()
    }

    #[test]
    fn test_loopback_order_and_disconnect() {
        let mut transport = LoopbackTransport::new();
        transport.push(vec![1]);
        transport.push(vec![2]);

        assert_eq!(transport.receive().unwrap(), vec![1]);
        assert_eq!(transport.receive().unwrap(), vec![2]);
        assert_eq!(transport.receive(), Err(KernelError::Disconnected));

        transport.send(&[9, 9]).unwrap();
        assert_eq!(transport.take_sent(), vec![vec![9, 9]]);
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_loopback_send_failure() {
        let mut transport = LoopbackTransport::new();
        transport.fail_sends(true);
        assert!(matches!(
            transport.send(&[0]),
            Err(KernelError::SendFailed(_))
        ));
    }

    #[test]
    fn test_stream_splits_frames_by_length() {
        let mut input = frame(CommandCode::Stat, 16);
        input.extend(frame(CommandCode::Ready, 0));

        let mut transport = StreamTransport::new(Cursor::new(input), Vec::new());
        let first = transport.receive().unwrap();
        assert_eq!(first.len(), MessageHeader::SIZE + 16);
        let second = transport.receive().unwrap();
        assert_eq!(
            MessageHeader::peek(&second).unwrap().code(),
            Some(CommandCode::Ready)
        );
        assert_eq!(transport.receive(), Err(KernelError::Disconnected));
    }

    #[test]
    fn test_stream_rejects_oversized_frame() {
        let input = frame(CommandCode::Write, 64);
        let mut transport =
            StreamTransport::new(Cursor::new(input), Vec::new()).with_max_frame(80);
        assert!(matches!(
            transport.receive(),
            Err(KernelError::InvalidFrameLength { length: 104, .. })
        ));
    }

    #[test]
    fn test_stream_truncated_frame() {
        let mut input = frame(CommandCode::Open, 32);
        input.truncate(MessageHeader::SIZE + 10);
        let mut transport = StreamTransport::new(Cursor::new(input), Vec::new());
        assert!(matches!(
            transport.receive(),
            Err(KernelError::ReceiveFailed(_))
        ));
    }

    #[test]
    fn test_stream_send_writes_frame() {
        let mut transport = StreamTransport::new(Cursor::new(Vec::new()), Vec::new());
        transport.send(&[1, 2, 3]).unwrap();
        let (_, written) = transport.into_inner();
        assert_eq!(written, vec![1, 2, 3]);
    }
}
