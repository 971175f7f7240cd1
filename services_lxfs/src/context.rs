//! Per-request execution context

use core_types::Credentials;
use hal::BlockDevice;

use crate::block_store::{Scratch, Volume};

/// State one request carries through the engine
///
/// Engine calls never share a buffer across requests: each context owns
/// its own [`Scratch`].
#[derive(Debug)]
pub struct OpContext {
    pub creds: Credentials,
    /// Request time in seconds, stamped on everything the request touches
    pub now: u64,
    pub scratch: Scratch,
}

impl OpContext {
    pub fn new<D: BlockDevice>(volume: &Volume<D>, creds: Credentials, now: u64) -> Self {
        Self {
            creds,
            now,
            scratch: volume.scratch(),
        }
    }
}
