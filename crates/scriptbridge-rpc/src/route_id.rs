use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use scriptbridge_frame::FIRST_OBJECT_ROUTE;
use scriptbridge_transport::ChannelMode;

use crate::ids::RouteId;

/// Process-wide route-id counter.
///
/// Clones share one atomic, so every channel created from the same
/// allocator draws from one sequence and no two live endpoints in the
/// process ever share an id. Safe to use from any thread.
#[derive(Debug, Clone)]
pub struct RouteIdAllocator {
    next: Arc<AtomicU32>,
}

impl RouteIdAllocator {
    pub fn new() -> Self {
        Self::starting_at(FIRST_OBJECT_ROUTE)
    }

    /// Start the sequence at `first`. Lets a process reserve a low range for
    /// well-known root objects.
    pub fn starting_at(first: u32) -> Self {
        Self {
            next: Arc::new(AtomicU32::new(first.max(FIRST_OBJECT_ROUTE))),
        }
    }

    pub fn allocate(&self) -> RouteId {
        RouteId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// The id the next `allocate` will return.
    pub fn peek(&self) -> RouteId {
        RouteId(self.next.load(Ordering::Relaxed))
    }
}

impl Default for RouteIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a channel gets route ids for the stubs it creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteIdPolicy {
    /// Draw from the local allocator. Lowest latency; the side that issues
    /// ids for the whole channel uses this.
    Local,
    /// Ask the peer with a synchronous control request, so a single side
    /// issues every id used on the channel.
    Peer,
}

impl RouteIdPolicy {
    /// Servers issue ids, clients ask for them.
    pub fn for_mode(mode: ChannelMode) -> Self {
        match mode {
            ChannelMode::Server => RouteIdPolicy::Local,
            ChannelMode::Client => RouteIdPolicy::Peer,
        }
    }
}
