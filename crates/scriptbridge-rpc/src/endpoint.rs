use std::rc::Rc;

use crate::channel::Channel;
use crate::ids::{RequestId, RouteId};
use crate::marshal;
use crate::message::{ObjectRequest, Reply};

/// Target of one route in a channel's routing table.
///
/// The channel holds endpoints weakly and upgrades them only for the
/// duration of a single dispatch, so an endpoint may be torn down by the
/// very request it is handling and is freed once the handler returns.
pub trait Endpoint {
    /// Handle a request addressed to this route.
    fn on_request(&self, request: ObjectRequest, reply: ReplySlot);

    /// The channel was invalidated. Called at most once per registration.
    fn on_channel_error(&self);
}

/// Where the answer to one inbound request goes.
///
/// For a synchronous request the peer is blocked until a reply arrives, so
/// a slot dropped without [`send`](Self::send) answers with
/// [`Reply::Failed`]. Asynchronous requests have nobody waiting and the
/// slot does nothing.
pub struct ReplySlot {
    channel: Rc<Channel>,
    route: RouteId,
    request_id: Option<RequestId>,
}

impl ReplySlot {
    pub(crate) fn new(channel: Rc<Channel>, route: RouteId, request_id: Option<RequestId>) -> Self {
        Self {
            channel,
            route,
            request_id,
        }
    }

    /// Whether the peer is blocked waiting on this reply.
    pub fn is_sync(&self) -> bool {
        self.request_id.is_some()
    }

    pub fn route(&self) -> RouteId {
        self.route
    }

    /// Answer the request. Returns false if the request was asynchronous or
    /// the reply could not be sent.
    pub fn send(mut self, reply: Reply) -> bool {
        match self.request_id.take() {
            Some(request_id) => self.channel.send_reply(self.route, request_id, reply),
            None => false,
        }
    }

    pub fn fail(self) {
        self.send(Reply::Failed);
    }

    /// Turn down a request without applying it.
    ///
    /// Objects it carried are taken and dropped first, while a synchronous
    /// caller is still dispatching, so the peer's stubs for them are
    /// released.
    pub fn refuse(self, request: &ObjectRequest) {
        marshal::discard(request.values(), &self.channel);
        self.fail();
    }
}

impl Drop for ReplySlot {
    fn drop(&mut self) {
        if let Some(request_id) = self.request_id.take() {
            self.channel.send_reply(self.route, request_id, Reply::Failed);
        }
    }
}
