use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use scriptbridge_transport::{ChannelMode, Transport, TransportError};
use tracing::{debug, info};

use crate::channel::Channel;
use crate::config::ChannelConfig;
use crate::error::Result;
use crate::ids::OwnerId;
use crate::route_id::RouteIdAllocator;

/// Per-thread table of open channels, keyed by name.
///
/// Holds channels weakly: a channel lives as long as the proxies, stubs and
/// consumers using it. Construct one per object-owning thread and pass it
/// to whatever opens channels.
#[derive(Debug)]
pub struct ChannelRegistry {
    channels: RefCell<HashMap<String, Weak<Channel>>>,
    route_ids: RouteIdAllocator,
    config: ChannelConfig,
}

impl ChannelRegistry {
    /// `route_ids` is shared with every channel this registry opens; clone
    /// the same allocator into registries on other threads to keep route
    /// ids unique process-wide.
    pub fn new(route_ids: RouteIdAllocator, config: ChannelConfig) -> Self {
        Self {
            channels: RefCell::new(HashMap::new()),
            route_ids,
            config,
        }
    }

    pub fn route_ids(&self) -> &RouteIdAllocator {
        &self.route_ids
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// The live, valid channel called `name`, or a new one over the
    /// transport `factory` opens.
    pub fn get_or_create<F>(&self, name: &str, mode: ChannelMode, factory: F) -> Result<Rc<Channel>>
    where
        F: FnOnce(&str, ChannelMode) -> std::result::Result<Box<dyn Transport>, TransportError>,
    {
        if let Some(channel) = self.get(name) {
            return Ok(channel);
        }

        debug!(channel = name, %mode, "opening channel");
        let transport = factory(name, mode)?;
        let channel = Channel::new(name, mode, transport, self.config.clone(), self.route_ids.clone());
        self.channels
            .borrow_mut()
            .insert(name.to_string(), Rc::downgrade(&channel));
        Ok(channel)
    }

    /// The live, valid channel called `name`.
    pub fn get(&self, name: &str) -> Option<Rc<Channel>> {
        let channel = self.channels.borrow().get(name).and_then(Weak::upgrade);
        channel.filter(|channel| channel.is_valid())
    }

    /// Run [`Channel::teardown_owner`] on every live channel.
    pub fn teardown_owner(&self, owner: OwnerId) {
        for channel in self.live() {
            channel.teardown_owner(owner);
        }
    }

    /// Close every live channel.
    pub fn shutdown(&self) {
        let channels = self.live();
        info!(channels = channels.len(), "closing all channels");
        for channel in channels {
            channel.close();
        }
        self.channels.borrow_mut().clear();
    }

    /// Number of channels that are still alive and valid.
    pub fn len(&self) -> usize {
        self.live().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live(&self) -> Vec<Rc<Channel>> {
        let mut channels = self.channels.borrow_mut();
        channels.retain(|_, channel| channel.strong_count() > 0);
        channels
            .values()
            .filter_map(Weak::upgrade)
            .filter(|channel| channel.is_valid())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use scriptbridge_transport::MemoryTransport;

    use super::*;

    fn quiet() -> ChannelConfig {
        ChannelConfig {
            announce_pid: false,
            ..ChannelConfig::default()
        }
    }

    fn memory(_name: &str, _mode: ChannelMode) -> std::result::Result<Box<dyn Transport>, TransportError> {
        let (local, _remote) = MemoryTransport::pair();
        Ok(Box::new(local))
    }

    #[test]
    fn reuses_live_channels() {
        let registry = ChannelRegistry::new(RouteIdAllocator::new(), quiet());
        let opened = Cell::new(0);
        let factory = |name: &str, mode: ChannelMode| {
            opened.set(opened.get() + 1);
            memory(name, mode)
        };

        let a = registry.get_or_create("renderer", ChannelMode::Server, factory).unwrap();
        let b = registry
            .get_or_create("renderer", ChannelMode::Server, |name, mode| {
                opened.set(opened.get() + 1);
                memory(name, mode)
            })
            .unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(opened.get(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn replaces_dropped_or_invalid_channels() {
        let registry = ChannelRegistry::new(RouteIdAllocator::new(), quiet());
        let first = registry.get_or_create("gpu", ChannelMode::Client, memory).unwrap();
        first.on_transport_error();
        assert!(registry.get("gpu").is_none());

        let second = registry.get_or_create("gpu", ChannelMode::Client, memory).unwrap();
        assert!(!Rc::ptr_eq(&first, &second));
        drop(second);
        assert!(registry.get("gpu").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn shares_the_route_id_sequence() {
        let registry = ChannelRegistry::new(RouteIdAllocator::starting_at(10), quiet());
        let a = registry.get_or_create("a", ChannelMode::Server, memory).unwrap();
        let b = registry.get_or_create("b", ChannelMode::Server, memory).unwrap();
        assert_eq!(a.generate_route_id().unwrap().0, 10);
        assert_eq!(b.generate_route_id().unwrap().0, 11);
        assert_eq!(registry.route_ids().peek().0, 12);
    }

    #[test]
    fn factory_errors_propagate() {
        let registry = ChannelRegistry::new(RouteIdAllocator::new(), quiet());
        let result = registry.get_or_create("bad", ChannelMode::Client, |name, _| {
            Err(TransportError::InvalidName(name.to_string()))
        });
        assert!(matches!(
            result,
            Err(crate::error::BridgeError::Transport(TransportError::InvalidName(_)))
        ));
    }

    #[test]
    fn shutdown_closes_everything() {
        let registry = ChannelRegistry::new(RouteIdAllocator::new(), quiet());
        let a = registry.get_or_create("a", ChannelMode::Server, memory).unwrap();
        let b = registry.get_or_create("b", ChannelMode::Server, memory).unwrap();
        registry.shutdown();
        assert!(!a.is_valid());
        assert!(!b.is_valid());
        assert_eq!(registry.len(), 0);
    }
}
