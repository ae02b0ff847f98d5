//! Per-port state.
//!
//! A [`Port`] owns everything the ingress path needs for one physical
//! downlink: the configuration, the descriptor pool, and the table mapping
//! mux IDs to logical endpoints. Endpoints carry the [`Device`] a delivered
//! packet is attributed to, along with the device's offload capabilities.

use std::sync::Arc;

use crate::config::Config;
use crate::error::Error;
use crate::pool::DescriptorPool;

/// Number of mux ID slots on a port.
pub const MAX_ENDPOINTS: usize = 256;

/// A logical network device packets are delivered on.
#[derive(Debug)]
pub struct Device {
    pub name: String,
    /// Trust hardware checksum verdicts; when false, checksum offload
    /// headers are ignored and packets are handed up unverified.
    pub rx_checksum: bool,
    /// Deliver coalesced superframes whole when possible instead of
    /// segmenting them.
    pub hw_gro: bool,
}

impl Device {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rx_checksum: true,
            hw_gro: true,
        }
    }
}

/// A configured logical channel on a port.
#[derive(Debug)]
pub struct Endpoint {
    pub device: Arc<Device>,
}

/// One physical downlink and its logical channels.
pub struct Port {
    pub config: Config,
    pub pool: DescriptorPool,
    endpoints: Vec<Option<Endpoint>>,
}

impl Port {
    /// Create a port. Fails if the configuration is invalid.
    pub fn new(config: Config) -> Result<Self, Error> {
        config.validate()?;
        let pool = DescriptorPool::new(config.pool_prefill, config.pool_cap);
        let mut endpoints = Vec::with_capacity(MAX_ENDPOINTS);
        endpoints.resize_with(MAX_ENDPOINTS, || None);
        Ok(Self {
            config,
            pool,
            endpoints,
        })
    }

    /// Attach a device to a mux ID.
    pub fn set_endpoint(&mut self, mux_id: u8, device: Arc<Device>) {
        self.endpoints[mux_id as usize] = Some(Endpoint { device });
    }

    /// Detach a mux ID, returning the endpoint that occupied it.
    pub fn clear_endpoint(&mut self, mux_id: u8) -> Option<Endpoint> {
        self.endpoints[mux_id as usize].take()
    }

    /// The endpoint configured for a mux ID, if any.
    pub fn endpoint(&self, mux_id: u8) -> Option<&Endpoint> {
        self.endpoints[mux_id as usize].as_ref()
    }
}
