//! Port abstraction for filter inputs and outputs.
//!
//! Ports are the connection points of filters. An [`OutPort`] holds a
//! strong reference to its peer [`InPort`], since pushing data requires the
//! receiver to stay alive for the duration of the call. An [`InPort`] only
//! holds a weak reference back upstream: pulls and activation tolerate a
//! vanished peer and fail with an error instead.
//!
//! Every port keeps a weak back-reference to the filter that owns it, so
//! the filter graph has no ownership cycles.

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::format::{Capability, Meta, Params};
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::sync::{Arc, Weak};

/// Name of the port every filter gets at init time, in either direction.
pub const DEFAULT_PORT_NAME: &str = "default";

/// Direction of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    /// An input port (receives buffers from upstream).
    Input,
    /// An output port (sends buffers downstream).
    Output,
}

/// How data moves across a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WorkMode {
    /// Upstream pushes buffers into downstream.
    #[default]
    Push,
    /// Downstream pulls byte ranges from upstream.
    Pull,
}

/// A list of work modes, ordered by preference.
pub type WorkModes = SmallVec<[WorkMode; 2]>;

/// Result of a successful negotiation.
#[derive(Debug, Clone, PartialEq)]
pub struct Negotiated {
    /// The capability both sides agreed on.
    pub capability: Capability,
    /// Parameters returned by downstream.
    pub params: Params,
}

impl Negotiated {
    /// Create a negotiation result with empty downstream parameters.
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            params: Params::new(),
        }
    }
}

fn owner_of(owner: &Weak<dyn Filter>) -> Result<Arc<dyn Filter>> {
    owner.upgrade().ok_or(Error::NotExisted)
}

// ============================================================================
// InPort
// ============================================================================

/// An input port on a filter.
pub struct InPort {
    name: String,
    owner: Weak<dyn Filter>,
    work_mode: RwLock<WorkMode>,
    peer: RwLock<Weak<OutPort>>,
}

impl InPort {
    /// Create a new input port owned by `owner`.
    pub fn new(name: impl Into<String>, owner: Weak<dyn Filter>) -> Self {
        Self {
            name: name.into(),
            owner,
            work_mode: RwLock::new(WorkMode::Push),
            peer: RwLock::new(Weak::new()),
        }
    }

    /// Get the port's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the port's direction.
    pub fn direction(&self) -> PortDirection {
        PortDirection::Input
    }

    /// Get the owning filter, if it is still alive.
    pub fn owner(&self) -> Option<Arc<dyn Filter>> {
        self.owner.upgrade()
    }

    /// Get the work mode chosen at activation.
    pub fn work_mode(&self) -> WorkMode {
        *self.work_mode.read()
    }

    /// Get the connected upstream port, if any.
    pub fn peer(&self) -> Option<Arc<OutPort>> {
        self.peer.read().upgrade()
    }

    /// Check if the port has a live peer.
    pub fn is_connected(&self) -> bool {
        self.peer().is_some()
    }

    /// Record `peer` as the upstream end of this connection.
    pub fn connect(&self, peer: &Arc<OutPort>) -> Result<()> {
        *self.peer.write() = Arc::downgrade(peer);
        Ok(())
    }

    /// Forget the upstream peer.
    pub fn disconnect(&self) {
        *self.peer.write() = Weak::new();
    }

    /// Ask upstream for one of `modes` and adopt the mode it picks.
    pub fn activate(&self, modes: &[WorkMode]) -> Result<WorkMode> {
        let peer = self.peer().ok_or_else(|| {
            tracing::error!("port '{}' activated without a live peer", self.name);
            Error::InvalidParameterValue
        })?;
        let mode = peer.activate(modes)?;
        *self.work_mode.write() = mode;
        Ok(mode)
    }

    /// Hand an upstream capability to the owning filter.
    pub fn negotiate(&self, upstream_cap: &Capability, upstream_params: &Params) -> Result<Negotiated> {
        owner_of(&self.owner)?.negotiate(&self.name, upstream_cap, upstream_params)
    }

    /// Hand finalized stream metadata to the owning filter.
    pub fn configure(&self, upstream_meta: &Meta) -> Result<()> {
        owner_of(&self.owner)?.configure(&self.name, upstream_meta)
    }

    /// Deliver a buffer to the owning filter.
    ///
    /// Runs synchronously on the caller's thread and may block if the
    /// receiving filter applies backpressure.
    pub fn push_data(&self, buffer: Buffer, offset: Option<u64>) -> Result<()> {
        owner_of(&self.owner)?.push_data(&self.name, buffer, offset)
    }

    /// Request `size` bytes at `offset` from upstream.
    ///
    /// Returns [`Error::EndOfStream`] once upstream has no data at or after
    /// `offset`.
    pub fn pull_data(&self, offset: u64, size: usize) -> Result<Buffer> {
        let peer = self.peer().ok_or(Error::NotExisted)?;
        peer.pull_data(offset, size)
    }
}

impl std::fmt::Debug for InPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InPort")
            .field("name", &self.name)
            .field("work_mode", &self.work_mode())
            .field("connected", &self.is_connected())
            .finish()
    }
}

// ============================================================================
// OutPort
// ============================================================================

/// An output port on a filter.
pub struct OutPort {
    name: String,
    owner: Weak<dyn Filter>,
    work_mode: RwLock<WorkMode>,
    peer: RwLock<Option<Arc<InPort>>>,
}

impl OutPort {
    /// Create a new output port owned by `owner`.
    pub fn new(name: impl Into<String>, owner: Weak<dyn Filter>) -> Self {
        Self {
            name: name.into(),
            owner,
            work_mode: RwLock::new(WorkMode::Push),
            peer: RwLock::new(None),
        }
    }

    /// Get the port's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the port's direction.
    pub fn direction(&self) -> PortDirection {
        PortDirection::Output
    }

    /// Get the owning filter, if it is still alive.
    pub fn owner(&self) -> Option<Arc<dyn Filter>> {
        self.owner.upgrade()
    }

    /// Get the work mode chosen at activation.
    pub fn work_mode(&self) -> WorkMode {
        *self.work_mode.read()
    }

    /// Get the connected downstream port, if any.
    pub fn peer(&self) -> Option<Arc<InPort>> {
        self.peer.read().clone()
    }

    /// Check if the port has a peer.
    pub fn is_connected(&self) -> bool {
        self.peer.read().is_some()
    }

    /// Connect to a downstream port.
    ///
    /// Both owning filters must belong to the same pipeline. Only this side
    /// of the link is recorded; the caller connects `peer` back.
    pub fn connect(&self, peer: &Arc<InPort>) -> Result<()> {
        let this_owner = owner_of(&self.owner)?;
        let peer_owner = peer.owner().ok_or(Error::NotExisted)?;
        if !this_owner.base().shares_pipeline_with(peer_owner.base()) {
            tracing::error!(
                "cannot connect '{}.{}' to '{}.{}': filters belong to different pipelines",
                this_owner.name(),
                self.name,
                peer_owner.name(),
                peer.name()
            );
            return Err(Error::InvalidParameterValue);
        }
        *self.peer.write() = Some(Arc::clone(peer));
        Ok(())
    }

    /// Drop the downstream peer.
    pub fn disconnect(&self) {
        *self.peer.write() = None;
    }

    /// Pick the first of `modes` the owning filter supports.
    pub fn activate(&self, modes: &[WorkMode]) -> Result<WorkMode> {
        let owner = owner_of(&self.owner).map_err(|_| Error::InvalidParameterValue)?;
        let supported = owner.work_modes();
        let mode = modes
            .iter()
            .copied()
            .find(|mode| supported.contains(mode))
            .ok_or_else(|| {
                tracing::error!(
                    "filter '{}' supports none of the requested work modes {:?}",
                    owner.name(),
                    modes
                );
                Error::InvalidParameterValue
            })?;
        *self.work_mode.write() = mode;
        Ok(mode)
    }

    /// Propagate a capability to the downstream filter.
    pub fn negotiate(&self, upstream_cap: &Capability, upstream_params: &Params) -> Result<Negotiated> {
        let peer = self.peer().ok_or(Error::NotExisted)?;
        peer.negotiate(upstream_cap, upstream_params)
    }

    /// Propagate finalized metadata to the downstream filter.
    pub fn configure(&self, upstream_meta: &Meta) -> Result<()> {
        let peer = self.peer().ok_or(Error::NotExisted)?;
        peer.configure(upstream_meta)
    }

    /// Push a buffer into the downstream filter.
    pub fn push_data(&self, buffer: Buffer, offset: Option<u64>) -> Result<()> {
        let peer = self.peer().ok_or(Error::NotExisted)?;
        peer.push_data(buffer, offset)
    }

    /// Serve a pull request from downstream using the owning filter.
    pub fn pull_data(&self, offset: u64, size: usize) -> Result<Buffer> {
        owner_of(&self.owner)?.pull_data(&self.name, offset, size)
    }
}

impl std::fmt::Debug for OutPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutPort")
            .field("name", &self.name)
            .field("work_mode", &self.work_mode())
            .field("connected", &self.is_connected())
            .finish()
    }
}
