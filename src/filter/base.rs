//! Shared state and default behaviour for filters.

use crate::error::{Error, Result};
use crate::event::{Event, EventReceiver, EventType};
use crate::filter::context::InitContext;
use crate::filter::port::{DEFAULT_PORT_NAME, InPort, OutPort, WorkMode};
use crate::filter::traits::{
    AtomicFilterState, Filter, FilterCallback, FilterCallbackCommand, FilterState, FilterType,
    StreamType, filter_key,
};
use crate::sync::MediaSyncCenter;
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

#[derive(Default)]
struct Links {
    this: Option<Weak<dyn Filter>>,
    receiver: Option<Weak<dyn EventReceiver>>,
    callback: Option<Weak<dyn FilterCallback>>,
    sync_center: Option<Weak<dyn MediaSyncCenter>>,
}

#[derive(Default)]
struct Ports {
    inputs: SmallVec<[Arc<InPort>; 2]>,
    outputs: SmallVec<[Arc<OutPort>; 2]>,
    /// Internal pass-through routes as (input name, output name).
    routes: Vec<(String, String)>,
}

/// State every filter embeds.
///
/// Holds the name, role and lifecycle state, owns the filter's ports and
/// keeps the non-owning references to the pipeline, the structural callback
/// and the sync center.
pub struct FilterBase {
    name: String,
    filter_type: FilterType,
    state: AtomicFilterState,
    flushing: AtomicBool,
    links: RwLock<Links>,
    ports: RwLock<Ports>,
    media_type_counts: Mutex<HashMap<StreamType, u32>>,
}

impl FilterBase {
    /// Create the base for a filter named `name`.
    pub fn new(name: impl Into<String>, filter_type: FilterType) -> Self {
        Self {
            name: name.into(),
            filter_type,
            state: AtomicFilterState::new(FilterState::Created),
            flushing: AtomicBool::new(false),
            links: RwLock::new(Links::default()),
            ports: RwLock::new(Ports::default()),
            media_type_counts: Mutex::new(HashMap::new()),
        }
    }

    /// Get the filter's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the filter's role.
    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> FilterState {
        self.state.load()
    }

    /// Overwrite the lifecycle state.
    pub fn set_state(&self, state: FilterState) {
        self.state.store(state);
    }

    /// Check if the filter is between `flush_start` and `flush_end`.
    pub fn is_flushing(&self) -> bool {
        self.flushing.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Store the context references and build the default ports.
    ///
    /// Ports are only built the first time; a filter re-added after removal
    /// keeps its existing ports.
    pub fn init(&self, ctx: InitContext) -> Result<()> {
        {
            let mut links = self.links.write();
            links.this = Some(ctx.filter().clone());
            links.receiver = ctx.receiver().cloned();
            links.callback = ctx.callback().cloned();
        }

        let mut ports = self.ports.write();
        if ports.inputs.is_empty() && ports.outputs.is_empty() {
            let owner = ctx.filter().clone();
            if !self.filter_type.is_source() {
                ports
                    .inputs
                    .push(Arc::new(InPort::new(DEFAULT_PORT_NAME, owner.clone())));
            }
            if !self.filter_type.is_sink() {
                ports
                    .outputs
                    .push(Arc::new(OutPort::new(DEFAULT_PORT_NAME, owner)));
            }
            if !ports.inputs.is_empty() && !ports.outputs.is_empty() {
                ports
                    .routes
                    .push((DEFAULT_PORT_NAME.to_string(), DEFAULT_PORT_NAME.to_string()));
            }
        }
        drop(ports);

        self.state.store(FilterState::Initialized);
        tracing::debug!("filter '{}' initialized", self.name);
        Ok(())
    }

    /// Move to `Preparing` and activate the first input in push mode.
    pub fn prepare(&self) -> Result<()> {
        self.prepare_with(&[WorkMode::Push])
    }

    /// Move to `Preparing` and activate the first input with one of `modes`.
    pub fn prepare_with(&self, modes: &[WorkMode]) -> Result<()> {
        let state = self.state();
        if state != FilterState::Initialized {
            tracing::warn!("filter '{}' cannot prepare from {:?}", self.name, state);
            return Err(Error::InvalidOperation);
        }
        self.state.store(FilterState::Preparing);

        let first_input = self.ports.read().inputs.first().cloned();
        if let Some(port) = first_input {
            port.activate(modes)?;
        }
        Ok(())
    }

    /// Move to `Running`.
    pub fn start(&self) -> Result<()> {
        match self.state() {
            FilterState::Ready | FilterState::Paused | FilterState::Running => {
                self.state.store(FilterState::Running);
                Ok(())
            }
            state => {
                tracing::warn!("filter '{}' cannot start from {:?}", self.name, state);
                Err(Error::InvalidOperation)
            }
        }
    }

    /// Move to `Paused`.
    pub fn pause(&self) -> Result<()> {
        match self.state() {
            FilterState::Running | FilterState::Ready | FilterState::Paused => {
                self.state.store(FilterState::Paused);
                Ok(())
            }
            state => {
                tracing::warn!("filter '{}' cannot pause from {:?}", self.name, state);
                Err(Error::InvalidOperation)
            }
        }
    }

    /// Return to `Initialized` and forget dynamic port numbering.
    pub fn stop(&self) -> Result<()> {
        self.state.store(FilterState::Initialized);
        self.flushing.store(false, Ordering::Release);
        self.media_type_counts.lock().clear();
        Ok(())
    }

    /// Start dropping incoming data.
    pub fn flush_start(&self) {
        self.flushing.store(true, Ordering::Release);
    }

    /// Stop dropping incoming data.
    pub fn flush_end(&self) {
        self.flushing.store(false, Ordering::Release);
    }

    /// Mark the filter ready and tell the pipeline.
    pub fn notify_ready(&self) {
        self.state.store(FilterState::Ready);
        self.emit_event(Event::new(self.name.clone(), EventType::Ready));
    }

    // ------------------------------------------------------------------
    // Events and callbacks
    // ------------------------------------------------------------------

    /// Send an event to the receiver given at init.
    pub fn emit_event(&self, event: Event) {
        let receiver = self.links.read().receiver.as_ref().and_then(Weak::upgrade);
        match receiver {
            Some(receiver) => receiver.on_event(event),
            None => tracing::debug!("filter '{}' dropped event {}", self.name, event),
        }
    }

    /// Send an `Error` event carrying `error`.
    pub fn emit_error(&self, error: Error) {
        self.emit_event(Event::error(self.name.clone(), error));
    }

    /// Report a structural change to the callback given at init.
    pub fn emit_callback(&self, command: FilterCallbackCommand) {
        let (this, callback) = {
            let links = self.links.read();
            (
                links.this.as_ref().and_then(Weak::upgrade),
                links.callback.as_ref().and_then(Weak::upgrade),
            )
        };
        if let (Some(this), Some(callback)) = (this, callback) {
            callback.on_callback(&this, command);
        }
    }

    /// Check if `other` was initialized by the same pipeline as this filter.
    pub fn shares_pipeline_with(&self, other: &FilterBase) -> bool {
        self.pipeline_addr() == other.pipeline_addr()
    }

    fn pipeline_addr(&self) -> Option<usize> {
        self.links
            .read()
            .receiver
            .as_ref()
            .map(|receiver| receiver.as_ptr() as *const () as usize)
    }

    /// Attach the session's sync center.
    pub fn set_sync_center(&self, center: Weak<dyn MediaSyncCenter>) {
        self.links.write().sync_center = Some(center);
    }

    /// Get the sync center, if one is attached and alive.
    pub fn sync_center(&self) -> Option<Arc<dyn MediaSyncCenter>> {
        self.links.read().sync_center.as_ref().and_then(Weak::upgrade)
    }

    // ------------------------------------------------------------------
    // Ports
    // ------------------------------------------------------------------

    fn owner(&self) -> Result<Weak<dyn Filter>> {
        self.links.read().this.clone().ok_or_else(|| {
            tracing::warn!("filter '{}' must be initialized before adding ports", self.name);
            Error::InvalidOperation
        })
    }

    /// Add an input port named `name`.
    pub fn add_in_port(&self, name: impl Into<String>) -> Result<Arc<InPort>> {
        let name = name.into();
        let owner = self.owner()?;
        let mut ports = self.ports.write();
        if ports.inputs.iter().any(|p| p.name() == name) {
            return Err(Error::InvalidParameterValue);
        }
        let port = Arc::new(InPort::new(name, owner));
        ports.inputs.push(Arc::clone(&port));
        Ok(port)
    }

    /// Add an output port named `name`.
    pub fn add_out_port(&self, name: impl Into<String>) -> Result<Arc<OutPort>> {
        let name = name.into();
        let owner = self.owner()?;
        let mut ports = self.ports.write();
        if ports.outputs.iter().any(|p| p.name() == name) {
            return Err(Error::InvalidParameterValue);
        }
        let port = Arc::new(OutPort::new(name, owner));
        ports.outputs.push(Arc::clone(&port));
        Ok(port)
    }

    /// Add an output port for a newly discovered stream.
    ///
    /// Ports are named `<type>_<n>` with `n` counting per stream type since
    /// the last stop. The structural callback is told about the new port.
    pub fn add_out_port_for(&self, stream_type: StreamType) -> Result<Arc<OutPort>> {
        let index = {
            let mut counts = self.media_type_counts.lock();
            let count = counts.entry(stream_type).or_insert(0);
            let index = *count;
            *count += 1;
            index
        };
        let name = format!("{}_{}", stream_type.port_prefix(), index);
        let port = self.add_out_port(name.clone())?;
        tracing::debug!("filter '{}' added port '{}'", self.name, name);
        self.emit_callback(FilterCallbackCommand::PortAdded {
            port: name,
            stream_type,
        });
        Ok(port)
    }

    /// Remove an output port and any route using it.
    pub fn remove_out_port(&self, name: &str) -> Result<()> {
        let port = {
            let mut ports = self.ports.write();
            let index = ports
                .outputs
                .iter()
                .position(|p| p.name() == name)
                .ok_or(Error::NotExisted)?;
            ports.routes.retain(|(_, out)| out != name);
            ports.outputs.remove(index)
        };
        if let Some(peer) = port.peer() {
            peer.disconnect();
        }
        port.disconnect();
        self.emit_callback(FilterCallbackCommand::PortRemoved {
            port: name.to_string(),
        });
        Ok(())
    }

    /// Route data arriving on input `in_port` to output `out_port`.
    pub fn add_route(&self, in_port: &str, out_port: &str) -> Result<()> {
        let mut ports = self.ports.write();
        let has_in = ports.inputs.iter().any(|p| p.name() == in_port);
        let has_out = ports.outputs.iter().any(|p| p.name() == out_port);
        if !has_in || !has_out {
            return Err(Error::InvalidParameterValue);
        }
        ports.routes.retain(|(input, _)| input != in_port);
        ports.routes.push((in_port.to_string(), out_port.to_string()));
        Ok(())
    }

    /// Get the internal routes as (input, output) name pairs.
    pub fn routes(&self) -> Vec<(String, String)> {
        self.ports.read().routes.clone()
    }

    /// Get the output port paired with input `in_port`.
    pub fn route_out_port(&self, in_port: &str) -> Result<Arc<OutPort>> {
        let ports = self.ports.read();
        let (_, out_name) = ports
            .routes
            .iter()
            .find(|(input, _)| input == in_port)
            .ok_or(Error::NotExisted)?;
        ports
            .outputs
            .iter()
            .find(|p| p.name() == out_name)
            .cloned()
            .ok_or(Error::NotExisted)
    }

    /// Get all input ports.
    pub fn in_ports(&self) -> Vec<Arc<InPort>> {
        self.ports.read().inputs.to_vec()
    }

    /// Get all output ports.
    pub fn out_ports(&self) -> Vec<Arc<OutPort>> {
        self.ports.read().outputs.to_vec()
    }

    /// Find an input port by name.
    pub fn in_port(&self, name: &str) -> Option<Arc<InPort>> {
        self.ports.read().inputs.iter().find(|p| p.name() == name).cloned()
    }

    /// Find an output port by name.
    pub fn out_port(&self, name: &str) -> Option<Arc<OutPort>> {
        self.ports.read().outputs.iter().find(|p| p.name() == name).cloned()
    }

    /// Filters whose outputs feed this filter.
    pub fn pre_filters(&self) -> Vec<Arc<dyn Filter>> {
        let filters = self
            .in_ports()
            .into_iter()
            .filter_map(|port| port.peer())
            .filter_map(|peer| peer.owner());
        dedup_filters(filters)
    }

    /// Filters fed by this filter's outputs.
    pub fn next_filters(&self) -> Vec<Arc<dyn Filter>> {
        let filters = self
            .out_ports()
            .into_iter()
            .filter_map(|port| port.peer())
            .filter_map(|peer| peer.owner());
        dedup_filters(filters)
    }

    /// Break every connection into this filter's inputs, on both sides.
    pub fn unlink_prev_filters(&self) {
        for port in self.in_ports() {
            let peer = port.peer();
            port.disconnect();
            if let Some(peer) = peer {
                peer.disconnect();
            }
        }
    }
}

fn dedup_filters(filters: impl Iterator<Item = Arc<dyn Filter>>) -> Vec<Arc<dyn Filter>> {
    let mut out: Vec<Arc<dyn Filter>> = Vec::new();
    for filter in filters {
        let key = filter_key(&filter);
        if !out.iter().any(|f| filter_key(f) == key) {
            out.push(filter);
        }
    }
    out
}

impl std::fmt::Debug for FilterBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ports = self.ports.read();
        f.debug_struct("FilterBase")
            .field("name", &self.name)
            .field("filter_type", &self.filter_type)
            .field("state", &self.state())
            .field("in_ports", &ports.inputs.len())
            .field("out_ports", &ports.outputs.len())
            .finish()
    }
}
