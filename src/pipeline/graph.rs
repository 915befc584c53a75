//! The pipeline: filter set, processing order and lifecycle driving.

use crate::error::{Error, Result};
use crate::event::{Event, EventReceiver, EventType};
use crate::filter::{
    AtomicFilterState, DEFAULT_PORT_NAME, Filter, FilterCallback, FilterCallbackCommand,
    FilterState, InPort, InitContext, OutPort, filter_key,
};
use crate::observability::{
    PipelineMetrics, TracingConfig, instrument_filter, instrument_pipeline, trace_filter_error,
    trace_state_change,
};
use crate::sync::MediaSyncCenter;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Weak};

#[derive(Default)]
struct Upstream {
    receiver: Option<Weak<dyn EventReceiver>>,
    callback: Option<Weak<dyn FilterCallback>>,
    sync_center: Option<Weak<dyn MediaSyncCenter>>,
}

/// A set of linked filters driven through their lifecycle together.
///
/// The pipeline keeps its filters in processing order (sources first) and
/// runs every lifecycle operation sink-first, so downstream filters are
/// able to accept data before upstream filters are told to produce it.
///
/// Filters see the pipeline as their [`EventReceiver`] and
/// [`FilterCallback`]. `Ready` events are collected until every member has
/// reported and then forwarded upward as one event; everything else is
/// forwarded unchanged.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use cadence::elements::{NullSink, PassThrough};
/// use cadence::filter::Filter;
/// use cadence::pipeline::Pipeline;
///
/// let pipeline = Pipeline::new("player");
/// let identity: Arc<dyn Filter> = Arc::new(PassThrough::new("identity"));
/// let sink: Arc<dyn Filter> = Arc::new(NullSink::new("sink"));
///
/// pipeline.add_filters(&[identity.clone(), sink.clone()]).unwrap();
/// pipeline.link_filters(&[identity, sink]).unwrap();
/// assert_eq!(pipeline.filter_count(), 2);
/// ```
pub struct Pipeline {
    name: String,
    this: Weak<Pipeline>,
    state: AtomicFilterState,
    filters: Mutex<Vec<Arc<dyn Filter>>>,
    filters_to_remove: Mutex<Vec<Arc<dyn Filter>>>,
    ready: Mutex<HashSet<String>>,
    upstream: RwLock<Upstream>,
    metrics: PipelineMetrics,
    tracing: TracingConfig,
}

impl Pipeline {
    /// Create an empty pipeline.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_tracing(name, TracingConfig::default())
    }

    /// Create an empty pipeline with explicit span configuration.
    pub fn with_tracing(name: impl Into<String>, tracing: TracingConfig) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|this| Self {
            metrics: PipelineMetrics::new(&name),
            name,
            this: this.clone(),
            state: AtomicFilterState::new(FilterState::Created),
            filters: Mutex::new(Vec::new()),
            filters_to_remove: Mutex::new(Vec::new()),
            ready: Mutex::new(HashSet::new()),
            upstream: RwLock::new(Upstream::default()),
            tracing,
        })
    }

    /// Get the pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the aggregate lifecycle state.
    pub fn state(&self) -> FilterState {
        self.state.load()
    }

    fn set_state(&self, to: FilterState) {
        let from = self.state.load();
        if from != to {
            self.state.store(to);
            trace_state_change(&self.name, from.as_str(), to.as_str());
        }
    }

    /// Attach the session-level event receiver and structural callback.
    pub fn init(
        &self,
        receiver: Weak<dyn EventReceiver>,
        callback: Option<Weak<dyn FilterCallback>>,
    ) {
        {
            let mut upstream = self.upstream.write();
            upstream.receiver = Some(receiver);
            upstream.callback = callback;
        }
        self.ready.lock().clear();
        self.set_state(FilterState::Initialized);
    }

    /// Attach a sync center to every current and future member.
    pub fn set_sync_center(&self, center: Weak<dyn MediaSyncCenter>) {
        self.upstream.write().sync_center = Some(center.clone());
        for filter in self.filters() {
            filter.set_sync_center(center.clone());
        }
    }

    // ========================================================================
    // Membership
    // ========================================================================

    /// Add filters that are not already members and initialize them.
    ///
    /// Filters are initialized with this pipeline as their event receiver
    /// and callback. The first initialization failure is returned; filters
    /// added before it stay members.
    ///
    /// Member names are unique. If a new filter shares its name with
    /// another member, nothing is added and
    /// [`Error::InvalidParameterValue`] is returned.
    pub fn add_filters(&self, filters: &[Arc<dyn Filter>]) -> Result<()> {
        let added: Vec<Arc<dyn Filter>> = {
            let mut members = self.filters.lock();
            let mut known: HashSet<usize> = members.iter().map(filter_key).collect();
            let mut names: HashSet<String> =
                members.iter().map(|f| f.name().to_string()).collect();
            let mut added = Vec::new();
            for filter in filters {
                if !known.insert(filter_key(filter)) {
                    continue;
                }
                if !names.insert(filter.name().to_string()) {
                    tracing::warn!(
                        "pipeline '{}' already has a filter named '{}'",
                        self.name,
                        filter.name()
                    );
                    return Err(Error::InvalidParameterValue);
                }
                added.push(Arc::clone(filter));
            }
            members.extend(added.iter().cloned());
            added
        };

        let receiver: Weak<dyn EventReceiver> = self.this.clone();
        let callback: Weak<dyn FilterCallback> = self.this.clone();
        let sync_center = self.upstream.read().sync_center.clone();
        for filter in &added {
            let ctx = InitContext::new(filter)
                .with_receiver(receiver.clone())
                .with_callback(callback.clone());
            if let Err(e) = filter.init(ctx) {
                trace_filter_error(&self.name, filter.name(), "init", e);
                return Err(e);
            }
            if let Some(center) = &sync_center {
                filter.set_sync_center(center.clone());
            }
            tracing::debug!("pipeline '{}' added filter '{}'", self.name, filter.name());
        }
        Ok(())
    }

    /// Remove a filter immediately.
    ///
    /// The filter's links are left untouched; use
    /// [`remove_filter_chain`](Self::remove_filter_chain) to detach a
    /// linked branch safely.
    pub fn remove_filter(&self, filter: &Arc<dyn Filter>) -> Result<()> {
        let key = filter_key(filter);
        let mut members = self.filters.lock();
        let before = members.len();
        members.retain(|f| filter_key(f) != key);
        if members.len() == before {
            return Err(Error::NotExisted);
        }
        drop(members);
        self.ready.lock().remove(filter.name());
        tracing::debug!("pipeline '{}' removed filter '{}'", self.name, filter.name());
        // The removed filter may have been the last one not yet ready.
        self.complete_ready();
        Ok(())
    }

    /// Detach `first` and everything downstream of it.
    ///
    /// Walks the graph breadth-first from `first`, unlinking every visited
    /// filter from its upstream peers. The visited filters stay members
    /// until the next [`stop`](Self::stop).
    pub fn remove_filter_chain(&self, first: &Arc<dyn Filter>) -> Result<()> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([Arc::clone(first)]);
        let mut chain = Vec::new();
        while let Some(filter) = queue.pop_front() {
            if !visited.insert(filter_key(&filter)) {
                continue;
            }
            queue.extend(filter.next_filters());
            filter.unlink_prev_filters();
            chain.push(filter);
        }
        tracing::debug!(
            "pipeline '{}' queued {} filters for removal starting at '{}'",
            self.name,
            chain.len(),
            first.name()
        );
        self.filters_to_remove.lock().extend(chain);
        Ok(())
    }

    /// Get a snapshot of the member filters in processing order.
    pub fn filters(&self) -> Vec<Arc<dyn Filter>> {
        self.filters.lock().clone()
    }

    /// Number of member filters.
    pub fn filter_count(&self) -> usize {
        self.filters.lock().len()
    }

    /// Find a member by name.
    pub fn find_filter(&self, name: &str) -> Option<Arc<dyn Filter>> {
        self.filters.lock().iter().find(|f| f.name() == name).cloned()
    }

    // ========================================================================
    // Linking
    // ========================================================================

    /// Link each filter's default output to the next filter's default input.
    pub fn link_filters(&self, filters: &[Arc<dyn Filter>]) -> Result<()> {
        for pair in filters.windows(2) {
            let (upstream, downstream) = (&pair[0], &pair[1]);
            let out = upstream.out_port(DEFAULT_PORT_NAME).ok_or_else(|| {
                tracing::error!("filter '{}' has no default output", upstream.name());
                Error::NotExisted
            })?;
            let input = downstream.in_port(DEFAULT_PORT_NAME).ok_or_else(|| {
                tracing::error!("filter '{}' has no default input", downstream.name());
                Error::NotExisted
            })?;
            self.link_ports(&out, &input)?;
        }
        Ok(())
    }

    /// Connect `out` to `input` in both directions.
    pub fn link_ports(&self, out: &Arc<OutPort>, input: &Arc<InPort>) -> Result<()> {
        out.connect(input)?;
        input.connect(out)?;
        Ok(())
    }

    /// Sort the members so every filter comes after its upstream peers.
    ///
    /// If the graph has a cycle the sort comes up short; the current order
    /// is then kept and the unsorted filters are logged.
    pub fn reorder_filters(&self) {
        let mut members = self.filters.lock();
        let count = members.len();
        let index: HashMap<usize, usize> = members
            .iter()
            .enumerate()
            .map(|(i, f)| (filter_key(f), i))
            .collect();

        let mut edges: HashSet<(usize, usize)> = HashSet::new();
        for (i, filter) in members.iter().enumerate() {
            for pre in filter.pre_filters() {
                if let Some(&p) = index.get(&filter_key(&pre)) {
                    edges.insert((p, i));
                }
            }
            for next in filter.next_filters() {
                if let Some(&n) = index.get(&filter_key(&next)) {
                    edges.insert((i, n));
                }
            }
        }

        let mut in_degree = vec![0usize; count];
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); count];
        for &(from, to) in &edges {
            in_degree[to] += 1;
            successors[from].push(to);
        }
        for next in &mut successors {
            next.sort_unstable_by(|a, b| b.cmp(a));
        }

        let mut stack: Vec<usize> = (0..count).rev().filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(count);
        while let Some(i) = stack.pop() {
            order.push(i);
            for &next in &successors[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    stack.push(next);
                }
            }
        }

        if order.len() == count {
            let sorted: Vec<Arc<dyn Filter>> =
                order.iter().map(|&i| Arc::clone(&members[i])).collect();
            *members = sorted;
        } else {
            let placed: HashSet<usize> = order.into_iter().collect();
            let unsorted: Vec<&str> = (0..count)
                .filter(|i| !placed.contains(i))
                .map(|i| members[i].name())
                .collect();
            tracing::warn!(
                "pipeline '{}' has a cycle through {:?}, keeping insertion order",
                self.name,
                unsorted
            );
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Filters in lifecycle order: sinks first.
    fn sink_first(&self) -> Vec<Arc<dyn Filter>> {
        let mut filters = self.filters();
        filters.reverse();
        filters
    }

    fn run_all(
        &self,
        operation: &'static str,
        call: impl Fn(&Arc<dyn Filter>) -> Result<()>,
    ) -> Result<()> {
        let _span = instrument_pipeline(&self.tracing, &self.name, operation);
        self.metrics.record_operation(operation);
        for filter in self.sink_first() {
            let _filter_span = instrument_filter(&self.tracing, &self.name, filter.name(), operation);
            if let Err(e) = call(&filter) {
                self.metrics.record_error();
                trace_filter_error(&self.name, filter.name(), operation, e);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Sort the members and prepare them, sinks first.
    ///
    /// The pipeline becomes `Ready` once every member has emitted a
    /// `Ready` event.
    pub fn prepare(&self) -> Result<()> {
        self.reorder_filters();
        self.set_state(FilterState::Preparing);
        self.run_all("prepare", |f| f.prepare())
    }

    /// Start every member, sinks first.
    pub fn start(&self) -> Result<()> {
        self.run_all("start", |f| f.start())?;
        self.set_state(FilterState::Running);
        Ok(())
    }

    /// Pause every member, sinks first.
    ///
    /// Only valid from `Ready` or `Running`; pausing a paused pipeline is a
    /// no-op. A member failing to pause is logged and the rest are still
    /// paused.
    pub fn pause(&self) -> Result<()> {
        match self.state() {
            FilterState::Paused => return Ok(()),
            FilterState::Ready | FilterState::Running => {}
            state => {
                tracing::warn!("pipeline '{}' cannot pause from {:?}", self.name, state);
                return Err(Error::InvalidOperation);
            }
        }

        let _span = instrument_pipeline(&self.tracing, &self.name, "pause");
        self.metrics.record_operation("pause");
        for filter in self.sink_first() {
            let _filter_span = instrument_filter(&self.tracing, &self.name, filter.name(), "pause");
            if let Err(e) = filter.pause() {
                self.metrics.record_error();
                trace_filter_error(&self.name, filter.name(), "pause", e);
            }
        }
        self.set_state(FilterState::Paused);
        Ok(())
    }

    /// Resume every member, sinks first.
    pub fn resume(&self) -> Result<()> {
        self.run_all("resume", |f| f.resume())?;
        self.set_state(FilterState::Running);
        Ok(())
    }

    /// Stop every member, sinks first, then drop filters queued by
    /// [`remove_filter_chain`](Self::remove_filter_chain).
    pub fn stop(&self) -> Result<()> {
        self.ready.lock().clear();
        self.run_all("stop", |f| f.stop())?;

        let removed = std::mem::take(&mut *self.filters_to_remove.lock());
        if !removed.is_empty() {
            let keys: HashSet<usize> = removed.iter().map(filter_key).collect();
            self.filters.lock().retain(|f| !keys.contains(&filter_key(f)));
            tracing::debug!("pipeline '{}' removed {} filters", self.name, removed.len());
        }
        self.set_state(FilterState::Initialized);
        Ok(())
    }

    /// Tell every member to start discarding buffered data.
    pub fn flush_start(&self) {
        let _span = instrument_pipeline(&self.tracing, &self.name, "flush_start");
        for filter in self.sink_first() {
            filter.flush_start();
        }
    }

    /// Tell every member that the flush is over.
    pub fn flush_end(&self) {
        let _span = instrument_pipeline(&self.tracing, &self.name, "flush_end");
        for filter in self.sink_first() {
            filter.flush_end();
        }
    }

    /// Emit the aggregate `Ready` once every member has reported.
    fn complete_ready(&self) {
        let members: Vec<String> = self.filters.lock().iter().map(|f| f.name().to_string()).collect();
        {
            let mut ready = self.ready.lock();
            if ready.is_empty() || !members.iter().all(|name| ready.contains(name)) {
                return;
            }
            ready.clear();
        }
        self.set_state(FilterState::Ready);
        tracing::debug!("pipeline '{}' is ready", self.name);
        self.forward_event(Event::new(self.name.clone(), EventType::Ready));
    }

    fn forward_event(&self, event: Event) {
        let receiver = self.upstream.read().receiver.as_ref().and_then(Weak::upgrade);
        match receiver {
            Some(receiver) => receiver.on_event(event),
            None => tracing::debug!("pipeline '{}' has no receiver for {}", self.name, event),
        }
    }
}

impl EventReceiver for Pipeline {
    fn on_event(&self, event: Event) {
        if !event.is_ready() {
            self.forward_event(event);
            return;
        }

        if self.find_filter(&event.src_filter).is_none() {
            tracing::debug!(
                "pipeline '{}' ignoring ready from non-member '{}'",
                self.name,
                event.src_filter
            );
            return;
        }
        self.ready.lock().insert(event.src_filter);
        self.complete_ready();
    }
}

impl FilterCallback for Pipeline {
    fn on_callback(&self, filter: &Arc<dyn Filter>, command: FilterCallbackCommand) {
        let callback = self.upstream.read().callback.as_ref().and_then(Weak::upgrade);
        match callback {
            Some(callback) => callback.on_callback(filter, command),
            None => tracing::debug!(
                "pipeline '{}' dropped callback {:?} from '{}'",
                self.name,
                command,
                filter.name()
            ),
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.filters.lock().iter().map(|f| f.name().to_string()).collect();
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("filters", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterBase, FilterType};

    struct Node {
        base: FilterBase,
    }

    impl Filter for Node {
        fn base(&self) -> &FilterBase {
            &self.base
        }
    }

    fn node(name: &str, filter_type: FilterType) -> Arc<dyn Filter> {
        Arc::new(Node {
            base: FilterBase::new(name, filter_type),
        })
    }

    #[test]
    fn test_add_filters_dedups() {
        let pipeline = Pipeline::new("test");
        let a = node("a", FilterType::MediaSource);
        let b = node("b", FilterType::AudioSink);
        pipeline.add_filters(&[a.clone(), b.clone()]).unwrap();
        pipeline.add_filters(&[a.clone()]).unwrap();

        assert_eq!(pipeline.filter_count(), 2);
        assert_eq!(a.state(), FilterState::Initialized);
        assert!(pipeline.find_filter("b").is_some());
        assert!(pipeline.find_filter("c").is_none());
    }

    #[test]
    fn test_add_filters_rejects_duplicate_name() {
        let pipeline = Pipeline::new("test");
        let dec = node("dec", FilterType::AudioDecoder);
        pipeline.add_filters(&[dec.clone()]).unwrap();

        let twin = node("dec", FilterType::AudioDecoder);
        let sink = node("sink", FilterType::AudioSink);
        assert_eq!(
            pipeline.add_filters(&[sink.clone(), twin.clone()]),
            Err(Error::InvalidParameterValue)
        );
        assert_eq!(pipeline.filter_count(), 1);
        assert_eq!(twin.state(), FilterState::Created);
        assert!(pipeline.find_filter("sink").is_none());
    }

    #[test]
    fn test_link_requires_default_ports() {
        let pipeline = Pipeline::new("test");
        let sink = node("sink", FilterType::AudioSink);
        let src = node("src", FilterType::MediaSource);
        pipeline.add_filters(&[sink.clone(), src.clone()]).unwrap();

        // A sink has no output to link from.
        assert_eq!(pipeline.link_filters(&[sink, src]), Err(Error::NotExisted));
    }

    #[test]
    fn test_reorder_sorts_by_links() {
        let pipeline = Pipeline::new("test");
        let src = node("src", FilterType::MediaSource);
        let mid = node("mid", FilterType::Generic);
        let sink = node("sink", FilterType::AudioSink);
        pipeline
            .add_filters(&[sink.clone(), mid.clone(), src.clone()])
            .unwrap();
        pipeline.link_filters(&[src, mid, sink]).unwrap();

        pipeline.reorder_filters();
        let names: Vec<String> = pipeline.filters().iter().map(|f| f.name().to_string()).collect();
        assert_eq!(names, ["src", "mid", "sink"]);
    }

    #[test]
    fn test_remove_filter() {
        let pipeline = Pipeline::new("test");
        let a = node("a", FilterType::Generic);
        pipeline.add_filters(&[a.clone()]).unwrap();
        pipeline.remove_filter(&a).unwrap();
        assert_eq!(pipeline.filter_count(), 0);
        assert_eq!(pipeline.remove_filter(&a), Err(Error::NotExisted));
    }

    #[test]
    fn test_pause_requires_ready_or_running() {
        let pipeline = Pipeline::new("test");
        assert_eq!(pipeline.pause(), Err(Error::InvalidOperation));
    }
}
