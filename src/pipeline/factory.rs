//! Filter factory for creating filters by registered name.

use crate::elements::{NullSink, PassThrough};
use crate::error::{Error, Result};
use crate::filter::Filter;
use std::collections::HashMap;
use std::sync::Arc;

/// Constructor registered with a [`FilterFactory`].
///
/// Receives the instance name (alias) the new filter should carry.
pub type FilterConstructor = Box<dyn Fn(&str) -> Arc<dyn Filter> + Send + Sync>;

/// Registry of filter constructors keyed by name.
///
/// Owned by the session and passed to whoever builds pipelines; there is
/// no process-wide instance.
///
/// ```rust
/// use cadence::pipeline::FilterFactory;
///
/// let factory = FilterFactory::with_builtins();
/// let filter = factory.create("builtin.passthrough", "identity").unwrap();
/// assert_eq!(filter.name(), "identity");
/// ```
#[derive(Default)]
pub struct FilterFactory {
    constructors: HashMap<String, FilterConstructor>,
}

impl FilterFactory {
    /// Create an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a factory with the built-in filters registered.
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        factory.register_builtin_filters();
        factory
    }

    /// Register the filters shipped with this crate.
    pub fn register_builtin_filters(&mut self) {
        self.register("builtin.passthrough", |alias| {
            Arc::new(PassThrough::new(alias)) as Arc<dyn Filter>
        });
        self.register("builtin.null_sink", |alias| {
            Arc::new(NullSink::new(alias)) as Arc<dyn Filter>
        });
    }

    /// Register a constructor, replacing any previous one under `name`.
    pub fn register<F>(&mut self, name: &str, constructor: F)
    where
        F: Fn(&str) -> Arc<dyn Filter> + Send + Sync + 'static,
    {
        if self
            .constructors
            .insert(name.to_string(), Box::new(constructor))
            .is_some()
        {
            tracing::debug!("filter factory replaced constructor '{}'", name);
        }
    }

    /// Create a filter registered as `name`, calling it `alias`.
    pub fn create(&self, name: &str, alias: &str) -> Result<Arc<dyn Filter>> {
        let constructor = self.constructors.get(name).ok_or_else(|| {
            tracing::error!("no filter registered as '{}'", name);
            Error::NotExisted
        })?;
        Ok(constructor(alias))
    }

    /// Check if `name` is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// List registered names, sorted.
    pub fn list_filters(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for FilterFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterFactory")
            .field("filters", &self.list_filters())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterType;

    #[test]
    fn test_builtins() {
        let factory = FilterFactory::with_builtins();
        assert!(factory.is_registered("builtin.passthrough"));
        assert!(factory.is_registered("builtin.null_sink"));
        assert_eq!(
            factory.list_filters(),
            vec!["builtin.null_sink".to_string(), "builtin.passthrough".to_string()]
        );

        let sink = factory.create("builtin.null_sink", "audio_sink").unwrap();
        assert_eq!(sink.name(), "audio_sink");
        assert!(sink.filter_type().is_sink());
    }

    #[test]
    fn test_unknown_filter() {
        let factory = FilterFactory::new();
        assert!(matches!(
            factory.create("builtin.player.demuxer", "demuxer"),
            Err(Error::NotExisted)
        ));
    }

    #[test]
    fn test_custom_constructor() {
        let mut factory = FilterFactory::new();
        factory.register("custom.identity", |alias| {
            Arc::new(PassThrough::new(alias)) as Arc<dyn Filter>
        });
        let filter = factory.create("custom.identity", "id0").unwrap();
        assert_eq!(filter.filter_type(), FilterType::Generic);
    }
}
