//! Exact-match route table.

use std::{collections::HashMap, fmt, sync::Arc};

use tracing::warn;

use super::handler::Handler;
use super::handlers;
use super::normalize::trim_path;

/// Immutable mapping from normalized path to handler.
///
/// Built once with [`RouteTable::builder`] before any listener starts and
/// shared read-only by every connection. A path that is not registered
/// resolves to the NotFound handler.
#[derive(Clone)]
pub struct RouteTable {
    routes: HashMap<String, Arc<dyn Handler>>,
    not_found: Arc<dyn Handler>,
}

impl RouteTable {
    /// Start building a route table.
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::default()
    }

    /// Select the handler for a normalized `path`.
    ///
    /// Never fails: a miss returns the NotFound handler.
    pub fn resolve(&self, path: &str) -> Arc<dyn Handler> {
        self.routes
            .get(path)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.not_found))
    }

    /// Whether `path` has a registered handler.
    pub fn contains(&self, path: &str) -> bool {
        self.routes.contains_key(path)
    }

    /// Number of registered routes, not counting the fallback.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Registered paths, sorted.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.paths())
            .finish_non_exhaustive()
    }
}

/// Builder for [`RouteTable`].
pub struct RouteTableBuilder {
    routes: HashMap<String, Arc<dyn Handler>>,
    not_found: Arc<dyn Handler>,
}

impl Default for RouteTableBuilder {
    fn default() -> Self {
        Self {
            routes: HashMap::new(),
            not_found: Arc::new(handlers::not_found),
        }
    }
}

impl RouteTableBuilder {
    /// Register `handler` for `path`.
    ///
    /// `path` is normalized the same way request paths are, so `"/ping/"`
    /// and `"ping"` register the same route. Registering a path twice keeps
    /// the later handler.
    pub fn route(mut self, path: &str, handler: impl Handler + 'static) -> Self {
        let path = trim_path(path).to_owned();
        if self.routes.insert(path.clone(), Arc::new(handler)).is_some() {
            warn!(path = %path, "route registered twice; keeping the later handler");
        }
        self
    }

    /// Replace the handler used for unregistered paths.
    pub fn not_found(mut self, handler: impl Handler + 'static) -> Self {
        self.not_found = Arc::new(handler);
        self
    }

    /// Freeze the table.
    pub fn build(self) -> RouteTable {
        RouteTable {
            routes: self.routes,
            not_found: self.not_found,
        }
    }
}
