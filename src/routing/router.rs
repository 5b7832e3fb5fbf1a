//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up the longest matching prefix for a path
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) prefix scan over routes sorted longest-first
//! - Explicit NoMatch rather than silent default

use crate::config::RouteConfig;
use crate::routing::matcher::PathPrefixMatcher;
use crate::routing::RouteClass;

/// A compiled route.
#[derive(Debug, Clone)]
pub struct Route {
    pub matcher: PathPrefixMatcher,
    pub class: RouteClass,
}

/// Result of a successful lookup, borrowing from the table and the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    pub class: RouteClass,
    pub prefix: &'a str,
    pub remainder: &'a str,
}

/// Ordered route table evaluated by longest-prefix match.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Compile the configured routes.
    pub fn from_config(configs: &[RouteConfig]) -> Self {
        let mut routes: Vec<Route> = configs
            .iter()
            .map(|c| Route {
                matcher: PathPrefixMatcher::new(c.prefix.clone()),
                class: c.class,
            })
            .collect();

        // Stable sort keeps config order for equal lengths.
        routes.sort_by(|a, b| b.matcher.prefix().len().cmp(&a.matcher.prefix().len()));

        tracing::debug!(routes = routes.len(), "Route table compiled");
        Self { routes }
    }

    /// Classify a request path.
    pub fn classify(&self, path: &str) -> Option<RouteClass> {
        self.match_path(path).map(|m| m.class)
    }

    /// Find the longest matching route for `path`.
    pub fn match_path<'a>(&'a self, path: &'a str) -> Option<RouteMatch<'a>> {
        self.routes.iter().find_map(|route| {
            route.matcher.strip(path).map(|remainder| RouteMatch {
                class: route.class,
                prefix: route.matcher.prefix(),
                remainder,
            })
        })
    }

    /// All compiled routes, longest prefix first.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Whether any route serves the given class.
    pub fn has_class(&self, class: RouteClass) -> bool {
        self.routes.iter().any(|r| r.class == class)
    }
}
