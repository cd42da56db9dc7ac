//! Priority-ordered route table

use std::sync::Arc;

use super::route::{RequestDescriptor, Route, RouteBuilder, RouteMatch};
use super::RouteError;
use crate::http::{HttpRequest, HttpResponse};

/// Handler consulted once when no registered route matches (static assets,
/// legacy paths, ...). Returning `None` leaves the miss as a 404.
pub trait Fallback: Send + Sync {
    fn handle(&self, path: &str, request: &HttpRequest) -> Option<HttpResponse>;
}

impl<F> Fallback for F
where
    F: Fn(&str, &HttpRequest) -> Option<HttpResponse> + Send + Sync,
{
    fn handle(&self, path: &str, request: &HttpRequest) -> Option<HttpResponse> {
        self(path, request)
    }
}

/// A group of routes sharing a path prefix
pub struct Scope {
    prefix: String,
    routes: Vec<RouteBuilder>,
}

impl Scope {
    pub fn new(prefix: &str) -> Self {
        Self { prefix: prefix.to_string(), routes: Vec::new() }
    }

    pub fn route(mut self, route: RouteBuilder) -> Self {
        self.routes.push(route);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

/// All registered routes, kept sorted by priority (descending). Routes of
/// equal priority stay in registration order.
#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: Vec<Arc<Route>>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route and restore priority order
    pub fn register(&mut self, route: Route) {
        log::info!("REGISTERED > {}", route.describe());
        self.routes.push(Arc::new(route));
        // sort_by is stable: equal priorities keep registration order
        self.routes.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    /// Build and register a route declaration
    pub fn route(&mut self, builder: RouteBuilder) -> Result<&mut Self, RouteError> {
        let route = builder.build()?;
        self.register(route);
        Ok(self)
    }

    /// Register every route of a scope under its prefix
    pub fn register_scope(&mut self, scope: Scope) -> Result<(), RouteError> {
        let Scope { prefix, routes } = scope;
        for builder in routes {
            self.route(builder.prefixed(&prefix))?;
        }
        Ok(())
    }

    /// First route, in priority order, whose template matches `path` and
    /// whose predicate accepts the request.
    pub fn find(&self, path: &str, request: &RequestDescriptor) -> Option<RouteMatch> {
        self.routes.iter().find_map(|route| {
            let params = route.pattern().matches(path)?;
            let media_type = route.accepts(request)?;
            Some(RouteMatch { route: Arc::clone(route), params, media_type })
        })
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Finish registration; the returned table is shared read-only
    pub fn freeze(self) -> Arc<Self> {
        log::debug!("Route table frozen with {} routes", self.routes.len());
        Arc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Reply;
    use crate::http::{HttpMethod, MediaType};

    fn named(template: &str, name: &str, priority: i32) -> Route {
        Route::builder(template)
            .name(name)
            .priority(priority)
            .handler(|_| Ok(Reply::empty()))
            .build()
            .unwrap()
    }

    fn get() -> RequestDescriptor {
        RequestDescriptor::new(HttpMethod::GET)
    }

    #[test]
    fn test_higher_priority_wins() {
        let mut registry = RouteRegistry::new();
        registry.register(named("/users/{id}", "generic", 0));
        registry.register(named("/users/me", "specific", 10));

        let found = registry.find("/users/me", &get()).unwrap();
        assert_eq!(found.route.name(), Some("specific"));

        let found = registry.find("/users/42", &get()).unwrap();
        assert_eq!(found.route.name(), Some("generic"));
        assert_eq!(found.params["id"], "42");
    }

    #[test]
    fn test_equal_priority_keeps_registration_order() {
        let mut registry = RouteRegistry::new();
        registry.register(named("/items/{a}", "first", 5));
        registry.register(named("/items/{b}", "second", 5));
        registry.register(named("/other", "third", 1));
        registry.register(named("/items/{c}", "fourth", 5));

        let found = registry.find("/items/x", &get()).unwrap();
        assert_eq!(found.route.name(), Some("first"));

        let order: Vec<_> = registry.routes().iter().filter_map(|r| r.name()).collect();
        assert_eq!(order, vec!["first", "second", "fourth", "third"]);
    }

    #[test]
    fn test_predicate_failure_falls_through() {
        let mut registry = RouteRegistry::new();
        registry
            .route(
                Route::builder("/doc")
                    .name("html")
                    .priority(1)
                    .produces("text/html")
                    .handler(|_| Ok(Reply::empty())),
            )
            .unwrap()
            .route(
                Route::builder("/doc")
                    .name("json")
                    .produces("application/json")
                    .handler(|_| Ok(Reply::empty())),
            )
            .unwrap();

        let request = get().with_accept("application/json");
        let found = registry.find("/doc", &request).unwrap();
        assert_eq!(found.route.name(), Some("json"));
        assert_eq!(found.media_type, MediaType::json());

        assert!(registry.find("/doc", &get().with_accept("image/png")).is_none());
    }

    #[test]
    fn test_miss() {
        let registry = RouteRegistry::new();
        assert!(registry.find("/", &get()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_scope_prefix() {
        let mut registry = RouteRegistry::new();
        registry
            .register_scope(
                Scope::new("/api/")
                    .route(Route::builder("/health").handler(|_| Ok(Reply::empty())))
                    .route(Route::builder("/").handler(|_| Ok(Reply::empty()))),
            )
            .unwrap();

        let templates: Vec<_> = registry.routes().iter().map(|r| r.template()).collect();
        assert_eq!(templates, vec!["/api/health", "/api"]);
        assert!(registry.find("/api/health", &get()).is_some());
    }
}
