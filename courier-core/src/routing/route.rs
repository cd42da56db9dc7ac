//! Route definitions

use std::fmt;
use std::sync::Arc;

use super::template::{join_paths, CompiledPattern, PathParams};
use super::RouteError;
use crate::dispatch::{Handler, HandlerResult};
use crate::http::{HttpMethod, HttpRequest, MediaType};
use crate::params::{Args, ParameterSpec, Source, WholeObject};

/// An immutable route: template, predicate, declared parameters and handler
pub struct Route {
    name: Option<String>,
    pattern: CompiledPattern,
    params: Vec<ParameterSpec>,
    priority: i32,
    verbs: Vec<HttpMethod>,
    consumes: Vec<MediaType>,
    produces: Vec<MediaType>,
    handler: Arc<dyn Handler>,
}

impl Route {
    /// Start declaring a route for `template`
    pub fn builder(template: &str) -> RouteBuilder {
        RouteBuilder::new(template)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn template(&self) -> &str {
        self.pattern.template()
    }

    pub fn pattern(&self) -> &CompiledPattern {
        &self.pattern
    }

    pub fn params(&self) -> &[ParameterSpec] {
        &self.params
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Accepted verbs; empty means any
    pub fn verbs(&self) -> &[HttpMethod] {
        &self.verbs
    }

    pub fn consumes(&self) -> &[MediaType] {
        &self.consumes
    }

    pub fn produces(&self) -> &[MediaType] {
        &self.produces
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    /// Whether any declared parameter reads the session
    pub fn needs_session(&self) -> bool {
        self.params.iter().any(|spec| {
            matches!(spec.source(), Source::Session | Source::WholeObject(WholeObject::Session))
        })
    }

    /// Evaluate the route predicate against a request.
    ///
    /// Returns the negotiated media type when the verb, the consumed content
    /// type and the `Accept` ranges are all satisfied.
    pub fn accepts(&self, request: &RequestDescriptor) -> Option<MediaType> {
        if !self.verbs.is_empty() && !self.verbs.contains(&request.method) {
            return None;
        }

        if !self.consumes.is_empty() && request.method.permits_body() {
            if let Some(content_type) = &request.content_type {
                if !self.consumes.iter().any(|declared| declared.matches(content_type)) {
                    return None;
                }
            }
        }

        MediaType::negotiate(&request.accept, &self.produces)
    }

    /// One-line description used in registration logs and route listings
    pub fn describe(&self) -> String {
        let verbs = if self.verbs.is_empty() {
            "*".to_string()
        } else {
            self.verbs.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(",")
        };
        let mut line = format!("{} {} (priority {})", verbs, self.template(), self.priority);
        if !self.produces.is_empty() {
            let produces: Vec<String> = self.produces.iter().map(|m| m.essence()).collect();
            line.push_str(&format!(" -> {}", produces.join(", ")));
        }
        if let Some(name) = &self.name {
            line.push_str(&format!(" [{}]", name));
        }
        line
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("template", &self.template())
            .field("priority", &self.priority)
            .field("verbs", &self.verbs)
            .field("consumes", &self.consumes)
            .field("produces", &self.produces)
            .field("params", &self.params.len())
            .finish()
    }
}

/// Fluent route declaration
pub struct RouteBuilder {
    template: String,
    name: Option<String>,
    params: Vec<ParameterSpec>,
    priority: i32,
    verbs: Vec<HttpMethod>,
    consumes: Vec<MediaType>,
    produces: Vec<MediaType>,
    handler: Option<Arc<dyn Handler>>,
    error: Option<RouteError>,
}

impl RouteBuilder {
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
            name: None,
            params: Vec::new(),
            priority: 0,
            verbs: Vec::new(),
            consumes: Vec::new(),
            produces: Vec::new(),
            handler: None,
            error: None,
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn get(self) -> Self {
        self.verb(HttpMethod::GET)
    }

    pub fn post(self) -> Self {
        self.verb(HttpMethod::POST)
    }

    pub fn put(self) -> Self {
        self.verb(HttpMethod::PUT)
    }

    pub fn delete(self) -> Self {
        self.verb(HttpMethod::DELETE)
    }

    pub fn patch(self) -> Self {
        self.verb(HttpMethod::PATCH)
    }

    pub fn verb(mut self, method: HttpMethod) -> Self {
        if !self.verbs.contains(&method) {
            self.verbs.push(method);
        }
        self
    }

    /// Higher priorities are checked first
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn consumes(mut self, media_type: &str) -> Self {
        match MediaType::parse(media_type) {
            Some(media) => self.consumes.push(media),
            None => self.fail(RouteError::InvalidMediaType(media_type.to_string())),
        }
        self
    }

    pub fn produces(mut self, media_type: &str) -> Self {
        match MediaType::parse(media_type) {
            Some(media) => self.produces.push(media),
            None => self.fail(RouteError::InvalidMediaType(media_type.to_string())),
        }
        self
    }

    /// Declare the next handler parameter; arguments arrive in declaration order
    pub fn param(mut self, spec: ParameterSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(Args) -> HandlerResult + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Use a handler type implementing [`Handler`] directly
    pub fn with_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Prefix the template, as done when a [`super::Scope`] is registered
    pub fn prefixed(mut self, prefix: &str) -> Self {
        self.template = join_paths(prefix, &self.template);
        self
    }

    pub fn build(self) -> Result<Route, RouteError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let pattern = CompiledPattern::compile(&self.template)?;
        let handler = self.handler.ok_or_else(|| RouteError::MissingHandler(self.template))?;

        Ok(Route {
            name: self.name,
            pattern,
            params: self.params,
            priority: self.priority,
            verbs: self.verbs,
            consumes: self.consumes,
            produces: self.produces,
            handler,
        })
    }

    fn fail(&mut self, error: RouteError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

/// The parts of a request the route predicate looks at
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: HttpMethod,
    pub content_type: Option<MediaType>,
    pub accept: Vec<MediaType>,
}

impl RequestDescriptor {
    pub fn new(method: HttpMethod) -> Self {
        Self { method, content_type: None, accept: Vec::new() }
    }

    pub fn from_request(request: &HttpRequest) -> Self {
        Self {
            method: request.method().clone(),
            content_type: request.content_type(),
            accept: request.accept(),
        }
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = MediaType::parse(content_type);
        self
    }

    pub fn with_accept(mut self, accept: &str) -> Self {
        self.accept = MediaType::parse_accept(accept);
        self
    }
}

/// A successful registry lookup
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    pub params: PathParams,
    pub media_type: MediaType,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Reply;

    fn route(builder: RouteBuilder) -> Route {
        builder.handler(|_| Ok(Reply::empty())).build().unwrap()
    }

    #[test]
    fn test_verb_predicate() {
        let any = route(Route::builder("/a"));
        let post = route(Route::builder("/a").post());

        assert!(any.accepts(&RequestDescriptor::new(HttpMethod::DELETE)).is_some());
        assert!(post.accepts(&RequestDescriptor::new(HttpMethod::POST)).is_some());
        assert!(post.accepts(&RequestDescriptor::new(HttpMethod::GET)).is_none());
    }

    #[test]
    fn test_consumes_predicate() {
        let json_only = route(Route::builder("/a").post().consumes("application/json"));

        let json = RequestDescriptor::new(HttpMethod::POST).with_content_type("application/json");
        let form = RequestDescriptor::new(HttpMethod::POST)
            .with_content_type("application/x-www-form-urlencoded");
        let bare = RequestDescriptor::new(HttpMethod::POST);

        assert!(json_only.accepts(&json).is_some());
        assert!(json_only.accepts(&form).is_none());
        assert!(json_only.accepts(&bare).is_some());
    }

    #[test]
    fn test_produces_negotiation() {
        let html = route(Route::builder("/a").produces("text/html"));

        let browser = RequestDescriptor::new(HttpMethod::GET).with_accept("text/html,*/*;q=0.8");
        assert_eq!(html.accepts(&browser), Some(MediaType::html()));

        let api = RequestDescriptor::new(HttpMethod::GET).with_accept("application/json");
        assert!(html.accepts(&api).is_none());
    }

    #[test]
    fn test_build_errors() {
        assert!(matches!(
            Route::builder("/a").build(),
            Err(RouteError::MissingHandler(_))
        ));
        assert!(matches!(
            Route::builder("/a").produces("nonsense").handler(|_| Ok(Reply::empty())).build(),
            Err(RouteError::InvalidMediaType(_))
        ));
        assert!(matches!(
            Route::builder("/a/{x}/{x}").handler(|_| Ok(Reply::empty())).build(),
            Err(RouteError::InvalidTemplate { .. })
        ));
    }

    #[test]
    fn test_needs_session() {
        let plain = route(Route::builder("/a").param(ParameterSpec::query("q")));
        let session = route(Route::builder("/a").param(ParameterSpec::session("user")));

        assert!(!plain.needs_session());
        assert!(session.needs_session());
    }
}
