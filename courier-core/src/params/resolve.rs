//! Parameter resolution

use std::collections::HashMap;

use super::{
    Arg, Args, ParameterSpec, Required, Source, ValidationResult, Value, ValueType, WholeObject,
    Wrapper,
};
use crate::body::FormValue;
use crate::context::RequestContext;
use crate::dispatch::{ResponseHandle, ResponsePusher};
use crate::http::HttpCookie;

/// Arguments that exist independently of the request's content
#[derive(Debug, Clone)]
pub struct InvocationScope {
    pub response: ResponseHandle,
    pub pusher: ResponsePusher,
}

/// A raw value found for a keyed parameter, before coercion
enum Raw<'a> {
    Text(&'a str),
    Cookie(&'a HttpCookie),
    Map(&'a HashMap<String, String>),
    Json(serde_json::Value),
}

impl Raw<'_> {
    fn is_empty(&self) -> bool {
        match self {
            Raw::Text(text) => text.is_empty(),
            Raw::Cookie(cookie) => cookie.value().is_empty(),
            Raw::Map(map) => map.is_empty(),
            Raw::Json(json) => json.is_null() || json.as_str().is_some_and(str::is_empty),
        }
    }
}

/// Resolve `specs` against the request, in declaration order.
///
/// Never fails and never mutates the context. The validation result
/// covers every `Required` spec, including those declared after a
/// [`WholeObject::Validation`] parameter.
pub fn resolve(
    specs: &[ParameterSpec],
    ctx: &RequestContext,
    scope: &InvocationScope,
) -> (Args, ValidationResult) {
    let mut validation = ValidationResult::default();
    for spec in specs.iter().filter(|spec| spec.wrapper() == Wrapper::Required) {
        if let Source::WholeObject(_) = spec.source() {
            continue;
        }
        let valid = lookup(spec, ctx)
            .filter(|raw| !raw.is_empty())
            .and_then(|raw| coerce(raw, spec.target()))
            .is_some();
        validation.record(&spec.label(), valid);
    }

    let args = specs.iter().map(|spec| resolve_one(spec, ctx, scope, &validation)).collect();
    if !validation.is_valid() {
        log::debug!(
            "Required parameters missing for {}: {:?}",
            ctx.path(),
            validation.failures()
        );
    }
    (Args::new(args), validation)
}

fn resolve_one(
    spec: &ParameterSpec,
    ctx: &RequestContext,
    scope: &InvocationScope,
    validation: &ValidationResult,
) -> Arg {
    if let Source::WholeObject(object) = spec.source() {
        return whole_object(object, ctx, scope, validation);
    }

    let raw = lookup(spec, ctx);
    match spec.wrapper() {
        Wrapper::Plain => {
            let value = raw.and_then(|raw| coerce(raw, spec.target()));
            match value.or_else(|| spec.target().zero()) {
                Some(value) => Arg::Value(value),
                None => Arg::Null,
            }
        }
        Wrapper::Required => {
            let value = raw
                .filter(|raw| !raw.is_empty())
                .and_then(|raw| coerce(raw, spec.target()));
            Arg::Required(match value {
                Some(value) => Required::present(value),
                None => Required::missing(),
            })
        }
    }
}

fn whole_object(
    object: WholeObject,
    ctx: &RequestContext,
    scope: &InvocationScope,
    validation: &ValidationResult,
) -> Arg {
    match object {
        WholeObject::Request => Arg::Request(ctx.request().clone()),
        WholeObject::Response => Arg::Response(scope.response.clone()),
        WholeObject::Session => match ctx.session() {
            Some(session) => Arg::Session(session.clone()),
            None => Arg::Null,
        },
        WholeObject::Query => Arg::Query(ctx.query().clone()),
        WholeObject::Cookies => Arg::Cookies(ctx.cookies().clone()),
        WholeObject::Form => Arg::Form(ctx.form().clone()),
        WholeObject::Files => Arg::Files(ctx.files().to_vec()),
        WholeObject::MatchedPath => Arg::MatchedPath(ctx.matched_path()),
        WholeObject::Validation => Arg::Validation(validation.clone()),
        WholeObject::Pusher => Arg::Pusher(scope.pusher.clone()),
        WholeObject::Body => Arg::Body(ctx.body_bytes()),
    }
}

fn lookup<'a>(spec: &ParameterSpec, ctx: &'a RequestContext) -> Option<Raw<'a>> {
    let key = spec.key()?;
    match spec.source() {
        Source::Path => ctx.path_param(key).map(Raw::Text),
        Source::Query => ctx.request().query_param(key).map(Raw::Text),
        Source::Header => ctx.request().header(key).map(Raw::Text),
        Source::Cookie => ctx.request().cookie(key).map(Raw::Cookie),
        Source::Form => match ctx.form().get(key)? {
            FormValue::Nested(map) => Some(Raw::Map(map)),
            scalar => scalar.first().map(Raw::Text),
        },
        Source::Session => ctx.session().and_then(|session| session.get(key)).map(Raw::Json),
        Source::WholeObject(_) => None,
    }
}

fn coerce(raw: Raw<'_>, target: ValueType) -> Option<Value> {
    match raw {
        Raw::Text(text) => coerce_text(text, target),
        Raw::Cookie(cookie) => match target {
            ValueType::Cookie => Some(Value::Cookie(cookie.clone())),
            _ => coerce_text(cookie.value(), target),
        },
        Raw::Map(map) => match target {
            ValueType::Map => Some(Value::Map(map.clone())),
            ValueType::Json => serde_json::to_value(map).ok().map(Value::Json),
            _ => None,
        },
        Raw::Json(json) => coerce_json(json, target),
    }
}

fn coerce_text(text: &str, target: ValueType) -> Option<Value> {
    let trimmed = text.trim();
    match target {
        ValueType::Str => Some(Value::Str(text.to_string())),
        ValueType::I32 => trimmed.parse().ok().map(Value::I32),
        ValueType::I64 => trimmed.parse().ok().map(Value::I64),
        ValueType::U32 => trimmed.parse().ok().map(Value::U32),
        ValueType::U64 => trimmed.parse().ok().map(Value::U64),
        ValueType::F32 => trimmed.parse().ok().map(Value::F32),
        ValueType::F64 => trimmed.parse().ok().map(Value::F64),
        ValueType::Bool => parse_bool(trimmed).map(Value::Bool),
        ValueType::Json => Some(Value::Json(serde_json::Value::String(text.to_string()))),
        ValueType::Cookie | ValueType::Map => None,
    }
}

fn coerce_json(json: serde_json::Value, target: ValueType) -> Option<Value> {
    if target == ValueType::Json {
        return Some(Value::Json(json));
    }
    match json {
        serde_json::Value::String(text) => coerce_text(&text, target),
        serde_json::Value::Number(number) => coerce_text(&number.to_string(), target),
        serde_json::Value::Bool(flag) => match target {
            ValueType::Bool => Some(Value::Bool(flag)),
            ValueType::Str => Some(Value::Str(flag.to_string())),
            _ => None,
        },
        object @ serde_json::Value::Object(_) if target == ValueType::Map => {
            serde_json::from_value::<HashMap<String, String>>(object).ok().map(Value::Map)
        }
        _ => None,
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Some(true),
        "false" | "0" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Reply;
    use crate::http::{HttpMethod, HttpRequest, HttpVersion, MediaType};
    use crate::routing::{Route, RouteMatch};
    use crate::session::{MemorySessionStore, SessionStore};
    use std::sync::Arc;

    fn context(target: &str, headers: &[(&str, &str)]) -> RequestContext {
        let headers = headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let request = Arc::new(HttpRequest::new(
            HttpMethod::GET,
            target.to_string(),
            HttpVersion::Http1_1,
            headers,
        ));
        let route =
            Route::builder("/items/{id}/{slug}").handler(|_| Ok(Reply::empty())).build().unwrap();
        let params = route.pattern().matches(request.path()).unwrap_or_default();
        RequestContext::matched(
            request,
            RouteMatch { route: Arc::new(route), params, media_type: MediaType::json() },
        )
    }

    fn scope() -> InvocationScope {
        InvocationScope { response: ResponseHandle::new(), pusher: ResponsePusher::detached() }
    }

    #[test]
    fn test_path_and_query_coercion() {
        let ctx = context("/items/42/hello?page=3&ratio=0.5&debug=true&bad=x", &[]);
        let specs = vec![
            ParameterSpec::path("id").of(ValueType::U64),
            ParameterSpec::path("slug"),
            ParameterSpec::query("page").of(ValueType::I32),
            ParameterSpec::query("ratio").of(ValueType::F64),
            ParameterSpec::query("debug").of(ValueType::Bool),
            ParameterSpec::query("bad").of(ValueType::I64),
        ];

        let (args, validation) = resolve(&specs, &ctx, &scope());
        assert_eq!(args.len(), 6);
        assert_eq!(args[0].as_u64(), Some(42));
        assert_eq!(args[1].as_str(), Some("hello"));
        assert_eq!(args[2].as_i32(), Some(3));
        assert_eq!(args[3].as_f64(), Some(0.5));
        assert_eq!(args[4].as_bool(), Some(true));
        assert_eq!(args[5].as_i64(), Some(0));
        assert!(validation.is_valid());
    }

    #[test]
    fn test_missing_values_never_fail() {
        let ctx = context("/items/1/a", &[]);
        let specs = vec![
            ParameterSpec::path("missing").of(ValueType::I32),
            ParameterSpec::query("flag").of(ValueType::Bool),
            ParameterSpec::query("name"),
            ParameterSpec::cookie("sid").of(ValueType::Cookie),
            ParameterSpec::form("tags").of(ValueType::Map),
        ];

        let (args, _) = resolve(&specs, &ctx, &scope());
        assert_eq!(args[0].as_i32(), Some(0));
        assert_eq!(args[1].as_bool(), Some(false));
        assert!(args[2].is_null());
        assert!(args[3].is_null());
        assert!(args[4].is_null());
    }

    #[test]
    fn test_required_wrapper() {
        let ctx = context("/items/1/a?name=bob&empty=&n=x", &[]);
        let specs = vec![
            ParameterSpec::whole(WholeObject::Validation),
            ParameterSpec::query("name").required(),
            ParameterSpec::query("absent").of(ValueType::I32).required(),
            ParameterSpec::query("empty").required(),
            ParameterSpec::query("n").of(ValueType::I32).required(),
        ];

        let (args, validation) = resolve(&specs, &ctx, &scope());

        let name = args[1].as_required().unwrap();
        assert!(name.is_valid());
        assert_eq!(name.value(), Some(&Value::Str("bob".to_string())));

        for index in 2..5 {
            let required = args[index].as_required().unwrap();
            assert!(!required.is_valid());
            assert!(required.value().is_none());
        }

        assert_eq!(validation.checked(), 4);
        assert_eq!(validation.failures().len(), 3);
        let reported = args[0].as_validation().unwrap();
        assert_eq!(reported, &validation);
    }

    #[test]
    fn test_headers_and_cookies() {
        let ctx = context(
            "/items/1/a",
            &[("X-Request-Id", "abc"), ("Cookie", "sid=s-1; count=7")],
        );
        let specs = vec![
            ParameterSpec::header("x-request-id"),
            ParameterSpec::cookie("sid").of(ValueType::Cookie),
            ParameterSpec::cookie("count").of(ValueType::U32),
            ParameterSpec::whole(WholeObject::Cookies),
        ];

        let (args, _) = resolve(&specs, &ctx, &scope());
        assert_eq!(args[0].as_str(), Some("abc"));
        assert_eq!(args[1].as_cookie().map(|c| c.value()), Some("s-1"));
        assert_eq!(args[2].as_u32(), Some(7));
        assert_eq!(args[3].as_cookies().map(|c| c.len()), Some(2));
    }

    #[test]
    fn test_form_fields_and_nested_maps() {
        let mut ctx = context("/items/1/a", &[]);
        ctx.add_field("a[x]", "1".to_string());
        ctx.add_field("a[y]", "2".to_string());
        ctx.add_field("age", "31".to_string());

        let specs = vec![
            ParameterSpec::form("a").of(ValueType::Map),
            ParameterSpec::form("age").of(ValueType::U32),
            ParameterSpec::form("a"),
            ParameterSpec::whole(WholeObject::Form),
        ];

        let (args, _) = resolve(&specs, &ctx, &scope());
        let nested = args[0].as_map().unwrap();
        assert_eq!(nested.get("x").map(String::as_str), Some("1"));
        assert_eq!(nested.get("y").map(String::as_str), Some("2"));
        assert_eq!(args[1].as_u32(), Some(31));
        assert!(args[2].is_null());
        assert_eq!(args[3].as_form().map(|f| f.len()), Some(2));
    }

    #[test]
    fn test_session_values() {
        let mut ctx = context("/items/1/a", &[]);
        let store = MemorySessionStore::new();
        let session = store.load(None);
        session.put("user", &"alice").unwrap();
        session.put("visits", &5).unwrap();
        ctx.set_session(session);

        let specs = vec![
            ParameterSpec::session("user"),
            ParameterSpec::session("visits").of(ValueType::I64),
            ParameterSpec::session("visits").of(ValueType::Json),
            ParameterSpec::whole(WholeObject::Session),
        ];

        let (args, _) = resolve(&specs, &ctx, &scope());
        assert_eq!(args[0].as_str(), Some("alice"));
        assert_eq!(args[1].as_i64(), Some(5));
        assert_eq!(args[2].as_json(), Some(&serde_json::json!(5)));
        assert!(args[3].as_session().is_some());
    }

    #[test]
    fn test_whole_objects() {
        let mut ctx = context("/items/7/x?q=1", &[]);
        ctx.append_body(b"raw");
        let specs = vec![
            ParameterSpec::whole(WholeObject::Request),
            ParameterSpec::whole(WholeObject::Response),
            ParameterSpec::whole(WholeObject::Query),
            ParameterSpec::whole(WholeObject::MatchedPath),
            ParameterSpec::whole(WholeObject::Pusher),
            ParameterSpec::whole(WholeObject::Body),
            ParameterSpec::whole(WholeObject::Files),
            ParameterSpec::whole(WholeObject::Session),
        ];

        let (args, _) = resolve(&specs, &ctx, &scope());
        assert_eq!(args[0].as_request().map(|r| r.path()), Some("/items/7/x"));
        assert!(args[1].as_response().is_some());
        assert_eq!(args[2].as_query().map(|q| q.len()), Some(1));
        let matched = args[3].as_matched_path().unwrap();
        assert_eq!(matched.template, "/items/{id}/{slug}");
        assert_eq!(matched.params["id"], "7");
        assert!(args[4].as_pusher().is_some());
        assert_eq!(args[5].as_body().map(|b| b.as_ref()), Some(&b"raw"[..]));
        assert_eq!(args[6].as_files().map(|f| f.len()), Some(0));
        assert!(args[7].is_null());
    }
}
