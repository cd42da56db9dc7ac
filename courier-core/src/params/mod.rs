//! Handler parameter declarations and resolved arguments
//!
//! A route declares one [`ParameterSpec`] per handler argument. Before the
//! handler runs, [`resolve`] turns the list into [`Args`], one [`Arg`] per
//! spec in declaration order. Resolution never fails: missing or
//! unparseable values become zero, `false`, [`Arg::Null`], or an invalid
//! [`Required`], and `Required` outcomes are collected in a
//! [`ValidationResult`].

mod resolve;

pub use resolve::{resolve, InvocationScope};

use std::collections::HashMap;
use std::ops::Index;
use std::sync::Arc;

use bytes::Bytes;

use crate::body::{FileUpload, FormFields};
pub use crate::context::MatchedPath;
use crate::dispatch::{ResponseHandle, ResponsePusher};
use crate::http::{HttpCookie, HttpRequest, QueryParams};
use crate::session::SessionHandle;

/// Where a parameter's value comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Path,
    Query,
    Header,
    Cookie,
    Form,
    Session,
    /// An entire request-scoped object rather than a keyed value
    WholeObject(WholeObject),
}

/// Objects a handler can receive whole
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WholeObject {
    Request,
    Response,
    Session,
    Query,
    Cookies,
    Form,
    Files,
    MatchedPath,
    Validation,
    Pusher,
    Body,
}

/// Target type of a keyed parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Str,
    I32,
    I64,
    U32,
    U64,
    F32,
    F64,
    Bool,
    /// The whole cookie (cookie sources only)
    Cookie,
    /// A nested form entry (`a[x]`, `a[y]`)
    Map,
    Json,
}

impl ValueType {
    /// Value used for a missing or unparseable plain parameter
    fn zero(self) -> Option<Value> {
        match self {
            ValueType::I32 => Some(Value::I32(0)),
            ValueType::I64 => Some(Value::I64(0)),
            ValueType::U32 => Some(Value::U32(0)),
            ValueType::U64 => Some(Value::U64(0)),
            ValueType::F32 => Some(Value::F32(0.0)),
            ValueType::F64 => Some(Value::F64(0.0)),
            ValueType::Bool => Some(Value::Bool(false)),
            ValueType::Str | ValueType::Cookie | ValueType::Map | ValueType::Json => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrapper {
    Plain,
    /// Never null: resolves to [`Required`] with a validity flag
    Required,
}

/// One declared handler parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    source: Source,
    key: Option<String>,
    target: ValueType,
    wrapper: Wrapper,
}

impl ParameterSpec {
    fn keyed(source: Source, key: &str) -> Self {
        Self { source, key: Some(key.to_string()), target: ValueType::Str, wrapper: Wrapper::Plain }
    }

    pub fn path(key: &str) -> Self {
        Self::keyed(Source::Path, key)
    }

    pub fn query(key: &str) -> Self {
        Self::keyed(Source::Query, key)
    }

    pub fn header(key: &str) -> Self {
        Self::keyed(Source::Header, key)
    }

    pub fn cookie(key: &str) -> Self {
        Self::keyed(Source::Cookie, key)
    }

    pub fn form(key: &str) -> Self {
        Self::keyed(Source::Form, key)
    }

    pub fn session(key: &str) -> Self {
        Self::keyed(Source::Session, key)
    }

    pub fn whole(object: WholeObject) -> Self {
        Self {
            source: Source::WholeObject(object),
            key: None,
            target: ValueType::Str,
            wrapper: Wrapper::Plain,
        }
    }

    /// Set the target type (defaults to [`ValueType::Str`])
    pub fn of(mut self, target: ValueType) -> Self {
        self.target = target;
        self
    }

    pub fn required(mut self) -> Self {
        self.wrapper = Wrapper::Required;
        self
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn target(&self) -> ValueType {
        self.target
    }

    pub fn wrapper(&self) -> Wrapper {
        self.wrapper
    }

    /// Name used in validation reports
    pub fn label(&self) -> String {
        match (&self.key, self.source) {
            (Some(key), source) => format!("{:?}:{}", source, key).to_lowercase(),
            (None, source) => format!("{:?}", source).to_lowercase(),
        }
    }
}

/// A coerced parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Cookie(HttpCookie),
    Map(HashMap<String, String>),
    Json(serde_json::Value),
}

/// A value that may be absent, with the outcome of its presence check
#[derive(Debug, Clone, PartialEq)]
pub struct Required<T> {
    pub value: Option<T>,
    pub valid: bool,
}

impl<T> Required<T> {
    pub fn present(value: T) -> Self {
        Self { value: Some(value), valid: true }
    }

    pub fn missing() -> Self {
        Self { value: None, valid: false }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn into_inner(self) -> Option<T> {
        self.value
    }
}

/// Presence checks of every `Required` parameter of a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    checked: usize,
    failures: Vec<String>,
}

impl ValidationResult {
    pub fn record(&mut self, label: &str, valid: bool) {
        self.checked += 1;
        if !valid {
            self.failures.push(label.to_string());
        }
    }

    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }

    /// Labels of the parameters that failed, in declaration order
    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    pub fn checked(&self) -> usize {
        self.checked
    }
}

/// One resolved handler argument
#[derive(Debug, Clone)]
pub enum Arg {
    Null,
    Value(Value),
    Required(Required<Value>),
    Request(Arc<HttpRequest>),
    Response(ResponseHandle),
    Session(SessionHandle),
    Query(QueryParams),
    Cookies(HashMap<String, HttpCookie>),
    Form(FormFields),
    Files(Vec<Arc<FileUpload>>),
    MatchedPath(MatchedPath),
    Validation(ValidationResult),
    Pusher(ResponsePusher),
    Body(Bytes),
}

impl Arg {
    pub fn is_null(&self) -> bool {
        matches!(self, Arg::Null)
    }

    /// The plain value, or the value inside a valid `Required`
    pub fn value(&self) -> Option<&Value> {
        match self {
            Arg::Value(value) => Some(value),
            Arg::Required(required) => required.value(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.value()? {
            Value::Str(s) => Some(s),
            Value::Cookie(cookie) => Some(cookie.value()),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self.value()? {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.value()? {
            Value::I64(v) => Some(*v),
            Value::I32(v) => Some(i64::from(*v)),
            Value::U32(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self.value()? {
            Value::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self.value()? {
            Value::U64(v) => Some(*v),
            Value::U32(v) => Some(u64::from(*v)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.value()? {
            Value::F64(v) => Some(*v),
            Value::F32(v) => Some(f64::from(*v)),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.value()? {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_cookie(&self) -> Option<&HttpCookie> {
        match self.value()? {
            Value::Cookie(cookie) => Some(cookie),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, String>> {
        match self.value()? {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self.value()? {
            Value::Json(json) => Some(json),
            _ => None,
        }
    }

    pub fn as_required(&self) -> Option<&Required<Value>> {
        match self {
            Arg::Required(required) => Some(required),
            _ => None,
        }
    }

    pub fn as_request(&self) -> Option<&Arc<HttpRequest>> {
        match self {
            Arg::Request(request) => Some(request),
            _ => None,
        }
    }

    pub fn as_response(&self) -> Option<&ResponseHandle> {
        match self {
            Arg::Response(response) => Some(response),
            _ => None,
        }
    }

    pub fn as_session(&self) -> Option<&SessionHandle> {
        match self {
            Arg::Session(session) => Some(session),
            _ => None,
        }
    }

    pub fn as_query(&self) -> Option<&QueryParams> {
        match self {
            Arg::Query(query) => Some(query),
            _ => None,
        }
    }

    pub fn as_cookies(&self) -> Option<&HashMap<String, HttpCookie>> {
        match self {
            Arg::Cookies(cookies) => Some(cookies),
            _ => None,
        }
    }

    pub fn as_form(&self) -> Option<&FormFields> {
        match self {
            Arg::Form(form) => Some(form),
            _ => None,
        }
    }

    pub fn as_files(&self) -> Option<&[Arc<FileUpload>]> {
        match self {
            Arg::Files(files) => Some(files),
            _ => None,
        }
    }

    pub fn as_matched_path(&self) -> Option<&MatchedPath> {
        match self {
            Arg::MatchedPath(path) => Some(path),
            _ => None,
        }
    }

    pub fn as_validation(&self) -> Option<&ValidationResult> {
        match self {
            Arg::Validation(validation) => Some(validation),
            _ => None,
        }
    }

    pub fn as_pusher(&self) -> Option<&ResponsePusher> {
        match self {
            Arg::Pusher(pusher) => Some(pusher),
            _ => None,
        }
    }

    pub fn as_body(&self) -> Option<&Bytes> {
        match self {
            Arg::Body(body) => Some(body),
            _ => None,
        }
    }
}

/// Resolved arguments, in declaration order
#[derive(Debug, Clone, Default)]
pub struct Args(Vec<Arg>);

impl Args {
    pub fn new(args: Vec<Arg>) -> Self {
        Self(args)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arg> {
        self.0.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arg> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<Arg> {
        self.0
    }
}

impl Index<usize> for Args {
    type Output = Arg;

    fn index(&self, index: usize) -> &Arg {
        &self.0[index]
    }
}
