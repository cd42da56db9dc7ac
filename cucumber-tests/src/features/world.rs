use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use courier_core::config::FilesConfig;
use courier_core::connection::{Connection, Progress};
use courier_core::dispatch::{Dispatched, Dispatcher, Reply};
use courier_core::http::{HttpRequest, HttpResponse};
use courier_core::params::{Args, ParameterSpec, ValueType, WholeObject};
use courier_core::routing::Route;
use cucumber::World as CucumberWorld;

/// Boundary used by the multipart bodies the steps build
pub const BOUNDARY: &str = "courier-boundary";

/// Scenario state: a dispatcher over the fixture routes, one connection,
/// and what the last exchange produced.
#[derive(CucumberWorld)]
pub struct CourierWorld {
    pub files: FilesConfig,
    pub dispatcher: Option<Arc<Dispatcher>>,
    pub connection: Option<Connection>,
    pub calls: Arc<AtomicUsize>,
    pub response: Option<HttpResponse>,
    pub responses: Vec<HttpResponse>,
    pub body: Vec<u8>,
}

impl Default for CourierWorld {
    fn default() -> Self {
        Self {
            files: FilesConfig::default(),
            dispatcher: None,
            connection: None,
            calls: Arc::new(AtomicUsize::new(0)),
            response: None,
            responses: Vec::new(),
            body: Vec::new(),
        }
    }
}

impl std::fmt::Debug for CourierWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CourierWorld")
            .field("files", &self.files)
            .field("calls", &self.calls.load(Ordering::SeqCst))
            .field("response", &self.response.as_ref().map(|r| r.status()))
            .field("responses", &self.responses.len())
            .finish()
    }
}

impl CourierWorld {
    /// Build the dispatcher over the fixture routes
    pub fn start(&mut self) -> Result<(), String> {
        let dispatcher = fixture_dispatcher(self.files.clone(), Arc::clone(&self.calls))?;
        let dispatcher = Arc::new(dispatcher);
        self.connection = Some(Connection::new(Arc::clone(&dispatcher)));
        self.dispatcher = Some(dispatcher);
        Ok(())
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(self.dispatcher.as_ref().expect("dispatcher not started"))
    }

    pub fn connection(&mut self) -> &mut Connection {
        self.connection.as_mut().expect("dispatcher not started")
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Feed a request head to the connection. Returns the response when the
    /// exchange completes without a body.
    pub async fn send_head(&mut self, head: &str) {
        let request = HttpRequest::parse_head(head.as_bytes()).expect("valid request head");
        self.response = None;
        let progress = self.connection().on_request(request);
        self.advance(progress).await;
    }

    pub async fn send_chunk(&mut self, chunk: &[u8]) {
        let progress = self.connection().on_chunk(chunk);
        self.advance(progress).await;
    }

    pub async fn send_last(&mut self) {
        let progress = self.connection().on_last();
        self.advance(progress).await;
    }

    /// Send a whole exchange: head, then the body in chunks of `chunk_size`
    pub async fn exchange(&mut self, head: &str, body: &[u8], chunk_size: usize) {
        self.send_head(head).await;
        if self.response.is_some() {
            return;
        }
        for chunk in body.chunks(chunk_size.max(1)) {
            self.send_chunk(chunk).await;
            if self.response.is_some() {
                return;
            }
        }
        self.send_last().await;
    }

    async fn advance(&mut self, progress: Progress) {
        let dispatcher = self.dispatcher();
        let response = match progress {
            Progress::Pending => return,
            Progress::Respond(response) => response,
            Progress::Invoke(ctx) => match self.connection().invoke(ctx) {
                Dispatched::Ready(response) => response,
                Dispatched::Deferred(deferred) => dispatcher.resolve_deferred(deferred).await,
            },
        };
        self.finish(response);
    }

    fn finish(&mut self, mut response: HttpResponse) {
        let dispatcher = self.dispatcher();
        let conn = self.connection();
        if let Some(request) = conn.request().cloned() {
            dispatcher.finalize(&mut response, &request, true);
            dispatcher.record_access(&request, &response);
        }
        conn.on_written();
        self.responses.push(response.clone());
        self.response = Some(response);
    }

    pub fn response(&self) -> &HttpResponse {
        self.response.as_ref().expect("no response was produced")
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(self.response().body_bytes()).expect("response body is JSON")
    }
}

/// Multipart body with one text field and one file
pub fn multipart_body(title: &str, file_name: &str, contents: &str) -> Vec<u8> {
    format!(
        "--{b}\r\n\
Content-Disposition: form-data; name=\"title\"\r\n\r\n\
{title}\r\n\
--{b}\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
Content-Type: text/plain\r\n\r\n\
{contents}\r\n\
--{b}--\r\n",
        b = BOUNDARY,
    )
    .into_bytes()
}

fn counted<F>(calls: &Arc<AtomicUsize>, f: F) -> impl Fn(Args) -> anyhow::Result<Reply> + Send + Sync + 'static
where
    F: Fn(Args) -> anyhow::Result<Reply> + Send + Sync + 'static,
{
    let calls = Arc::clone(calls);
    move |args| {
        calls.fetch_add(1, Ordering::SeqCst);
        f(args)
    }
}

fn fixture_dispatcher(files: FilesConfig, calls: Arc<AtomicUsize>) -> Result<Dispatcher, String> {
    let item = counted(&calls, |args: Args| {
        Ok(Reply::json(serde_json::json!({
            "id": args[0].as_u64(),
            "verbose": args[1].as_bool(),
        })))
    });
    let slug = counted(&calls, |args: Args| {
        Ok(Reply::json(serde_json::json!({ "slug": args[0].as_str() })))
    });
    let upload = counted(&calls, |args: Args| {
        let title = args[0].as_required().is_some_and(|t| t.is_valid());
        let files: Vec<serde_json::Value> = args[1]
            .as_files()
            .unwrap_or_default()
            .iter()
            .map(|file| {
                let contents = file.bytes().map(|b| String::from_utf8_lossy(&b).into_owned());
                serde_json::json!({
                    "name": file.file_name(),
                    "size": file.len(),
                    "contents": contents.unwrap_or_default(),
                })
            })
            .collect();
        Ok(Reply::json(serde_json::json!({
            "title": args[0].as_str(),
            "valid": title,
            "files": files,
        })))
    });
    let form = counted(&calls, |args: Args| {
        Ok(Reply::json(serde_json::json!({ "user": args[0].as_map() })))
    });
    let report = counted(&calls, |_| Ok(Reply::json(serde_json::json!({ "ok": true }))));
    let page = counted(&calls, |_| Ok(Reply::text("<p>hello</p>")));
    let boom = counted(&calls, |_| Err(anyhow::anyhow!("kaboom: secret detail")));

    let err = |e: courier_core::routing::RouteError| e.to_string();
    let dispatcher = Dispatcher::builder()
        .with_files_config(files)
        .with_route(
            Route::builder("/items/{id:[0-9]+}")
                .get()
                .produces("application/json")
                .param(ParameterSpec::path("id").of(ValueType::U64))
                .param(ParameterSpec::query("verbose").of(ValueType::Bool))
                .handler(item),
        )
        .map_err(err)?
        .with_route(
            Route::builder("/items/{slug}")
                .get()
                .priority(-1)
                .produces("application/json")
                .param(ParameterSpec::path("slug"))
                .handler(slug),
        )
        .map_err(err)?
        .with_route(
            Route::builder("/upload")
                .post()
                .consumes("multipart/form-data")
                .produces("application/json")
                .param(ParameterSpec::form("title").required())
                .param(ParameterSpec::whole(WholeObject::Files))
                .handler(upload),
        )
        .map_err(err)?
        .with_route(
            Route::builder("/form")
                .post()
                .produces("application/json")
                .param(ParameterSpec::form("user").of(ValueType::Map))
                .handler(form),
        )
        .map_err(err)?
        .with_route(Route::builder("/report").get().handler(report))
        .map_err(err)?
        .with_route(
            Route::builder("/page")
                .get()
                .produces("text/html")
                .produces("text/plain")
                .handler(page),
        )
        .map_err(err)?
        .with_route(Route::builder("/boom").get().produces("application/json").handler(boom))
        .map_err(err)?
        .build();
    Ok(dispatcher)
}
