//! Demo API served by `courier serve`

use courier_core::dispatch::{Reply, WebFailure};
use courier_core::http::StatusCode;
use courier_core::params::{Args, ParameterSpec, ValueType, WholeObject};
use courier_core::routing::{Route, RouteError, RouteRegistry, Scope};
use serde_json::json;

const INDEX: &str = "<!DOCTYPE html>
<html>
<head><title>Courier</title></head>
<body>
<h1>Courier demo</h1>
<ul>
<li><a href=\"/api/test/abc123/42\">/api/test/abc123/42</a></li>
<li><a href=\"/api/items/7\">/api/items/7</a></li>
<li><a href=\"/api/failure/418\">/api/failure/418</a></li>
<li><a href=\"/api/visits\">/api/visits</a></li>
</ul>
<form action=\"/upload\" method=\"post\" enctype=\"multipart/form-data\">
<input name=\"title\"> <input type=\"file\" name=\"file\"> <button>Upload</button>
</form>
</body>
</html>
";

/// Largest item id the demo knows about
const LAST_ITEM: u64 = 100;

fn index(_: Args) -> anyhow::Result<Reply> {
    Ok(Reply::text(INDEX))
}

fn pattern_test(args: Args) -> anyhow::Result<Reply> {
    Ok(Reply::json(json!({
        "string": args[0].as_str(),
        "num": args[1].as_i64(),
    })))
}

fn item(args: Args) -> anyhow::Result<Reply> {
    let id = args[0].as_u64().unwrap_or_default();
    if id == 0 || id > LAST_ITEM {
        return Err(WebFailure::not_found(format!("No item {}", id)).into());
    }
    let mut body = json!({ "id": id, "name": format!("Item {}", id) });
    if args[1].as_bool() == Some(true) {
        body["tags"] = json!(["demo", if id % 2 == 0 { "even" } else { "odd" }]);
    }
    Ok(Reply::json(body))
}

fn failure(args: Args) -> anyhow::Result<Reply> {
    let code = args[0].as_u32().unwrap_or_default();
    let status = u16::try_from(code)
        .ok()
        .and_then(StatusCode::from_u16)
        .filter(|status| status.is_error())
        .unwrap_or(StatusCode::BadRequest);
    Ok(Reply::failure(status, format!("Requested failure {}", code)))
}

fn visits(args: Args) -> anyhow::Result<Reply> {
    let Some(session) = args[0].as_session() else {
        return Ok(Reply::failure(StatusCode::ServiceUnavailable, "Sessions are disabled"));
    };
    let count = session.get_as::<u64>("visits").unwrap_or(0) + 1;
    session.put("visits", &count)?;
    Ok(Reply::json(json!({ "session": session.id(), "visits": count })))
}

fn upload(args: Args) -> anyhow::Result<Reply> {
    let title = args[0].as_required();
    if !title.is_some_and(|t| t.is_valid()) {
        return Ok(Reply::failure(StatusCode::BadRequest, "A title is required"));
    }
    let files: Vec<_> = args[1]
        .as_files()
        .unwrap_or_default()
        .iter()
        .map(|file| {
            json!({
                "field": file.field(),
                "name": file.file_name(),
                "type": file.content_type(),
                "size": file.len(),
                "on_disk": file.path().is_some(),
            })
        })
        .collect();
    Ok(Reply::json(json!({ "title": args[0].as_str(), "files": files })))
}

/// Build the demo route table
pub fn registry() -> Result<RouteRegistry, RouteError> {
    let mut registry = RouteRegistry::new();

    registry
        .route(Route::builder("/").get().name("index").produces("text/html").handler(index))?
        .route(
            Route::builder("/upload")
                .post()
                .name("upload")
                .consumes("multipart/form-data")
                .produces("application/json")
                .param(ParameterSpec::form("title").required())
                .param(ParameterSpec::whole(WholeObject::Files))
                .handler(upload),
        )?;

    registry.register_scope(
        Scope::new("/api")
            .route(
                Route::builder("/test/{string:[a-z0-9]+}/{num:[0-9]+}")
                    .get()
                    .name("pattern-test")
                    .priority(10)
                    .produces("application/json")
                    .param(ParameterSpec::path("string"))
                    .param(ParameterSpec::path("num").of(ValueType::I64))
                    .handler(pattern_test),
            )
            .route(
                Route::builder("/items/{id:[0-9]+}")
                    .get()
                    .name("item")
                    .produces("application/json")
                    .param(ParameterSpec::path("id").of(ValueType::U64))
                    .param(ParameterSpec::query("verbose").of(ValueType::Bool))
                    .handler(item),
            )
            .route(
                Route::builder("/failure/{code:[0-9]{3}}")
                    .get()
                    .name("failure")
                    .produces("application/json")
                    .param(ParameterSpec::path("code").of(ValueType::U32))
                    .handler(failure),
            )
            .route(
                Route::builder("/visits")
                    .get()
                    .name("visits")
                    .produces("application/json")
                    .param(ParameterSpec::whole(WholeObject::Session))
                    .handler(visits),
            ),
    )?;

    Ok(registry)
}
