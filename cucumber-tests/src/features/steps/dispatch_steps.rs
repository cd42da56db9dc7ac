use std::sync::Arc;

use courier_core::connection::{Connection, DispatchState, Progress};
use courier_core::dispatch::Dispatched;
use courier_core::http::{HttpRequest, StatusCode};
use cucumber::{given, then, when};
use futures::future::join_all;

use crate::features::world::{multipart_body, CourierWorld, BOUNDARY};

// Background
#[given(expr = "a Courier dispatcher with the fixture routes")]
async fn given_dispatcher(world: &mut CourierWorld) {
    world.start().expect("fixture routes should register");
}

#[given(expr = "a body limit of {int} bytes")]
async fn given_body_limit(world: &mut CourierWorld, limit: usize) {
    world.files.max_body_size = limit;
    world.start().expect("fixture routes should register");
}

#[given(expr = "an in-memory threshold of {int} bytes")]
async fn given_memory_threshold(world: &mut CourierWorld, threshold: usize) {
    world.files.memory_threshold = threshold;
    world.start().expect("fixture routes should register");
}

#[given(expr = "a multipart upload titled {string} with file {string} containing {string}")]
async fn given_upload(world: &mut CourierWorld, title: String, file: String, contents: String) {
    world.body = multipart_body(&title, &file, &contents);
}

// Requests
#[when(expr = "the client requests {string}")]
async fn when_get(world: &mut CourierWorld, path: String) {
    world.send_head(&format!("GET {} HTTP/1.1\r\n\r\n", path)).await;
}

#[when(expr = "the client requests {string} accepting {string}")]
async fn when_get_accepting(world: &mut CourierWorld, path: String, accept: String) {
    world.send_head(&format!("GET {} HTTP/1.1\r\nAccept: {}\r\n\r\n", path, accept)).await;
}

#[when(expr = "the client posts the upload to {string} in chunks of {int} bytes")]
async fn when_post_upload(world: &mut CourierWorld, path: String, chunk_size: usize) {
    let head = format!(
        "POST {} HTTP/1.1\r\nContent-Type: multipart/form-data; boundary={}\r\nContent-Length: {}\r\n\r\n",
        path,
        BOUNDARY,
        world.body.len()
    );
    let body = std::mem::take(&mut world.body);
    world.exchange(&head, &body, chunk_size).await;
}

#[when(expr = "the client posts the form {string} to {string}")]
async fn when_post_form(world: &mut CourierWorld, form: String, path: String) {
    let head = format!(
        "POST {} HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n",
        path,
        form.len()
    );
    world.exchange(&head, form.as_bytes(), 5).await;
}

#[when(expr = "the end of the body is signalled again")]
async fn when_last_again(world: &mut CourierWorld) {
    world.send_last().await;
}

#[when(expr = "the client sends half of the upload to {string} and disconnects")]
async fn when_abort(world: &mut CourierWorld, path: String) {
    let head = format!(
        "POST {} HTTP/1.1\r\nContent-Type: multipart/form-data; boundary={}\r\n\r\n",
        path, BOUNDARY
    );
    let body = std::mem::take(&mut world.body);
    world.send_head(&head).await;
    world.send_chunk(&body[..body.len() / 2]).await;
    world.connection().abort();
}

#[when(expr = "{int} clients request {string} at the same time")]
async fn when_concurrent(world: &mut CourierWorld, clients: usize, path: String) {
    let dispatcher = world.dispatcher();
    let tasks = (0..clients).map(|_| {
        let dispatcher = Arc::clone(&dispatcher);
        let head = format!("GET {} HTTP/1.1\r\n\r\n", path);
        tokio::spawn(async move {
            let mut conn = Connection::new(Arc::clone(&dispatcher));
            let request = HttpRequest::parse_head(head.as_bytes()).expect("valid request head");
            match conn.on_request(request) {
                Progress::Invoke(ctx) => match conn.invoke(ctx) {
                    Dispatched::Ready(response) => response,
                    Dispatched::Deferred(deferred) => dispatcher.resolve_deferred(deferred).await,
                },
                Progress::Respond(response) => response,
                Progress::Pending => panic!("GET requests never wait for a body"),
            }
        })
    });
    for response in join_all(tasks).await {
        world.responses.push(response.expect("client task panicked"));
    }
}

// Outcomes
#[then(expr = "the response status is {int}")]
async fn then_status(world: &mut CourierWorld, status: u16) {
    assert_eq!(world.response().status().as_u16(), status);
}

#[then(expr = "the content type is {string}")]
async fn then_content_type(world: &mut CourierWorld, content_type: String) {
    let actual = world.response().header_value("content-type").unwrap_or_default();
    assert!(
        actual.starts_with(&content_type),
        "expected content type {}, got {}",
        content_type,
        actual
    );
}

#[then(expr = "the JSON field {string} is {string}")]
async fn then_json_string(world: &mut CourierWorld, field: String, expected: String) {
    let body = world.json();
    let actual = match body.pointer(&field) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => panic!("field {} missing from {}", field, body),
    };
    assert_eq!(actual, expected);
}

#[then(expr = "the body contains {string}")]
async fn then_body_contains(world: &mut CourierWorld, needle: String) {
    let body = String::from_utf8_lossy(world.response().body_bytes()).into_owned();
    assert!(body.contains(&needle), "{:?} not found in {:?}", needle, body);
}

#[then(expr = "the body does not contain {string}")]
async fn then_body_lacks(world: &mut CourierWorld, needle: String) {
    let body = String::from_utf8_lossy(world.response().body_bytes()).into_owned();
    assert!(!body.contains(&needle), "{:?} leaked into {:?}", needle, body);
}

#[then(expr = "the handler ran {int} time(s)")]
async fn then_calls(world: &mut CourierWorld, calls: usize) {
    assert_eq!(world.calls(), calls);
}

#[then(expr = "exactly {int} response(s) was/were written")]
async fn then_responses(world: &mut CourierWorld, count: usize) {
    assert_eq!(world.responses.len(), count);
}

#[then(expr = "every response has status {int}")]
async fn then_all_status(world: &mut CourierWorld, status: u16) {
    let expected = StatusCode::from_u16(status).expect("known status");
    assert!(world.responses.iter().all(|r| r.status() == expected));
}

#[then(expr = "the connection is errored")]
async fn then_errored(world: &mut CourierWorld) {
    assert_eq!(world.connection().state(), DispatchState::Errored);
}
