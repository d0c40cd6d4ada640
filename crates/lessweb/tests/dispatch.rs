use bytes::Bytes;
use http::header::{ALLOW, CACHE_CONTROL, CONTENT_TYPE, COOKIE, SET_COOKIE};
use http::{HeaderMap, Method, StatusCode};
use lessweb::{
    Application, Cookie, Request, Response, Router, WebError, any, get, handler_fn, options, post, put, template_view,
};
use serde_json::{Value, json};
use std::time::Duration;

struct Sent {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

impl Sent {
    fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

async fn send(app: &Application, method: Method, uri: &str) -> Sent {
    let request = http::Request::builder().method(method).uri(uri).body(Bytes::new()).unwrap();
    let response = app.handle(request).await;
    Sent {
        status: response.status(),
        headers: response.headers().clone(),
        body: String::from_utf8(response.body().bytes().to_vec()).unwrap(),
    }
}

async fn add(a: i64, b: i64) -> Value {
    json!({"ans": a + b})
}

async fn me() -> &'static str {
    "me"
}

async fn user(name: String) -> String {
    format!("user {name}")
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(5)).await;
    "late"
}

async fn panics() -> &'static str {
    panic!("handler bug")
}

async fn fails() -> Result<String, WebError> {
    Err(WebError::fault("connection refused"))
}

async fn forbidden() -> Result<String, WebError> {
    Err(WebError::status(StatusCode::FORBIDDEN, "not yours"))
}

async fn theme(request: Request, response: Response) -> String {
    let theme = request.cookie("theme").unwrap_or("light").to_string();
    response.set_cookie(Cookie::new("theme", "dark").http_only(true));
    theme
}

fn app() -> Application {
    let router = Router::builder()
        .route("/add", get(handler_fn(add).param("a").param("b")))
        .route("/user/me", get(handler_fn(me)))
        .route("/user/{name}", get(handler_fn(user).param("name")))
        .route("/item", post(handler_fn(me)))
        .route("/item", put(handler_fn(me)))
        .route("/item", options(handler_fn(me)))
        .route("/slow", get(handler_fn(slow)))
        .route("/panic", get(handler_fn(panics)))
        .route("/fail", get(handler_fn(fails)))
        .route("/forbidden", any(handler_fn(forbidden)))
        .route("/theme", get(handler_fn(theme)))
        .route("/sum", get(handler_fn(add).param("a").param("b")).view(template_view("sum={}")))
        .build()
        .unwrap();

    Application::builder().router(router).timeout(Duration::from_millis(50)).build().unwrap()
}

#[tokio::test]
async fn test_add_round_trip() {
    let sent = send(&app(), Method::GET, "/add?a=1&b=2").await;
    assert_eq!(sent.status, StatusCode::OK);
    assert_eq!(sent.headers[CONTENT_TYPE], "application/json");
    assert_eq!(sent.json(), json!({"ans": 3}));
}

#[tokio::test]
async fn test_repeated_get_is_idempotent() {
    let app = app();
    let first = send(&app, Method::GET, "/add?a=20&b=22").await;
    let second = send(&app, Method::GET, "/add?a=20&b=22").await;
    assert_eq!(first.status, second.status);
    assert_eq!(first.headers, second.headers);
    assert_eq!(first.body, second.body);
}

#[tokio::test]
async fn test_first_registered_route_wins() {
    let app = app();
    assert_eq!(send(&app, Method::GET, "/user/me").await.body, "me");
    assert_eq!(send(&app, Method::GET, "/user/zava").await.body, "user zava");
    assert_eq!(send(&app, Method::GET, "/user/%E4%BD%A0").await.body, "user 你");
}

#[tokio::test]
async fn test_not_found() {
    let sent = send(&app(), Method::GET, "/nowhere").await;
    assert_eq!(sent.status, StatusCode::NOT_FOUND);
    assert_eq!(sent.body, "Not Found");

    // anchored on both ends
    let sent = send(&app(), Method::GET, "/add/more").await;
    assert_eq!(sent.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_method_not_allowed_lists_declared_methods() {
    let sent = send(&app(), Method::GET, "/item").await;
    assert_eq!(sent.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(sent.headers[ALLOW], "POST, PUT");
}

#[tokio::test]
async fn test_missing_parameter() {
    let sent = send(&app(), Method::GET, "/add").await;
    assert_eq!(sent.status, StatusCode::BAD_REQUEST);

    let body = sent.json();
    assert_eq!(body["error"], "MissingParameter");
    assert_eq!(body["field"], "a");
}

#[tokio::test]
async fn test_invalid_parameter() {
    let sent = send(&app(), Method::GET, "/add?a=x&b=2").await;
    assert_eq!(sent.status, StatusCode::BAD_REQUEST);

    let body = sent.json();
    assert_eq!(body["error"], "InvalidParameter");
    assert_eq!(body["field"], "a");
    assert!(body["message"].as_str().unwrap().contains("invalid literal for int()"));
}

#[tokio::test]
async fn test_faults_become_500() {
    let app = app();

    let sent = send(&app, Method::GET, "/fail").await;
    assert_eq!(sent.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(sent.body, "Internal Server Error");

    let sent = send(&app, Method::GET, "/panic").await;
    assert_eq!(sent.status, StatusCode::INTERNAL_SERVER_ERROR);

    // the application keeps serving
    assert_eq!(send(&app, Method::GET, "/user/me").await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_explicit_status() {
    let sent = send(&app(), Method::DELETE, "/forbidden").await;
    assert_eq!(sent.status, StatusCode::FORBIDDEN);
    assert_eq!(sent.body, "not yours");
}

#[tokio::test]
async fn test_timeout() {
    let sent = send(&app(), Method::GET, "/slow").await;
    assert_eq!(sent.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_cookies() {
    let request =
        http::Request::builder().uri("/theme").header(COOKIE, "sid=1; theme=blue").body(Bytes::new()).unwrap();
    let response = app().handle(request).await;

    assert_eq!(response.body().bytes(), Bytes::from_static(b"blue"));
    assert_eq!(response.headers()[SET_COOKIE], "theme=dark; Path=/; HttpOnly");
}

#[tokio::test]
async fn test_view() {
    let sent = send(&app(), Method::GET, "/sum?a=1&b=2").await;
    assert_eq!(sent.body, r#"sum={"ans":3}"#);
    assert_eq!(sent.headers[CONTENT_TYPE], "text/html; charset=utf-8");
}

#[tokio::test]
async fn test_replace_router() {
    let app = app();
    assert_eq!(send(&app, Method::GET, "/fresh").await.status, StatusCode::NOT_FOUND);

    app.replace_router(Router::builder().route("/fresh", get(handler_fn(me))).build().unwrap());
    assert_eq!(send(&app, Method::GET, "/fresh").await.body, "me");
    assert_eq!(send(&app, Method::GET, "/add?a=1&b=2").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_custom_encoding() {
    let router = Router::builder().route("/", get(handler_fn(me))).build().unwrap();
    let app = Application::builder().router(router).encoding("gbk").build().unwrap();
    assert_eq!(send(&app, Method::GET, "/").await.headers[CONTENT_TYPE], "text/html; charset=gbk");
}

fn mounted_app() -> Application {
    let router = Router::builder()
        .route("/add", get(handler_fn(add).param("a").param("b")))
        .route("/theme", get(handler_fn(theme)))
        .build()
        .unwrap();
    Application::builder().router(router).base_path("/api").build().unwrap()
}

#[tokio::test]
async fn test_base_path() {
    let app = mounted_app();

    assert_eq!(send(&app, Method::GET, "/api/add?a=1&b=2").await.json(), json!({"ans": 3}));
    assert_eq!(send(&app, Method::GET, "/add?a=1&b=2").await.status, StatusCode::NOT_FOUND);
    assert_eq!(send(&app, Method::GET, "/apiadd?a=1&b=2").await.status, StatusCode::NOT_FOUND);
    assert_eq!(send(&app, Method::GET, "/api/theme").await.headers[SET_COOKIE], "theme=dark; Path=/api/; HttpOnly");
}

#[tokio::test]
async fn test_static_dir() {
    let dir = std::env::temp_dir().join(format!("lessweb-dispatch-static-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("app.js"), "run()").unwrap();

    let router = Router::builder().route("/add", get(handler_fn(add).param("a").param("b"))).build().unwrap();
    let app = Application::builder().router(router).base_path("/api").static_dir(&dir).build().unwrap();

    let sent = send(&app, Method::GET, "/static/app.js").await;
    assert_eq!(sent.status, StatusCode::OK);
    assert_eq!(sent.body, "run()");
    assert_eq!(sent.headers[CONTENT_TYPE], "application/javascript; charset=utf-8");
    assert_eq!(sent.headers[CACHE_CONTROL], "max-age=900");

    assert_eq!(send(&app, Method::GET, "/static/missing.js").await.status, StatusCode::NOT_FOUND);
    assert_eq!(send(&app, Method::GET, "/static/../secret").await.status, StatusCode::NOT_FOUND);

    let sent = send(&app, Method::POST, "/static/app.js").await;
    assert_eq!(sent.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(sent.headers[ALLOW], "GET, HEAD");
}

