use http::StatusCode;
use lessweb::{
    Application, Binder, Form, Inject, Json, Model, ModelSchema, ParamDescriptor, Router, Server, Service,
    WebError, get, handler_fn, interceptor_fn, post, template_view,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

#[derive(Deserialize, Serialize, Debug)]
pub struct User {
    name: String,
    zip: String,
}

impl ModelSchema for User {
    fn fields() -> Vec<ParamDescriptor> {
        vec![ParamDescriptor::of::<String>("name"), ParamDescriptor::of::<String>("zip").default("000000")]
    }
}

/// The caller, resolved from the `x-user` header.
struct CurrentUser {
    name: String,
}

impl Service for CurrentUser {
    fn construct(binder: &mut Binder<'_>) -> Result<Self, WebError> {
        let request = binder.request();
        let name = request
            .header("x-user")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| WebError::status(StatusCode::UNAUTHORIZED, "who are you?"))?;
        Ok(CurrentUser { name: name.to_string() })
    }
}

// curl -v "http://127.0.0.1:8080/add?a=1&b=2"
async fn add(a: i64, b: i64) -> Value {
    json!({"ans": a + b})
}

// curl -v http://127.0.0.1:8080/hello/zava
async fn hello(name: String, times: u8) -> String {
    format!("hello {name}! ").repeat(usize::from(times))
}

// curl -v -d "name=hello&zip=world" http://127.0.0.1:8080/user
async fn create_user(Model(user): Model<User>) -> Json<User> {
    Json(user)
}

// curl -v -H 'Content-Type: application/json' -d '{"name":"hello","zip":"world"}' http://127.0.0.1:8080/user/json
async fn create_user_json(Json(user): Json<User>) -> (StatusCode, Json<User>) {
    (StatusCode::CREATED, Json(user))
}

// curl -v -d "name=hello" http://127.0.0.1:8080/user/form
async fn create_user_form(Form(user): Form<User>) -> String {
    format!("receive user: {user:#?}\r\n")
}

// curl -v -H 'x-user: zava' http://127.0.0.1:8080/me
async fn me(user: Inject<CurrentUser>) -> String {
    user.name.clone()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let router = Router::builder()
        .route("/add", get(handler_fn(add).param("a").param("b")).view(template_view("<p>{}</p>")))
        .route("/hello/{name}", get(handler_fn(hello).param("name").param(lessweb::Param::new("times").default(1))))
        .route("/user", post(handler_fn(create_user)))
        .route("/user/json", post(handler_fn(create_user_json)))
        .route("/user/form", post(handler_fn(create_user_form)))
        .route("/me", get(handler_fn(me)))
        .build()?;

    let app = Application::builder()
        .router(router)
        .interceptor(
            "/.*",
            "*",
            interceptor_fn(|ctx, next| {
                Box::pin(async move {
                    let path = ctx.path().to_string();
                    let result = next.run(ctx).await;
                    info!(path = %path, ok = result.is_ok(), "access");
                    result
                })
            }),
        )
        .build()?;

    Server::builder().application(app).address("127.0.0.1:8080").build()?.start().await?;
    Ok(())
}
