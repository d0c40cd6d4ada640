use lessweb::decorator::map_reply;
use lessweb::{Application, Reply, Router, Server, get, handler_fn};
use http::HeaderValue;

async fn hello_world() -> &'static str {
    "hello world"
}

#[tokio::main]
async fn main() {
    let router = Router::builder()
        .route("/", get(handler_fn(hello_world)))
        .with_global_decorator(map_reply(|mut reply: Reply| {
            reply.headers_mut().insert("x-powered-by", HeaderValue::from_static("lessweb"));
            reply
        }))
        .build()
        .unwrap();

    let app = Application::builder().router(router).build().unwrap();

    Server::builder().application(app).address("127.0.0.1:3000").build().unwrap().start().await.unwrap();
}
