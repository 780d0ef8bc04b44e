use http::{Method, StatusCode};
use micro_flow::filter::header;
use micro_flow::handler::{error_fn, middleware_fn, step_fn};
use micro_flow::router::{get, post};
use micro_flow::{Context, Dispatcher, Feature, HandlerResult, Router};
use serde::{Deserialize, Serialize};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Deserialize, Serialize, Debug)]
struct User {
    name: String,
    zip: String,
}

fn router() -> micro_flow::router::RouterBuilder {
    let log = middleware_fn(|req, _res, next| {
        Box::pin(async move {
            info!(method = %req.method(), path = req.path(), "incoming request");
            next.advance();
            HandlerResult::Ok(())
        })
    });

    let locked = middleware_fn(|_req, res, _next| {
        Box::pin(async move {
            res.send_status(StatusCode::LOCKED)?;
            HandlerResult::Ok(())
        })
    });

    let hello = step_fn(|_ctx, req, res| {
        Box::pin(async move {
            res.text(format!("receive from method: {}\r\n", req.method()))?;
            HandlerResult::Ok(())
        })
    });

    // name=hello&zip=world
    let form_user = step_fn(|_ctx, req, res| {
        Box::pin(async move {
            let user: User = req.form()?;
            res.text(format!("receive user: {user:#?}\r\n"))?;
            HandlerResult::Ok(())
        })
    });

    let load_user = step_fn(|ctx, req, _res| {
        Box::pin(async move {
            let id = req.param("id").unwrap_or_default();
            ctx.insert_as("user", &User { name: format!("user-{id}"), zip: "00000".to_string() })?;
            HandlerResult::Ok(())
        })
    });

    let show_user = step_fn(|ctx, _req, res| {
        Box::pin(async move {
            match ctx.get_as::<User>("user") {
                Some(user) => res.json(&user?)?,
                None => res.send_status(StatusCode::NOT_FOUND)?,
            }
            HandlerResult::Ok(())
        })
    });

    let create_order = Feature::new(Method::POST, "/orders")
        .step(step_fn(|ctx, req, _res| {
            Box::pin(async move {
                let order: serde_json::Value = req.json()?;
                ctx.insert("order", order);
                HandlerResult::Ok(())
            })
        }))
        .step(step_fn(|ctx, _req, res| {
            Box::pin(async move {
                res.status(StatusCode::CREATED).json(&ctx.get("order"))?;
                HandlerResult::Ok(())
            })
        }))
        .with_context(|req| Context::from_iter([("received_at", req.path())]));

    Router::builder()
        .middleware(log)
        .middleware_when(header("x-locked", "true"), locked)
        .route("/", get(hello))
        .route("/form", post(form_user))
        .route("/users/:id", get(load_user).then(show_user))
        .feature(create_order)
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let dispatcher = Dispatcher::builder()
        .routes(router())
        .error_handler(error_fn(|failure, _req, res| {
            Box::pin(async move {
                res.status(StatusCode::BAD_REQUEST).text(format!("bad request: {failure}\r\n"))?;
                HandlerResult::Ok(())
            })
        }))
        .build()
        .unwrap();

    for route in dispatcher.router().routes() {
        info!(method = %route.0, pattern = %route.1, "route");
    }

    let response = dispatcher.inject().path("/").send().await;
    info!(status = %response.status, body = %response.text(), "GET /");

    let response = dispatcher
        .inject()
        .method(Method::POST)
        .path("/form")
        .header(http::header::CONTENT_TYPE, mime::APPLICATION_WWW_FORM_URLENCODED.as_ref())
        .payload("name=hello&zip=world")
        .send()
        .await;
    info!(status = %response.status, body = %response.text(), "POST /form");

    let response = dispatcher.inject().path("/users/42").send().await;
    info!(status = %response.status, body = %response.text(), "GET /users/42");

    let response = dispatcher.inject().path("/users/42").header("x-locked", "true").send().await;
    info!(status = %response.status, body = %response.text(), "GET /users/42 locked");

    let response =
        dispatcher.inject().method(Method::POST).path("/orders").json(&serde_json::json!({ "item": "book" })).send().await;
    info!(status = %response.status, body = %response.text(), "POST /orders");

    let response = dispatcher.inject().method(Method::POST).path("/orders").payload("not json").send().await;
    info!(status = %response.status, body = %response.text(), "POST /orders without json");

    let response = dispatcher.inject().path("/missing").send().await;
    info!(status = %response.status, body = %response.text(), "GET /missing");
}
