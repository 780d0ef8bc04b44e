use bytes::Bytes;
use criterion::{Criterion, criterion_group, criterion_main};
use futures::executor::block_on;
use http::{HeaderMap, Method};
use micro_flow::handler::{Handler, step_fn};
use micro_flow::router::{Router, get, post};
use micro_flow::{Dispatcher, HandlerResult};
use std::hint::black_box;

fn respond() -> Handler {
    step_fn(|_ctx, req, res| {
        Box::pin(async move {
            res.text(req.path().to_string())?;
            HandlerResult::Ok(())
        })
    })
}

fn router() -> Router {
    let mut builder = Router::builder();
    for resource in ["users", "posts", "comments", "tags", "orders", "invoices", "products", "carts"] {
        builder = builder
            .route(format!("/{resource}"), get(respond()))
            .route(format!("/{resource}"), post(respond()))
            .route(format!("/{resource}/:id"), get(respond()))
            .route(format!("/{resource}/:id/history/:version"), get(respond()));
    }
    builder.build().unwrap()
}

fn bench_resolve(c: &mut Criterion) {
    let router = router();
    let mut group = c.benchmark_group("resolve");

    group.bench_function("literal", |b| {
        b.iter(|| black_box(router.resolve(black_box(&Method::GET), black_box("/carts")).is_some()))
    });

    group.bench_function("params", |b| {
        b.iter(|| black_box(router.resolve(black_box(&Method::GET), black_box("/carts/42/history/7")).is_some()))
    });

    group.bench_function("percent_encoded", |b| {
        b.iter(|| black_box(router.resolve(black_box(&Method::GET), black_box("/carts/a%20b")).is_some()))
    });

    group.bench_function("miss", |b| {
        b.iter(|| black_box(router.resolve(black_box(&Method::GET), black_box("/unknown/1/2/3")).is_none()))
    });

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let dispatcher = Dispatcher::builder().router(router()).build().unwrap();

    c.bench_function("dispatch", |b| {
        b.iter(|| {
            let response = block_on(dispatcher.dispatch(
                Method::GET,
                black_box("/orders/42?expand=items"),
                HeaderMap::new(),
                Bytes::new(),
            ));
            black_box(response)
        })
    });
}

criterion_group!(benches, bench_resolve, bench_dispatch);
criterion_main!(benches);
