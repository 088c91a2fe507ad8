use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use apricot::{App, HttpRequestMethod, Outcome, Request, RoutePattern};

fn pattern_compile_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern_compile");

    let declarations = [
        ("static", "/about"),
        ("one_param", "/hello/:name"),
        ("nested", "/posts/:post_id/comments/:id/edit"),
    ];

    for (name, declaration) in declarations.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), declaration, |b, declaration| {
            b.iter(|| {
                let _ = RoutePattern::compile(black_box(declaration)).unwrap();
            });
        });
    }

    group.finish();
}

fn build_app(size: usize) -> App {
    let mut app = App::new();
    for i in 0..size {
        app.when(
            &format!("/section{}/:id", i),
            |_, params| Ok(Outcome::respond(params.values().join(","))),
            None,
        )
        .unwrap();
    }
    app
}

fn dispatch_position_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_position");

    // 路由按顺序扫描，命中位置越靠后耗时越长
    for size in [10, 100, 1000].iter() {
        let app = build_app(*size);
        let request = Request::new(HttpRequestMethod::Get, &format!("/section{}/42", size - 1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &request, |b, request| {
            b.iter(|| {
                let _ = app.handle(black_box(request), true).unwrap();
            });
        });
    }

    group.finish();
}

fn dispatch_not_found_benchmark(c: &mut Criterion) {
    let app = build_app(100);
    let request = Request::new(HttpRequestMethod::Get, "/nowhere");

    c.bench_function("dispatch_not_found", |b| {
        b.iter(|| {
            let _ = app.handle(black_box(&request), true).unwrap();
        });
    });
}

fn parse_and_dispatch_benchmark(c: &mut Criterion) {
    let mut app = build_app(10);
    app.resource("posts", |app| {
        app.update(|_, params| Ok(Outcome::respond(params.values().join(","))))
    })
    .unwrap();

    // 表单覆盖方法后命中 REST 路由
    let raw = b"POST /posts/42 HTTP/1.1\r\n\
                Host: localhost\r\n\
                Content-Type: application/x-www-form-urlencoded\r\n\
                \r\n\
                _method=PUT&title=Hello+World";

    c.bench_function("parse_and_dispatch", |b| {
        b.iter(|| {
            let request = Request::try_from(black_box(raw.as_slice()), 0).unwrap();
            let _ = app.handle(&request, true).unwrap();
        });
    });
}

fn url_generation_benchmark(c: &mut Criterion) {
    let mut app = App::new();
    app.when(
        "/:first_name/:last_name",
        |_, _| Ok(Outcome::respond("")),
        Some("hello_page"),
    )
    .unwrap();

    c.bench_function("url_generation", |b| {
        b.iter(|| {
            let _ = app
                .url(
                    black_box("hello_page"),
                    &[("first_name", "Foo"), ("last_name", "Bar")],
                )
                .unwrap();
        });
    });
}

criterion_group!(
    benches,
    pattern_compile_benchmark,
    dispatch_position_benchmark,
    dispatch_not_found_benchmark,
    parse_and_dispatch_benchmark,
    url_generation_benchmark
);
criterion_main!(benches);
