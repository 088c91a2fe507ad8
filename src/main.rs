// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Apricot 演示服务器
//!
//! 在 Tokio 多线程运行时上运行一个最小的 HTTP/1.1 服务端，把每个请求交给共享的 `App` 分发。
//! 核心功能包括：
//! - 启动阶段注册演示路由（首页、带参数路由、前缀作用域、REST 资源、缓存接口）
//! - 按客户端的 `Accept-Encoding` 压缩响应
//! - 后台管理控制台（CLI 指令交互）

use std::{
    net::{Ipv4Addr, SocketAddrV4},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Instant,
};

use apricot::{
    cache::Cache, config::Config, exception::Exception, handler::Outcome, middleware::Phase,
    param::HttpRequestMethod, request::Request, response::Response, security::SessionStore, App,
};
use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    runtime::Builder,
    sync::Notify,
};

/// # 程序入口点
///
/// 初始化日志、加载配置、注册路由并启动主事件循环。
fn main() {
    // 1. 初始化日志系统：通过外部 YAML 配置级别与输出目的地
    if let Err(e) = log4rs::init_file("config/log4rs.yaml", Default::default()) {
        eprintln!("无法初始化日志系统：{}", e);
    }

    // 2. 环境配置加载：从 TOML 文件读取运行参数
    let config = Config::from_toml("config/development.toml");
    info!("配置文件已载入，运行环境：{}", config.environment());

    // 3. 异步运行时定制：根据配置文件动态分配工作线程数
    let runtime = match Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("无法构建异步运行时：{}", e);
            return;
        }
    };

    // 4. 共享资源初始化：注册完成后 App 只读，放进 Arc 在连接之间共享
    let cache = match Cache::from_config(&config) {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            error!("无法初始化缓存：{}", e);
            return;
        }
    };
    let sessions = Arc::new(SessionStore::with_capacity(config.session_capacity()));
    let app = match build_app(Arc::clone(&cache), Arc::clone(&sessions)) {
        Ok(app) => Arc::new(app),
        Err(e) => {
            error!("路由注册失败：{}", e);
            return;
        }
    };
    info!("共注册{}条路由", app.routes().len());

    runtime.block_on(serve(app, Arc::new(config)));
}

/// 注册演示路由
fn build_app(cache: Arc<Cache>, sessions: Arc<SessionStore>) -> Result<App, Exception> {
    let mut app = App::new();

    app.add(
        |request, error, _| {
            if let Some(e) = error {
                warn!("[ID{}]前一个中间件失败：{}", request.id(), e);
            }
            info!("[ID{}]{} {}", request.id(), request.method(), request.path());
            Ok(())
        },
        Phase::BeforeRequest,
    );

    let home_sessions = Arc::clone(&sessions);
    app.home(move |request, _| {
        let session = home_sessions.start(request);
        let response = Response::html(
            "<h1>Apricot</h1><p>Try <a href=\"/hello/World\">/hello/World</a> or <a href=\"/posts\">/posts</a>.</p>",
        );
        if session.is_new() {
            Ok(Outcome::Matched(response.set_cookie(&session.cookie())))
        } else {
            Ok(Outcome::Matched(response))
        }
    })?;

    app.when(
        "/hello/:name",
        |_, params| {
            Ok(Outcome::Matched(Response::text(format!(
                "Hello {}",
                params.get("name").unwrap_or_default()
            ))))
        },
        Some("hello"),
    )?;

    app.prefix("/api", |app| {
        app.when("/ping", |_, _| Ok(Outcome::Matched(Response::text("pong"))), None)?;
        let store = Arc::clone(&cache);
        app.when(
            "/cache/:key",
            move |request, params| {
                let key = params.get("key").unwrap_or_default();
                let value = request.parameter("value").map(|v| Value::String(v.to_string()));
                let current = store.cache(key, value, None)?;
                let body = current.unwrap_or(Value::Null).to_string();
                Ok(Outcome::Matched(Response::text(body).with_content_type("application/json")))
            },
            Some("cache"),
        )?;
        app.when(
            "/cache",
            App::with(
                apricot::Requirements::new().method(HttpRequestMethod::Delete),
                move |_, _| {
                    cache.purge()?;
                    Ok(Outcome::Matched(Response::new().with_status(204)))
                },
            )?,
            None,
        )
    })?;

    app.resource("posts", |app| {
        app.index(|_, _| Ok(Outcome::respond("<h1>All posts</h1>")))?;
        app.show(|_, params| {
            Ok(Outcome::respond(format!("<h1>Post {}</h1>", params.get("id").unwrap_or_default())))
        })?;
        app.create(|_, _| Ok(Outcome::Matched(Response::text("created post").with_status(201))))?;
        app.edit(|_, params| {
            Ok(Outcome::respond(format!("<h1>Editing post {}</h1>", params.get("id").unwrap_or_default())))
        })?;
        app.update(|_, params| {
            Ok(Outcome::Matched(Response::text(format!("updated post {}", params.get("id").unwrap_or_default()))))
        })?;
        app.delete(|_, params| {
            Ok(Outcome::Matched(Response::text(format!("deleted post {}", params.get("id").unwrap_or_default()))))
        })
    })?;

    app.fail(|e, request| {
        error!("[ID{}]请求处理失败：{}", request.id(), e);
        Response::html("<h1>500 Internal Server Error</h1>").with_status(500)
    });

    Ok(app)
}

async fn serve(app: Arc<App>, config: Arc<Config>) {
    // 网络层初始化：支持全地址监听 (0.0.0.0) 或本地回环监听 (127.0.0.1)
    let port: u16 = config.port();
    let address = match config.local() {
        true => Ipv4Addr::new(127, 0, 0, 1),
        false => Ipv4Addr::new(0, 0, 0, 0),
    };
    info!("服务端将在{}:{}上监听Socket连接", address, port);
    let socket = SocketAddrV4::new(address, port);

    let listener = match TcpListener::bind(socket).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("无法绑定端口：{}，错误：{}", port, e);
            return;
        }
    };
    info!("端口{}绑定完成", port);

    // shutdown: 控制台发出停机指令
    // active_connection: 追踪当前并发连接数
    let shutdown = Arc::new(Notify::new());
    let active_connection = Arc::new(AtomicU32::new(0));

    // 启动交互式管理控制台任务，不阻塞监听循环
    tokio::spawn({
        let shutdown = Arc::clone(&shutdown);
        let active_connection = Arc::clone(&active_connection);
        let app = Arc::clone(&app);
        async move {
            let mut reader = BufReader::new(tokio::io::stdin());
            let mut input = String::new();
            loop {
                input.clear();
                match reader.read_line(&mut input).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                match input.trim() {
                    "stop" => {
                        println!("停机指令已激活，服务器将停止接收新连接...");
                        shutdown.notify_one();
                        break;
                    }
                    "help" => {
                        println!("== Apricot Help ==");
                        println!("stop   - 发出停机信号");
                        println!("status - 查看当前服务器运行状态");
                        println!("help   - 显示此帮助信息");
                        println!("==================");
                    }
                    "status" => {
                        println!("== Apricot 状态 ===");
                        println!("当前活跃连接数: {}", active_connection.load(Ordering::SeqCst));
                        println!("已注册路由数: {}", app.routes().len());
                        println!("==================");
                    }
                    cmd => println!("无效的命令：{}", cmd),
                }
            }
        }
    });

    let mut id: u128 = 0;

    // 主事件循环：持续接收新连接并分发至线程池
    loop {
        let (mut stream, addr) = tokio::select! {
            _ = shutdown.notified() => {
                info!("主循环接收到停机指令，正在退出...");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!("接受连接失败：{}", e);
                    continue;
                }
            },
        };
        debug!("[ID{}]新的连接：{}", id, addr);

        let app = Arc::clone(&app);
        let config = Arc::clone(&config);
        let active_connection = Arc::clone(&active_connection);
        tokio::spawn(async move {
            active_connection.fetch_add(1, Ordering::SeqCst);
            handle_connection(&mut stream, id, app, config).await;
            active_connection.fetch_sub(1, Ordering::SeqCst);
        });
        id += 1;
    }
}

/// # 连接处理器
///
/// 读取并解析请求、交给 `App` 分发、压缩并发送响应。
async fn handle_connection(stream: &mut TcpStream, id: u128, app: Arc<App>, config: Arc<Config>) {
    let mut buffer = vec![0; 8192];
    let n = match stream.read(&mut buffer).await {
        Ok(0) => return, // 客户端主动关闭连接
        Ok(n) => n,
        Err(e) => {
            error!("[ID{}]读取TCPStream时遇到错误: {}", id, e);
            return;
        }
    };
    debug!("[ID{}]HTTP请求接收完毕，{}字节", id, n);

    let start_time = Instant::now();

    let request = match Request::try_from(&buffer[..n], id) {
        Ok(req) => req,
        Err(e) => {
            error!("[ID{}]解析HTTP请求失败: {}", id, e);
            let response = Response::text("Bad Request").with_status(400);
            let _ = stream.write_all(&response.as_bytes(false)).await;
            return;
        }
    };

    let mut response = match app.handle(&request, !config.strict_errors()) {
        Ok(response) => response,
        Err(e) => {
            error!("[ID{}]未处理的错误：{}", id, e);
            Response::html("<h1>500 Internal Server Error</h1>").with_status(500)
        }
    };
    response.encode(request.accept_encoding());

    let head_only = request.transport_method() == HttpRequestMethod::Head;
    let bytes = response.as_bytes(head_only);
    if let Err(e) = stream.write_all(&bytes).await {
        error!("[ID{}]发送响应失败: {}", id, e);
        return;
    }
    let _ = stream.flush().await;

    info!(
        "[ID{}]{} {} -> {}，耗时{}ms",
        id,
        request.method(),
        request.path(),
        response.status_code(),
        start_time.elapsed().as_millis()
    );
}
