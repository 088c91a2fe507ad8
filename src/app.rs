// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 应用上下文与分发器
//!
//! `App` 持有路由表、中间件链、事件总线与依赖注入容器。注册阶段通过 `&mut App` 进行，
//! 分发阶段只需要 `&App`，因此启动完成后可以放进 `Arc` 在多个连接之间共享。
//!
//! ## 分发流程
//! 1. 发出 `request` 事件，监听器返回响应时直接结束。
//! 2. 执行 `BeforeRequest` 中间件。
//! 3. 按注册顺序尝试每条匹配的路由：强制 HTTPS 重定向、发出 `match` 事件、调用处理函数。
//!    处理函数返回 `Skip` 时继续尝试下一条。
//! 4. 产出响应后执行 `BeforeResponse` 中间件。
//! 5. 没有路由产出响应时返回 404 页面。
//!
//! 任何一步返回的错误都会终止分发：403 / 404 信号被渲染为对应页面，
//! 其余错误交给失败回调，或在严格模式下抛给调用方。

use std::fmt;

use log::{debug, error, info};

use crate::{
    container::Container,
    event::{EventBus, ListenerResult},
    exception::Exception,
    gate::{self, Requirements},
    handler::{HandlerResult, Outcome, Params},
    middleware::{MiddlewareChain, Next, Phase},
    param::*,
    request::Request,
    response::Response,
    route::RouteTable,
};

pub type PageFn = dyn Fn(&Request) -> Response + Send + Sync;

pub type FailureFn = dyn Fn(&Exception, &Request) -> Response + Send + Sync;

/// 分发过程中的状态，仅用于日志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    AwaitingMatch,
    Matched,
    Responded,
    NotFound,
    Failed,
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DispatchState::AwaitingMatch => write!(f, "AwaitingMatch"),
            DispatchState::Matched => write!(f, "Matched"),
            DispatchState::Responded => write!(f, "Responded"),
            DispatchState::NotFound => write!(f, "NotFound"),
            DispatchState::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Default)]
pub struct App {
    routes: RouteTable,
    middlewares: MiddlewareChain,
    events: EventBus,
    container: Container,
    /// 正在定义的资源名，嵌套资源依次压栈
    pub(crate) resources: Vec<String>,
    not_found: Option<Box<PageFn>>,
    access_denied: Option<Box<PageFn>>,
    failure: Option<Box<FailureFn>>,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    /// 丢弃全部路由、中间件、监听器、容器内容与回调
    pub fn reset(&mut self) {
        *self = App::new();
        info!("应用状态已重置");
    }

    // --- 路由注册 ---

    pub fn when<F>(&mut self, pattern: &str, handler: F, name: Option<&str>) -> Result<(), Exception>
    where
        F: Fn(&Request, &Params) -> HandlerResult + Send + Sync + 'static,
    {
        self.routes.register(pattern, std::sync::Arc::new(handler), name)
    }

    pub fn home<F>(&mut self, handler: F) -> Result<(), Exception>
    where
        F: Fn(&Request, &Params) -> HandlerResult + Send + Sync + 'static,
    {
        self.when("/", handler, None)
    }

    /// 注册带动词的路由，同一声明可以按动词各保留一条
    pub(crate) fn when_verb<F>(
        &mut self,
        pattern: &str,
        handler: F,
        verb: HttpRequestMethod,
    ) -> Result<(), Exception>
    where
        F: Fn(&Request, &Params) -> HandlerResult + Send + Sync + 'static,
    {
        self.routes
            .register_verb(pattern, std::sync::Arc::new(handler), verb)
    }

    /// 在 `prefix` 作用域内执行 `body`。无论 `body` 成功与否，退出时都恢复之前的前缀。
    pub fn prefix<F>(&mut self, prefix: &str, body: F) -> Result<(), Exception>
    where
        F: FnOnce(&mut App) -> Result<(), Exception>,
    {
        self.routes.push_prefix(prefix);
        let result = body(self);
        self.routes.pop_prefix();
        result
    }

    /// 用约束包装处理函数，约束不满足时该路由被跳过
    pub fn with<F>(
        requirements: Requirements,
        handler: F,
    ) -> Result<impl Fn(&Request, &Params) -> HandlerResult + Send + Sync + 'static, Exception>
    where
        F: Fn(&Request, &Params) -> HandlerResult + Send + Sync + 'static,
    {
        gate::wrap(requirements, handler)
    }

    /// 要求参数 `name` 为纯数字
    pub fn with_number<F>(
        name: &str,
        handler: F,
    ) -> Result<impl Fn(&Request, &Params) -> HandlerResult + Send + Sync + 'static, Exception>
    where
        F: Fn(&Request, &Params) -> HandlerResult + Send + Sync + 'static,
    {
        gate::wrap(Requirements::new().number(name), handler)
    }

    /// 将已注册、且编译后的正则以 `pattern` 开头的路由标记为强制 HTTPS
    pub fn force_https(&mut self, pattern: &str) -> Result<usize, Exception> {
        let marked = self.routes.force_https(pattern)?;
        info!("{}条路由被标记为强制HTTPS", marked);
        Ok(marked)
    }

    pub fn url(&self, name_or_path: &str, params: &[(&str, &str)]) -> Result<String, Exception> {
        self.routes.url_for(name_or_path, params)
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    // --- 回调 ---

    pub fn not_found<F>(&mut self, callback: F)
    where
        F: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        self.not_found = Some(Box::new(callback));
    }

    pub fn access_denied<F>(&mut self, callback: F)
    where
        F: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        self.access_denied = Some(Box::new(callback));
    }

    pub fn fail<F>(&mut self, callback: F)
    where
        F: Fn(&Exception, &Request) -> Response + Send + Sync + 'static,
    {
        self.failure = Some(Box::new(callback));
    }

    /// 构造拒绝访问信号，由处理函数或监听器以 `Err` 返回
    pub fn trigger_access_denied(message: &str) -> Exception {
        Exception::AccessDenied(message.to_string())
    }

    /// 构造未找到信号，由处理函数或监听器以 `Err` 返回
    pub fn trigger_not_found(message: &str) -> Exception {
        Exception::NotFound(message.to_string())
    }

    // --- 中间件与事件 ---

    pub fn add<F>(&mut self, callback: F, phase: Phase)
    where
        F: Fn(&Request, Option<Exception>, Next<'_>) -> Result<(), Exception> + Send + Sync + 'static,
    {
        self.middlewares.add(callback, phase);
    }

    pub fn on<F>(&mut self, event: &str, callback: F, priority: i32)
    where
        F: Fn(&[String]) -> ListenerResult + Send + Sync + 'static,
    {
        self.events.on(event, callback, priority);
    }

    pub fn emit(&self, event: &str, args: &[String]) -> ListenerResult {
        self.events.emit(event, args)
    }

    pub fn clear(&mut self, event: &str) {
        self.events.clear(event);
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn container_mut(&mut self) -> &mut Container {
        &mut self.container
    }

    // --- 分发 ---

    /// 分发一个请求。
    ///
    /// `catch` 为真且注册了失败回调时，失败由回调转换为响应；否则错误返回给调用方。
    pub fn handle(&self, request: &Request, catch: bool) -> Result<Response, Exception> {
        let id = request.id();
        match self.dispatch(request) {
            Ok(response) => Ok(response),
            Err(e) if e.is_page_signal() => {
                debug!("[ID{}]渲染信号页面：{}", id, e);
                Ok(self.render_signal(&e, request))
            }
            Err(e) => {
                log_state(id, DispatchState::Failed);
                error!("[ID{}]分发失败：{}", id, e);
                match &self.failure {
                    Some(failure) if catch => Ok(failure(&e, request)),
                    _ => Err(e),
                }
            }
        }
    }

    /// 模拟一次浏览器访问，便于功能测试
    pub fn browse(&self, path: &str, method: HttpRequestMethod) -> Result<Response, Exception> {
        self.handle(&Request::new(method, path), true)
    }

    fn dispatch(&self, request: &Request) -> Result<Response, Exception> {
        let id = request.id();
        let path = request.path();

        if let Some(response) = self.events.emit(REQUEST_EVENT, &[path.to_string()])? {
            debug!("[ID{}]request事件的监听器直接产出了响应", id);
            return Ok(response);
        }

        log_state(id, DispatchState::AwaitingMatch);
        self.middlewares.run(Phase::BeforeRequest, request)?;

        for (entry, params) in self.routes.matches(path) {
            debug!("[ID{}]候选路由：{} ({})", id, entry.name(), entry.pattern().raw());

            if entry.forces_https() && !request.is_secure() {
                let mut location = format!("https://{}{}", request.host(), path);
                if let Some(query) = request.query() {
                    location.push('?');
                    location.push_str(query);
                }
                info!("[ID{}]强制HTTPS，重定向至{}", id, location);
                return Ok(Response::redirect(&location));
            }

            let mut args = Vec::with_capacity(params.len() + 1);
            args.push(path.to_string());
            args.extend(params.values().iter().cloned());
            if let Some(response) = self.events.emit(MATCH_EVENT, &args)? {
                debug!("[ID{}]match事件的监听器直接产出了响应", id);
                return Ok(response);
            }

            match entry.call(request, &params)? {
                Outcome::Skip => {
                    debug!("[ID{}]处理函数放弃了该路由，继续匹配", id);
                    continue;
                }
                Outcome::Matched(response) => {
                    log_state(id, DispatchState::Matched);
                    self.middlewares.run(Phase::BeforeResponse, request)?;
                    log_state(id, DispatchState::Responded);
                    return Ok(response);
                }
            }
        }

        log_state(id, DispatchState::NotFound);
        Ok(self.render_not_found(request, NOT_FOUND_MESSAGE))
    }

    fn render_signal(&self, signal: &Exception, request: &Request) -> Response {
        match signal {
            Exception::AccessDenied(message) => match &self.access_denied {
                Some(callback) => callback(request),
                None => Response::access_denied(message),
            },
            Exception::NotFound(message) => self.render_not_found(request, message),
            _ => Response::not_found(NOT_FOUND_MESSAGE),
        }
    }

    fn render_not_found(&self, request: &Request, message: &str) -> Response {
        match &self.not_found {
            Some(callback) => callback(request),
            None => Response::not_found(message),
        }
    }
}

fn log_state(id: u128, state: DispatchState) {
    debug!("[ID{}]分发状态：{}", id, state);
}
