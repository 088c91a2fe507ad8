// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了框架在注册路由、分发请求以及调用各类协作组件（容器、缓存、会话）时可能抛出的异常。
//!
//! ## 设计意图
//! - **错误分类**：涵盖了协议解析错误、路由配置错误、作用域/服务错误以及应用代码主动抛出的错误。
//! - **控制流信号**：`AccessDenied` 与 `NotFound` 由分发器捕获并渲染为 403/404 页面，不会进入失败回调。
//! - **用户友好**：通过实现 `std::fmt::Display`，确保错误信息可以被安全地记录到日志或交给失败回调。

use std::fmt;

/// 框架处理过程中发生的异常类型。
///
/// 该枚举通常作为 `Result` 的 `Err` 部分返回，用于指示处理失败的具体原因。
#[derive(Debug, Clone, PartialEq)]
pub enum Exception {
    /// 客户端发送的请求字节流无法解析为合法的 UTF-8 字符串。
    RequestIsNotUtf8,
    /// 客户端使用了框架不认识的 HTTP 方法。
    UnSupportedRequestMethod,
    /// 客户端使用了服务器不支持的 HTTP 协议版本（例如：HTTP/0.9 或过高的版本）。
    UnsupportedHttpVersion,
    /// 路由声明或参数约束无法编译为正则表达式。携带出错的原始文本。
    InvalidPattern(String),
    /// 生成 URL 时找不到指定名称的路由。
    RouteNotFound(String),
    /// 试图重新打开已冻结的作用域。
    FrozenScope(String),
    /// 试图冻结一个尚未声明的作用域。
    ScopeNotDeclared(String),
    /// 容器中找不到指定服务，或服务类型与请求的类型不符。
    ServiceNotFound(String),
    /// 访问被拒绝，分发器会将其渲染为 403 页面。
    AccessDenied(String),
    /// 主动触发的 404，分发器会将其渲染为未找到页面。
    NotFound(String),
    /// 请求携带的 CSRF 令牌缺失或与会话中的不一致。
    InvalidCsrfToken,
    /// 缓存后端读写失败。
    CacheFailure(String),
    /// 中间件、事件监听器或路由处理函数主动抛出的错误。
    Custom(String),
}

use Exception::*;

impl Exception {
    /// 构造一个由应用代码抛出的错误。
    pub fn custom(message: impl Into<String>) -> Self {
        Custom(message.into())
    }

    /// 该异常是否属于分发器会就地渲染的控制流信号（403 / 404）。
    pub fn is_page_signal(&self) -> bool {
        matches!(self, AccessDenied(_) | NotFound(_))
    }
}

/// 为 `Exception` 实现 `Display` 特性，使其支持字符串格式化输出。
impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            UnSupportedRequestMethod => write!(f, "Unsupported request method"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            InvalidPattern(pattern) => write!(f, "Invalid route pattern '{}'", pattern),
            RouteNotFound(name) => write!(f, "No route was found under name '{}'", name),
            FrozenScope(name) => write!(f, "Cannot re-open frozen scope '{}'", name),
            ScopeNotDeclared(name) => write!(
                f,
                "Cannot freeze scope '{}', as it has not been declared yet",
                name
            ),
            ServiceNotFound(id) => write!(f, "Unable to find service '{}' into the container", id),
            AccessDenied(message) => write!(f, "{}", message),
            NotFound(message) => write!(f, "{}", message),
            InvalidCsrfToken => write!(f, "Invalid CSRF token provided"),
            CacheFailure(message) => write!(f, "Cache failure: {}", message),
            Custom(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for Exception {}
