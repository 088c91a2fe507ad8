// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 该模块负责将 TCP 流中读取的原始字节解析为强类型的 `Request` 结构体，
//! 也为进程内分发（测试、`browse`）提供直接构造请求的入口。它涵盖了：
//! 1. 请求行（Request-Line）的解析（方法、路径、查询字符串、版本）。
//! 2. 标头（Headers）与 Cookie 的提取。
//! 3. 查询参数与表单正文参数的合并，以及 `_method` 方法覆盖。
//! 4. 内容协商（Content Negotiation）相关的编码解析。

use std::collections::HashMap;

use log::error;
use url::form_urlencoded;

use crate::{exception::Exception, param::*};

/// 表示一次分发周期内的完整请求上下文。
///
/// 分发器与所有协作组件都从这里读取方法、路径、参数和 Cookie，而不是读取进程级的全局状态。
#[derive(Debug, Clone)]
pub struct Request {
    /// 全局请求 ID，用于在日志中追踪
    id: u128,
    /// 传输层的 HTTP 请求方法
    method: HttpRequestMethod,
    /// 请求的资源路径（不含查询字符串）
    path: String,
    /// 原始查询字符串
    query: Option<String>,
    /// HTTP 协议版本
    version: HttpVersion,
    /// 客户端标识字符串
    user_agent: String,
    /// 客户端支持的压缩编码列表（按解析顺序排列）
    accept_encoding: Vec<HttpEncoding>,
    /// 标头，键统一为小写
    headers: HashMap<String, String>,
    /// 查询参数与表单参数，表单参数覆盖同名查询参数
    parameters: HashMap<String, String>,
    cookies: HashMap<String, String>,
    /// 是否经由安全传输（TLS）到达
    secure: bool,
}

impl Request {
    /// 直接构造一个进程内请求，`target` 可以携带查询字符串。
    pub fn new(method: HttpRequestMethod, target: &str) -> Self {
        let (path, query) = split_target(target);
        let mut parameters = HashMap::new();
        if let Some(q) = &query {
            merge_form(&mut parameters, q);
        }
        Self {
            id: 0,
            method,
            path,
            query,
            version: HttpVersion::V1_1,
            user_agent: String::new(),
            accept_encoding: vec![],
            headers: HashMap::new(),
            parameters,
            cookies: HashMap::new(),
            secure: false,
        }
    }

    /// 从原始字节缓冲区尝试构建 `Request` 实例。
    ///
    /// # 逻辑步骤
    /// 1. 验证编码：确保请求数据是合法的 UTF-8 字符串。
    /// 2. 解析请求行：提取方法、路径、查询字符串和协议版本。
    /// 3. 迭代解析标头：统一转为小写键，并单独处理 `Cookie` 与 `Accept-Encoding`。
    /// 4. 解析正文：`application/x-www-form-urlencoded` 正文合并进参数表。
    ///
    /// # 错误处理
    /// 如果请求格式不符合 HTTP 规范或使用了不支持的方法/版本，将返回相应的 `Exception`。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        // 读缓冲区尾部可能是大量的 0 填充
        let end = buffer.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        let request_string = match std::str::from_utf8(&buffer[..end]) {
            Ok(string) => string,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };

        let (head, body) = match request_string.split_once("\r\n\r\n") {
            Some((head, body)) => (head, body),
            None => (request_string, ""),
        };
        let request_lines: Vec<&str> = head.split(CRLF).collect();

        // 解析请求行 (e.g., "GET /index.html HTTP/1.1")
        let first_line_parts: Vec<&str> = request_lines[0].split(' ').collect();
        if first_line_parts.len() < 3 {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, request_lines[0]);
            return Err(Exception::UnSupportedRequestMethod);
        }

        let method = match HttpRequestMethod::parse(first_line_parts[0]) {
            Some(m) => m,
            None => {
                error!("[ID{}]不支持的HTTP请求方法：{}", id, first_line_parts[0]);
                return Err(Exception::UnSupportedRequestMethod);
            }
        };

        let version_str = first_line_parts[first_line_parts.len() - 1].to_uppercase();
        let version = match version_str.as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            _ => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, &version_str);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        // 路径中出现空格虽然不规范，但通过 join 尝试恢复
        let target = first_line_parts[1..first_line_parts.len() - 1].join(" ");
        let mut request = Self::new(method, &target);
        request.id = id;
        request.version = version;

        for line in &request_lines[1..] {
            let (name, value) = match line.split_once(':') {
                Some((name, value)) => (name.trim().to_lowercase(), value.trim().to_string()),
                None => continue,
            };
            match name.as_str() {
                "user-agent" => request.user_agent = value.clone(),
                "cookie" => {
                    for pair in value.split(';') {
                        if let Some((k, v)) = pair.split_once('=') {
                            request.cookies.insert(k.trim().to_string(), v.trim().to_string());
                        }
                    }
                }
                // 这里的逻辑比较简单，只要包含关键词即视为支持
                "accept-encoding" => {
                    if value.contains("gzip") {
                        request.accept_encoding.push(HttpEncoding::Gzip);
                    }
                    if value.contains("deflate") {
                        request.accept_encoding.push(HttpEncoding::Deflate);
                    }
                    if value.contains("br") {
                        request.accept_encoding.push(HttpEncoding::Br);
                    }
                }
                "x-forwarded-proto" => request.secure = value.eq_ignore_ascii_case("https"),
                _ => {}
            }
            request.headers.insert(name, value);
        }

        let is_form = request
            .header("content-type")
            .map_or(false, |t| t.contains("application/x-www-form-urlencoded"));
        if is_form && !body.is_empty() {
            merge_form(&mut request.parameters, body);
        }

        Ok(request)
    }

    pub fn with_id(mut self, id: u128) -> Self {
        self.id = id;
        self
    }

    pub fn with_parameter(mut self, key: &str, value: &str) -> Self {
        self.parameters.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_lowercase(), value.to_string());
        self
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }
}

// --- Getter 访问器实现 ---

impl Request {
    pub fn id(&self) -> u128 {
        self.id
    }

    /// 获取 HTTP 协议版本
    pub fn version(&self) -> &HttpVersion {
        &self.version
    }

    /// 获取请求路径（不含查询参数）
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// 获取生效的请求方法。
    ///
    /// `_method` 参数指定了合法方法时优先使用它，否则使用传输层的方法。
    pub fn method(&self) -> HttpRequestMethod {
        self.parameters
            .get(METHOD_OVERRIDE_KEY)
            .and_then(|m| HttpRequestMethod::parse(m))
            .unwrap_or(self.method)
    }

    /// 获取传输层的原始请求方法
    pub fn transport_method(&self) -> HttpRequestMethod {
        self.method
    }

    /// 获取用户代理字符串
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// 获取客户端支持的压缩算法列表
    pub fn accept_encoding(&self) -> &[HttpEncoding] {
        &self.accept_encoding
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn host(&self) -> &str {
        self.header("host").unwrap_or("localhost")
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }
}

fn split_target(target: &str) -> (String, Option<String>) {
    match target.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (target.to_string(), None),
    }
}

fn merge_form(parameters: &mut HashMap<String, String>, encoded: &str) {
    for (key, value) in form_urlencoded::parse(encoded.as_bytes()) {
        parameters.insert(key.into_owned(), value.into_owned());
    }
}
