// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 响应构建模块
//!
//! 路由处理函数、监听器与失败回调都产出 `Response`。服务端在发送前按客户端的
//! `Accept-Encoding` 进行压缩，再序列化为报文。

use std::borrow::Cow;
use std::io::{self, Write};

use brotli::enc::{self, backward_references::BrotliEncoderParams};
use bytes::Bytes;
use chrono::prelude::*;
use flate2::{
    write::{DeflateEncoder, GzEncoder},
    Compression,
};
use log::{debug, error};

use crate::param::*;

const HTML_TYPE: &str = "text/html;charset=utf-8";
const TEXT_TYPE: &str = "text/plain;charset=utf-8";

/// `Set-Cookie` 的安全快捷方式：默认 `HttpOnly`，路径为 `/`。
#[derive(Debug, Clone, PartialEq)]
pub struct Cookie {
    name: String,
    value: String,
    expires: Option<DateTime<Utc>>,
    path: String,
    domain: Option<String>,
    secure: bool,
    http_only: bool,
}

impl Cookie {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            expires: None,
            path: "/".to_string(),
            domain: None,
            secure: false,
            http_only: true,
        }
    }

    pub fn expires(mut self, at: DateTime<Utc>) -> Self {
        self.expires = Some(at);
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    pub fn domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// 序列化为 `Set-Cookie` 头的值
    pub fn header_value(&self) -> String {
        let mut value = format!("{}={}; Path={}", self.name, self.value, self.path);
        if let Some(expires) = self.expires {
            value.push_str(&format!(
                "; Expires={}",
                expires.format("%a, %d %b %Y %H:%M:%S GMT")
            ));
        }
        if let Some(domain) = &self.domain {
            value.push_str(&format!("; Domain={}", domain));
        }
        if self.secure {
            value.push_str("; Secure");
        }
        if self.http_only {
            value.push_str("; HttpOnly");
        }
        value
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    version: HttpVersion,
    status_code: u16,
    information: String,
    content_type: Option<String>,
    content_encoding: Option<HttpEncoding>,
    date: DateTime<Utc>,
    server_name: String,
    headers: Vec<(String, String)>,
    content: Bytes,
}

impl Response {
    pub fn new() -> Self {
        Self {
            version: HttpVersion::V1_1,
            status_code: 200,
            information: "OK".to_string(),
            content_type: None,
            content_encoding: None,
            date: Utc::now(),
            server_name: SERVER_NAME.to_string(),
            headers: vec![],
            content: Bytes::new(),
        }
    }

    pub fn html(body: impl Into<String>) -> Self {
        let mut response = Self::new();
        response.content_type = Some(HTML_TYPE.to_string());
        response.content = Bytes::from(body.into());
        response
    }

    pub fn text(body: impl Into<String>) -> Self {
        let mut response = Self::new();
        response.content_type = Some(TEXT_TYPE.to_string());
        response.content = Bytes::from(body.into());
        response
    }

    /// 默认的 404 页面：`<h1>{message}</h1>`
    pub fn not_found(message: &str) -> Self {
        Self::html(format!("<h1>{}</h1>", message)).with_status(404)
    }

    /// 默认的 403 页面：`<h1>{message}</h1>`
    pub fn access_denied(message: &str) -> Self {
        Self::html(format!("<h1>{}</h1>", message)).with_status(403)
    }

    /// 401 质询页面，附带 `WWW-Authenticate` 头
    pub fn unauthorized(challenge: &str) -> Self {
        Self::html("<h1>401 Unauthorized</h1>")
            .with_status(401)
            .with_header("WWW-Authenticate", challenge)
    }

    pub fn redirect(location: &str) -> Self {
        Self::new().with_status(302).with_header("Location", location)
    }

    pub fn with_status(mut self, code: u16) -> Self {
        self.set_code(code);
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    pub fn set_cookie(self, cookie: &Cookie) -> Self {
        self.with_header("Set-Cookie", &cookie.header_value())
    }

    fn set_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = match STATUS_CODES.get(&code) {
            Some(&phrase) => phrase.to_string(),
            None => {
                error!("非法的状态码：{}，原因短语将被置为Unknown", code);
                "Unknown".to_string()
            }
        };
        self
    }

    /// 按客户端声明的编码压缩响应体。
    ///
    /// 已经压缩过的媒体类型、空响应体以及已编码的响应保持原样。压缩失败时发送未压缩内容。
    pub fn encode(&mut self, accept_encoding: &[HttpEncoding]) {
        if self.content.is_empty() || self.content_encoding.is_some() {
            return;
        }
        if let Some(mime) = &self.content_type {
            if should_skip_compression(mime) {
                debug!("文件类型: {}，跳过压缩", mime);
                return;
            }
        }
        let encoding = match decide_encoding(accept_encoding) {
            Some(e) => e,
            None => return,
        };
        match compress(self.content.to_vec(), Some(encoding)) {
            Ok(compressed) => {
                self.content = Bytes::from(compressed);
                self.content_encoding = Some(encoding);
            }
            Err(e) => error!("压缩响应内容失败: {}，返回未压缩内容", e),
        }
    }

    /// 序列化为完整的 HTTP 报文。`head_only` 为真时只发送头部（HEAD 请求）。
    pub fn as_bytes(&self, head_only: bool) -> Vec<u8> {
        let version: &str = match self.version {
            HttpVersion::V1_1 => "HTTP/1.1",
        };
        let mut header = format!("{} {} {}{}", version, self.status_code, self.information, CRLF);
        if let Some(t) = &self.content_type {
            header.push_str(&["Content-Type: ", t, CRLF].concat());
        }
        if let Some(e) = self.content_encoding {
            header.push_str(&format!("Content-Encoding: {}{}", e, CRLF));
        }
        header.push_str(&format!("Content-Length: {}{}", self.content.len(), CRLF));
        header.push_str(&["Date: ", &format_date(&self.date), CRLF].concat());
        header.push_str(&["Server: ", &self.server_name, CRLF].concat());
        for (name, value) in &self.headers {
            header.push_str(&[name.as_str(), ": ", value, CRLF].concat());
        }
        header.push_str(CRLF);

        let body: &[u8] = if head_only { b"" } else { &self.content };
        [header.as_bytes(), body].concat()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for Response {
    fn from(body: &str) -> Self {
        Self::html(body)
    }
}

impl From<String> for Response {
    fn from(body: String) -> Self {
        Self::html(body)
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_encoding(&self) -> Option<HttpEncoding> {
        self.content_encoding
    }

    pub fn body(&self) -> &Bytes {
        &self.content
    }

    /// 以字符串形式读取响应体（非 UTF-8 字节被替换）
    pub fn body_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }

    /// 第一个同名头（大小写不敏感）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc2822()
}

fn compress(data: Vec<u8>, mode: Option<HttpEncoding>) -> io::Result<Vec<u8>> {
    let original_size = data.len();
    let result = match mode {
        Some(HttpEncoding::Gzip) => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data)?;
            encoder.finish()
        }
        Some(HttpEncoding::Deflate) => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data)?;
            encoder.finish()
        }
        Some(HttpEncoding::Br) => {
            let params = BrotliEncoderParams::default();
            let mut output = Vec::new();
            enc::BrotliCompress(&mut io::Cursor::new(data), &mut output, &params)?;
            Ok(output)
        }
        None => Ok(data),
    };

    if let Ok(ref compressed) = result {
        debug!(
            "压缩完成: {:?}, 原始大小: {} bytes, 压缩后: {} bytes",
            mode,
            original_size,
            compressed.len()
        );
    }

    result
}

fn should_skip_compression(mime_type: &str) -> bool {
    let skip_types = [
        "image/",
        "video/",
        "audio/",
        "application/zip",
        "application/gzip",
        "application/x-7z-compressed",
        "font/woff",
    ];

    skip_types
        .iter()
        .any(|&skip_type| mime_type.starts_with(skip_type))
}

// Brotli 编码代价较高，仅在显式调用 compress 时使用
fn decide_encoding(accept_encoding: &[HttpEncoding]) -> Option<HttpEncoding> {
    if accept_encoding.contains(&HttpEncoding::Gzip) {
        Some(HttpEncoding::Gzip)
    } else if accept_encoding.contains(&HttpEncoding::Deflate) {
        Some(HttpEncoding::Deflate)
    } else {
        None
    }
}
