// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 路由表模块
//!
//! 负责路由声明的编译、注册、匹配与反向生成 URL。
//!
//! ## 匹配规则
//! 1. `:name` 占位符编译为 `([a-zA-Z0-9\-_]+)`，参数值不会跨越 `/`。
//! 2. 匹配时使用 `^pattern/?$`，大小写敏感，末尾斜杠可选。
//! 3. 按存储顺序逐条尝试，先注册者优先，不存在“更具体的路由优先”。
//! 4. 声明中其余的正则语法原样保留，不做转义。其中的捕获组同样绑定为参数，
//!    按名字取值时以占位符实际所在的捕获组为准。
//! 5. 占位符名以字母或下划线开头。紧跟在 `(?` 或 `(?flags` 之后的冒号属于分组语法，
//!    例如 `(?:a|b)`、`(?i:abc)`，不会被当作占位符。

use std::fmt;

use lazy_static::lazy_static;
use log::{debug, error};
use regex::{Captures, Regex};

use crate::{
    exception::Exception,
    handler::{BoxedHandler, HandlerResult, Params},
    param::HttpRequestMethod,
    request::Request,
};

/// 占位符被替换成的捕获组
const PLACEHOLDER: &str = r"([a-zA-Z0-9\-_]+)";

/// 匹配器内部给占位符捕获组起的名字前缀，用来定位参数所在的组
const SLOT_PREFIX: &str = "apricot_slot";

lazy_static! {
    // 第一组非空时冒号属于 `(?:` 一类的分组语法
    static ref TOKEN: Regex =
        Regex::new(r"(\(\?[a-zA-Z-]*)?:([A-Za-z_][A-Za-z0-9_]*)").expect("占位符正则必须合法");
    static ref URL_TOKEN: Regex =
        Regex::new(r"/:([A-Za-z_][A-Za-z0-9_]*)").expect("占位符正则必须合法");
}

/// 一条编译后的路由声明。`raw` 保留原始声明，用于去重与反向生成 URL。
#[derive(Debug, Clone)]
pub struct RoutePattern {
    raw: String,
    source: String,
    matcher: Regex,
    names: Vec<String>,
    /// 每个占位符对应的参数位置（捕获组序号减一）
    slots: Vec<usize>,
}

impl RoutePattern {
    pub fn compile(declaration: &str) -> Result<Self, Exception> {
        let mut names = Vec::new();
        let source = TOKEN
            .replace_all(declaration, |caps: &Captures| {
                if caps.get(1).is_some() {
                    return caps[0].to_string();
                }
                names.push(caps[2].to_string());
                PLACEHOLDER.to_string()
            })
            .into_owned();

        let mut slot = 0;
        let tagged = TOKEN.replace_all(declaration, |caps: &Captures| {
            if caps.get(1).is_some() {
                return caps[0].to_string();
            }
            let group = format!(r"(?P<{}{}>[a-zA-Z0-9\-_]+)", SLOT_PREFIX, slot);
            slot += 1;
            group
        });
        let matcher = match Regex::new(&format!("^{}/?$", tagged)) {
            Ok(m) => m,
            Err(e) => {
                error!("路由声明{}无法编译为正则：{}", declaration, e);
                return Err(Exception::InvalidPattern(declaration.to_string()));
            }
        };

        let slots = (0..names.len())
            .map(|i| {
                let wanted = format!("{}{}", SLOT_PREFIX, i);
                matcher
                    .capture_names()
                    .position(|n| n == Some(wanted.as_str()))
                    .map_or(i, |group| group - 1)
            })
            .collect();

        Ok(Self {
            raw: declaration.to_string(),
            source,
            matcher,
            names,
            slots,
        })
    }

    /// 尝试匹配路径，成功时按捕获组顺序绑定参数
    pub fn captures(&self, path: &str) -> Option<Params> {
        let caps = self.matcher.captures(path)?;
        let values = caps
            .iter()
            .skip(1)
            .map(|m| m.map_or_else(String::new, |m| m.as_str().to_string()))
            .collect();
        Some(Params::with_slots(
            self.names.clone(),
            self.slots.clone(),
            values,
        ))
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// 替换占位符之后、加锚点之前的正则文本
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// 路由名。自动编号与显式命名处于不同的命名空间，互不冲突。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteName {
    Auto(usize),
    Named(String),
}

impl fmt::Display for RouteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteName::Auto(index) => write!(f, "#{}", index),
            RouteName::Named(name) => write!(f, "{}", name),
        }
    }
}

pub struct RouteEntry {
    name: RouteName,
    pattern: RoutePattern,
    handler: BoxedHandler,
    verb: Option<HttpRequestMethod>,
    force_https: bool,
}

impl RouteEntry {
    pub fn name(&self) -> &RouteName {
        &self.name
    }

    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    /// REST 辅助函数注册的路由带有动词，普通路由为 `None`
    pub fn verb(&self) -> Option<HttpRequestMethod> {
        self.verb
    }

    pub fn forces_https(&self) -> bool {
        self.force_https
    }

    pub fn call(&self, request: &Request, params: &Params) -> HandlerResult {
        (self.handler)(request, params)
    }
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("name", &self.name)
            .field("pattern", &self.pattern.raw)
            .field("verb", &self.verb)
            .field("force_https", &self.force_https)
            .finish()
    }
}

/// 按注册顺序保存的路由集合，以及当前生效的前缀栈
#[derive(Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
    prefixes: Vec<String>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_prefix(&self) -> Option<&str> {
        self.prefixes.last().map(String::as_str)
    }

    /// 将 `prefix` 与当前前缀拼接后压栈
    pub(crate) fn push_prefix(&mut self, prefix: &str) {
        let composed = format!("{}{}", self.active_prefix().unwrap_or(""), prefix);
        debug!("进入前缀作用域：{}", composed);
        self.prefixes.push(composed);
    }

    pub(crate) fn pop_prefix(&mut self) -> Option<String> {
        self.prefixes.pop()
    }

    /// 当前前缀下声明的实际路径。前缀非空且声明为 `/` 时，结果就是前缀本身。
    pub fn effective_declaration(&self, declaration: &str) -> String {
        match self.active_prefix() {
            Some(prefix) if !prefix.is_empty() => {
                if declaration == "/" {
                    prefix.to_string()
                } else {
                    format!("{}{}", prefix, declaration)
                }
            }
            _ => declaration.to_string(),
        }
    }

    pub fn register(
        &mut self,
        declaration: &str,
        handler: BoxedHandler,
        name: Option<&str>,
    ) -> Result<(), Exception> {
        self.insert(declaration, handler, name, None)
    }

    pub fn register_verb(
        &mut self,
        declaration: &str,
        handler: BoxedHandler,
        verb: HttpRequestMethod,
    ) -> Result<(), Exception> {
        self.insert(declaration, handler, None, Some(verb))
    }

    fn insert(
        &mut self,
        declaration: &str,
        handler: BoxedHandler,
        name: Option<&str>,
        verb: Option<HttpRequestMethod>,
    ) -> Result<(), Exception> {
        let effective = self.effective_declaration(declaration);
        let pattern = RoutePattern::compile(&effective)?;

        // 相同声明（及动词）的旧路由被移除，新路由追加到末尾
        let before = self.entries.len();
        self.entries
            .retain(|e| !(e.pattern.raw == effective && e.verb == verb));
        if let Some(n) = name {
            self.entries
                .retain(|e| e.name != RouteName::Named(n.to_string()));
        }
        if self.entries.len() != before {
            debug!("路由{}覆盖了{}条旧路由", effective, before - self.entries.len());
        }

        let name = match name {
            Some(n) => RouteName::Named(n.to_string()),
            None => RouteName::Auto(self.entries.len()),
        };
        debug!("注册路由：{} -> {}", name, effective);
        self.entries.push(RouteEntry {
            name,
            pattern,
            handler,
            verb,
            force_https: false,
        });
        Ok(())
    }

    /// 第一条匹配 `path` 的路由
    pub fn match_path<'a>(&'a self, path: &'a str) -> Option<(&'a RouteEntry, Params)> {
        self.matches(path).next()
    }

    /// 按存储顺序列出所有匹配 `path` 的路由
    pub fn matches<'a>(&'a self, path: &'a str) -> impl Iterator<Item = (&'a RouteEntry, Params)> + 'a {
        self.entries
            .iter()
            .filter_map(move |e| e.pattern.captures(path).map(|p| (e, p)))
    }

    /// 根据路由名或带占位符的路径生成 URL。
    ///
    /// 输入不含 `/` 时视为路由名；每个 `/:name` 被替换为 `/value`，没有提供值的占位符保持原样。
    pub fn url_for(&self, name_or_path: &str, params: &[(&str, &str)]) -> Result<String, Exception> {
        let template = if name_or_path.contains('/') {
            name_or_path.to_string()
        } else {
            let wanted = RouteName::Named(name_or_path.to_string());
            match self.entries.iter().find(|e| e.name == wanted) {
                Some(e) => e.pattern.raw.clone(),
                None => return Err(Exception::RouteNotFound(name_or_path.to_string())),
            }
        };

        let url = URL_TOKEN.replace_all(&template, |caps: &Captures| {
            match params.iter().find(|(k, _)| *k == &caps[1]) {
                Some((_, v)) => format!("/{}", v),
                None => caps[0].to_string(),
            }
        });
        Ok(url.into_owned())
    }

    /// 将编译后正则以 `pattern` 开头的路由标记为强制 HTTPS，返回标记的数量
    pub fn force_https(&mut self, pattern: &str) -> Result<usize, Exception> {
        let prefix = Regex::new(&format!("^{}", pattern))
            .map_err(|_| Exception::InvalidPattern(pattern.to_string()))?;
        let mut marked = 0;
        for entry in self.entries.iter_mut() {
            if prefix.is_match(&entry.pattern.source) {
                entry.force_https = true;
                marked += 1;
            }
        }
        Ok(marked)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
