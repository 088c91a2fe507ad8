// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 路由约束
//!
//! 在路由匹配成功之后、处理函数执行之前检查传输方式、请求方法与参数形态。
//! 任何一项不满足时返回 `Outcome::Skip`，分发器会继续尝试后续路由，而不是报错。

use log::{debug, error};
use regex::Regex;

use crate::{
    exception::Exception,
    handler::{HandlerResult, Outcome, Params},
    param::HttpRequestMethod,
    request::Request,
};

/// 纯数字参数使用的约束
pub const NUMBER_PATTERN: &str = r"\d+";

/// 约束的声明形式，通过链式调用构造
#[derive(Debug, Clone, Default)]
pub struct Requirements {
    secure: bool,
    method: Option<HttpRequestMethod>,
    params: Vec<(String, String)>,
}

impl Requirements {
    pub fn new() -> Self {
        Self::default()
    }

    /// 要求请求经由安全传输到达
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// 要求生效的请求方法（考虑 `_method` 覆盖）与之相同
    pub fn method(mut self, method: HttpRequestMethod) -> Self {
        self.method = Some(method);
        self
    }

    /// 要求名为 `name` 的参数完整匹配正则 `pattern`
    pub fn param(mut self, name: &str, pattern: &str) -> Self {
        self.params.push((name.to_string(), pattern.to_string()));
        self
    }

    pub fn number(self, name: &str) -> Self {
        self.param(name, NUMBER_PATTERN)
    }
}

/// 编译后的约束集合
#[derive(Debug, Clone)]
pub struct RequirementGate {
    secure: bool,
    method: Option<HttpRequestMethod>,
    params: Vec<(String, Regex)>,
}

impl RequirementGate {
    pub fn compile(requirements: &Requirements) -> Result<Self, Exception> {
        let mut params = Vec::with_capacity(requirements.params.len());
        for (name, pattern) in &requirements.params {
            match Regex::new(&format!("^(?:{})$", pattern)) {
                Ok(re) => params.push((name.clone(), re)),
                Err(e) => {
                    error!("参数{}的约束{}无法编译：{}", name, pattern, e);
                    return Err(Exception::InvalidPattern(pattern.clone()));
                }
            }
        }
        Ok(Self {
            secure: requirements.secure,
            method: requirements.method,
            params,
        })
    }

    /// 检查本次请求与匹配出的参数是否满足全部约束。
    ///
    /// 路由声明里没有的参数名会被忽略。
    pub fn admits(&self, request: &Request, params: &Params) -> bool {
        if self.secure && !request.is_secure() {
            debug!("[ID{}]约束要求安全传输，跳过该路由", request.id());
            return false;
        }
        if let Some(method) = self.method {
            if request.method() != method {
                debug!(
                    "[ID{}]约束要求{}方法，实际为{}，跳过该路由",
                    request.id(),
                    method,
                    request.method()
                );
                return false;
            }
        }
        for (name, re) in &self.params {
            if let Some(value) = params.get(name) {
                if !re.is_match(value) {
                    debug!(
                        "[ID{}]参数{}的值{}不满足约束，跳过该路由",
                        request.id(),
                        name,
                        value
                    );
                    return false;
                }
            }
        }
        true
    }
}

/// 用约束包装处理函数。约束不满足时返回 `Outcome::Skip`。
pub fn wrap<F>(
    requirements: Requirements,
    handler: F,
) -> Result<impl Fn(&Request, &Params) -> HandlerResult + Send + Sync + 'static, Exception>
where
    F: Fn(&Request, &Params) -> HandlerResult + Send + Sync + 'static,
{
    let gate = RequirementGate::compile(&requirements)?;
    Ok(move |request: &Request, params: &Params| {
        if gate.admits(request, params) {
            handler(request, params)
        } else {
            Ok(Outcome::Skip)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(name: &str, value: &str) -> Params {
        Params::new(vec![name.to_string()], vec![value.to_string()])
    }

    fn ok(_: &Request, _: &Params) -> HandlerResult {
        Ok(Outcome::respond("ok"))
    }

    #[test]
    fn test_param_requirement_is_anchored() {
        let gate = RequirementGate::compile(&Requirements::new().number("id")).unwrap();
        let request = Request::new(HttpRequestMethod::Get, "/42");

        assert!(gate.admits(&request, &params("id", "42")));
        assert!(!gate.admits(&request, &params("id", "abc")));
        assert!(!gate.admits(&request, &params("id", "42abc")));
    }

    #[test]
    fn test_alternation_is_fully_anchored() {
        let gate =
            RequirementGate::compile(&Requirements::new().param("kind", "a|b")).unwrap();
        let request = Request::new(HttpRequestMethod::Get, "/");

        assert!(gate.admits(&request, &params("kind", "b")));
        assert!(!gate.admits(&request, &params("kind", "ab")));
    }

    #[test]
    fn test_unknown_param_names_are_ignored() {
        let gate = RequirementGate::compile(&Requirements::new().number("page")).unwrap();
        let request = Request::new(HttpRequestMethod::Get, "/x");
        assert!(gate.admits(&request, &params("id", "x")));
    }

    #[test]
    fn test_secure_requirement() {
        let gate = RequirementGate::compile(&Requirements::new().secure(true)).unwrap();
        let plain = Request::new(HttpRequestMethod::Get, "/");
        let tls = Request::new(HttpRequestMethod::Get, "/").with_secure(true);

        assert!(!gate.admits(&plain, &Params::default()));
        assert!(gate.admits(&tls, &Params::default()));
    }

    #[test]
    fn test_method_requirement_honours_override() {
        let gate = RequirementGate::compile(
            &Requirements::new().method(HttpRequestMethod::Delete),
        )
        .unwrap();
        let post = Request::new(HttpRequestMethod::Post, "/posts/1");
        let overridden = post.clone().with_parameter("_method", "DELETE");

        assert!(!gate.admits(&post, &Params::default()));
        assert!(gate.admits(&overridden, &Params::default()));
    }

    #[test]
    fn test_wrap_skips_instead_of_failing() {
        let guarded = wrap(Requirements::new().number("id"), ok).unwrap();
        let request = Request::new(HttpRequestMethod::Get, "/abc");

        assert!(guarded(&request, &params("id", "abc")).unwrap().is_skip());
        assert!(!guarded(&request, &params("id", "7")).unwrap().is_skip());
    }

    #[test]
    fn test_invalid_requirement_pattern() {
        let result = wrap(Requirements::new().param("id", "(\\d+"), ok);
        assert!(matches!(result, Err(Exception::InvalidPattern(_))));
    }
}
