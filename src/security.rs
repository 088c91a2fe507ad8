// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 安全辅助
//!
//! - 按路径前缀保护路由：在 `match` 事件上挂监听器，检查失败时拒绝访问。
//! - HTTP Basic 认证。
//! - 基于 Cookie 的内存会话与 CSRF 令牌。

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, warn};
use lru::LruCache;
use regex::Regex;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    app::App,
    exception::Exception,
    param::{
        ACCESS_DENIED_MESSAGE, CSRF_TOKEN_KEY, DEFAULT_SESSION_CAPACITY, MATCH_EVENT,
        SESSION_COOKIE,
    },
    request::Request,
    response::{Cookie, Response},
};

impl App {
    /// 保护路径以 `pattern` 开头的所有路由。
    ///
    /// 路由匹配后 `check` 收到按顺序捕获的参数，返回 `false` 时本次请求被拒绝（403）。
    pub fn secure<F>(&mut self, pattern: &str, check: F) -> Result<(), Exception>
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        let guarded = Regex::new(&format!("^{}", pattern))
            .map_err(|_| Exception::InvalidPattern(pattern.to_string()))?;
        self.on(
            MATCH_EVENT,
            move |args| {
                let Some((path, params)) = args.split_first() else {
                    return Ok(None);
                };
                if guarded.is_match(path) && !check(params) {
                    debug!("路径{}未通过安全检查", path);
                    return Err(App::trigger_access_denied(ACCESS_DENIED_MESSAGE));
                }
                Ok(None)
            },
            0,
        );
        Ok(())
    }
}

/// HTTP Basic 认证的结果
#[derive(Debug, Clone)]
pub enum BasicAuth {
    Authenticated(String),
    Rejected,
    /// 请求没有携带凭据，应当把这个 401 响应返回给客户端
    Challenge(Response),
}

impl BasicAuth {
    /// 把 `Rejected` 转换为拒绝访问错误，交给分发器渲染 403 页面
    pub fn or_deny(self) -> Result<BasicAuth, Exception> {
        match self {
            BasicAuth::Rejected => Err(App::trigger_access_denied(ACCESS_DENIED_MESSAGE)),
            other => Ok(other),
        }
    }
}

pub fn http_basic(request: &Request, realm: &str, users: &HashMap<String, String>) -> BasicAuth {
    let Some(header) = request.header("authorization") else {
        return BasicAuth::Challenge(Response::unauthorized(&format!(
            "Basic realm=\"{}\"",
            realm
        )));
    };

    let credentials = header
        .strip_prefix("Basic ")
        .and_then(|encoded| STANDARD.decode(encoded.trim()).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok());
    let Some(credentials) = credentials else {
        warn!("[ID{}]无法解析Authorization头", request.id());
        return BasicAuth::Rejected;
    };

    match credentials.split_once(':') {
        Some((user, password)) if users.get(user).is_some_and(|p| p == password) => {
            BasicAuth::Authenticated(user.to_string())
        }
        _ => {
            debug!("[ID{}]Basic认证失败", request.id());
            BasicAuth::Rejected
        }
    }
}

/// 一次请求对应的会话句柄
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    id: String,
    is_new: bool,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 会话是否在本次请求中新建，新建时需要把会话 Cookie 发给客户端
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn cookie(&self) -> Cookie {
        Cookie::new(SESSION_COOKIE, &self.id)
    }
}

type SessionVars = HashMap<String, Value>;

/// 以 `APRICOTSESSID` Cookie 为键的内存会话存储。
///
/// 容量有限，满了之后新建会话会淘汰最久未使用的会话。
#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<LruCache<String, SessionVars>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_SESSION_CAPACITY)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 容量为 0 时使用默认容量
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = match NonZeroUsize::new(capacity) {
            Some(c) => c,
            None => {
                warn!("会话容量不能为0，使用默认容量{}", DEFAULT_SESSION_CAPACITY);
                NonZeroUsize::new(DEFAULT_SESSION_CAPACITY).unwrap_or(NonZeroUsize::MIN)
            }
        };
        Self {
            sessions: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, SessionVars>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 沿用请求携带的会话，或者新建一个
    pub fn start(&self, request: &Request) -> Session {
        let mut sessions = self.lock();
        if let Some(id) = request.cookie(SESSION_COOKIE) {
            if sessions.get(id).is_some() {
                return Session {
                    id: id.to_string(),
                    is_new: false,
                };
            }
        }
        let id = Uuid::new_v4().simple().to_string();
        debug!("[ID{}]新建会话{}", request.id(), id);
        if let Some((evicted, _)) = sessions.push(id.clone(), HashMap::new()) {
            debug!("[ID{}]会话已满，淘汰会话{}", request.id(), evicted);
        }
        Session { id, is_new: true }
    }

    pub fn get(&self, session: &str, key: &str) -> Option<Value> {
        self.lock().get(session).and_then(|s| s.get(key).cloned())
    }

    pub fn set(&self, session: &str, key: &str, value: impl Into<Value>) {
        self.lock()
            .get_or_insert_mut(session.to_string(), HashMap::new)
            .insert(key.to_string(), value.into());
    }

    /// 返回会话中的 CSRF 令牌，没有时生成一个
    pub fn csrf_token(&self, session: &str) -> String {
        let mut sessions = self.lock();
        let vars = sessions.get_or_insert_mut(session.to_string(), HashMap::new);
        match vars.get(CSRF_TOKEN_KEY) {
            Some(Value::String(token)) => token.clone(),
            _ => {
                let token = Uuid::new_v4().simple().to_string();
                vars.insert(CSRF_TOKEN_KEY.to_string(), Value::String(token.clone()));
                token
            }
        }
    }

    /// 校验请求中的 CSRF 令牌。
    ///
    /// 会话中没有令牌时返回 `Ok(false)`；请求没带令牌或令牌不一致时返回 `InvalidCsrfToken`。
    pub fn validate_csrf(&self, request: &Request) -> Result<bool, Exception> {
        let expected = request
            .cookie(SESSION_COOKIE)
            .and_then(|id| self.get(id, CSRF_TOKEN_KEY));
        let Some(Value::String(expected)) = expected else {
            return Ok(false);
        };
        match request.parameter(CSRF_TOKEN_KEY) {
            Some(token) if token == expected => Ok(true),
            _ => {
                warn!("[ID{}]CSRF令牌校验失败", request.id());
                Err(Exception::InvalidCsrfToken)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::HttpRequestMethod;

    fn users() -> HashMap<String, String> {
        HashMap::from([("admin".to_string(), "secret".to_string())])
    }

    fn with_auth(credentials: &str) -> Request {
        Request::new(HttpRequestMethod::Get, "/admin").with_header(
            "Authorization",
            &format!("Basic {}", STANDARD.encode(credentials)),
        )
    }

    #[test]
    fn test_basic_challenge_without_credentials() {
        let request = Request::new(HttpRequestMethod::Get, "/admin");
        match http_basic(&request, "Admin area", &users()) {
            BasicAuth::Challenge(response) => {
                assert_eq!(response.status_code(), 401);
                assert_eq!(
                    response.header("WWW-Authenticate"),
                    Some("Basic realm=\"Admin area\"")
                );
                assert_eq!(response.body_str(), "<h1>401 Unauthorized</h1>");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_basic_accepts_known_user() {
        match http_basic(&with_auth("admin:secret"), "r", &users()) {
            BasicAuth::Authenticated(user) => assert_eq!(user, "admin"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_basic_rejects_bad_password_and_unknown_user() {
        assert!(matches!(
            http_basic(&with_auth("admin:wrong"), "r", &users()),
            BasicAuth::Rejected
        ));
        assert!(matches!(
            http_basic(&with_auth("root:secret"), "r", &users()),
            BasicAuth::Rejected
        ));
        assert!(matches!(
            http_basic(&with_auth("garbage"), "r", &users()),
            BasicAuth::Rejected
        ));
    }

    #[test]
    fn test_rejected_can_become_access_denied() {
        let result = http_basic(&with_auth("admin:wrong"), "r", &users()).or_deny();
        assert_eq!(
            result.unwrap_err(),
            Exception::AccessDenied(ACCESS_DENIED_MESSAGE.to_string())
        );
    }

    #[test]
    fn test_session_is_reused_by_cookie() {
        let store = SessionStore::new();
        let first = store.start(&Request::new(HttpRequestMethod::Get, "/"));
        assert!(first.is_new());
        store.set(first.id(), "user", "Foo");

        let again = Request::new(HttpRequestMethod::Get, "/").with_cookie(SESSION_COOKIE, first.id());
        let second = store.start(&again);
        assert!(!second.is_new());
        assert_eq!(second.id(), first.id());
        assert_eq!(store.get(second.id(), "user"), Some(Value::from("Foo")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_unknown_session_cookie_starts_fresh() {
        let store = SessionStore::new();
        let request = Request::new(HttpRequestMethod::Get, "/").with_cookie(SESSION_COOKIE, "forged");
        let session = store.start(&request);
        assert!(session.is_new());
        assert_ne!(session.id(), "forged");
        assert!(session.cookie().header_value().starts_with("APRICOTSESSID="));
    }

    #[test]
    fn test_store_stays_bounded_without_cookies() {
        let store = SessionStore::with_capacity(3);
        let first = store.start(&Request::new(HttpRequestMethod::Get, "/"));
        for _ in 0..100 {
            assert!(store.start(&Request::new(HttpRequestMethod::Get, "/")).is_new());
        }
        assert_eq!(store.len(), 3);

        // 最久未使用的会话已被淘汰
        let returning = Request::new(HttpRequestMethod::Get, "/").with_cookie(SESSION_COOKIE, first.id());
        assert!(store.start(&returning).is_new());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_active_session_survives_eviction() {
        let store = SessionStore::with_capacity(2);
        let kept = store.start(&Request::new(HttpRequestMethod::Get, "/"));
        store.set(kept.id(), "user", "Foo");
        let revisit = Request::new(HttpRequestMethod::Get, "/").with_cookie(SESSION_COOKIE, kept.id());

        for _ in 0..10 {
            store.start(&Request::new(HttpRequestMethod::Get, "/"));
            assert!(!store.start(&revisit).is_new());
        }
        assert_eq!(store.get(kept.id(), "user"), Some(Value::from("Foo")));
    }

    #[test]
    fn test_csrf_validation() {
        let store = SessionStore::new();
        let session = store.start(&Request::new(HttpRequestMethod::Get, "/form"));
        let base = Request::new(HttpRequestMethod::Post, "/form").with_cookie(SESSION_COOKIE, session.id());

        // 会话中还没有令牌
        assert_eq!(store.validate_csrf(&base), Ok(false));

        let token = store.csrf_token(session.id());
        assert_eq!(store.csrf_token(session.id()), token);

        assert_eq!(
            store.validate_csrf(&base),
            Err(Exception::InvalidCsrfToken)
        );
        assert_eq!(
            store.validate_csrf(&base.clone().with_parameter(CSRF_TOKEN_KEY, "nope")),
            Err(Exception::InvalidCsrfToken)
        );
        assert_eq!(
            store.validate_csrf(&base.with_parameter(CSRF_TOKEN_KEY, &token)),
            Ok(true)
        );
    }
}
