// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 依赖注入容器
//!
//! 容器保存三类条目，查找顺序依次为：
//! 1. 参数：任意可序列化为 JSON 的配置值。
//! 2. 服务：已构造好的共享实例。
//! 3. 提供者：每次查找都重新构造实例的工厂函数。
//!
//! 另外还提供可冻结的命名作用域，用于分阶段注入配置。

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use log::{debug, warn};
use regex::{Captures, Regex};
use serde_json::Value;

use crate::exception::Exception;

pub type Service = Arc<dyn Any + Send + Sync>;

pub type ProviderFn = dyn Fn(&Container) -> Result<Service, Exception> + Send + Sync;

lazy_static! {
    static ref PARAMETER_REF: Regex = Regex::new(r"%([^%]+)%").expect("参数引用正则必须合法");
}

/// 一次查找的结果
#[derive(Clone)]
pub enum Resolved {
    Parameter(Value),
    Service(Service),
}

#[derive(Default)]
pub struct Container {
    parameters: HashMap<String, Value>,
    services: HashMap<String, Service>,
    providers: HashMap<String, Box<ProviderFn>>,
    scopes: HashMap<String, Scope>,
}

#[derive(Default)]
struct Scope {
    container: ScopeContainer,
    frozen: bool,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_parameter(&mut self, id: &str, value: impl Into<Value>) {
        self.parameters.insert(id.to_string(), value.into());
    }

    pub fn set_service<T: Any + Send + Sync>(&mut self, id: &str, service: T) {
        self.services.insert(id.to_string(), Arc::new(service));
    }

    /// 注册一个工厂，每次 `get` / `service` 都会调用它构造新实例
    pub fn provide<F>(&mut self, id: &str, factory: F)
    where
        F: Fn(&Container) -> Result<Service, Exception> + Send + Sync + 'static,
    {
        self.providers.insert(id.to_string(), Box::new(factory));
    }

    pub fn parameter(&self, id: &str) -> Option<&Value> {
        self.parameters.get(id)
    }

    pub fn has(&self, id: &str) -> bool {
        self.parameters.contains_key(id)
            || self.services.contains_key(id)
            || self.providers.contains_key(id)
    }

    /// 按参数、服务、提供者的顺序查找
    pub fn get(&self, id: &str) -> Result<Option<Resolved>, Exception> {
        if let Some(value) = self.parameters.get(id) {
            return Ok(Some(Resolved::Parameter(value.clone())));
        }
        if let Some(service) = self.services.get(id) {
            return Ok(Some(Resolved::Service(Arc::clone(service))));
        }
        if let Some(factory) = self.providers.get(id) {
            debug!("通过提供者构造服务{}", id);
            return factory(self).map(|s| Some(Resolved::Service(s)));
        }
        Ok(None)
    }

    /// 取出服务并转换为具体类型。找不到或类型不符时返回 `ServiceNotFound`。
    pub fn service<T: Any + Send + Sync>(&self, id: &str) -> Result<Arc<T>, Exception> {
        match self.get(id)? {
            Some(Resolved::Service(service)) => service.downcast::<T>().map_err(|_| {
                warn!("服务{}的类型与请求的类型不符", id);
                Exception::ServiceNotFound(id.to_string())
            }),
            _ => Err(Exception::ServiceNotFound(id.to_string())),
        }
    }

    /// 将文本中的 `%name%` 替换为参数值，未知的引用保持原样
    pub fn expand(&self, text: &str) -> String {
        PARAMETER_REF
            .replace_all(text, |caps: &Captures| match self.parameters.get(&caps[1]) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// 创建或重新打开作用域，并在其中执行 `f`。作用域已冻结时返回 `FrozenScope`。
    pub fn scope<F>(&mut self, name: &str, f: F) -> Result<(), Exception>
    where
        F: FnOnce(&mut ScopeContainer),
    {
        let scope = self.scopes.entry(name.to_string()).or_default();
        if scope.frozen {
            return Err(Exception::FrozenScope(name.to_string()));
        }
        f(&mut scope.container);
        Ok(())
    }

    pub fn inject<I, K, V>(&mut self, name: &str, values: I) -> Result<(), Exception>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.scope(name, |scope| {
            for (key, value) in values {
                scope.set(key, value);
            }
        })
    }

    /// 冻结作用域，此后不能再打开，但仍可通过 `scope_ref` 读取
    pub fn freeze(&mut self, name: &str) -> Result<(), Exception> {
        match self.scopes.get_mut(name) {
            Some(scope) => {
                scope.frozen = true;
                Ok(())
            }
            None => Err(Exception::ScopeNotDeclared(name.to_string())),
        }
    }

    pub fn is_frozen(&self, name: &str) -> bool {
        self.scopes.get(name).is_some_and(|s| s.frozen)
    }

    pub fn scope_ref(&self, name: &str) -> Option<&ScopeContainer> {
        self.scopes.get(name).map(|s| &s.container)
    }
}

/// 作用域内的键值存储
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeContainer {
    vars: HashMap<String, Value>,
}

impl ScopeContainer {
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.vars.get(key).cloned().unwrap_or(default)
    }

    pub fn has(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.vars.remove(key)
    }
}
