// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 路由处理函数的统一签名
//!
//! 处理函数总是接收本次请求与按声明顺序捕获的参数，返回一个显式的判别结果：
//! `Matched(response)` 表示产出了响应，`Skip` 表示放弃本路由、继续扫描后续路由。

use std::sync::Arc;

use crate::{exception::Exception, request::Request, response::Response};

/// 处理函数的返回值
#[derive(Debug, Clone)]
pub enum Outcome {
    Matched(Response),
    Skip,
}

impl Outcome {
    pub fn respond(response: impl Into<Response>) -> Self {
        Outcome::Matched(response.into())
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Outcome::Skip)
    }
}

pub type HandlerResult = Result<Outcome, Exception>;

pub type BoxedHandler = Arc<dyn Fn(&Request, &Params) -> HandlerResult + Send + Sync>;

/// 一次成功匹配绑定出的路由参数。
///
/// `names` 来自路由声明中的 `:name` 占位符，`values` 是按捕获组顺序得到的值。
/// 声明中直接书写的正则分组也会产生值，但没有对应的名字；`slots` 记录每个名字在 `values` 中的位置。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    names: Vec<String>,
    slots: Vec<usize>,
    values: Vec<String>,
}

impl Params {
    /// 名字与值按位置一一对应
    pub fn new(names: Vec<String>, values: Vec<String>) -> Self {
        let slots = (0..names.len()).collect();
        Self {
            names,
            slots,
            values,
        }
    }

    pub fn with_slots(names: Vec<String>, slots: Vec<usize>, values: Vec<String>) -> Self {
        Self {
            names,
            slots,
            values,
        }
    }

    /// 按占位符名字取值
    pub fn get(&self, name: &str) -> Option<&str> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.slots.get(i))
            .and_then(|&slot| self.values.get(slot))
            .map(String::as_str)
    }

    /// 按位置取值
    pub fn at(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
