// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 中间件链
//!
//! 中间件按注册顺序执行，只有与当前阶段相同的条目才会被调用。
//! 某个中间件失败时，错误被交给同一阶段的下一个中间件，由它决定是否吞掉；
//! 最后一个中间件失败时，错误抛给分发器。

use std::fmt;

use log::{debug, warn};

use crate::{exception::Exception, request::Request};

/// 中间件执行的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// 路由匹配之前
    BeforeRequest,
    /// 处理函数产出响应之后
    BeforeResponse,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Phase::BeforeRequest => write!(f, "BeforeRequest"),
            Phase::BeforeResponse => write!(f, "BeforeResponse"),
        }
    }
}

/// 中间件回调：本次请求、上一个中间件留下的错误、指向下一个中间件的句柄
pub type MiddlewareFn =
    dyn Fn(&Request, Option<Exception>, Next<'_>) -> Result<(), Exception> + Send + Sync;

struct MiddlewareEntry {
    callback: Box<MiddlewareFn>,
    phase: Phase,
}

/// 指向链上同一阶段下一个中间件的句柄。链尾时是一个什么都不做的终点。
#[derive(Clone, Copy)]
pub struct Next<'a> {
    rest: &'a [MiddlewareEntry],
    phase: Phase,
}

impl<'a> Next<'a> {
    fn locate(&self) -> Option<usize> {
        self.rest.iter().position(|e| e.phase == self.phase)
    }

    pub fn is_terminal(&self) -> bool {
        self.locate().is_none()
    }

    /// 立即调用下一个中间件。链尾时直接返回 `Ok(())`。
    pub fn call(&self, request: &Request, error: Option<Exception>) -> Result<(), Exception> {
        match self.locate() {
            Some(pos) => {
                let next = Next {
                    rest: &self.rest[pos + 1..],
                    phase: self.phase,
                };
                (self.rest[pos].callback)(request, error, next)
            }
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct MiddlewareChain {
    entries: Vec<MiddlewareEntry>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&mut self, callback: F, phase: Phase)
    where
        F: Fn(&Request, Option<Exception>, Next<'_>) -> Result<(), Exception> + Send + Sync + 'static,
    {
        self.entries.push(MiddlewareEntry {
            callback: Box::new(callback),
            phase,
        });
    }

    pub fn run(&self, phase: Phase, request: &Request) -> Result<(), Exception> {
        let positions: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.phase == phase)
            .map(|(i, _)| i)
            .collect();
        if positions.is_empty() {
            return Ok(());
        }
        debug!("[ID{}]执行{}个{}中间件", request.id(), positions.len(), phase);

        let mut error: Option<Exception> = None;
        for (i, &pos) in positions.iter().enumerate() {
            let next = Next {
                rest: &self.entries[pos + 1..],
                phase,
            };
            if let Err(e) = (self.entries[pos].callback)(request, error.take(), next) {
                if i + 1 == positions.len() {
                    return Err(e);
                }
                warn!("[ID{}]中间件执行失败，错误交给下一个中间件：{}", request.id(), e);
                error = Some(e);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
