// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # REST 资源
//!
//! `resource` 打开一个以资源名为前缀的作用域，作用域内的六个动作各注册一条约定路由：
//!
//! | 动作     | 方法   | 路径         |
//! |----------|--------|--------------|
//! | `index`  | GET    | `/`          |
//! | `show`   | GET    | `/:id`       |
//! | `create` | POST   | `/`          |
//! | `edit`   | GET    | `/:id/edit`  |
//! | `update` | PUT    | `/:id`       |
//! | `delete` | DELETE | `/:id`       |
//!
//! 带 `:id` 的动作要求 `id` 为纯数字。嵌套资源的前缀为 `/:<父资源单数>_id/<资源名>`。

use std::fmt;

use log::debug;

use crate::{
    app::App,
    exception::Exception,
    gate::{self, Requirements},
    handler::{HandlerResult, Params},
    param::HttpRequestMethod,
    request::Request,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestAction {
    Index,
    Show,
    Create,
    Edit,
    Update,
    Delete,
}

impl fmt::Display for RestAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RestAction::Index => write!(f, "index"),
            RestAction::Show => write!(f, "show"),
            RestAction::Create => write!(f, "create"),
            RestAction::Edit => write!(f, "edit"),
            RestAction::Update => write!(f, "update"),
            RestAction::Delete => write!(f, "delete"),
        }
    }
}

/// 去掉末尾的 `s` 作为单数形式
fn singular(name: &str) -> &str {
    name.strip_suffix('s').unwrap_or(name)
}

impl App {
    pub fn resource<F>(&mut self, name: &str, body: F) -> Result<(), Exception>
    where
        F: FnOnce(&mut App) -> Result<(), Exception>,
    {
        let prefix = match self.resources.last() {
            Some(parent) => format!("/:{}_id/{}", singular(parent), name),
            None => format!("/{}", name),
        };
        debug!("定义资源{}，前缀{}", name, prefix);

        self.resources.push(name.to_string());
        let result = self.prefix(&prefix, body);
        self.resources.pop();
        result
    }

    fn rest_route<F>(
        &mut self,
        declaration: &str,
        verb: HttpRequestMethod,
        requirements: Requirements,
        handler: F,
    ) -> Result<(), Exception>
    where
        F: Fn(&Request, &Params) -> HandlerResult + Send + Sync + 'static,
    {
        let guarded = gate::wrap(requirements.method(verb), handler)?;
        self.when_verb(declaration, guarded, verb)
    }

    pub fn index<F>(&mut self, handler: F) -> Result<(), Exception>
    where
        F: Fn(&Request, &Params) -> HandlerResult + Send + Sync + 'static,
    {
        self.rest_route("/", HttpRequestMethod::Get, Requirements::new(), handler)
    }

    pub fn show<F>(&mut self, handler: F) -> Result<(), Exception>
    where
        F: Fn(&Request, &Params) -> HandlerResult + Send + Sync + 'static,
    {
        self.rest_route(
            "/:id",
            HttpRequestMethod::Get,
            Requirements::new().number("id"),
            handler,
        )
    }

    pub fn create<F>(&mut self, handler: F) -> Result<(), Exception>
    where
        F: Fn(&Request, &Params) -> HandlerResult + Send + Sync + 'static,
    {
        self.rest_route("/", HttpRequestMethod::Post, Requirements::new(), handler)
    }

    pub fn edit<F>(&mut self, handler: F) -> Result<(), Exception>
    where
        F: Fn(&Request, &Params) -> HandlerResult + Send + Sync + 'static,
    {
        self.rest_route(
            "/:id/edit",
            HttpRequestMethod::Get,
            Requirements::new().number("id"),
            handler,
        )
    }

    pub fn update<F>(&mut self, handler: F) -> Result<(), Exception>
    where
        F: Fn(&Request, &Params) -> HandlerResult + Send + Sync + 'static,
    {
        self.rest_route(
            "/:id",
            HttpRequestMethod::Put,
            Requirements::new().number("id"),
            handler,
        )
    }

    pub fn delete<F>(&mut self, handler: F) -> Result<(), Exception>
    where
        F: Fn(&Request, &Params) -> HandlerResult + Send + Sync + 'static,
    {
        self.rest_route(
            "/:id",
            HttpRequestMethod::Delete,
            Requirements::new().number("id"),
            handler,
        )
    }
}

/// 资源动作对应的 URL
pub fn rest_url(resource: &str, action: RestAction, id: Option<&str>) -> String {
    let mut url = format!("/{}", resource);
    if let Some(id) = id {
        match action {
            RestAction::Show | RestAction::Update | RestAction::Delete => {
                url.push('/');
                url.push_str(id);
            }
            RestAction::Edit => {
                url.push('/');
                url.push_str(id);
                url.push_str("/edit");
            }
            RestAction::Index | RestAction::Create => {}
        }
    }
    url
}
