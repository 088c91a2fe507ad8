// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

pub mod app;
pub mod cache;
pub mod config;
pub mod container;
pub mod event;
pub mod exception;
pub mod gate;
pub mod handler;
pub mod middleware;
pub mod param;
pub mod request;
pub mod response;
pub mod rest;
pub mod route;
pub mod security;

pub use app::App;
pub use cache::{Cache, CacheStore, FileCache, MemoryCache};
pub use config::Config;
pub use container::Container;
pub use exception::Exception;
pub use gate::Requirements;
pub use handler::{HandlerResult, Outcome, Params};
pub use middleware::{Next, Phase};
pub use param::{HttpEncoding, HttpRequestMethod, HttpVersion};
pub use request::Request;
pub use response::{Cookie, Response};
pub use rest::{rest_url, RestAction};
pub use route::{RouteName, RoutePattern, RouteTable};
pub use security::{http_basic, BasicAuth, SessionStore};
