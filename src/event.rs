// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 事件总线
//!
//! 监听器按优先级从高到低排列，同优先级保持注册顺序。
//! 任一监听器返回 `Some(response)` 时停止唤醒后续监听器，并把该响应交给调用方。

use std::collections::HashMap;

use log::debug;

use crate::{exception::Exception, param::META_EVENT, response::Response};

pub type ListenerResult = Result<Option<Response>, Exception>;

pub type ListenerFn = dyn Fn(&[String]) -> ListenerResult + Send + Sync;

struct Listener {
    callback: Box<ListenerFn>,
    priority: i32,
}

#[derive(Default)]
pub struct EventBus {
    listeners: HashMap<String, Vec<Listener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&mut self, event: &str, callback: F, priority: i32)
    where
        F: Fn(&[String]) -> ListenerResult + Send + Sync + 'static,
    {
        let listeners = self.listeners.entry(event.to_string()).or_default();
        listeners.push(Listener {
            callback: Box::new(callback),
            priority,
        });
        // sort_by_key 是稳定排序
        listeners.sort_by_key(|l| std::cmp::Reverse(l.priority));
    }

    /// 唤醒 `event` 的监听器。
    ///
    /// 每个监听器被唤醒前都会先发出元事件 `event`，参数为 `[event]`；元事件本身不再触发元事件。
    pub fn emit(&self, event: &str, args: &[String]) -> ListenerResult {
        let Some(listeners) = self.listeners.get(event) else {
            return Ok(None);
        };
        debug!("唤醒事件{}的{}个监听器", event, listeners.len());

        for listener in listeners {
            if event != META_EVENT {
                self.emit(META_EVENT, &[event.to_string()])?;
            }
            if let Some(response) = (listener.callback)(args)? {
                debug!("事件{}的监听器返回了响应，停止唤醒", event);
                return Ok(Some(response));
            }
        }
        Ok(None)
    }

    pub fn clear(&mut self, event: &str) {
        self.listeners.remove(event);
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> impl Fn(&[String]) -> ListenerResult {
        let log = Arc::clone(log);
        move |_| {
            log.lock().unwrap().push(tag.to_string());
            Ok(None)
        }
    }

    #[test]
    fn test_priority_descending_and_stable() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.on("boot", recorder(&log, "low"), -1);
        bus.on("boot", recorder(&log, "first"), 5);
        bus.on("boot", recorder(&log, "second"), 5);
        bus.on("boot", recorder(&log, "default"), 0);

        assert!(bus.emit("boot", &[]).unwrap().is_none());
        assert_eq!(
            *log.lock().unwrap(),
            vec!["first", "second", "default", "low"]
        );
    }

    #[test]
    fn test_first_response_short_circuits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.on("request", |args| Ok(Some(Response::text(args[0].clone()))), 10);
        bus.on("request", recorder(&log, "never"), 0);

        let response = bus.emit("request", &["/x".to_string()]).unwrap().unwrap();
        assert_eq!(response.body_str(), "/x");
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_meta_event_precedes_each_listener() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        let sink = Arc::clone(&log);
        bus.on(
            META_EVENT,
            move |args| {
                sink.lock().unwrap().push(format!("meta:{}", args[0]));
                Ok(None)
            },
            0,
        );
        bus.on("save", recorder(&log, "a"), 0);
        bus.on("save", recorder(&log, "b"), 0);

        bus.emit("save", &[]).unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["meta:save", "a", "meta:save", "b"]
        );
    }

    #[test]
    fn test_listener_error_propagates() {
        let mut bus = EventBus::new();
        bus.on("match", |_| Err(Exception::AccessDenied("no".into())), 0);
        assert_eq!(
            bus.emit("match", &[]).unwrap_err(),
            Exception::AccessDenied("no".into())
        );
    }

    #[test]
    fn test_clear_removes_listeners() {
        let mut bus = EventBus::new();
        bus.on("x", |_| Ok(Some(Response::text("x"))), 0);
        bus.clear("x");
        assert_eq!(bus.listener_count("x"), 0);
        assert!(bus.emit("x", &[]).unwrap().is_none());
    }
}
