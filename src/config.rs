// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use num_cpus;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::{error, warn};
use std::fmt;
use std::fs::File;
use std::io::prelude::*;

/// 缓存后端
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    File,
}

impl fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CacheBackend::Memory => write!(f, "memory"),
            CacheBackend::File => write!(f, "file"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    port: u16,
    worker_threads: usize,
    local: bool,
    #[serde(default = "default_environment")]
    environment: String,
    /// 为真时分发失败直接抛给调用方，不交给失败回调
    #[serde(default)]
    strict_errors: bool,
    #[serde(default = "default_cache_backend")]
    cache_backend: CacheBackend,
    #[serde(default = "default_cache_capacity")]
    cache_capacity: usize,
    #[serde(default = "default_cache_file")]
    cache_file: String,
    #[serde(default = "default_cache_ttl")]
    cache_ttl: u64,
    #[serde(default = "default_session_capacity")]
    session_capacity: usize,
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_cache_backend() -> CacheBackend {
    CacheBackend::Memory
}

fn default_cache_capacity() -> usize {
    128
}

fn default_cache_file() -> String {
    "apricot_cache.json".to_string()
}

fn default_cache_ttl() -> u64 {
    crate::param::DEFAULT_CACHE_TTL
}

fn default_session_capacity() -> usize {
    crate::param::DEFAULT_SESSION_CAPACITY
}

impl Config {
    pub fn new() -> Self {
        Self {
            port: 7878,
            worker_threads: 0,
            local: true,
            environment: default_environment(),
            strict_errors: false,
            cache_backend: default_cache_backend(),
            cache_capacity: default_cache_capacity(),
            cache_file: default_cache_file(),
            cache_ttl: default_cache_ttl(),
            session_capacity: default_session_capacity(),
        }
    }

    /// 从 TOML 文件构建配置。文件缺失或格式错误时记录错误并使用默认配置。
    pub fn from_toml(filename: &str) -> Self {
        let mut str_val = String::new();
        let read = File::open(filename).and_then(|mut file| file.read_to_string(&mut str_val));
        let mut raw_config = match read {
            Ok(_) => match toml::from_str(&str_val) {
                Ok(t) => t,
                Err(e) => {
                    error!("无法成功从配置文件构建配置对象，使用默认配置：{}", e);
                    Config::new()
                }
            },
            Err(e) => {
                error!("无法读取配置文件{}，使用默认配置：{}", filename, e);
                Config::new()
            }
        };
        raw_config.normalize();
        raw_config
    }

    fn normalize(&mut self) {
        if self.worker_threads == 0 {
            self.worker_threads = num_cpus::get();
        }
        if self.cache_capacity == 0 {
            warn!("cache_capacity被设置为0，但内存缓存不能为空，因此该值将被改为{}。", default_cache_capacity());
            self.cache_capacity = default_cache_capacity();
        }
        if self.session_capacity == 0 {
            warn!("session_capacity被设置为0，该值将被改为{}。", default_session_capacity());
            self.session_capacity = default_session_capacity();
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn strict_errors(&self) -> bool {
        self.strict_errors
    }

    pub fn cache_backend(&self) -> CacheBackend {
        self.cache_backend
    }

    pub fn cache_capacity(&self) -> usize {
        self.cache_capacity
    }

    pub fn cache_file(&self) -> &str {
        &self.cache_file
    }

    pub fn cache_ttl(&self) -> u64 {
        self.cache_ttl
    }

    pub fn session_capacity(&self) -> usize {
        self.session_capacity
    }
}
