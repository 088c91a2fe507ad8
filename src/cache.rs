// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 缓存模块
//!
//! 以字符串为键缓存任意 JSON 值，每个条目带有以秒计的过期时间（`0` 表示永不过期）。
//! 后端有两种：
//! - `MemoryCache`：进程内的 LRU 缓存，容量有限。
//! - `FileCache`：全部条目序列化为一个 JSON 文件，每次修改都重写该文件。

use std::collections::HashMap;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use lru::LruCache;
use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::{CacheBackend, Config},
    exception::Exception,
    param::DEFAULT_CACHE_TTL,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// `ttl` 为 0，或大到超出可表示的时间范围时，条目永不过期
    pub fn new(value: Value, ttl: u64) -> Self {
        let expires_at = if ttl == 0 {
            None
        } else {
            let expires_at = i64::try_from(ttl)
                .ok()
                .and_then(Duration::try_seconds)
                .and_then(|d| Utc::now().checked_add_signed(d));
            if expires_at.is_none() {
                warn!("缓存过期时间{}秒超出范围，按永不过期处理", ttl);
            }
            expires_at
        };
        Self { value, expires_at }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// 缓存后端需要实现的操作
#[cfg_attr(test, mockall::automock)]
pub trait CacheStore {
    /// 取出未过期的值，过期条目在此时被删除
    fn fetch(&mut self, key: &str) -> Result<Option<Value>, Exception>;
    fn store(&mut self, key: &str, value: Value, ttl: u64) -> Result<(), Exception>;
    fn remove(&mut self, key: &str) -> Result<(), Exception>;
    fn purge(&mut self) -> Result<(), Exception>;
}

pub struct MemoryCache {
    cache: LruCache<String, CacheEntry>,
}

impl MemoryCache {
    // 根据容量构造
    pub fn from_capacity(capacity: usize) -> Self {
        let capacity = match NonZeroUsize::new(capacity) {
            Some(c) => c,
            None => panic!("调用from_capacity时指定的大小是0。如果需要自动设置大小，请在调用处进行处理，而不是传入0"),
        };
        Self {
            cache: LruCache::new(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }

    #[cfg(test)]
    fn put_entry(&mut self, key: &str, entry: CacheEntry) {
        self.cache.put(key.to_string(), entry);
    }
}

impl CacheStore for MemoryCache {
    fn fetch(&mut self, key: &str) -> Result<Option<Value>, Exception> {
        let expired = match self.cache.get(key) {
            Some(entry) if !entry.is_expired_at(Utc::now()) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            debug!("缓存条目{}已过期", key);
            self.cache.pop(key);
        }
        Ok(None)
    }

    fn store(&mut self, key: &str, value: Value, ttl: u64) -> Result<(), Exception> {
        self.cache.put(key.to_string(), CacheEntry::new(value, ttl));
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), Exception> {
        self.cache.pop(key);
        Ok(())
    }

    fn purge(&mut self) -> Result<(), Exception> {
        self.cache.clear();
        Ok(())
    }
}

pub struct FileCache {
    path: PathBuf,
    entries: HashMap<String, CacheEntry>,
}

impl FileCache {
    /// 打开缓存文件，文件不存在时从空缓存开始
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Exception> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let text = fs::read_to_string(&path).map_err(|e| {
                error!("无法读取缓存文件{}：{}", path.display(), e);
                Exception::CacheFailure(e.to_string())
            })?;
            if text.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&text).map_err(|e| {
                    error!("缓存文件{}格式错误：{}", path.display(), e);
                    Exception::CacheFailure(e.to_string())
                })?
            }
        } else {
            HashMap::new()
        };
        info!("打开缓存文件{}，共{}个条目", path.display(), entries.len());
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn persist(&self) -> Result<(), Exception> {
        let text = serde_json::to_string(&self.entries)
            .map_err(|e| Exception::CacheFailure(e.to_string()))?;
        fs::write(&self.path, text).map_err(|e| {
            error!("无法写入缓存文件{}：{}", self.path.display(), e);
            Exception::CacheFailure(e.to_string())
        })
    }
}

impl CacheStore for FileCache {
    fn fetch(&mut self, key: &str) -> Result<Option<Value>, Exception> {
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired_at(Utc::now()) => Ok(Some(entry.value.clone())),
            Some(_) => {
                debug!("缓存条目{}已过期", key);
                self.entries.remove(key);
                self.persist()?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn store(&mut self, key: &str, value: Value, ttl: u64) -> Result<(), Exception> {
        self.entries
            .insert(key.to_string(), CacheEntry::new(value, ttl));
        self.persist()
    }

    fn remove(&mut self, key: &str) -> Result<(), Exception> {
        if self.entries.remove(key).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    fn purge(&mut self) -> Result<(), Exception> {
        self.entries.clear();
        self.persist()
    }
}

/// 面向应用的缓存入口，内部加锁，可以在处理函数中通过共享引用使用
pub struct Cache {
    store: Mutex<Box<dyn CacheStore + Send>>,
    default_ttl: u64,
}

impl Cache {
    pub fn new(store: Box<dyn CacheStore + Send>) -> Self {
        Self::with_default_ttl(store, DEFAULT_CACHE_TTL)
    }

    pub fn with_default_ttl(store: Box<dyn CacheStore + Send>, default_ttl: u64) -> Self {
        Self {
            store: Mutex::new(store),
            default_ttl,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, Exception> {
        let store: Box<dyn CacheStore + Send> = match config.cache_backend() {
            CacheBackend::Memory => Box::new(MemoryCache::from_capacity(config.cache_capacity())),
            CacheBackend::File => Box::new(FileCache::open(config.cache_file())?),
        };
        info!("缓存后端：{}", config.cache_backend());
        Ok(Self::with_default_ttl(store, config.cache_ttl()))
    }

    /// 给出 `value` 时写入并返回该值，否则返回当前值。`ttl` 缺省时使用默认过期时间。
    pub fn cache(
        &self,
        key: &str,
        value: Option<Value>,
        ttl: Option<u64>,
    ) -> Result<Option<Value>, Exception> {
        let mut store = self.lock()?;
        match value {
            Some(value) => {
                store.store(key, value.clone(), ttl.unwrap_or(self.default_ttl))?;
                Ok(Some(value))
            }
            None => store.fetch(key),
        }
    }

    pub fn remove(&self, key: &str) -> Result<(), Exception> {
        self.lock()?.remove(key)
    }

    pub fn purge(&self) -> Result<(), Exception> {
        self.lock()?.purge()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Box<dyn CacheStore + Send>>, Exception> {
        self.store
            .lock()
            .map_err(|_| Exception::CacheFailure("cache lock poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_memory_cache_creation() {
        let cache = MemoryCache::from_capacity(10);
        assert_eq!(cache.capacity(), 10);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    #[should_panic(expected = "调用from_capacity时指定的大小是0")]
    fn test_memory_cache_zero_capacity_panics() {
        MemoryCache::from_capacity(0);
    }

    #[test]
    fn test_memory_cache_store_and_fetch() {
        let mut cache = MemoryCache::from_capacity(3);
        cache.store("user", json!({"name": "Foo"}), 0).unwrap();

        assert_eq!(cache.fetch("user").unwrap(), Some(json!({"name": "Foo"})));
        assert_eq!(cache.fetch("other").unwrap(), None);
    }

    #[test]
    fn test_memory_cache_drops_expired_entries() {
        let mut cache = MemoryCache::from_capacity(3);
        cache.put_entry(
            "old",
            CacheEntry {
                value: json!(1),
                expires_at: Some(Utc::now() - Duration::seconds(5)),
            },
        );

        assert_eq!(cache.fetch("old").unwrap(), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_memory_cache_lru_eviction() {
        let mut cache = MemoryCache::from_capacity(2);
        cache.store("a", json!("a"), 0).unwrap();
        cache.store("b", json!("b"), 0).unwrap();
        cache.fetch("a").unwrap();
        cache.store("c", json!("c"), 0).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.fetch("b").unwrap().is_none());
        assert!(cache.fetch("a").unwrap().is_some());
        assert!(cache.fetch("c").unwrap().is_some());
    }

    #[test]
    fn test_entry_expiry() {
        let now = Utc::now();
        assert!(!CacheEntry::new(json!(1), 0).is_expired_at(now + Duration::days(365)));
        let entry = CacheEntry::new(json!(1), 60);
        assert!(!entry.is_expired_at(now));
        assert!(entry.is_expired_at(now + Duration::seconds(61)));
    }

    #[test]
    fn test_huge_ttl_never_expires() {
        let now = Utc::now();
        for ttl in [u64::MAX, i64::MAX as u64, 10u64.pow(17), 10u64.pow(12)] {
            let entry = CacheEntry::new(json!("forever"), ttl);
            assert!(!entry.is_expired_at(now + Duration::days(365 * 100)));
        }

        let cache = Cache::with_default_ttl(Box::new(MemoryCache::from_capacity(4)), u64::MAX);
        cache.cache("k", Some(json!(7)), None).unwrap();
        cache.cache("m", Some(json!(8)), Some(u64::MAX)).unwrap();
        assert_eq!(cache.cache("k", None, None).unwrap(), Some(json!(7)));
        assert_eq!(cache.cache("m", None, None).unwrap(), Some(json!(8)));
    }

    #[test]
    fn test_file_cache_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");

        {
            let mut cache = FileCache::open(&path).unwrap();
            cache.store("greeting", json!("hello"), 0).unwrap();
            cache.store("gone", json!("bye"), 0).unwrap();
            cache.remove("gone").unwrap();
        }

        let mut reopened = FileCache::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.fetch("greeting").unwrap(), Some(json!("hello")));

        reopened.purge().unwrap();
        assert!(FileCache::open(&path).unwrap().is_empty());
    }

    #[test]
    fn test_file_cache_rejects_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(
            FileCache::open(&path),
            Err(Exception::CacheFailure(_))
        ));
    }

    #[test]
    fn test_facade_uses_default_ttl() {
        let mut store = MockCacheStore::new();
        store
            .expect_store()
            .with(eq("answer"), eq(json!(42)), eq(DEFAULT_CACHE_TTL))
            .times(1)
            .returning(|_, _, _| Ok(()));
        store
            .expect_fetch()
            .with(eq("answer"))
            .times(1)
            .returning(|_| Ok(Some(json!(42))));

        let cache = Cache::new(Box::new(store));
        assert_eq!(
            cache.cache("answer", Some(json!(42)), None).unwrap(),
            Some(json!(42))
        );
        assert_eq!(cache.cache("answer", None, None).unwrap(), Some(json!(42)));
    }

    #[test]
    fn test_facade_passes_explicit_ttl_and_errors() {
        let mut store = MockCacheStore::new();
        store
            .expect_store()
            .with(eq("k"), eq(json!("v")), eq(10))
            .returning(|_, _, _| Err(Exception::CacheFailure("disk full".into())));
        store.expect_purge().times(1).returning(|| Ok(()));

        let cache = Cache::new(Box::new(store));
        assert_eq!(
            cache.cache("k", Some(json!("v")), Some(10)).unwrap_err(),
            Exception::CacheFailure("disk full".into())
        );
        cache.purge().unwrap();
    }
}
