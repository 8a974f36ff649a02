use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::DashMap;

/// 带类型的属性键。
///
/// 同名键在同一属性表中只对应一个值；以不同类型读取同名键时返回 `None`。
pub struct AttributeKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AttributeKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for AttributeKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for AttributeKey<T> {}

impl<T> fmt::Debug for AttributeKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AttributeKey").field(&self.name).finish()
    }
}

type AttributeValue = Arc<dyn Any + Send + Sync>;

/// 连接级属性表，任意任务可并发读写。
///
/// # 逻辑解析（How）
/// - 底层为分段锁哈希表 [`DashMap`]，读写只锁定单个分片；
/// - 值以 `Arc` 保存，读取返回共享句柄而非克隆值，调用方无需持有表锁。
#[derive(Default)]
pub struct Attributes {
    entries: DashMap<&'static str, AttributeValue>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入属性，返回同名且同类型的旧值。
    pub fn set<T: Any + Send + Sync>(&self, key: &AttributeKey<T>, value: T) -> Option<Arc<T>> {
        self.entries
            .insert(key.name, Arc::new(value))
            .and_then(|previous| previous.downcast::<T>().ok())
    }

    /// 读取属性。
    pub fn get<T: Any + Send + Sync>(&self, key: &AttributeKey<T>) -> Option<Arc<T>> {
        self.entries
            .get(key.name)
            .and_then(|entry| Arc::clone(entry.value()).downcast::<T>().ok())
    }

    /// 是否存在同名属性（不区分类型）。
    pub fn contains<T>(&self, key: &AttributeKey<T>) -> bool {
        self.entries.contains_key(key.name)
    }

    /// 删除属性，返回同类型的旧值。
    pub fn remove<T: Any + Send + Sync>(&self, key: &AttributeKey<T>) -> Option<Arc<T>> {
        self.entries
            .remove(key.name)
            .and_then(|(_, previous)| previous.downcast::<T>().ok())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&'static str> = self.entries.iter().map(|entry| *entry.key()).collect();
        names.sort_unstable();
        f.debug_struct("Attributes").field("keys", &names).finish()
    }
}
