use dashmap::DashMap;
use std::sync::Arc;

/// 有界的线程安全片段缓存：词片段 -> 合词结果。
///
/// 缓存只是优化，任何时候丢弃都不影响结果，因此满了就整体清空，
/// 不维护 LRU 顺序。并发写同一个键时后写者覆盖先写者，两者的值必然相同。
pub(super) struct FragmentCache {
    map: DashMap<Box<str>, Arc<[Box<str>]>>,
    capacity: usize,
}

impl FragmentCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            map: DashMap::new(),
            capacity,
        }
    }

    #[inline]
    pub fn get(&self, word: &str) -> Option<Arc<[Box<str>]>> {
        self.map.get(word).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, word: &str, pieces: Arc<[Box<str>]>) {
        if self.capacity == 0 {
            return;
        }
        if self.map.len() >= self.capacity && !self.map.contains_key(word) {
            self.map.clear();
        }
        self.map.insert(word.into(), pieces);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }
}
