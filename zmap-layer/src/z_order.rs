use std::cmp::Ordering;

use crate::geometry::Geometry;

/// 绘制顺序索引：按 (zIndex, internalId) 升序排列。
///
/// 插入时只追加并标记脏位，排序推迟到第一次依赖顺序的查找。
/// `min_z`/`max_z` 在插入和 zIndex 变化时增量维护，在重排时精确重算。
#[derive(Debug, Default)]
pub(crate) struct ZOrderIndex {
    entries: Vec<Geometry>,
    dirty: bool,
    min_z: i32,
    max_z: i32,
}

fn order_key(geometry: &Geometry) -> (i32, u64) {
    (
        geometry.z_index(),
        geometry.internal_id().unwrap_or(u64::MAX),
    )
}

impl ZOrderIndex {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn min_z(&self) -> i32 {
        self.min_z
    }

    pub(crate) fn max_z(&self) -> i32 {
        self.max_z
    }

    pub(crate) fn push(&mut self, geometry: Geometry) {
        let z_index = geometry.z_index();
        if self.max_z > 0 || z_index != 0 {
            self.dirty = true;
        }
        if self.entries.is_empty() {
            self.min_z = z_index;
            self.max_z = z_index;
        } else {
            self.track(z_index);
        }
        self.entries.push(geometry);
    }

    pub(crate) fn on_z_index_change(&mut self, z_index: i32) {
        self.track(z_index);
        self.dirty = true;
    }

    fn track(&mut self, z_index: i32) {
        self.min_z = self.min_z.min(z_index);
        self.max_z = self.max_z.max(z_index);
    }

    pub(crate) fn sort(&mut self) {
        if !self.dirty {
            return;
        }
        self.entries.sort_by_cached_key(order_key);
        self.min_z = self.entries.first().map_or(0, Geometry::z_index);
        self.max_z = self.entries.last().map_or(0, Geometry::z_index);
        self.dirty = false;
    }

    /// 重排后二分查找。internalId 保证键全序，相同 zIndex 也能定位。
    pub(crate) fn position(&mut self, geometry: &Geometry) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }
        self.sort();
        let target = order_key(geometry);
        let mut low = 0;
        let mut high = self.entries.len();
        while low < high {
            let middle = low + (high - low) / 2;
            let candidate = &self.entries[middle];
            if candidate.ptr_eq(geometry) {
                return Some(middle);
            }
            match order_key(candidate).cmp(&target) {
                Ordering::Greater => high = middle,
                Ordering::Less | Ordering::Equal => low = middle + 1,
            }
        }
        None
    }

    pub(crate) fn remove(&mut self, position: usize) -> Geometry {
        self.entries.remove(position)
    }

    pub(crate) fn first(&self) -> Option<Geometry> {
        self.entries.first().cloned()
    }

    pub(crate) fn last(&self) -> Option<Geometry> {
        self.entries.last().cloned()
    }

    pub(crate) fn snapshot(&self) -> Vec<Geometry> {
        self.entries.clone()
    }

    /// 一次性取出全部条目并复位状态。
    pub(crate) fn take_all(&mut self) -> Vec<Geometry> {
        self.dirty = false;
        self.min_z = 0;
        self.max_z = 0;
        std::mem::take(&mut self.entries)
    }
}
