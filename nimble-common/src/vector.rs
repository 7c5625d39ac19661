use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use nimble_error::NimbleResult;

use crate::{InputBufferGrowthPolicy, MemoryPool, default_growth_policy};

/// A growable, pool-accounted sequence of `T`.
///
/// Behaves like a `Vec<T>` except that every capacity change is metered
/// against the owning [`MemoryPool`] and sized by an
/// [`InputBufferGrowthPolicy`], so allocation failures surface as
/// `ResourceExhausted` instead of aborting.
pub struct Vector<T> {
    pool: MemoryPool,
    policy: Arc<dyn InputBufferGrowthPolicy>,
    data: Vec<T>,
    reserved: usize,
}

impl<T> Vector<T> {
    pub fn new(pool: &MemoryPool) -> Self {
        Self::with_policy(pool, default_growth_policy())
    }

    pub fn with_policy(pool: &MemoryPool, policy: Arc<dyn InputBufferGrowthPolicy>) -> Self {
        Self {
            pool: pool.clone(),
            policy,
            data: Vec::new(),
            reserved: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Ensure capacity for `new_size` items, growing per the policy.
    pub fn reserve_for(&mut self, new_size: usize) -> NimbleResult<()> {
        if new_size <= self.data.capacity() {
            return Ok(());
        }
        let target = self.policy.extended_capacity(new_size, self.data.capacity());
        let additional_bytes = (target - self.data.capacity()) * size_of::<T>();
        self.pool.reserve(additional_bytes)?;
        self.reserved += additional_bytes;
        self.data.reserve_exact(target - self.data.len());
        Ok(())
    }

    pub fn push(&mut self, value: T) -> NimbleResult<()> {
        self.reserve_for(self.data.len() + 1)?;
        self.data.push(value);
        Ok(())
    }

    pub fn extend_from_slice(&mut self, values: &[T]) -> NimbleResult<()>
    where
        T: Clone,
    {
        self.reserve_for(self.data.len() + values.len())?;
        self.data.extend_from_slice(values);
        Ok(())
    }

    /// Drop all items but keep the capacity (and the pool reservation).
    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Consume the vector, releasing the pool reservation.
    pub fn into_vec(mut self) -> Vec<T> {
        self.pool.release(self.reserved);
        self.reserved = 0;
        std::mem::take(&mut self.data)
    }
}

impl<T> Deref for Vector<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.data
    }
}

impl<T> DerefMut for Vector<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T> Drop for Vector<T> {
    fn drop(&mut self) {
        self.pool.release(self.reserved);
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Vector<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.data.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_grow() {
        let pool = MemoryPool::new("test", true);
        let mut v = Vector::<u32>::new(&pool);
        for i in 0..100u32 {
            v.push(i).unwrap();
        }
        assert_eq!(v.len(), 100);
        assert_eq!(&v[..5], &[0, 1, 2, 3, 4]);
        assert!(pool.used() >= 400);
    }

    #[test]
    fn drop_releases_pool_bytes() {
        let pool = MemoryPool::new("test", true);
        {
            let mut v = Vector::<u64>::new(&pool);
            v.extend_from_slice(&[1, 2, 3, 4, 5]).unwrap();
            assert!(pool.used() > 0);
        }
        assert_eq!(pool.used(), 0);
    }

    #[test]
    fn pool_capacity_enforced() {
        let pool = MemoryPool::with_capacity("small", 64);
        let mut v = Vector::<u64>::new(&pool);
        let mut failed = false;
        for i in 0..1000u64 {
            if v.push(i).is_err() {
                failed = true;
                break;
            }
        }
        assert!(failed);
    }

    #[test]
    fn clear_keeps_capacity() {
        let pool = MemoryPool::default();
        let mut v = Vector::<u8>::new(&pool);
        v.extend_from_slice(&[1, 2, 3]).unwrap();
        let cap = v.capacity();
        v.clear();
        assert_eq!(v.len(), 0);
        assert_eq!(v.capacity(), cap);
    }
}
