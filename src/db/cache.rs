use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

use crate::model::department::Department;
use crate::payroll::error::StoreError;
use crate::payroll::store::DepartmentDirectory;

/// Departments change rarely; keep found ones in memory for `ttl`.
/// Misses are never cached, so a newly created department is visible at once.
pub struct CachedDepartmentDirectory {
    inner: Arc<dyn DepartmentDirectory>,
    cache: Cache<u64, Department>,
}

impl CachedDepartmentDirectory {
    pub fn new(inner: Arc<dyn DepartmentDirectory>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(ttl)
                .build(),
        }
    }
}

#[async_trait]
impl DepartmentDirectory for CachedDepartmentDirectory {
    async fn find_by_id(&self, id: u64) -> Result<Option<Department>, StoreError> {
        if let Some(department) = self.cache.get(&id).await {
            return Ok(Some(department));
        }

        let found = self.inner.find_by_id(id).await?;
        if let Some(department) = &found {
            self.cache.insert(id, department.clone()).await;
        }
        Ok(found)
    }

    async fn find_all(&self) -> Result<Vec<Department>, StoreError> {
        let departments = self.inner.find_all().await?;

        // Batch refresh concurrently
        let inserts: Vec<_> = departments
            .iter()
            .map(|d| self.cache.insert(d.id, d.clone()))
            .collect();
        futures::future::join_all(inserts).await;

        Ok(departments)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::db::memory::InMemoryDepartmentDirectory;

    struct Counting {
        inner: InMemoryDepartmentDirectory,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl DepartmentDirectory for Counting {
        async fn find_by_id(&self, id: u64) -> Result<Option<Department>, StoreError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.find_by_id(id).await
        }

        async fn find_all(&self) -> Result<Vec<Department>, StoreError> {
            self.inner.find_all().await
        }
    }

    fn counting() -> Arc<Counting> {
        Arc::new(Counting {
            inner: InMemoryDepartmentDirectory::new(vec![Department {
                id: 2,
                name: "Finance".into(),
            }]),
            lookups: AtomicUsize::new(0),
        })
    }

    #[actix_web::test]
    async fn hits_are_served_from_cache() {
        let inner = counting();
        let cached = CachedDepartmentDirectory::new(inner.clone(), Duration::from_secs(60));

        assert_eq!(cached.find_by_id(2).await.unwrap().unwrap().name, "Finance");
        assert_eq!(cached.find_by_id(2).await.unwrap().unwrap().name, "Finance");

        assert_eq!(inner.lookups.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn misses_are_not_cached() {
        let inner = counting();
        let cached = CachedDepartmentDirectory::new(inner.clone(), Duration::from_secs(60));

        assert!(cached.find_by_id(9).await.unwrap().is_none());
        assert!(cached.find_by_id(9).await.unwrap().is_none());

        assert_eq!(inner.lookups.load(Ordering::SeqCst), 2);
    }

    #[actix_web::test]
    async fn listing_warms_the_cache() {
        let inner = counting();
        let cached = CachedDepartmentDirectory::new(inner.clone(), Duration::from_secs(60));

        assert_eq!(cached.find_all().await.unwrap().len(), 1);
        assert!(cached.find_by_id(2).await.unwrap().is_some());

        assert_eq!(inner.lookups.load(Ordering::SeqCst), 0);
    }
}
