//! Paginated list state for one REST collection
//!
//! Holds the current page, the query that produced it and the last error.
//! Every mutation is followed by a refetch of the current page.

use anyhow::Result;
use tracing::{debug, warn};

use crate::api::types::{ListQuery, Page, Resource};

/// CRUD operations a list store needs from its backend
pub trait ResourceService<R: Resource> {
    async fn list(&self, query: &ListQuery) -> Result<Page<R>>;
    async fn create(&self, draft: &R::Draft) -> Result<R>;
    async fn update(&self, id: &str, draft: &R::Draft) -> Result<R>;
    async fn delete(&self, id: &str) -> Result<()>;
}

#[cfg(feature = "api")]
impl<R: Resource> ResourceService<R> for crate::api::ApiClient {
    async fn list(&self, query: &ListQuery) -> Result<Page<R>> {
        self.list_resources::<R>(query).await
    }

    async fn create(&self, draft: &R::Draft) -> Result<R> {
        self.create_resource::<R>(draft).await
    }

    async fn update(&self, id: &str, draft: &R::Draft) -> Result<R> {
        self.update_resource::<R>(id, draft).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.delete_resource::<R>(id).await
    }
}

pub struct ListStore<R: Resource, S: ResourceService<R>> {
    service: S,
    query: ListQuery,
    items: Vec<R>,
    total: u64,
    loading: bool,
    error: Option<String>,
}

impl<R: Resource, S: ResourceService<R>> ListStore<R, S> {
    pub fn new(service: S, query: ListQuery) -> Self {
        Self {
            service,
            query,
            items: Vec::new(),
            total: 0,
            loading: false,
            error: None,
        }
    }

    pub fn items(&self) -> &[R] {
        &self.items
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn query(&self) -> &ListQuery {
        &self.query
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn total_pages(&self) -> u32 {
        let limit = u64::from(self.query.limit.max(1));
        let pages = self.total.div_ceil(limit).max(1);
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    /// Reload the current page. Failures are kept in `error()`.
    pub async fn refresh(&mut self) {
        self.loading = true;
        match self.service.list(&self.query).await {
            Ok(page) => {
                debug!(
                    "Loaded {} {} (page {}, total {})",
                    page.data.len(),
                    R::NAME,
                    self.query.page,
                    page.meta.total
                );
                self.items = page.data;
                self.total = page.meta.total;
                self.error = None;
            }
            Err(e) => {
                warn!("Failed to load {} list: {}", R::NAME, e);
                self.error = Some(e.to_string());
            }
        }
        self.loading = false;
    }

    pub async fn set_page(&mut self, page: u32) {
        self.query.page = page.max(1);
        self.refresh().await;
    }

    pub async fn set_limit(&mut self, limit: u32) {
        self.query.limit = limit.max(1);
        self.query.page = 1;
        self.refresh().await;
    }

    /// Blank text clears the search
    pub async fn set_search(&mut self, text: &str) {
        let text = text.trim();
        self.query.search = (!text.is_empty()).then(|| text.to_string());
        self.query.page = 1;
        self.refresh().await;
    }

    /// An empty value removes the filter
    pub async fn set_filter(&mut self, key: &str, value: &str) {
        if value.is_empty() {
            self.query.filters.remove(key);
        } else {
            self.query.filters.insert(key.to_string(), value.to_string());
        }
        self.query.page = 1;
        self.refresh().await;
    }

    pub async fn create(&mut self, draft: &R::Draft) -> Result<R> {
        let created = match self.service.create(draft).await {
            Ok(created) => created,
            Err(e) => return Err(self.record(e)),
        };
        self.refresh().await;
        Ok(created)
    }

    pub async fn update(&mut self, id: &str, draft: &R::Draft) -> Result<R> {
        let updated = match self.service.update(id, draft).await {
            Ok(updated) => updated,
            Err(e) => return Err(self.record(e)),
        };
        self.refresh().await;
        Ok(updated)
    }

    /// Delete and refetch; steps back a page when the current one empties.
    pub async fn remove(&mut self, id: &str) -> Result<()> {
        if let Err(e) = self.service.delete(id).await {
            return Err(self.record(e));
        }
        self.refresh().await;
        if self.items.is_empty() && self.query.page > 1 && self.error.is_none() {
            self.query.page -= 1;
            self.refresh().await;
        }
        Ok(())
    }

    fn record(&mut self, e: anyhow::Error) -> anyhow::Error {
        warn!("{} mutation failed: {}", R::NAME, e);
        self.error = Some(e.to_string());
        e
    }
}
