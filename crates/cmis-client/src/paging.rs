//! Lazy, forward-only paging over listing operations.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use async_stream::try_stream;
use cmis_core::{ListOptions, Page, Result};
use futures::future::BoxFuture;
use futures::Stream;
use tracing::debug;

type FetchPage<T> = Arc<dyn Fn(ListOptions) -> BoxFuture<'static, Result<Page<T>>> + Send + Sync>;

/// Forward-only sequence over a paged listing.
///
/// Each page is an independent request carrying its own skip count, so no
/// server-side cursor is held. A failed fetch does not advance the position:
/// calling again retries the same page. To start over, issue the originating
/// call again.
pub struct Pager<T> {
    fetch: FetchPage<T>,
    options: ListOptions,
    buffer: VecDeque<T>,
    exhausted: bool,
    total: Option<u64>,
}

impl<T: Send + 'static> Pager<T> {
    pub(crate) fn new<F>(options: ListOptions, fetch: F) -> Self
    where
        F: Fn(ListOptions) -> BoxFuture<'static, Result<Page<T>>> + Send + Sync + 'static,
    {
        Self {
            fetch: Arc::new(fetch),
            options,
            buffer: VecDeque::new(),
            exhausted: false,
            total: None,
        }
    }

    /// Total number of items, when the repository reported it.
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Number of items consumed from the repository so far.
    pub fn position(&self) -> u64 {
        self.options.skip_count
    }

    /// The next batch of items, or `None` once the listing is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<T>>> {
        if !self.buffer.is_empty() {
            return Ok(Some(self.buffer.drain(..).collect()));
        }
        if self.exhausted {
            return Ok(None);
        }

        let page = (self.fetch)(self.options.clone()).await?;
        debug!(
            "Fetched page at skip {}: {} items, more: {}",
            self.options.skip_count,
            page.items.len(),
            page.has_more
        );

        self.options.skip_count += page.items.len() as u64;
        self.total = page.total.or(self.total);
        if !page.has_more || page.items.is_empty() {
            self.exhausted = true;
        }

        if page.items.is_empty() {
            Ok(None)
        } else {
            Ok(Some(page.items))
        }
    }

    pub async fn next(&mut self) -> Result<Option<T>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }
            match self.next_page().await? {
                Some(items) => self.buffer.extend(items),
                None => return Ok(None),
            }
        }
    }

    /// Drain every remaining page.
    pub async fn collect_all(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page);
        }
        Ok(items)
    }

    pub fn into_stream(mut self) -> impl Stream<Item = Result<T>> + Send {
        try_stream! {
            while let Some(item) = self.next().await? {
                yield item;
            }
        }
    }
}

impl<T> fmt::Debug for Pager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pager")
            .field("options", &self.options)
            .field("buffered", &self.buffer.len())
            .field("exhausted", &self.exhausted)
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmis_core::CmisError;
    use futures::{FutureExt, StreamExt};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves `0..len` in pages of `options.max_items`.
    fn numbers(len: u32, calls: Arc<AtomicUsize>) -> Pager<u32> {
        Pager::new(ListOptions::new(3), move |options: ListOptions| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                let start = options.skip_count as u32;
                let end = (start + options.max_items).min(len);
                Ok(Page {
                    items: (start..end).collect(),
                    has_more: end < len,
                    total: Some(len as u64),
                })
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_collects_all_pages_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let items = numbers(7, Arc::clone(&calls)).collect_all().await.unwrap();
        assert_eq!(items, (0..7).collect::<Vec<_>>());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_is_lazy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut pager = numbers(7, Arc::clone(&calls));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(pager.next().await.unwrap(), Some(0));
        assert_eq!(pager.next().await.unwrap(), Some(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(pager.total(), Some(7));
        assert_eq!(pager.position(), 3);
    }

    #[tokio::test]
    async fn test_empty_listing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut pager = numbers(0, Arc::clone(&calls));
        assert_eq!(pager.next().await.unwrap(), None);
        assert_eq!(pager.next().await.unwrap(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_does_not_advance() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);
        let mut pager = Pager::new(ListOptions::new(2), move |options: ListOptions| {
            let attempt = seen.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    return Err(CmisError::Connectivity("reset".to_string()));
                }
                Ok(Page::last(vec![options.skip_count]))
            }
            .boxed()
        });

        assert!(pager.next().await.unwrap_err().is_transport());
        assert_eq!(pager.next().await.unwrap(), Some(0));
        assert_eq!(pager.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stream() {
        let calls = Arc::new(AtomicUsize::new(0));
        let stream = numbers(5, calls).into_stream();
        let items: Vec<u32> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(items, vec![0, 1, 2, 3, 4]);
    }
}
