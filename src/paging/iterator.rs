//! Pull-based traversal across pages with cooperative pause and resume.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::fetcher::PageFetcher;
use super::page::Page;
use crate::error::TransferError;

/// Per-item handler. Returning `false` pauses the iteration.
pub trait Visitor<T> {
    /// Visits one item; `true` continues, `false` pauses.
    fn visit(&mut self, item: &T) -> bool;
}

impl<T, F> Visitor<T> for F
where
    F: FnMut(&T) -> bool,
{
    fn visit(&mut self, item: &T) -> bool {
        self(item)
    }
}

/// Lifecycle of a [`PageIterator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IteratorState {
    /// No item visited yet.
    NotStarted,
    /// Inside `iterate` or `resume`.
    InProgress,
    /// Stopped by the visitor, cancellation or a fetch error; resumable.
    Paused,
    /// Every page consumed. Terminal.
    Complete,
}

/// The iterator's full position, serializable so a paused traversal can
/// be persisted and picked up by another process.
///
/// While paused, either `current_page` holds the page being visited and
/// `current_item_index` the next unvisited item, or `current_page` is empty
/// and `pending_cursor` names the next page to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagingContext<T> {
    /// Page whose items are being visited.
    pub current_page: Option<Page<T>>,
    /// Index of the next unvisited item in `current_page`.
    pub current_item_index: usize,
    /// Next page to fetch once `current_page` is exhausted.
    pub pending_cursor: Option<String>,
    /// Delta link reported by the last page, if any.
    pub delta_link: Option<String>,
    /// Lifecycle state.
    pub state: IteratorState,
}

/// Visits every item of a paged collection exactly once, in server order.
///
/// Pages are fetched strictly one after another, only when the previous
/// page is exhausted.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use transfer_core::http::{HttpClient, Transport};
/// use transfer_core::paging::{IteratorState, PageFetcher, PageIterator};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = PageFetcher::new(Transport::unauthenticated(Arc::new(HttpClient::try_new()?)));
/// let mut iterator =
///     PageIterator::<serde_json::Value>::from_url(fetcher, "https://graph.microsoft.com/v1.0/me/messages");
///
/// let mut seen = 0;
/// let mut visitor = |_: &serde_json::Value| {
///     seen += 1;
///     seen % 10 != 0
/// };
/// let mut state = iterator.iterate(&mut visitor).await?;
/// while state == IteratorState::Paused {
///     state = iterator.resume(&mut visitor).await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PageIterator<T> {
    fetcher: PageFetcher,
    context: PagingContext<T>,
    cancel: Option<CancellationToken>,
}

impl<T: DeserializeOwned> PageIterator<T> {
    /// Starts from a page the caller already fetched.
    #[must_use]
    pub fn new(fetcher: PageFetcher, first_page: Page<T>) -> Self {
        Self::from_context(
            fetcher,
            PagingContext {
                current_page: Some(first_page),
                current_item_index: 0,
                pending_cursor: None,
                delta_link: None,
                state: IteratorState::NotStarted,
            },
        )
    }

    /// Starts from a URL; the first page is fetched on the first `iterate`.
    #[must_use]
    pub fn from_url(fetcher: PageFetcher, url: impl Into<String>) -> Self {
        Self::from_context(
            fetcher,
            PagingContext {
                current_page: None,
                current_item_index: 0,
                pending_cursor: Some(url.into()),
                delta_link: None,
                state: IteratorState::NotStarted,
            },
        )
    }

    /// Restores a previously saved position.
    #[must_use]
    pub fn from_context(fetcher: PageFetcher, context: PagingContext<T>) -> Self {
        Self {
            fetcher,
            context,
            cancel: None,
        }
    }

    /// Checks `token` before every page fetch.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> IteratorState {
        self.context.state
    }

    /// Current position.
    #[must_use]
    pub fn context(&self) -> &PagingContext<T> {
        &self.context
    }

    /// Consumes the iterator, returning its position for persistence.
    #[must_use]
    pub fn into_context(self) -> PagingContext<T> {
        self.context
    }

    /// The delta link of the final page, once the iteration is complete.
    #[must_use]
    pub fn delta_link(&self) -> Option<&str> {
        self.context.delta_link.as_deref()
    }

    /// Visits items until the visitor pauses or the collection ends.
    ///
    /// From `NotStarted` this starts the traversal; from `Paused` it
    /// continues like [`resume`](Self::resume). On `Complete` nothing
    /// happens.
    ///
    /// # Errors
    ///
    /// - the fetch error of a failed page request; the iterator is left
    ///   `Paused` at that cursor
    /// - [`TransferError::Cancelled`] when cancellation is observed before a
    ///   fetch; the iterator is left `Paused`
    #[instrument(skip(self, visitor), fields(state = ?self.context.state))]
    pub async fn iterate<V>(&mut self, visitor: &mut V) -> Result<IteratorState, TransferError>
    where
        V: Visitor<T> + ?Sized,
    {
        if self.context.state == IteratorState::Complete {
            return Ok(IteratorState::Complete);
        }
        self.run(visitor).await
    }

    /// Continues a paused traversal from the next unvisited item.
    ///
    /// A no-op in any state other than `Paused`.
    ///
    /// # Errors
    ///
    /// As [`iterate`](Self::iterate).
    #[instrument(skip(self, visitor), fields(state = ?self.context.state))]
    pub async fn resume<V>(&mut self, visitor: &mut V) -> Result<IteratorState, TransferError>
    where
        V: Visitor<T> + ?Sized,
    {
        if self.context.state != IteratorState::Paused {
            debug!("resume ignored");
            return Ok(self.context.state);
        }
        self.run(visitor).await
    }

    async fn run<V>(&mut self, visitor: &mut V) -> Result<IteratorState, TransferError>
    where
        V: Visitor<T> + ?Sized,
    {
        self.context.state = IteratorState::InProgress;

        loop {
            if let Some(page) = &self.context.current_page {
                while let Some(item) = page.items.get(self.context.current_item_index) {
                    // Advance first so a pause points at the next unvisited item.
                    self.context.current_item_index += 1;
                    if !visitor.visit(item) {
                        debug!(
                            next_index = self.context.current_item_index,
                            "visitor paused iteration"
                        );
                        self.context.state = IteratorState::Paused;
                        return Ok(IteratorState::Paused);
                    }
                }
            }

            if let Some(page) = self.context.current_page.take() {
                self.context.current_item_index = 0;
                if page.delta_link.is_some() {
                    self.context.delta_link = page.delta_link;
                }
                self.context.pending_cursor = page.next_link;
            }

            let Some(cursor) = self.context.pending_cursor.clone() else {
                info!("iteration complete");
                self.context.state = IteratorState::Complete;
                return Ok(IteratorState::Complete);
            };

            if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                info!("iteration cancelled");
                self.pause();
                return Err(TransferError::Cancelled);
            }

            match self.fetcher.fetch::<T>(&cursor).await {
                Ok(page) => {
                    self.context.current_page = Some(page);
                    self.context.current_item_index = 0;
                    self.context.pending_cursor = None;
                }
                Err(e) => {
                    self.pause();
                    return Err(e);
                }
            }
        }
    }

    fn pause(&mut self) {
        self.context.state = IteratorState::Paused;
    }
}
