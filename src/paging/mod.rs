//! Cursor-driven traversal of paged collections.
//!
//! [`PageFetcher`] retrieves one page, replaying the caller's
//! [`RequestOptions`] on every request so continuation links keep the
//! original headers. [`PageIterator`] walks the pages and hands each item to
//! a [`Visitor`], which can pause the walk at any item; the position is kept
//! in a [`PagingContext`] and a later `resume` continues with the next
//! unvisited item.

mod fetcher;
mod iterator;
mod options;
mod page;

pub use fetcher::PageFetcher;
pub use iterator::{IteratorState, PageIterator, PagingContext, Visitor};
pub use options::{RequestConfigurator, RequestOptions};
pub use page::Page;
