//! One page of a paged collection.

use serde::{Deserialize, Serialize};

/// A page as returned by an OData collection endpoint:
/// `{"value": [...], "@odata.nextLink": "...", "@odata.deltaLink": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items in server order.
    #[serde(rename = "value")]
    pub items: Vec<T>,

    /// Continuation cursor; absent on the last page.
    #[serde(
        rename = "@odata.nextLink",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub next_link: Option<String>,

    /// Delta cursor, present on the last page of a delta query.
    #[serde(
        rename = "@odata.deltaLink",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub delta_link: Option<String>,
}

impl<T> Page<T> {
    /// Creates a page.
    #[must_use]
    pub fn new(items: Vec<T>, next_link: Option<String>) -> Self {
        Self {
            items,
            next_link,
            delta_link: None,
        }
    }

    /// Attaches a delta link.
    #[must_use]
    pub fn with_delta_link(mut self, delta_link: impl Into<String>) -> Self {
        self.delta_link = Some(delta_link.into());
        self
    }

    /// True when no further page follows.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.next_link.is_none()
    }

    /// Drops an empty continuation link, which some servers send instead of
    /// omitting the field.
    pub(crate) fn normalized(mut self) -> Self {
        if self.next_link.as_deref().is_some_and(|l| l.trim().is_empty()) {
            self.next_link = None;
        }
        self
    }
}
