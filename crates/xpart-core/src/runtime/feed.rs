// crates/xpart-core/src/runtime/feed.rs
// ============================================================================
// Module: Query Feed Cursor
// Description: Continuation-driven cursor over a paged query feed.
// Purpose: Fetch pages until the backend reports no more results.
// Dependencies: crate::{model, interfaces}
// ============================================================================

//! ## Overview
//! A [`DocumentQuery`] walks `NotStarted -> HasMore* -> Exhausted`. The first
//! fetch always happens; afterwards the backend's continuation token decides
//! whether another round trip is needed. Page boundaries come from the
//! backend's page size, so even a single-scalar aggregate may span pages.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashSet;

use crate::interfaces::DocumentStore;
use crate::interfaces::FeedPage;
use crate::interfaces::FeedRequest;
use crate::interfaces::StoreError;
use crate::model::CollectionRef;
use crate::model::CountQuery;
use crate::model::FeedOptions;
use crate::model::QueryScope;

// ============================================================================
// SECTION: Cursor
// ============================================================================

/// Position of a query feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedCursor {
    /// No page requested yet.
    NotStarted,
    /// Backend reported more results behind this continuation token.
    HasMore(String),
    /// Backend reported no further results.
    Exhausted,
}

/// Paged execution of one count query.
pub struct DocumentQuery<'a> {
    /// Backend executing the query.
    store: &'a dyn DocumentStore,
    /// Target collection.
    collection: &'a CollectionRef,
    /// Logical query.
    query: &'a CountQuery,
    /// Partition routing.
    scope: &'a QueryScope,
    /// Paging options.
    options: &'a FeedOptions,
    /// Current position.
    cursor: FeedCursor,
    /// Number of pages fetched so far.
    pages_fetched: u64,
    /// Every continuation token the backend has issued.
    seen_tokens: HashSet<String>,
}

impl<'a> DocumentQuery<'a> {
    /// Creates a feed positioned before the first page.
    #[must_use]
    pub fn new(
        store: &'a dyn DocumentStore,
        collection: &'a CollectionRef,
        query: &'a CountQuery,
        scope: &'a QueryScope,
        options: &'a FeedOptions,
    ) -> Self {
        Self {
            store,
            collection,
            query,
            scope,
            options,
            cursor: FeedCursor::NotStarted,
            pages_fetched: 0,
            seen_tokens: HashSet::new(),
        }
    }

    /// Returns the current cursor.
    #[must_use]
    pub const fn cursor(&self) -> &FeedCursor {
        &self.cursor
    }

    /// Returns true until the backend reports exhaustion.
    #[must_use]
    pub const fn has_more_results(&self) -> bool {
        !matches!(self.cursor, FeedCursor::Exhausted)
    }

    /// Returns the number of pages fetched.
    #[must_use]
    pub const fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    /// Fetches the next page, or `None` once exhausted.
    ///
    /// An empty continuation token counts as exhaustion. Any token the backend
    /// already issued earlier in this feed is rejected, so a cycling backend
    /// cannot loop the feed forever.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend fails; the cursor is left
    /// unchanged.
    pub async fn next_page(&mut self) -> Result<Option<FeedPage>, StoreError> {
        let continuation = match &self.cursor {
            FeedCursor::Exhausted => return Ok(None),
            FeedCursor::NotStarted => None,
            FeedCursor::HasMore(token) => Some(token.as_str()),
        };
        let request = FeedRequest {
            collection: self.collection,
            query: self.query,
            scope: self.scope,
            options: self.options,
            continuation,
        };
        let mut page = self.store.query_page(request).await?;
        if page.continuation.as_deref().is_some_and(str::is_empty) {
            page.continuation = None;
        }
        let next = match &page.continuation {
            Some(token) if self.seen_tokens.contains(token) => {
                return Err(StoreError::InvalidResponse(
                    "continuation token repeated an earlier page".to_string(),
                ));
            }
            Some(token) => {
                self.seen_tokens.insert(token.clone());
                FeedCursor::HasMore(token.clone())
            }
            None => FeedCursor::Exhausted,
        };
        self.cursor = next;
        self.pages_fetched += 1;
        Ok(Some(page))
    }
}
