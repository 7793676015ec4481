//! Cursor-following pagination.
//!
//! [`paginate`] turns any [`PagedRpc`] into a lazy stream of pages. The next
//! page is only requested when the consumer polls for it, and a fixed delay
//! separates consecutive calls to stay under Slack's per-method rate limits.
//! There is no retry and no page cap: the first error ends the stream, and
//! the stream ends normally once a page carries no continuation cursor.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;

use crate::error::{Result, SlackError};

/// Delay between consecutive calls of one cursor chain.
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_secs(1);

/// One page of a paged API response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Items carried by this page.
    pub items: Vec<Value>,
    /// Cursor for the following page, `None` on the last page.
    pub next_cursor: Option<String>,
}

impl Page {
    pub fn new(items: Vec<Value>, next_cursor: Option<String>) -> Self {
        Self {
            items,
            next_cursor: next_cursor.filter(|c| !c.is_empty()),
        }
    }

    /// Extract a page from a Slack response body.
    ///
    /// Items are read from `items_key`; the cursor from
    /// `response_metadata.next_cursor`, where Slack uses an empty string
    /// on the last page.
    pub fn from_response(method: &str, items_key: &str, mut body: Value) -> Result<Self> {
        let items = match body.get_mut(items_key).map(Value::take) {
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(SlackError::decode(
                    method,
                    format!("'{}' is not an array", items_key),
                ));
            }
            None => {
                return Err(SlackError::decode(
                    method,
                    format!("missing '{}'", items_key),
                ));
            }
        };

        let next_cursor = body
            .pointer("/response_metadata/next_cursor")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self::new(items, next_cursor))
    }
}

/// An asynchronous call that returns one page for a given cursor.
#[async_trait]
pub trait PagedRpc: Send + Sync {
    /// Fetch the page at `cursor`, or the first page when `None`.
    async fn fetch(&self, cursor: Option<&str>) -> Result<Page>;
}

/// A boxed stream of pages.
pub type PageStream<'a> = Pin<Box<dyn Stream<Item = Result<Page>> + Send + 'a>>;

/// Enumerate every page of `rpc`, sleeping `delay` between calls.
pub fn paginate<'a, R>(rpc: R, delay: Duration) -> PageStream<'a>
where
    R: PagedRpc + 'a,
{
    Box::pin(async_stream::stream! {
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = match rpc.fetch(cursor.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::debug!(pages, error = %e, "Pagination aborted");
                    yield Err(e);
                    break;
                }
            };
            pages += 1;
            let next = page.next_cursor.clone();
            yield Ok(page);

            match next {
                Some(next) => {
                    tokio::time::sleep(delay).await;
                    cursor = Some(next);
                }
                None => {
                    tracing::trace!(pages, "Pagination finished");
                    break;
                }
            }
        }
    })
}
