//! Page loops for list APIs.
//!
//! Providers paginate in one of three ways: by page number, by offset, or by
//! an opaque continuation token (marker). [`paginate`] drives all three and
//! stops on whichever end signal the API gives first.

use std::future::Future;

use anyhow::{Context, Result};

use crate::orchestrator::CollectContext;
use crate::{unit_debug, unit_warn};

/// How a list API is paged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStyle {
    Number,
    Offset,
    Token,
}

/// One page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    /// 1-based page number.
    Number { page: u32, size: u32 },
    Offset { offset: u64, limit: u32 },
    /// `None` requests the first page.
    Token { token: Option<String>, size: u32 },
}

/// One page of results and the end signals it carried.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total number of items, when the API reports it.
    pub total: Option<u64>,
    pub next_token: Option<String>,
    /// Explicit "more pages" flag, when the API reports one.
    pub truncated: Option<bool>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            total: None,
            next_token: None,
            truncated: None,
        }
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    pub fn with_next_token(mut self, token: Option<String>) -> Self {
        self.next_token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn with_truncated(mut self, truncated: bool) -> Self {
        self.truncated = Some(truncated);
        self
    }
}

/// List every item, one page at a time.
///
/// Stops when the page is empty, the running count reaches the reported
/// total, the API says it is not truncated, a token-paged API returns no
/// (or the same) token, or a numbered page comes back short. A failed page
/// fails the whole listing.
pub async fn paginate<T, F, Fut>(ctx: &CollectContext, style: PageStyle, page_size: u32, mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let size = page_size.max(1);
    let mut items = Vec::new();
    let mut count: u64 = 0;
    let mut page_number: u32 = 1;
    let mut token: Option<String> = None;

    loop {
        ctx.check()?;

        let request = match style {
            PageStyle::Number => PageRequest::Number { page: page_number, size },
            PageStyle::Offset => PageRequest::Offset { offset: count, limit: size },
            PageStyle::Token => PageRequest::Token { token: token.clone(), size },
        };
        let page = fetch(request)
            .await
            .with_context(|| format!("listing page {}", page_number))?;

        let received = page.items.len() as u64;
        count += received;
        items.extend(page.items);
        unit_debug!(ctx, "page {}: {} items ({} so far)", page_number, received, count);

        if received == 0 {
            break;
        }
        if matches!(page.total, Some(total) if count >= total) {
            break;
        }
        if page.truncated == Some(false) {
            break;
        }

        match style {
            PageStyle::Token => match page.next_token {
                None => break,
                Some(next) if token.as_deref() == Some(next.as_str()) => {
                    unit_warn!(ctx, "list API repeated continuation token, stopping");
                    break;
                }
                Some(next) => token = Some(next),
            },
            PageStyle::Number | PageStyle::Offset => {
                if page.total.is_none() && page.truncated.is_none() && received < size as u64 {
                    break;
                }
            }
        }
        page_number += 1;
    }

    Ok(items)
}
