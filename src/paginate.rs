//! Provider pagination strategies.
//!
//! Every collaboration API pages differently, and each style has its own
//! termination contract. Getting the contract wrong silently truncates
//! data, so the styles are a closed set of strategies selected by source
//! configuration at construction time — never by inspecting responses.
//!
//! | Style | Advances by | Terminates when |
//! |-------|-------------|-----------------|
//! | [`PageStyle::TokenCursor`] | opaque token from each response | records empty, `is_last`, or no new token |
//! | [`PageStyle::SizeThreshold`] | the *returned* record count | records empty, or returned < requested |
//! | [`PageStyle::LinkHeader`] | explicit next link | next link absent |
//!
//! Token-cursor responses sometimes carry a `total` field; it is unreliable
//! across providers and is never consulted. The size-threshold offset
//! advances by the returned size rather than the requested page size, so a
//! provider returning fewer items than asked neither skips nor duplicates
//! records. Link-header is the simplest and most robust contract; prefer it
//! when designing new integrations.
//!
//! A transport error aborts the remaining pagination for that source;
//! records already yielded stay valid. Restart is from scratch only.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::RawRecord;

/// Which cursor protocol a source speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStyle {
    TokenCursor,
    SizeThreshold { page_size: usize },
    LinkHeader,
}

/// Cursor position handed to the transport for one page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    /// `next_token` is `None` on the first call.
    Token { next_token: Option<String> },
    Offset {
        start_offset: usize,
        page_size: usize,
    },
    /// `next_link` is `None` on the first call (fetch the base endpoint).
    Link { next_link: Option<String> },
}

/// One page of raw records plus whatever advancement signals the provider
/// included. Fields irrelevant to a style are left `None`.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<RawRecord>,
    pub is_last: Option<bool>,
    pub next_token: Option<String>,
    pub next_link: Option<String>,
}

/// Capability interface over the HTTP transport: fetch the page a cursor
/// points at. Implementations build the provider-specific request.
#[async_trait]
pub trait PageTransport: Send + Sync {
    async fn fetch(&self, request: &PageRequest) -> Result<Page>;
}

/// Everything a connector scan managed to fetch, plus the error that
/// stopped it early, if any. Records fetched before an abort are kept —
/// there is no rollback — and the caller decides whether a partial
/// collection is worth loading.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub records: Vec<RawRecord>,
    pub error: Option<crate::error::Error>,
}

impl ScanOutcome {
    pub fn aborted(records: Vec<RawRecord>, error: crate::error::Error) -> Self {
        Self {
            records,
            error: Some(error),
        }
    }

    pub fn complete(records: Vec<RawRecord>) -> Self {
        Self {
            records,
            error: None,
        }
    }
}

enum CursorState {
    Token { next: Option<String> },
    Offset { offset: usize, page_size: usize },
    Link { next: Option<String> },
    Exhausted,
}

/// Lazily pulls pages from a [`PageTransport`] until the style's
/// termination rule fires.
pub struct Paginator<'a> {
    transport: &'a dyn PageTransport,
    state: CursorState,
}

impl<'a> Paginator<'a> {
    pub fn new(transport: &'a dyn PageTransport, style: PageStyle) -> Self {
        let state = match style {
            PageStyle::TokenCursor => CursorState::Token { next: None },
            PageStyle::SizeThreshold { page_size } => CursorState::Offset {
                offset: 0,
                page_size,
            },
            PageStyle::LinkHeader => CursorState::Link { next: None },
        };
        Self { transport, state }
    }

    /// Fetch the next page of records, or `None` once the sequence is
    /// exhausted. An `Err` means the rest of this source's pagination is
    /// aborted; pages already returned remain valid.
    pub async fn next_page(&mut self) -> Result<Option<Vec<RawRecord>>> {
        // Own the cursor while the fetch is in flight; unless a rule below
        // re-arms it, the paginator stays exhausted. A transport error
        // therefore also ends the sequence — restart is from scratch only.
        let state = std::mem::replace(&mut self.state, CursorState::Exhausted);
        match state {
            CursorState::Exhausted => Ok(None),
            CursorState::Token { next } => {
                let request = PageRequest::Token { next_token: next };
                let page = self.transport.fetch(&request).await?;
                if page.records.is_empty() {
                    return Ok(None);
                }
                let last = page.is_last == Some(true) || page.next_token.is_none();
                if !last {
                    self.state = CursorState::Token {
                        next: page.next_token,
                    };
                }
                Ok(Some(page.records))
            }
            CursorState::Offset { offset, page_size } => {
                let request = PageRequest::Offset {
                    start_offset: offset,
                    page_size,
                };
                let page = self.transport.fetch(&request).await?;
                let returned = page.records.len();
                if returned == 0 {
                    return Ok(None);
                }
                // A short page proves it is the last one; otherwise advance
                // by what actually arrived.
                if returned >= page_size {
                    self.state = CursorState::Offset {
                        offset: offset + returned,
                        page_size,
                    };
                }
                Ok(Some(page.records))
            }
            CursorState::Link { next } => {
                let request = PageRequest::Link { next_link: next };
                let page = self.transport.fetch(&request).await?;
                if let Some(link) = page.next_link {
                    self.state = CursorState::Link { next: Some(link) };
                }
                Ok(Some(page.records))
            }
        }
    }

    /// Drain the whole sequence into one vector.
    pub async fn fetch_all(mut self) -> Result<Vec<RawRecord>> {
        let mut records = Vec::new();
        while let Some(mut batch) = self.next_page().await? {
            records.append(&mut batch);
        }
        Ok(records)
    }
}
