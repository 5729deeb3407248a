//! Change log reading with an opaque token cursor.
//!
//! Repositories treat a change token as inclusive: reading from the token
//! returned with a page hands back that page's last event again. The reader
//! remembers the last event it yielded per token and drops everything up to
//! it, so consecutive reads never repeat an event.

use std::sync::Arc;

use async_stream::try_stream;
use cmis_core::{ChangeEvent, ChangeEventsPage, CmisError, Result};
use futures::Stream;
use tracing::{debug, instrument};

use crate::client::CmisClient;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// No page read since creation or the last reset.
    Uninitialized,
    /// The repository reported more events after the cursor.
    Reading,
    /// Caught up. Reading again polls for newer events.
    Exhausted,
}

/// Resumable cursor over a repository's change log.
pub struct ChangeLogReader {
    session: Arc<Session>,
    cursor: Option<String>,
    last: Option<ChangeEvent>,
    state: ReaderState,
}

impl ChangeLogReader {
    pub(crate) fn new(session: Arc<Session>, token: Option<String>) -> Result<Self> {
        if !session.repository_info().supports_changes() {
            return Err(CmisError::UnsupportedCapability(format!(
                "repository {} does not keep a change log",
                session.repository_id()
            )));
        }
        Ok(Self {
            session,
            cursor: token,
            last: None,
            state: ReaderState::Uninitialized,
        })
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Token to resume from. `None` means the beginning of the log.
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Start over from `token`.
    pub fn reset(&mut self, token: Option<String>) {
        self.cursor = token;
        self.last = None;
        self.state = ReaderState::Uninitialized;
    }

    /// Read the next bounded page of events after the cursor.
    ///
    /// On failure the cursor and state are left unchanged.
    #[instrument(skip(self), level = "debug", fields(cursor = ?self.cursor))]
    pub async fn read_page(&mut self, include_properties: bool) -> Result<Vec<ChangeEvent>> {
        let page = self
            .session
            .binding()
            .get_content_changes(
                self.session.repository_id(),
                self.cursor.as_deref(),
                include_properties,
                self.session.config().page_size,
            )
            .await?;

        let boundary = self
            .last
            .clone()
            .or_else(|| self.cursor.as_deref().and_then(|t| self.session.change_boundary(t)));
        let mut events = page.events;
        if let Some(boundary) = &boundary {
            if let Some(pos) = events.iter().position(|e| e.same_entry(boundary)) {
                events.drain(..=pos);
            }
        }

        let previous = self.cursor.take();
        let stalled = events.is_empty() && page.latest_change_token == previous;
        self.cursor = page.latest_change_token.or(previous);
        if let Some(last) = events.last() {
            self.last = Some(last.clone());
            if let Some(token) = &self.cursor {
                self.session.remember_change_boundary(token, last.clone());
            }
        }
        self.state = if page.has_more && !stalled {
            ReaderState::Reading
        } else {
            ReaderState::Exhausted
        };

        debug!(
            "Read {} change events, cursor now {:?}, state {:?}",
            events.len(),
            self.cursor,
            self.state
        );
        Ok(events)
    }

    /// Every event from the cursor up to the end of the log.
    pub fn into_stream(mut self, include_properties: bool) -> impl Stream<Item = Result<ChangeEvent>> + Send {
        try_stream! {
            loop {
                let events = self.read_page(include_properties).await?;
                for event in events {
                    yield event;
                }
                if self.state == ReaderState::Exhausted {
                    break;
                }
            }
        }
    }
}

impl CmisClient {
    /// A reader positioned at `token`, or at the start of the log.
    pub async fn change_log_reader(&self, token: Option<&str>) -> Result<ChangeLogReader> {
        ChangeLogReader::new(self.session().await?, token.map(str::to_string))
    }

    /// Read one page of changes after `token`.
    ///
    /// Passing back the returned `latest_change_token` continues where this
    /// page ended without repeating its events.
    pub async fn changelog(&self, token: Option<&str>, include_properties: bool) -> Result<ChangeEventsPage> {
        let mut reader = self.change_log_reader(token).await?;
        let events = reader.read_page(include_properties).await?;
        Ok(ChangeEventsPage {
            events,
            latest_change_token: reader.cursor,
            has_more: reader.state == ReaderState::Reading,
        })
    }
}
