//! The DCB event store backed by EventSourcingDB.
//!
//! [`EsdbEventStore`] owns the shared client handle, the clock and the [`StoreConfig`],
//! and exposes the [`EventStore`] operations: check reachability, read a filtered slice
//! of the log, and append events guarded by an [`AppendCondition`]. It keeps no other
//! state; clones share the same client and can be used concurrently.

use std::sync::Arc;

use metrics::counter;

use crate::client::Client;
use crate::clock::{Clock, SystemClock};
use crate::error::Error;
use crate::reader::{EventStream, read_program};
use crate::types::{AppendCondition, Event, Query, ReadOptions};
use crate::writer::append_events;

/// Default value of every written record's `source` field.
pub const DEFAULT_EVENT_SOURCE: &str = "https://dcb.events";

/// Default namespace prepended to event types in the store.
pub const DEFAULT_EVENT_TYPE_PREFIX: &str = "events.dcb.";

/// Adapter configuration.
///
/// Connection details (base URI, API key) belong to the [`Client`] implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Value of each written record's `source` field.
    pub event_source: String,
    /// Namespace prepended to event types on write and stripped on read.
    pub event_type_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            event_source: DEFAULT_EVENT_SOURCE.to_string(),
            event_type_prefix: DEFAULT_EVENT_TYPE_PREFIX.to_string(),
        }
    }
}

impl StoreConfig {
    /// Replace the event source.
    pub fn with_event_source(mut self, event_source: impl Into<String>) -> StoreConfig {
        self.event_source = event_source.into();
        self
    }

    /// Replace the event type prefix.
    pub fn with_event_type_prefix(mut self, prefix: impl Into<String>) -> StoreConfig {
        self.event_type_prefix = prefix.into();
        self
    }
}

/// Operations of a Dynamic Consistency Boundary event store.
#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    /// Check that the store is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the store cannot be reached.
    async fn ping(&self) -> Result<(), Error>;

    /// Read the events matching `query`, shaped by `options`.
    ///
    /// Query compilation errors are returned before anything is sent to the store.
    async fn read(&self, query: &Query, options: ReadOptions) -> Result<EventStream, Error>;

    /// Append `events` atomically, provided `condition` holds.
    async fn append(&self, events: &[Event], condition: &AppendCondition) -> Result<(), Error>;
}

/// [`EventStore`] backed by an EventSourcingDB [`Client`].
#[derive(Clone)]
pub struct EsdbEventStore {
    client: Arc<dyn Client>,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
}

impl EsdbEventStore {
    /// Create a store using the system clock and the default configuration.
    pub fn new(client: Arc<dyn Client>) -> EsdbEventStore {
        EsdbEventStore {
            client,
            clock: Arc::new(SystemClock),
            config: StoreConfig::default(),
        }
    }

    /// A store sharing this store's client, stamping events with `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> EsdbEventStore {
        self.clock = clock;
        self
    }

    /// A store sharing this store's client, using `config`.
    pub fn with_config(mut self, config: StoreConfig) -> EsdbEventStore {
        self.config = config;
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl EventStore for EsdbEventStore {
    async fn ping(&self) -> Result<(), Error> {
        self.client.ping().await?;
        Ok(())
    }

    async fn read(&self, query: &Query, options: ReadOptions) -> Result<EventStream, Error> {
        let prefix = &self.config.event_type_prefix;
        let program = read_program(query, &options, prefix)?;

        tracing::debug!(program = %program, "Running EventQL query");
        counter!("dcb_esdb_reads_total").increment(1);

        let rows = self.client.run_query(&program).await?;
        Ok(EventStream::new(rows, prefix.clone()))
    }

    async fn append(&self, events: &[Event], condition: &AppendCondition) -> Result<(), Error> {
        append_events(
            self.client.as_ref(),
            self.clock.as_ref(),
            &self.config.event_source,
            &self.config.event_type_prefix,
            events,
            condition,
        )
        .await
    }
}

impl std::fmt::Debug for EsdbEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EsdbEventStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
