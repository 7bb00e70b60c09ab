//! Streamer Core - Synthetic Event Streaming Orchestration
//!
//! This crate drives a periodic generation loop that asks a text-generation
//! backend for synthetic application error events, records each event, and
//! fans it out to every live subscriber. It has no HTTP server dependencies;
//! a host (see `streamer-daemon`) exposes it over REST and WebSocket.
//!
//! # Architecture
//!
//! ```text
//!   REST start/stop/configure                     WebSocket subscribers
//!            │                                           ▲
//! ┌──────────┼───────────────────────────────────────────┼──────────────┐
//! │          ▼                STREAMER CORE              │              │
//! │  ┌──────────────────┐   tick   ┌─────────────────┐   │              │
//! │  │ StreamController ├─────────►│ ProviderResolver│   │              │
//! │  │  (timer, state)  │          └────────┬────────┘   │              │
//! │  └───────┬──────────┘                   ▼            │              │
//! │          │                   ┌───────────────────┐   │              │
//! │          │                   │ GenerationBackend │   │              │
//! │          │                   └────────┬──────────┘   │              │
//! │          │                            ▼              │              │
//! │          │                   ┌───────────────────┐   │              │
//! │          │                   │   EventFactory    │   │              │
//! │          │                   └────────┬──────────┘   │              │
//! │          │                            ▼              │              │
//! │  ┌───────▼──────┐          ┌────────────────────┐  ┌─┴────────────┐ │
//! │  │ ConfigStore  │          │ PersistenceGateway ├─►│ BroadcastHub │ │
//! │  └──────────────┘          └────────────────────┘  └──────────────┘ │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`StreamController`]: run state, timer and the operations hosts call
//! - [`BroadcastHub`]: subscriber set and status board
//! - [`StreamMessage`]: what subscribers receive
//! - [`ProviderResolver`]: which backend the next tick talks to
//! - [`EventRecord`]: the generated event
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use streamer_core::{HttpGenerationClient, MemoryStore, StreamController, SubscriberHandle};
//!
//! let store = Arc::new(MemoryStore::new());
//! let controller = StreamController::builder(
//!     Arc::new(HttpGenerationClient::new()?),
//!     store.clone(),
//!     store,
//! )
//! .build();
//!
//! let (handle, mut rx) = SubscriberHandle::channel(64);
//! controller.hub().register(handle);
//! controller.start(Some(2000)).await?;
//!
//! while let Some(message) = rx.recv().await {
//!     println!("{}", message.to_json()?);
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: generation backend trait and HTTP client
//! - [`broadcast`]: subscriber fan-out
//! - [`config`]: TOML/env configuration for hosts
//! - [`config_store`]: live stream configuration
//! - [`controller`]: the stream controller
//! - [`factory`]: prompt rendering and payload parsing
//! - [`persistence`]: best-effort event writes
//! - [`resolver`]: provider resolution
//! - [`settings`]: stored provider settings and app config
//! - [`store`]: storage traits, memory and Postgres stores

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod broadcast;
pub mod config;
pub mod config_store;
pub mod controller;
pub mod error;
pub mod factory;
pub mod messages;
pub mod persistence;
pub mod record;
pub mod resolver;
pub mod settings;
pub mod store;

// Re-exports for convenience
pub use backend::{BackendError, GenerationBackend, GenerationRequest, HttpGenerationClient};
pub use broadcast::{BroadcastHub, BroadcastResult, SubscriberHandle, SubscriberId};
pub use config_store::{
    normalize_variation_limit, validate_interval, ConfigStore, StreamConfig, StreamConfigUpdate,
};
pub use controller::{
    ConfigSnapshot, ConfigureRequest, StartOutcome, StreamController, StreamControllerBuilder,
    StreamState,
};
pub use error::{StreamError, StreamResult};
pub use factory::{EventFactory, PayloadError};
pub use messages::{StatusSnapshot, StreamMessage};
pub use persistence::PersistenceGateway;
pub use record::{ErrorCategory, EventRecord, StoredEvent};
pub use resolver::{
    ProviderEnvironment, ProviderResolver, ProviderSummary, Resolution, ResolutionError,
    ResolutionStrategy, ResolvedProvider,
};
pub use settings::{
    AppConfig, AppConfigUpdate, ProviderConfig, ProviderKind, ProviderSettings,
    ProviderSettingsUpdate,
};
pub use store::{EventStore, MemoryStore, SettingsStore, StoreError};

#[cfg(feature = "postgres")]
pub use store::PostgresStore;

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, load_config_with_env, ConfigError,
    ConfigOverrides, ConfigSource, StorageBackend, StorageConfig, StreamerConfig, StreamerToml,
};
