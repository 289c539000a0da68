//! # dough-sync
//!
//! Keeps a local copy of the system's presence state (members, fronting,
//! mental state) in step with the server.
//!
//! - [`connection::ConnectionManager`] owns the push channel and reconnects with backoff
//! - [`dispatcher`] decodes frames into typed events
//! - [`engine::SyncEngine`] applies events and seed snapshots, then republishes
//!   derived views: expanded fronters, filtered lists, document metadata

pub mod backoff;
pub mod banner;
pub mod cofront;
pub mod connection;
pub mod dispatcher;
pub mod engine;
pub mod filter;
pub mod metadata;
pub mod presence;

pub use backoff::ReconnectPolicy;
pub use banner::ConnectivityBanner;
pub use cofront::{expand, CofrontOrigin, ExpandedFronter, ExpandedFrontingView, MemberLookup};
pub use connection::{ConnectionError, ConnectionManager, ConnectionStatus};
pub use dispatcher::{decode_frame, dispatch, EventDispatcher, PushHandler};
pub use engine::{EngineExit, EngineHandle, EngineInput, SyncEngine, ViewSnapshot};
pub use filter::{filter, grid_view, FilterState, TagFilter};
pub use metadata::{project, DocumentMetadata, MetadataSink, MetadataSynchronizer, SocialTags};
pub use presence::PresenceModel;
