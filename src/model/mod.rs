//! Core domain entities shared across every subsystem.
//!
//! Packages reference each other by [`nevra::Nevra`] id, never by owning
//! reference — the package graph is cyclic (shared-library families) so
//! everything here is plain, `Clone`-able data that lives in arenas owned by
//! the catalog or the resolver's pool.

pub mod capability;
pub mod history;
pub mod media;
pub mod nevra;
pub mod package;
pub mod peer;

pub use capability::{CapOp, Capability};
pub use history::{AffectedPackage, Direction, Hold, HistoryAction, HistoryEntry, HistoryStatus, ListKind};
pub use media::{FileIndexState, IpMode, Media, ReplicationPolicy, Server};
pub use nevra::{Evr, Nevra};
pub use package::{Package, PackageBuilder, PackageFile};
pub use peer::{Peer, PeerMode};
