//! Port definitions (trait abstractions) for external collaborators.
//!
//! Ports define the interfaces that the engine expects from infrastructure.
//! They contain no implementation details and use only domain types.
//!
//! # Design Rules
//!
//! - No `reqwest`, `zip` or `std::io` types in any signature
//! - Failures are always [`ModError`](crate::ModError)
//! - Progress and cancellation flow through [`ProgressSink`]

pub mod archive;
pub mod filesystem;
pub mod progress;
pub mod transport;

pub use archive::ArchivePort;
pub use filesystem::FileSystemPort;
pub use progress::{CountingProgress, ProgressSink};
pub use transport::{ApiCall, ApiRequest, CachePolicy, TransportPort};
