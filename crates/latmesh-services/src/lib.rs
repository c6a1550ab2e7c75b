//! latmesh-services: the registry of peer regions and the operations run
//! against it (ping exchange, region lookup, snapshotting).

pub mod peer;
pub mod ping;
pub mod registry;
pub mod resolver;
pub mod snapshot;
pub mod throttle;

pub use peer::Peer;
pub use ping::{PingError, PingOutcome, Pinger, Role};
pub use registry::{RegionRegistry, RegistryError};
pub use resolver::{split_regions, DnsTxtResolver, RegionResolver, ResolveError};
pub use snapshot::{snapshot, SnapshotRow};
pub use throttle::TokenBucket;
