//! latmesh-core — configuration, wire formats and the kernel RTT probe.
//! All other latmesh crates depend on this one.

pub mod config;
pub mod dns;
pub mod rtt;
pub mod wire;

pub use config::LatmeshConfig;
pub use rtt::{platform_probe, KernelRtt, RttError, RttProbe};
