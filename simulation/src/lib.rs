/// Simulation backend for the Calida vault
///
/// Provides an in-memory lending protocol with:
/// - A collateral-ratio ordered position list with hint-checked insertion
/// - A sampling hint helper seeded per call
/// - A settable price feed
/// - Failure injection for exercising error paths
pub mod protocol;
pub mod sorted_list;

pub use protocol::{SimulatedProtocol, SimulationConfig};
pub use sorted_list::SortedList;

use std::sync::Arc;

use calida_types::ProtocolHandles;

/// Create a simulated protocol and the handles a vault needs to talk to it
pub fn simulated_handles(config: SimulationConfig) -> (Arc<SimulatedProtocol>, ProtocolHandles) {
    let asset = config.collateral_asset;
    let protocol = Arc::new(SimulatedProtocol::new(config));
    let handles = ProtocolHandles::from_backend(protocol.clone(), asset);
    (protocol, handles)
}
