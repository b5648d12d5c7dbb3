//! Narrow interfaces to the collaborators the vault does not own.
//!
//! Implementations live outside the core (an RPC client, a simulator). They are
//! shared between controllers, so every method takes `&self` and
//! implementations synchronise their own state.

use std::fmt;
use std::sync::Arc;

use solana_program::pubkey::Pubkey;

use crate::errors::CalidaResult;
use crate::position::{ExternalPositionStatus, HintPair, PositionState};

/// Collateralized-lending protocol holding the pooled position
pub trait LendingProtocol: Send + Sync {
    /// Open a position owned by `owner` and return its id.
    fn open_position(
        &self,
        owner: &Pubkey,
        collateral: u128,
        debt: u128,
        hints: HintPair,
    ) -> CalidaResult<Pubkey>;

    /// Move collateral and debt of an open position in one call.
    fn adjust_position(
        &self,
        position: &Pubkey,
        collateral_delta: i128,
        debt_delta: i128,
        hints: HintPair,
    ) -> CalidaResult<()>;

    /// Collateral-only adjustment.
    fn adjust_collateral(&self, position: &Pubkey, delta: i128, hints: HintPair) -> CalidaResult<()> {
        self.adjust_position(position, delta, 0, hints)
    }

    fn position_state(&self, position: &Pubkey) -> CalidaResult<PositionState>;

    fn position_status(&self, position: &Pubkey) -> CalidaResult<ExternalPositionStatus>;
}

/// Read-only view of the protocol's list of positions, sorted by nominal ratio
/// from highest (head) to lowest (tail)
pub trait SortedPositions: Send + Sync {
    fn contains(&self, id: &Pubkey) -> bool;

    fn head(&self) -> Option<Pubkey>;

    fn tail(&self) -> Option<Pubkey>;

    /// Entry after `id`, towards the tail
    fn next(&self, id: &Pubkey) -> Option<Pubkey>;

    /// Entry before `id`, towards the head
    fn prev(&self, id: &Pubkey) -> Option<Pubkey>;

    /// Nominal ratio the entry is currently sorted by
    fn nominal_ratio(&self, id: &Pubkey) -> Option<u128>;

    fn size(&self) -> usize;
}

/// The protocol's approximate hint primitive
pub trait HintHelper: Send + Sync {
    /// Probe `probe_count` random entries and return the closest bracket found
    /// for `nominal_ratio`. The result is approximate and may already be stale.
    fn probe_hint(&self, nominal_ratio: u128, seed: u64, probe_count: u32) -> CalidaResult<HintPair>;
}

/// Validated price source
pub trait PriceFeed: Send + Sync {
    /// Price of `asset` in debt units, 18-decimal fixed point
    fn current_price(&self, asset: &Pubkey) -> CalidaResult<u128>;
}

/// Typed handles to every collaborator, injected once per controller
#[derive(Clone)]
pub struct ProtocolHandles {
    pub lending: Arc<dyn LendingProtocol>,
    pub sorted_positions: Arc<dyn SortedPositions>,
    pub hint_helper: Arc<dyn HintHelper>,
    pub price_feed: Arc<dyn PriceFeed>,
    /// Collateral asset priced by the feed; `Pubkey::default()` is the native asset
    pub collateral_asset: Pubkey,
}

impl ProtocolHandles {
    /// Bundle the handles of a backend that implements every interface
    pub fn from_backend<B>(backend: Arc<B>, collateral_asset: Pubkey) -> Self
    where
        B: LendingProtocol + SortedPositions + HintHelper + PriceFeed + 'static,
    {
        Self {
            lending: backend.clone(),
            sorted_positions: backend.clone(),
            hint_helper: backend.clone(),
            price_feed: backend,
            collateral_asset,
        }
    }

    pub fn current_price(&self) -> CalidaResult<u128> {
        self.price_feed.current_price(&self.collateral_asset)
    }
}

impl fmt::Debug for ProtocolHandles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolHandles")
            .field("collateral_asset", &self.collateral_asset)
            .finish_non_exhaustive()
    }
}
