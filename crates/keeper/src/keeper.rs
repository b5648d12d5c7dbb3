use std::time::Duration;

use calida_math::decimal_to_f64;
use calida_types::{CalidaError, Pubkey, VaultSnapshot};
use calida_vault::{RebalanceOutcome, StakingVault, TroveRebalance};
use serde::Serialize;

use crate::config::RetryConfig;
use crate::error::{KeeperError, KeeperResult};

/// Drives the vault's permissionless rebalance and retries stale hints.
///
/// The vault never retries on its own; this is where the retry policy lives.
pub struct Keeper {
    vault: StakingVault,
    retry: RetryConfig,
    iteration: u64,
}

/// Summary of one keeper pass
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub iteration: u64,
    pub in_band: usize,
    pub rebalanced: usize,
    pub failed: usize,
    pub retries: u32,
    pub snapshot: VaultSnapshot,
}

impl Keeper {
    pub fn new(vault: StakingVault, retry: RetryConfig) -> Self {
        Self {
            vault,
            retry,
            iteration: 0,
        }
    }

    pub fn vault(&self) -> &StakingVault {
        &self.vault
    }

    pub fn vault_mut(&mut self) -> &mut StakingVault {
        &mut self.vault
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// One rebalance pass over every active trove
    pub async fn run_once(&mut self) -> KeeperResult<PassReport> {
        self.iteration += 1;
        let mut results = self.vault.rebalance()?;
        let mut retries = 0u32;

        for result in results.iter_mut().filter(|r| r.outcome.is_retryable()) {
            match self.retry_trove(&result.trove).await {
                Ok((outcome, attempts)) => {
                    retries += attempts;
                    result.outcome = outcome;
                }
                Err(KeeperError::RetriesExhausted { attempts, last, .. }) => {
                    retries += attempts;
                    result.outcome = RebalanceOutcome::Failed(last);
                }
                Err(err) => return Err(err),
            }
        }

        let report = PassReport {
            iteration: self.iteration,
            in_band: count(&results, |o| matches!(o, RebalanceOutcome::InBand { .. })),
            rebalanced: count(&results, |o| matches!(o, RebalanceOutcome::Rebalanced(_))),
            failed: count(&results, RebalanceOutcome::is_failure),
            retries,
            snapshot: self.vault.snapshot()?,
        };

        for result in &results {
            match &result.outcome {
                RebalanceOutcome::Rebalanced(decision) => log::info!(
                    "Trove {} rebalanced from ICR {:.4} (delta {})",
                    result.trove,
                    decimal_to_f64(decision.current_ratio),
                    decision.delta
                ),
                RebalanceOutcome::Failed(err) => log::error!("Trove {} not rebalanced: {}", result.trove, err),
                RebalanceOutcome::InBand { .. } => {}
            }
        }

        Ok(report)
    }

    /// Retry a trove whose hint went stale, backing off between attempts.
    ///
    /// Returns the final outcome and the number of attempts made.
    async fn retry_trove(&mut self, trove: &Pubkey) -> KeeperResult<(RebalanceOutcome, u32)> {
        let mut last = CalidaError::HintStale { max_steps: 0 };

        for attempt in 0..self.retry.max_retries {
            let delay = self.retry.delay_for_attempt(attempt);
            log::debug!("Retrying trove {} in {}ms (attempt {})", trove, delay, attempt + 1);
            tokio::time::sleep(Duration::from_millis(delay)).await;

            match self.vault.rebalance_trove(trove)? {
                RebalanceOutcome::Failed(err) if err.is_retryable() => last = err,
                outcome => return Ok((outcome, attempt + 1)),
            }
        }

        log::warn!("Giving up on trove {} after {} retries", trove, self.retry.max_retries);
        Err(KeeperError::RetriesExhausted {
            trove: *trove,
            attempts: self.retry.max_retries,
            last,
        })
    }

    /// Warn about troves whose ratio is outside the band
    pub fn health_check(&self) -> KeeperResult<usize> {
        let snapshot = self.vault.snapshot()?;
        let drifted = snapshot
            .troves
            .iter()
            .filter(|t| t.in_band == Some(false))
            .inspect(|t| {
                log::warn!(
                    "Trove {} out of band at ICR {:.4}",
                    t.trove,
                    t.icr.map_or(0.0, decimal_to_f64)
                )
            })
            .count();
        Ok(drifted)
    }
}

fn count(results: &[TroveRebalance], predicate: impl Fn(&RebalanceOutcome) -> bool) -> usize {
    results.iter().filter(|r| predicate(&r.outcome)).count()
}
