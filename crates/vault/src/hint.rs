//! Insertion hints for the lending protocol's ordered position list.
//!
//! The list is sorted by nominal ratio, highest at the head. A full walk is
//! linear in the number of borrowers, so the resolver asks the protocol's
//! approximate-hint primitive for a nearby bracket first and then corrects it
//! with a bounded walk. Other borrowers can move between the probe and the
//! walk; when the walk would take more than `max_steps` the lookup fails with
//! `HintStale` and the caller decides whether to retry.

use calida_types::{CalidaError, CalidaResult, HintHelper, HintPair, Pubkey, SortedPositions};

/// Read-only view of the list with one entry hidden.
///
/// The entry being repositioned is still linked while its hint is computed,
/// but it will be unlinked before reinsertion, so it must not anchor the
/// bracket.
struct ListView<'a> {
    list: &'a dyn SortedPositions,
    exclude: Option<Pubkey>,
}

impl<'a> ListView<'a> {
    fn skip(&self, id: Option<Pubkey>, step: impl Fn(&Pubkey) -> Option<Pubkey>) -> Option<Pubkey> {
        match id {
            Some(id) if Some(id) == self.exclude => step(&id),
            other => other,
        }
    }

    fn head(&self) -> Option<Pubkey> {
        self.skip(self.list.head(), |id| self.list.next(id))
    }

    fn tail(&self) -> Option<Pubkey> {
        self.skip(self.list.tail(), |id| self.list.prev(id))
    }

    fn next(&self, id: &Pubkey) -> Option<Pubkey> {
        self.skip(self.list.next(id), |id| self.list.next(id))
    }

    fn prev(&self, id: &Pubkey) -> Option<Pubkey> {
        self.skip(self.list.prev(id), |id| self.list.prev(id))
    }

    /// Listed and not hidden
    fn is_member(&self, id: &Pubkey) -> bool {
        Some(*id) != self.exclude && self.list.contains(id)
    }

    fn ratio(&self, id: &Pubkey) -> CalidaResult<u128> {
        self.list
            .nominal_ratio(id)
            .ok_or(CalidaError::PositionNotFound { position: *id })
    }

    /// Successor of `prev`, or the head when `prev` is the list start
    fn after(&self, prev: Option<&Pubkey>) -> Option<Pubkey> {
        match prev {
            Some(prev) => self.next(prev),
            None => self.head(),
        }
    }
}

/// Whether `hints` brackets `nominal_ratio` in `list`, ignoring `exclude`.
///
/// Holds when `prev` is absent or ranks at or above the target, `next` is
/// absent or ranks at or below it, and the two are neighbours.
pub fn is_valid_bracket(
    list: &dyn SortedPositions,
    nominal_ratio: u128,
    hints: &HintPair,
    exclude: Option<&Pubkey>,
) -> bool {
    let view = ListView {
        list,
        exclude: exclude.copied(),
    };
    check_bracket(&view, nominal_ratio, hints.prev.as_ref()).unwrap_or(false)
        && view.after(hints.prev.as_ref()) == hints.next
}

fn check_bracket(view: &ListView<'_>, nominal_ratio: u128, prev: Option<&Pubkey>) -> CalidaResult<bool> {
    if let Some(prev) = prev {
        if !view.is_member(prev) || view.ratio(prev)? < nominal_ratio {
            return Ok(false);
        }
    }
    match view.after(prev) {
        Some(next) => Ok(view.ratio(&next)? <= nominal_ratio),
        None => Ok(true),
    }
}

/// Probe-then-walk hint lookup
#[derive(Debug, Clone)]
pub struct HintResolver {
    probe_count: u32,
    max_steps: u32,
    seed_counter: u64,
}

impl HintResolver {
    pub fn new(probe_count: u32, max_steps: u32) -> Self {
        Self {
            probe_count,
            max_steps,
            seed_counter: 0,
        }
    }

    pub fn probe_count(&self) -> u32 {
        self.probe_count
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    fn next_seed(&mut self) -> u64 {
        self.seed_counter = self.seed_counter.wrapping_add(1);
        self.seed_counter
    }

    /// Find the bracket for `nominal_ratio`.
    ///
    /// `exclude` hides the position being repositioned. Without an explicit
    /// `seed` each call draws a fresh one from the resolver's counter.
    pub fn resolve(
        &mut self,
        list: &dyn SortedPositions,
        helper: &dyn HintHelper,
        nominal_ratio: u128,
        exclude: Option<&Pubkey>,
        seed: Option<u64>,
    ) -> CalidaResult<HintPair> {
        let seed = seed.unwrap_or_else(|| self.next_seed());
        let view = ListView {
            list,
            exclude: exclude.copied(),
        };

        if view.head().is_none() {
            return Ok(HintPair::empty());
        }

        let probe = helper.probe_hint(nominal_ratio, seed, self.probe_count)?;

        // Anchor on whichever side of the probe is still listed
        let mut prev = match (probe.prev, probe.next) {
            (Some(prev), _) if view.is_member(&prev) => Some(prev),
            (_, Some(next)) if view.is_member(&next) => view.prev(&next),
            _ => view.tail(),
        };

        let mut steps = 0u32;
        loop {
            if check_bracket(&view, nominal_ratio, prev.as_ref())? {
                let hints = HintPair::new(prev, view.after(prev.as_ref()));
                log::debug!(
                    "Resolved hint for NICR {} after {} correction steps: {:?}",
                    nominal_ratio,
                    steps,
                    hints
                );
                return Ok(hints);
            }

            if steps >= self.max_steps {
                log::debug!(
                    "Hint for NICR {} still off after {} steps (seed {})",
                    nominal_ratio,
                    steps,
                    seed
                );
                return Err(CalidaError::HintStale {
                    max_steps: self.max_steps,
                });
            }

            // Move towards the head while prev ranks below target, else towards the tail
            prev = match prev {
                Some(current) if view.ratio(&current)? < nominal_ratio => view.prev(&current),
                current => view.after(current.as_ref()),
            };
            steps += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calida_simulation::SimulatedProtocol;
    use calida_types::{LendingProtocol, NICR_PRECISION};

    /// Protocol whose list holds positions at the given whole-number NICRs
    fn protocol_with(ratios: &[u128]) -> (SimulatedProtocol, Vec<Pubkey>) {
        let sim = SimulatedProtocol::new(Default::default());
        let debt = calida_types::DECIMAL_PRECISION;
        let ids = ratios
            .iter()
            .map(|ratio| {
                let owner = Pubkey::new_unique();
                sim.open_position(&owner, ratio * debt, debt, HintPair::empty()).unwrap();
                owner
            })
            .collect();
        (sim, ids)
    }

    #[test]
    fn test_empty_list_gives_empty_bracket() {
        let (sim, _) = protocol_with(&[]);
        let mut resolver = HintResolver::new(5, 3);
        let hints = resolver.resolve(&sim, &sim, NICR_PRECISION, None, None).unwrap();
        assert_eq!(hints, HintPair::empty());
    }

    #[test]
    fn test_resolves_interior_bracket() {
        let (sim, ids) = protocol_with(&[5, 4, 3, 2]);
        let mut resolver = HintResolver::new(10, 10);
        let target = 3 * NICR_PRECISION + 1;
        let hints = resolver.resolve(&sim, &sim, target, None, Some(1)).unwrap();
        assert_eq!(hints, HintPair::new(Some(ids[1]), Some(ids[2])));
        assert!(is_valid_bracket(&sim, target, &hints, None));
    }

    #[test]
    fn test_resolves_list_boundaries() {
        let (sim, ids) = protocol_with(&[5, 4, 3]);
        let mut resolver = HintResolver::new(0, 10);

        let hints = resolver.resolve(&sim, &sim, 9 * NICR_PRECISION, None, None).unwrap();
        assert_eq!(hints, HintPair::new(None, Some(ids[0])));

        let hints = resolver.resolve(&sim, &sim, 2 * NICR_PRECISION, None, None).unwrap();
        assert_eq!(hints, HintPair::new(Some(ids[2]), None));
    }

    #[test]
    fn test_excluded_entry_never_anchors() {
        let (sim, ids) = protocol_with(&[5, 4, 3]);
        let mut resolver = HintResolver::new(0, 10);

        // Moving the middle entry up to 4.5 must bracket between 5 and 3
        let target = 4 * NICR_PRECISION + NICR_PRECISION / 2;
        let hints = resolver.resolve(&sim, &sim, target, Some(&ids[1]), None).unwrap();
        assert_eq!(hints, HintPair::new(Some(ids[0]), Some(ids[2])));
        assert!(is_valid_bracket(&sim, target, &hints, Some(&ids[1])));
        assert!(!is_valid_bracket(&sim, target, &hints, None));
    }

    #[test]
    fn test_equal_ratios_are_valid_on_either_side() {
        let (sim, ids) = protocol_with(&[5, 4, 3]);
        let target = 4 * NICR_PRECISION;
        assert!(is_valid_bracket(&sim, target, &HintPair::new(Some(ids[0]), Some(ids[1])), None));
        assert!(is_valid_bracket(&sim, target, &HintPair::new(Some(ids[1]), Some(ids[2])), None));
    }

    #[test]
    fn test_walk_limit_gives_hint_stale() {
        let ratios: Vec<u128> = (2..=41).rev().collect();
        let (sim, _) = protocol_with(&ratios);
        // No probes: the walk starts next to the tail, over thirty steps away
        let mut resolver = HintResolver::new(0, 3);
        let result = resolver.resolve(&sim, &sim, 35 * NICR_PRECISION + 1, None, None);
        assert_eq!(result, Err(CalidaError::HintStale { max_steps: 3 }));
    }

    #[test]
    fn test_seed_counter_advances() {
        let mut resolver = HintResolver::new(1, 1);
        assert_eq!(resolver.next_seed(), 1);
        assert_eq!(resolver.next_seed(), 2);
    }
}
