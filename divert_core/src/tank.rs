//! Inference that the load can no longer absorb surplus ("tank full").
//!
//! There is no temperature sensor; the tell is a load that is commanded ON
//! while the site exports, yet draws nothing. Setting the state is slow
//! (a debounced run of such cycles), clearing is immediate on the first
//! cycle the load demonstrably absorbs again. While full, the load is held
//! OFF except for a brief periodic re-probe.

/// Consecutive qualifying cycles before the full state latches (~5 s).
const DETECT_CYCLES: u32 = 250;
/// Wall-clock gap between re-probes while full.
const RETEST_INTERVAL_MS: u64 = 600_000;
/// Cycles the load is forced ON during one re-probe.
const RETEST_ON_CYCLES: u32 = 10;

/// The heuristic's say in this cycle's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TankVerdict {
    /// No opinion; the bucket proposal stands.
    Neutral,
    /// Full: hold the load off.
    ForceOff,
    /// Re-probe in progress: hold the load on.
    ForceOn,
}

#[derive(Debug)]
pub struct TankFullHeuristic {
    full: bool,
    debounce: u32,
    retest_due_ms: u64,
    retest_remaining: u32,
}

impl Default for TankFullHeuristic {
    fn default() -> Self {
        Self::new()
    }
}

impl TankFullHeuristic {
    pub fn new() -> Self {
        Self {
            full: false,
            debounce: 0,
            retest_due_ms: 0,
            retest_remaining: 0,
        }
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Judge the cycle that just completed.
    ///
    /// `prev_on` is the decision that governed that cycle; powers are its
    /// measured means in ipu. Thresholds arrive pre-quantized so no float
    /// math happens here.
    pub fn evaluate(
        &mut self,
        prev_on: bool,
        divert_ipu: i64,
        grid_ipu: i64,
        anti_creep_ipu: i64,
        export_threshold_ipu: i64,
        now_ms: u64,
    ) -> TankVerdict {
        // Fast clear: the load absorbed real power, so it has headroom again.
        if prev_on && divert_ipu > anti_creep_ipu {
            if self.full {
                tracing::info!("load absorbing again, clearing tank-full");
            }
            self.full = false;
            self.debounce = 0;
            self.retest_remaining = 0;
            return TankVerdict::Neutral;
        }

        if self.full {
            if self.retest_remaining > 0 {
                self.retest_remaining -= 1;
                return TankVerdict::ForceOn;
            }
            if now_ms >= self.retest_due_ms {
                self.retest_due_ms = now_ms.saturating_add(RETEST_INTERVAL_MS);
                self.retest_remaining = RETEST_ON_CYCLES - 1;
                tracing::debug!("tank-full re-probe: forcing load on");
                return TankVerdict::ForceOn;
            }
            return TankVerdict::ForceOff;
        }

        // Slow set: ON but not absorbing while exporting hard.
        if prev_on && divert_ipu < anti_creep_ipu && grid_ipu > export_threshold_ipu {
            self.debounce += 1;
            if self.debounce > DETECT_CYCLES {
                self.full = true;
                self.debounce = 0;
                self.retest_due_ms = now_ms.saturating_add(RETEST_INTERVAL_MS);
                tracing::info!("tank-full latched, forcing load off");
                return TankVerdict::ForceOff;
            }
        } else {
            // No partial credit: any breaking cycle restarts the count.
            self.debounce = 0;
        }
        TankVerdict::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CREEP: i64 = 200;
    const EXPORT: i64 = 1_000;

    fn starve(t: &mut TankFullHeuristic, cycles: u32, now_ms: u64) -> Vec<TankVerdict> {
        (0..cycles)
            .map(|_| t.evaluate(true, 0, EXPORT + 1, CREEP, EXPORT, now_ms))
            .collect()
    }

    #[test]
    fn latches_exactly_after_the_detection_count() {
        let mut t = TankFullHeuristic::new();
        let verdicts = starve(&mut t, DETECT_CYCLES + 1, 0);
        assert!(verdicts[..DETECT_CYCLES as usize]
            .iter()
            .all(|v| *v == TankVerdict::Neutral));
        assert_eq!(verdicts[DETECT_CYCLES as usize], TankVerdict::ForceOff);
        assert!(t.is_full());
    }

    #[test]
    fn any_breaking_cycle_resets_the_count() {
        let mut t = TankFullHeuristic::new();
        starve(&mut t, DETECT_CYCLES, 0);
        // Export dips below the threshold for one cycle: full credit lost.
        t.evaluate(true, 0, EXPORT - 1, CREEP, EXPORT, 0);
        let verdicts = starve(&mut t, DETECT_CYCLES, 0);
        assert!(!t.is_full());
        assert!(verdicts.iter().all(|v| *v == TankVerdict::Neutral));
    }

    #[test]
    fn absorption_clears_immediately() {
        let mut t = TankFullHeuristic::new();
        starve(&mut t, DETECT_CYCLES + 1, 0);
        assert!(t.is_full());
        let v = t.evaluate(true, CREEP + 1, EXPORT + 1, CREEP, EXPORT, 0);
        assert_eq!(v, TankVerdict::Neutral);
        assert!(!t.is_full());
    }

    #[test]
    fn off_cycles_cannot_clear_the_state() {
        let mut t = TankFullHeuristic::new();
        starve(&mut t, DETECT_CYCLES + 1, 0);
        // Load off, power on the divert CT is noise; must stay full.
        for _ in 0..100 {
            t.evaluate(false, CREEP + 50, EXPORT + 1, CREEP, EXPORT, 1);
        }
        assert!(t.is_full());
    }

    #[test]
    fn retest_fires_once_per_interval_and_holds_off_between() {
        let mut t = TankFullHeuristic::new();
        starve(&mut t, DETECT_CYCLES + 1, 0);

        // Before the interval elapses: held off.
        for _ in 0..50 {
            assert_eq!(
                t.evaluate(false, 0, EXPORT + 1, CREEP, EXPORT, 1_000),
                TankVerdict::ForceOff
            );
        }

        // Interval elapsed: a burst of forced-on cycles, then off again.
        let now = RETEST_INTERVAL_MS + 1;
        for _ in 0..RETEST_ON_CYCLES {
            assert_eq!(
                t.evaluate(true, 0, EXPORT + 1, CREEP, EXPORT, now),
                TankVerdict::ForceOn
            );
        }
        assert_eq!(
            t.evaluate(true, 0, EXPORT + 1, CREEP, EXPORT, now + 20),
            TankVerdict::ForceOff
        );
        assert!(t.is_full());
    }
}
