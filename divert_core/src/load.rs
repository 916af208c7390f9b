//! Final load decision and diverted-energy totalizing.
//!
//! The decision merges, in strict priority order: the force-on override, the
//! disable override, the tank-full verdict, and finally the energy-bucket
//! proposal. It is applied to the output once per cycle; everything that
//! judges "what the load did" looks at the decision one cycle behind, after
//! that cycle's energy has been fully measured.

use crate::tank::TankVerdict;

/// The authoritative two-valued output state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    On,
    Off,
}

impl LoadState {
    #[inline]
    pub fn is_on(self) -> bool {
        matches!(self, LoadState::On)
    }
}

/// Operator overrides, applied at the next cycle boundary.
#[derive(Debug, Clone, Copy)]
pub struct Overrides {
    pub force_on: bool,
    pub enabled: bool,
}

/// Confirmed cycles between telemetry digests (~5 s).
pub const DIGEST_INTERVAL_CYCLES: u32 = 250;
/// OFF cycles after which the totalizer is considered stale (~3 h).
pub const STALE_HORIZON_CYCLES: u32 = 540_000;

#[derive(Debug, Default)]
pub struct LoadController {
    recent_energy_ieu: i64,
    diverted_wh: u32,
    idle_cycles: u32,
    cycles_since_digest: u32,
}

impl LoadController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge overrides, tank verdict, and bucket proposal.
    pub fn decide(overrides: Overrides, verdict: TankVerdict, proposal: LoadState) -> LoadState {
        if overrides.force_on {
            return LoadState::On;
        }
        if !overrides.enabled {
            return LoadState::Off;
        }
        match verdict {
            TankVerdict::ForceOn => LoadState::On,
            TankVerdict::ForceOff => LoadState::Off,
            TankVerdict::Neutral => proposal,
        }
    }

    /// Fold the completed cycle's diverted energy into the totalizer.
    ///
    /// Only cycles the load actually governed ON count, and only above the
    /// anti-creep limit so CT noise cannot creep the register upward. A long
    /// run of OFF cycles resets the accumulation period as stale.
    pub fn totalize(
        &mut self,
        prev_on: bool,
        divert_ipu: i64,
        anti_creep_ipu: i64,
        ieu_per_wh: i64,
    ) {
        if prev_on && divert_ipu > anti_creep_ipu {
            self.recent_energy_ieu = self.recent_energy_ieu.saturating_add(divert_ipu);
            if ieu_per_wh > 0 {
                while self.recent_energy_ieu >= ieu_per_wh {
                    self.recent_energy_ieu -= ieu_per_wh;
                    self.diverted_wh = self.diverted_wh.saturating_add(1);
                }
            }
        }

        if prev_on {
            self.idle_cycles = 0;
        } else {
            self.idle_cycles = self.idle_cycles.saturating_add(1);
            if self.idle_cycles == STALE_HORIZON_CYCLES {
                self.recent_energy_ieu = 0;
                self.diverted_wh = 0;
            }
        }
    }

    /// Advance the digest cadence; true when a digest falls due.
    pub fn tick_digest(&mut self) -> bool {
        self.cycles_since_digest += 1;
        if self.cycles_since_digest >= DIGEST_INTERVAL_CYCLES {
            self.cycles_since_digest = 0;
            true
        } else {
            false
        }
    }

    pub fn diverted_wh(&self) -> u32 {
        self.diverted_wh
    }

    pub fn recent_energy_ieu(&self) -> i64 {
        self.recent_energy_ieu
    }
}
