//! State exchanged across the priority boundary.
//!
//! The control pipeline runs on the acquisition thread (the "interrupt"
//! side); the command console, digest emitter, and watchdog servicing run on
//! the low-priority side. Every field crossing that boundary is either a
//! single atomic word (Relaxed is sufficient: each word is independent and
//! no ordering between them is relied on) or lives inside the settings
//! mutex, whose short critical section stands in for the original
//! interrupts-disabled exchange of the multi-field structure.

use crate::status::StatusDigest;
use divert_config::Settings;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};

pub struct SharedControls {
    // Low -> high: operator intent, applied at the next cycle boundary.
    enabled: AtomicBool,
    force_on: AtomicBool,
    anti_flicker: AtomicBool,

    // High -> low: telemetry. The interval flags latch true and are cleared
    // only when the digest is actually taken.
    digest_pending: AtomicBool,
    was_exporting: AtomicBool,
    was_load_on: AtomicBool,
    tank_full: AtomicBool,
    load_on: AtomicBool,
    diverted_wh: AtomicU32,
    grid_power_ipu: AtomicI64,
    divert_power_ipu: AtomicI64,

    /// Confirmed mains cycles processed; the low side watches this for
    /// forward progress before feeding the watchdog.
    cycle_count: AtomicU64,

    // Low -> high: validated settings, revision-stamped so the pipeline can
    // notice a change with one atomic load per cycle.
    settings: Mutex<Settings>,
    settings_rev: AtomicU64,
}

impl SharedControls {
    pub fn new(settings: Settings) -> Self {
        Self {
            enabled: AtomicBool::new(true),
            force_on: AtomicBool::new(false),
            anti_flicker: AtomicBool::new(false),
            digest_pending: AtomicBool::new(false),
            was_exporting: AtomicBool::new(false),
            was_load_on: AtomicBool::new(false),
            tank_full: AtomicBool::new(false),
            load_on: AtomicBool::new(false),
            diverted_wh: AtomicU32::new(0),
            grid_power_ipu: AtomicI64::new(0),
            divert_power_ipu: AtomicI64::new(0),
            cycle_count: AtomicU64::new(0),
            settings: Mutex::new(settings),
            settings_rev: AtomicU64::new(1),
        }
    }

    // --- operator intent ---

    pub fn set_enabled(&self, on: bool) {
        self.enabled.store(on, Ordering::Relaxed);
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_force_on(&self, on: bool) {
        self.force_on.store(on, Ordering::Relaxed);
    }

    pub fn force_on(&self) -> bool {
        self.force_on.load(Ordering::Relaxed)
    }

    pub fn set_anti_flicker(&self, on: bool) {
        self.anti_flicker.store(on, Ordering::Relaxed);
    }

    pub fn anti_flicker(&self) -> bool {
        self.anti_flicker.load(Ordering::Relaxed)
    }

    // --- settings exchange ---

    /// Replace the settings and bump the revision. Called from the low side
    /// only; the pipeline picks the change up at its next cycle boundary.
    pub fn update_settings(&self, settings: Settings) {
        if let Ok(mut guard) = self.settings.lock() {
            *guard = settings;
        }
        self.settings_rev.fetch_add(1, Ordering::Relaxed);
    }

    pub fn settings_snapshot(&self) -> Settings {
        self.settings
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }

    pub fn settings_rev(&self) -> u64 {
        self.settings_rev.load(Ordering::Relaxed)
    }

    /// Cheap per-cycle check: clone the settings only when the revision has
    /// moved past `seen_rev`, updating it.
    pub fn settings_if_changed(&self, seen_rev: &mut u64) -> Option<Settings> {
        let rev = self.settings_rev.load(Ordering::Relaxed);
        if rev == *seen_rev {
            return None;
        }
        *seen_rev = rev;
        Some(self.settings_snapshot())
    }

    // --- telemetry published by the pipeline ---

    pub fn publish_cycle(
        &self,
        load_on: bool,
        tank_full: bool,
        grid_ipu: i64,
        divert_ipu: i64,
        diverted_wh: u32,
    ) {
        self.load_on.store(load_on, Ordering::Relaxed);
        self.tank_full.store(tank_full, Ordering::Relaxed);
        self.grid_power_ipu.store(grid_ipu, Ordering::Relaxed);
        self.divert_power_ipu.store(divert_ipu, Ordering::Relaxed);
        self.diverted_wh.store(diverted_wh, Ordering::Relaxed);
        self.cycle_count.fetch_add(1, Ordering::Relaxed);
        if load_on {
            self.was_load_on.store(true, Ordering::Relaxed);
        }
        if grid_ipu > 0 {
            self.was_exporting.store(true, Ordering::Relaxed);
        }
    }

    pub fn raise_digest(&self) {
        self.digest_pending.store(true, Ordering::Relaxed);
    }

    pub fn digest_pending(&self) -> bool {
        self.digest_pending.load(Ordering::Relaxed)
    }

    /// Consume the pending digest: clears the pending flag and the interval
    /// latches, which is the only place they are ever cleared.
    pub fn take_digest(&self) -> StatusDigest {
        self.digest_pending.store(false, Ordering::Relaxed);
        StatusDigest {
            enabled: self.enabled.load(Ordering::Relaxed),
            force_on: self.force_on.load(Ordering::Relaxed),
            tank_full: self.tank_full.load(Ordering::Relaxed),
            was_exporting: self.was_exporting.swap(false, Ordering::Relaxed),
            was_load_on: self.was_load_on.swap(false, Ordering::Relaxed),
            diverted_wh: self.diverted_wh.load(Ordering::Relaxed),
        }
    }

    pub fn tank_full(&self) -> bool {
        self.tank_full.load(Ordering::Relaxed)
    }

    pub fn load_on(&self) -> bool {
        self.load_on.load(Ordering::Relaxed)
    }

    pub fn diverted_wh(&self) -> u32 {
        self.diverted_wh.load(Ordering::Relaxed)
    }

    pub fn grid_power_ipu(&self) -> i64 {
        self.grid_power_ipu.load(Ordering::Relaxed)
    }

    pub fn divert_power_ipu(&self) -> i64 {
        self.divert_power_ipu.load(Ordering::Relaxed)
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count.load(Ordering::Relaxed)
    }
}
