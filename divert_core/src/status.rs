//! Periodic status digest consumed by the external brain.

/// One fixed-field status record. The compact positional rendering is the
/// canonical machine interface; the labeled form is for humans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusDigest {
    pub enabled: bool,
    pub force_on: bool,
    pub tank_full: bool,
    /// Site exported at least once during the digest interval.
    pub was_exporting: bool,
    /// Load was commanded on at least once during the digest interval.
    pub was_load_on: bool,
    /// Cumulative diverted energy, whole watt-hours.
    pub diverted_wh: u32,
}

impl StatusDigest {
    /// Canonical positional form: six comma-separated fields, booleans as 0/1.
    pub fn render_compact(&self) -> String {
        format!(
            "{},{},{},{},{},{}",
            u8::from(self.enabled),
            u8::from(self.force_on),
            u8::from(self.tank_full),
            u8::from(self.was_exporting),
            u8::from(self.was_load_on),
            self.diverted_wh,
        )
    }

    pub fn render_labeled(&self) -> String {
        format!(
            "enabled={} force_on={} tank_full={} was_exporting={} was_load_on={} diverted_wh={}",
            self.enabled,
            self.force_on,
            self.tank_full,
            self.was_exporting,
            self.was_load_on,
            self.diverted_wh,
        )
    }

    pub fn render(&self, verbose: bool) -> String {
        if verbose {
            self.render_labeled()
        } else {
            self.render_compact()
        }
    }
}
