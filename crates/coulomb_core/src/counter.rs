//! Monotonic event counter with load/last/unplugged baselines.

use crate::types::StatsKind;

/// Counts discrete events and answers all four [`StatsKind`] views.
///
/// `plugged` is scratch state: it captures the count at the last plug so
/// that the next unplug can rebase to it, discarding steps that happened
/// while on external power. Only on-battery events are meaningful to the
/// consumers of these stats.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counter {
    pub(crate) count: u32,
    pub(crate) loaded: u32,
    pub(crate) last: u32,
    pub(crate) unplugged: u32,
    pub(crate) plugged: u32,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&mut self) {
        self.count += 1;
    }

    /// Batched variant for externally sampled counts (CPU speed bins).
    pub fn add(&mut self, n: u32) {
        self.count = self.count.saturating_add(n);
    }

    pub fn count_for(&self, kind: StatsKind) -> u32 {
        match kind {
            StatsKind::Last => self.last,
            StatsKind::Total => self.count,
            StatsKind::Unplugged => self.count.saturating_sub(self.unplugged),
            StatsKind::Current => self.count.saturating_sub(self.loaded),
        }
    }

    pub fn unplug(&mut self) {
        self.count = self.plugged;
        self.unplugged = self.plugged;
    }

    pub fn plug(&mut self) {
        self.plugged = self.count;
    }

    pub(crate) fn write_summary(&self, w: &mut crate::codec::ByteWriter) {
        w.write_u32(self.count);
        w.write_u32(self.count - self.loaded);
    }

    pub(crate) fn read_summary(&mut self, r: &mut crate::codec::ByteReader<'_>) -> Result<(), crate::error::CodecError> {
        self.count = r.read_u32()?;
        self.loaded = self.count;
        self.last = r.read_u32()?;
        self.unplugged = self.count;
        self.plugged = self.count;
        Ok(())
    }

    pub(crate) fn write_full(&self, w: &mut crate::codec::ByteWriter) {
        w.write_u32(self.count);
        w.write_u32(self.loaded);
        w.write_u32(self.last);
        w.write_u32(self.unplugged);
    }

    pub(crate) fn read_full(r: &mut crate::codec::ByteReader<'_>) -> Result<Self, crate::error::CodecError> {
        let count = r.read_u32()?;
        let loaded = r.read_u32()?;
        let last = r.read_u32()?;
        let unplugged = r.read_u32()?;
        Ok(Self { count, loaded, last, unplugged, plugged: count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_mode_views() {
        let mut c = Counter::new();
        c.loaded = 10;
        c.last = 4;
        c.count = 10;
        c.unplugged = 10;
        for _ in 0..5 {
            c.step();
        }
        assert_eq!(c.count_for(StatsKind::Total), 15);
        assert_eq!(c.count_for(StatsKind::Current), 5);
        assert_eq!(c.count_for(StatsKind::Unplugged), 5);
        assert_eq!(c.count_for(StatsKind::Last), 4);
    }

    #[test]
    fn unplug_plug_round_trip_is_neutral() {
        let mut c = Counter::new();
        c.step();
        c.step();
        c.plug();
        c.unplug();
        c.plug();
        assert_eq!(c.count_for(StatsKind::Unplugged), 0);
        assert_eq!(c.count_for(StatsKind::Total), 2);
    }

    #[test]
    fn steps_while_plugged_are_rebased_away_at_unplug() {
        let mut c = Counter::new();
        c.step();
        c.plug();
        // These land while on external power and do not survive the unplug.
        c.step();
        c.step();
        c.unplug();
        assert_eq!(c.count_for(StatsKind::Total), 1);
        assert_eq!(c.count_for(StatsKind::Unplugged), 0);
    }

    #[test]
    fn summary_round_trip_maps_current_to_last() {
        let mut c = Counter::new();
        c.loaded = 3;
        c.count = 8;
        let mut w = crate::codec::ByteWriter::new();
        c.write_summary(&mut w);
        let bytes = w.into_bytes();

        let mut restored = Counter::new();
        let mut r = crate::codec::ByteReader::new(&bytes);
        restored.read_summary(&mut r).unwrap();
        assert_eq!(restored.count_for(StatsKind::Total), 8);
        assert_eq!(restored.count_for(StatsKind::Current), 0);
        assert_eq!(restored.count_for(StatsKind::Last), 5);
    }
}
