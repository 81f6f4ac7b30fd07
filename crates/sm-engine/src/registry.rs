//! Channel routing table.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU32, Ordering};

use slotmap::SlotMap;
use sm_ir::{BitsPerSample, SourceKey};

use crate::source::SampleSource;
use crate::MixError;

static NEXT_REGISTRY_ID: AtomicU32 = AtomicU32::new(1);

/// Identity of a registry, used to detect sources owned elsewhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegistryId(u32);

impl RegistryId {
    fn next() -> Self {
        Self(NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Mapping of 1-based output channel to the source routed there.
///
/// Entries are only added through [`validate_and_register`], which keeps
/// channel numbers unique and the table within the driver's capacity.
///
/// [`validate_and_register`]: TrackRegistry::validate_and_register
#[derive(Debug)]
pub struct TrackRegistry {
    id: RegistryId,
    slots: BTreeMap<u16, SourceKey>,
    sample_rate: u32,
    bits: BitsPerSample,
    /// Channels the driver accepts
    capacity: u16,
}

impl TrackRegistry {
    pub fn new(sample_rate: u32, bits: BitsPerSample, capacity: u16) -> Self {
        Self {
            id: RegistryId::next(),
            slots: BTreeMap::new(),
            sample_rate,
            bits,
            capacity,
        }
    }

    pub fn id(&self) -> RegistryId {
        self.id
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bits(&self) -> BitsPerSample {
        self.bits
    }

    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    pub fn set_capacity(&mut self, capacity: u16) {
        self.capacity = capacity;
    }

    /// Validate `source` and route it to its channel.
    ///
    /// Rejections are logged and leave the table untouched. Re-registering a
    /// source that moved to a new channel moves its slot.
    pub fn validate_and_register(&mut self, key: SourceKey, source: &mut SampleSource) -> bool {
        let path = source.path().display().to_string();

        if source.path().as_os_str().is_empty() {
            log::error!("source {:?} has no audio file path; ignored", key);
            return false;
        }
        let channel = source.channel();
        let Some(slot) = u16::try_from(channel).ok().filter(|&c| c > 0) else {
            log::error!("source {} targets invalid output channel {}; ignored", path, channel);
            return false;
        };
        if source.registry().is_some_and(|owner| owner != self.id) {
            log::error!("source {} is already owned by another registry; ignored", path);
            return false;
        }
        if let Some(&other) = self.slots.get(&slot) {
            if other != key {
                log::error!(
                    "output channel {} of source {} is already used by another source; ignored",
                    slot,
                    path
                );
                return false;
            }
        }
        let previous = self.channel_of(key);
        if previous.is_none() && self.slots.len() >= self.capacity as usize {
            log::error!(
                "source {} would exceed the driver's {} channels; ignored",
                path,
                self.capacity
            );
            return false;
        }

        if let Some(old) = previous {
            self.slots.remove(&old);
        }
        self.slots.insert(slot, key);
        source.set_registry(Some(self.id));
        log::info!("routed {} to output channel {}", path, slot);
        true
    }

    /// Remove `key` from the table. Returns whether an entry was removed.
    pub fn unregister(&mut self, key: SourceKey, source: &mut SampleSource) -> bool {
        let removed = match self.channel_of(key) {
            Some(slot) => self.slots.remove(&slot).is_some(),
            None => false,
        };
        if source.registry() == Some(self.id) {
            source.set_registry(None);
        }
        removed
    }

    /// Width of the multiplexed stream: the highest assigned channel, or 0.
    pub fn channel_count(&self) -> u16 {
        self.slots.keys().next_back().copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Source routed to 1-based `channel`.
    pub fn get(&self, channel: u16) -> Option<SourceKey> {
        self.slots.get(&channel).copied()
    }

    pub fn channel_of(&self, key: SourceKey) -> Option<u16> {
        self.slots
            .iter()
            .find(|(_, &k)| k == key)
            .map(|(&ch, _)| ch)
    }

    pub fn contains(&self, key: SourceKey) -> bool {
        self.channel_of(key).is_some()
    }

    /// Entries in ascending channel order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, SourceKey)> + '_ {
        self.slots.iter().map(|(&ch, &k)| (ch, k))
    }

    /// Check the table against the sources before a mix is built.
    pub fn check_invariants(
        &self,
        sources: &SlotMap<SourceKey, SampleSource>,
    ) -> Result<(), MixError> {
        if self.slots.len() > self.capacity as usize {
            return Err(MixError::CapacityExceeded {
                registered: self.slots.len(),
                capacity: self.capacity,
            });
        }

        let mut seen = BTreeSet::new();
        for (&slot, &key) in &self.slots {
            let source = sources
                .get(key)
                .ok_or(MixError::MissingSource { channel: slot })?;
            if !seen.insert(source.channel()) {
                return Err(MixError::DuplicateChannel {
                    channel: source.channel().clamp(0, u16::MAX as i32) as u16,
                });
            }
        }
        for (&slot, &key) in &self.slots {
            let source_channel = sources[key].channel();
            if source_channel != slot as i32 {
                return Err(MixError::ChannelMismatch {
                    slot,
                    source_channel,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (TrackRegistry, SlotMap<SourceKey, SampleSource>) {
        (TrackRegistry::new(48000, BitsPerSample::Bits32, 8), SlotMap::with_key())
    }

    #[test]
    fn registers_valid_source() {
        let (mut reg, mut sources) = setup();
        let key = sources.insert(SampleSource::new("a.wav", 2));
        assert!(reg.validate_and_register(key, &mut sources[key]));
        assert_eq!(reg.get(2), Some(key));
        assert_eq!(sources[key].registry(), Some(reg.id()));
    }

    #[test]
    fn rejects_empty_path_and_bad_channel() {
        let (mut reg, mut sources) = setup();
        let no_path = sources.insert(SampleSource::new("", 1));
        let zero = sources.insert(SampleSource::new("a.wav", 0));
        let negative = sources.insert(SampleSource::new("b.wav", -3));
        assert!(!reg.validate_and_register(no_path, &mut sources[no_path]));
        assert!(!reg.validate_and_register(zero, &mut sources[zero]));
        assert!(!reg.validate_and_register(negative, &mut sources[negative]));
        assert!(reg.is_empty());
        assert_eq!(sources[zero].registry(), None);
    }

    #[test]
    fn second_source_on_same_channel_rejected() {
        let (mut reg, mut sources) = setup();
        let first = sources.insert(SampleSource::new("a.wav", 3));
        let second = sources.insert(SampleSource::new("b.wav", 3));
        assert!(reg.validate_and_register(first, &mut sources[first]));
        assert!(!reg.validate_and_register(second, &mut sources[second]));
        assert_eq!(reg.get(3), Some(first));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn source_owned_elsewhere_rejected() {
        let (mut reg, mut sources) = setup();
        let mut other = TrackRegistry::new(48000, BitsPerSample::Bits32, 8);
        let key = sources.insert(SampleSource::new("a.wav", 1));
        assert!(other.validate_and_register(key, &mut sources[key]));
        assert!(!reg.validate_and_register(key, &mut sources[key]));
    }

    #[test]
    fn reregistering_moves_slot() {
        let (mut reg, mut sources) = setup();
        let key = sources.insert(SampleSource::new("a.wav", 2));
        assert!(reg.validate_and_register(key, &mut sources[key]));
        assert!(reg.validate_and_register(key, &mut sources[key]));
        sources[key].set_channel(5);
        assert!(reg.validate_and_register(key, &mut sources[key]));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get(2), None);
        assert_eq!(reg.get(5), Some(key));
    }

    #[test]
    fn capacity_limits_registration() {
        let mut reg = TrackRegistry::new(48000, BitsPerSample::Bits32, 1);
        let mut sources = SlotMap::with_key();
        let a = sources.insert(SampleSource::new("a.wav", 1));
        let b = sources.insert(SampleSource::new("b.wav", 2));
        assert!(reg.validate_and_register(a, &mut sources[a]));
        assert!(!reg.validate_and_register(b, &mut sources[b]));
    }

    #[test]
    fn channel_count_is_max_channel_regardless_of_order() {
        let (mut reg, mut sources) = setup();
        assert_eq!(reg.channel_count(), 0);
        for ch in [5, 1, 3] {
            let key = sources.insert(SampleSource::new("a.wav", ch));
            assert!(reg.validate_and_register(key, &mut sources[key]));
        }
        assert_eq!(reg.channel_count(), 5);
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn unregister_reports_removal() {
        let (mut reg, mut sources) = setup();
        let key = sources.insert(SampleSource::new("a.wav", 4));
        assert!(!reg.unregister(key, &mut sources[key]));
        assert!(reg.validate_and_register(key, &mut sources[key]));
        assert!(reg.unregister(key, &mut sources[key]));
        assert_eq!(sources[key].registry(), None);
        assert_eq!(reg.channel_count(), 0);
    }

    #[test]
    fn invariants_catch_capacity_shrink_and_moved_channels() {
        let (mut reg, mut sources) = setup();
        let a = sources.insert(SampleSource::new("a.wav", 1));
        let b = sources.insert(SampleSource::new("b.wav", 2));
        assert!(reg.validate_and_register(a, &mut sources[a]));
        assert!(reg.validate_and_register(b, &mut sources[b]));
        assert_eq!(reg.check_invariants(&sources), Ok(()));

        sources[b].set_channel(7);
        assert_eq!(
            reg.check_invariants(&sources),
            Err(MixError::ChannelMismatch { slot: 2, source_channel: 7 })
        );

        sources[b].set_channel(1);
        assert_eq!(
            reg.check_invariants(&sources),
            Err(MixError::DuplicateChannel { channel: 1 })
        );

        sources[b].set_channel(2);
        reg.set_capacity(1);
        assert_eq!(
            reg.check_invariants(&sources),
            Err(MixError::CapacityExceeded { registered: 2, capacity: 1 })
        );
    }
}
