//! Slot write descriptions passed to Add/Update/Insert

use crate::stream::SlotTraits;

/// Where a write's key goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPlacement {
    /// Prefix of the slot's own record bytes
    Inline,
    /// Handed to metadata providers only (e.g. a key store)
    SideChannel,
}

/// Value, optional key and optional checksum for one slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotWrite {
    pub(crate) value: Option<Vec<u8>>,
    pub(crate) key: Option<(Vec<u8>, KeyPlacement)>,
    pub(crate) checksum: Option<i32>,
}

impl SlotWrite {
    /// Write a present value
    pub fn value(bytes: Vec<u8>) -> Self {
        Self {
            value: Some(bytes),
            key: None,
            checksum: None,
        }
    }

    /// Write an absent (null) item
    pub fn null() -> Self {
        Self {
            value: None,
            key: None,
            checksum: None,
        }
    }

    pub fn with_inline_key(mut self, key: Vec<u8>) -> Self {
        self.key = Some((key, KeyPlacement::Inline));
        self
    }

    pub fn with_side_key(mut self, key: Vec<u8>) -> Self {
        self.key = Some((key, KeyPlacement::SideChannel));
        self
    }

    pub fn with_checksum(mut self, checksum: i32) -> Self {
        self.checksum = Some(checksum);
        self
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    pub(crate) fn traits(&self) -> SlotTraits {
        let mut traits = SlotTraits::USED;
        if self.value.is_none() {
            traits.insert(SlotTraits::NULL);
        }
        if self.checksum.is_some() {
            traits.insert(SlotTraits::CHECKSUMMED);
        }
        if self.has_inline_key() {
            traits.insert(SlotTraits::KEYED);
        }
        traits
    }

    pub(crate) fn has_inline_key(&self) -> bool {
        matches!(self.key, Some((_, KeyPlacement::Inline)))
    }

    /// Bytes stored before the value in the record
    pub(crate) fn inline_key(&self) -> &[u8] {
        match &self.key {
            Some((key, KeyPlacement::Inline)) => key.as_slice(),
            _ => &[],
        }
    }

    /// Key passed to providers, wherever it is stored
    pub(crate) fn event_key(&self) -> Option<&[u8]> {
        self.key.as_ref().map(|(key, _)| key.as_slice())
    }

    pub(crate) fn value_bytes(&self) -> &[u8] {
        self.value.as_deref().unwrap_or_default()
    }
}
