//! # Slot Table
//!
//! The two-phase registration primitive behind cycle-safe graph walks.
//!
//! `reserve(type, id)` registers a slot and hands back a stable handle
//! before anything about the object has been computed. `populate(handle,
//! value)` fills it in later. A walk that reaches `(type, id)` a second time,
//! whether through a shared reference or a cycle, gets `Reservation::Existing`
//! and never visits it again, so every walk does work proportional to the
//! number of distinct `(type, id)` pairs.
//!
//! Both the marshaller (values are flat wire objects) and the unmarshaller
//! (values are rebuilt objects) use this table.

use crate::{NounId, NounwireError};
use std::collections::BTreeMap;

/// Stable handle to a reserved slot. Handles are dense and assigned in
/// reservation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotHandle(usize);

impl SlotHandle {
    /// Position of the slot in reservation order.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Outcome of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// First time this `(type, id)` was seen; the caller must populate it.
    Fresh(SlotHandle),
    /// Already reserved, possibly still being populated further up the walk.
    Existing(SlotHandle),
}

impl Reservation {
    #[must_use]
    pub fn handle(self) -> SlotHandle {
        match self {
            Self::Fresh(h) | Self::Existing(h) => h,
        }
    }

    #[must_use]
    pub fn is_fresh(self) -> bool {
        matches!(self, Self::Fresh(_))
    }
}

#[derive(Debug, Clone)]
struct Slot<T> {
    noun_type: String,
    id: NounId,
    value: Option<T>,
}

/// Reserved slots keyed by `(type, id)`.
#[derive(Debug, Clone)]
pub struct SlotTable<T> {
    index: BTreeMap<String, BTreeMap<NounId, SlotHandle>>,
    slots: Vec<Slot<T>>,
}

impl<T> Default for SlotTable<T> {
    fn default() -> Self {
        Self {
            index: BTreeMap::new(),
            slots: Vec::new(),
        }
    }
}

impl<T> SlotTable<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `(noun_type, id)` if it is new.
    pub fn reserve(&mut self, noun_type: &str, id: &NounId) -> Reservation {
        if let Some(handle) = self.lookup(noun_type, id) {
            return Reservation::Existing(handle);
        }

        let handle = SlotHandle(self.slots.len());
        self.slots.push(Slot {
            noun_type: noun_type.to_string(),
            id: id.clone(),
            value: None,
        });
        self.index
            .entry(noun_type.to_string())
            .or_default()
            .insert(id.clone(), handle);
        Reservation::Fresh(handle)
    }

    #[must_use]
    pub fn lookup(&self, noun_type: &str, id: &NounId) -> Option<SlotHandle> {
        self.index.get(noun_type).and_then(|ids| ids.get(id)).copied()
    }

    /// Fill a reserved slot. Each slot is populated exactly once.
    pub fn populate(&mut self, handle: SlotHandle, value: T) -> Result<(), NounwireError> {
        let slot = self.slots.get_mut(handle.0).ok_or_else(|| {
            NounwireError::SlotConflict(format!("handle {} was never reserved", handle.0))
        })?;
        if slot.value.is_some() {
            return Err(NounwireError::SlotConflict(format!(
                "{}#{} populated twice",
                slot.noun_type, slot.id
            )));
        }
        slot.value = Some(value);
        Ok(())
    }

    /// The populated value, if any.
    #[must_use]
    pub fn get(&self, handle: SlotHandle) -> Option<&T> {
        self.slots.get(handle.0).and_then(|s| s.value.as_ref())
    }

    /// Whether the slot has been populated.
    #[must_use]
    pub fn is_populated(&self, handle: SlotHandle) -> bool {
        self.get(handle).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Consume the table, yielding `(type, id, value)` in reservation order.
    /// Fails if any reserved slot was never populated.
    pub fn into_entries(self) -> Result<Vec<(String, NounId, T)>, NounwireError> {
        self.slots
            .into_iter()
            .map(|slot| match slot.value {
                Some(value) => Ok((slot.noun_type, slot.id, value)),
                None => Err(NounwireError::SlotConflict(format!(
                    "{}#{} reserved but never populated",
                    slot.noun_type, slot.id
                ))),
            })
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
