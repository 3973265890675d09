//! Buffer arena: one flat `f32` workspace carved into named, fixed regions.
//!
//! The plan builder sizes every buffer once (the largest map it will ever
//! hold) and packs them back to back into an [`ArenaLayout`]. At run time an
//! [`Arena`] wraps the caller's workspace and hands each stage disjoint
//! mutable views of the regions it touches. Nothing is allocated per run.

use alloc::string::String;
use alloc::vec::Vec;
use core::ops::Range;

use crate::error::{CnnError, CnnResult};

/// Handle to one buffer of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub(crate) usize);

impl BufferId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Placement of one buffer inside the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferSlot {
    pub name: String,
    pub offset: usize,
    pub capacity: usize,
}

/// Offsets and capacities of every buffer of a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArenaLayout {
    slots: Vec<BufferSlot>,
    total: usize,
}

impl ArenaLayout {
    /// Packs `(name, capacity)` pairs contiguously, in order.
    pub fn pack(buffers: impl IntoIterator<Item = (String, usize)>) -> Self {
        let mut total = 0;
        let slots = buffers
            .into_iter()
            .map(|(name, capacity)| {
                let slot = BufferSlot {
                    name,
                    offset: total,
                    capacity,
                };
                total += capacity;
                slot
            })
            .collect();
        Self { slots, total }
    }

    pub fn slot(&self, id: BufferId) -> &BufferSlot {
        &self.slots[id.0]
    }

    pub fn slots(&self) -> &[BufferSlot] {
        &self.slots
    }

    /// Floats the workspace must hold.
    pub fn total_len(&self) -> usize {
        self.total
    }

    /// Workspace range for the first `len` floats of `id`.
    fn range(&self, id: BufferId, len: usize) -> CnnResult<Range<usize>> {
        let slot = self.slots.get(id.0).ok_or_else(|| CnnError::BufferCapacityExceeded {
            stage: "arena".into(),
            buffer: "<unknown>".into(),
            required: len,
            available: 0,
        })?;
        if len > slot.capacity {
            return Err(CnnError::BufferCapacityExceeded {
                stage: "arena".into(),
                buffer: slot.name.clone(),
                required: len,
                available: slot.capacity,
            });
        }
        Ok(slot.offset..slot.offset + len)
    }
}

/// A workspace bound to a layout for the duration of one run.
pub struct Arena<'a> {
    buf: &'a mut [f32],
    layout: &'a ArenaLayout,
}

impl<'a> Arena<'a> {
    /// Fails if `buf` is shorter than the layout.
    pub fn new(buf: &'a mut [f32], layout: &'a ArenaLayout) -> CnnResult<Self> {
        if buf.len() < layout.total_len() {
            return Err(CnnError::BufferCapacityExceeded {
                stage: "workspace".into(),
                buffer: "workspace".into(),
                required: layout.total_len(),
                available: buf.len(),
            });
        }
        Ok(Self { buf, layout })
    }

    /// Mutable views of the first `len` floats of each requested buffer.
    /// `None` requests yield empty slices. Two requests for the same buffer
    /// are rejected.
    pub fn regions<const N: usize>(
        &mut self,
        requests: [Option<(BufferId, usize)>; N],
    ) -> CnnResult<[&mut [f32]; N]> {
        let mut ranges: [Range<usize>; N] = core::array::from_fn(|_| 0..0);
        for (range, request) in ranges.iter_mut().zip(requests.iter()) {
            if let Some((id, len)) = *request {
                *range = self.layout.range(id, len)?;
            }
        }

        carve(&mut *self.buf, ranges).ok_or_else(|| CnnError::BufferAliasing {
            stage: "arena".into(),
            buffer: requests
                .iter()
                .flatten()
                .map(|(id, _)| self.layout.slot(*id).name.clone())
                .next()
                .unwrap_or_default(),
        })
    }
}

/// Splits `buf` into the given ranges, returned in request order. Empty
/// ranges become empty slices; overlapping ones make the whole call fail.
fn carve<const N: usize>(buf: &mut [f32], ranges: [Range<usize>; N]) -> Option<[&mut [f32]; N]> {
    let mut order: [usize; N] = core::array::from_fn(|i| i);
    order.sort_unstable_by_key(|&i| ranges[i].start);

    let mut parts: [&mut [f32]; N] = core::array::from_fn(|_| <&mut [f32]>::default());
    let mut rest = buf;
    let mut consumed = 0;

    for i in order {
        let range = ranges[i].clone();
        if range.is_empty() {
            continue;
        }
        if range.start < consumed || range.end - consumed > rest.len() {
            return None;
        }
        let (_, tail) = core::mem::take(&mut rest).split_at_mut(range.start - consumed);
        let (region, tail) = tail.split_at_mut(range.len());
        parts[i] = region;
        rest = tail;
        consumed = range.end;
    }

    Some(parts)
}
