//! Color-Encoded Picking
//!
//! During a pick pass every node pushes its id onto the [`PickNameStack`].
//! Drawables snapshot the stack with [`PickNameStack::store`] and draw in a
//! color that packs the snapshot index together with an optional part id:
//!
//! ```text
//!  31          20 19                    0
//! +--------------+-----------------------+
//! | 0xFFF - base |        part id        |
//! +--------------+-----------------------+
//! ```
//!
//! The packed `u32` is written as RGBA bytes in little-endian order (red holds
//! the low byte). A cleared background (all zero) decodes to "nothing", since
//! base `0xFFF` is reserved. After the pass the caller reads the pixel under
//! the cursor and recovers the stored stack with [`decode_pick_color`] and
//! [`PickNameStack::load`].

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::node::NodeId;

/// Bits reserved for the part id.
pub const PART_ID_BITS: u32 = 20;
/// Largest encodable part id.
pub const MAX_PART_ID: u32 = (1 << PART_ID_BITS) - 1;
const BASE_MASK: u32 = 0xFFF;
/// Number of stack snapshots addressable by the 12 base bits.
pub const MAX_STORED_STACKS: usize = BASE_MASK as usize;

/// Packs a stored-stack index and a part id into a pick color value.
#[inline]
#[must_use]
pub fn encode_pick_color(base: u32, part_id: u32) -> u32 {
    ((BASE_MASK - (base & BASE_MASK)) << PART_ID_BITS) | (part_id & MAX_PART_ID)
}

/// Reverses [`encode_pick_color`]; `None` means no pickable object.
#[inline]
#[must_use]
pub fn decode_pick_color(color: u32) -> Option<(u32, u32)> {
    let base = BASE_MASK - ((color >> PART_ID_BITS) & BASE_MASK);
    (base != BASE_MASK).then_some((base, color & MAX_PART_ID))
}

#[inline]
#[must_use]
pub fn color_to_rgba(color: u32) -> [u8; 4] {
    color.to_le_bytes()
}

#[inline]
#[must_use]
pub fn rgba_to_color(rgba: [u8; 4]) -> u32 {
    u32::from_le_bytes(rgba)
}

/// Path of node ids currently being traversed in a pick pass.
#[derive(Debug, Clone)]
pub struct PickNameStack {
    names: SmallVec<[NodeId; 32]>,
    depth: usize,
    max_len: usize,
    stored: Vec<SmallVec<[NodeId; 8]>>,
    store_count: usize,
    max_stored: usize,
}

impl Default for PickNameStack {
    fn default() -> Self {
        Self::new(32, MAX_STORED_STACKS)
    }
}

impl PickNameStack {
    #[must_use]
    pub fn new(max_len: usize, max_stored: usize) -> Self {
        Self {
            names: SmallVec::new(),
            depth: 0,
            max_len,
            stored: Vec::new(),
            store_count: 0,
            max_stored: max_stored.min(MAX_STORED_STACKS),
        }
    }

    /// Starts a new pick pass.
    pub fn reset(&mut self) {
        self.names.clear();
        self.depth = 0;
        self.stored.clear();
        self.store_count = 0;
    }

    /// Pushes a name. Past the maximum length the name is dropped but still
    /// counted, so pushes and pops stay balanced.
    pub fn push(&mut self, name: NodeId) {
        if self.depth < self.max_len {
            self.names.truncate(self.depth);
            self.names.push(name);
        }
        self.depth += 1;
    }

    pub fn pop(&mut self) {
        if self.depth > 0 {
            self.depth -= 1;
            if self.depth < self.names.len() {
                self.names.truncate(self.depth);
            }
        }
    }

    /// Number of pushes not yet popped.
    #[inline]
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Recorded names, outermost first.
    #[must_use]
    pub fn names(&self) -> &[NodeId] {
        &self.names
    }

    /// Snapshots the current stack and returns its index. The index advances
    /// even when the list is full, so overflow can be detected.
    pub fn store(&mut self) -> u32 {
        if self.store_count < self.max_stored {
            self.stored.push(SmallVec::from_slice(&self.names));
        }
        self.store_count += 1;
        (self.store_count - 1) as u32
    }

    /// Pick color of the current stack for `part_id`.
    pub fn color(&mut self, part_id: u32) -> u32 {
        let base = self.store();
        encode_pick_color(base, part_id)
    }

    /// Stack stored at `index`.
    #[must_use]
    pub fn load(&self, index: u32) -> Option<&[NodeId]> {
        self.stored.get(index as usize).map(SmallVec::as_slice)
    }

    /// Number of snapshots requested this pass, including dropped ones.
    #[must_use]
    pub fn store_count(&self) -> usize {
        self.store_count
    }

    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.store_count > self.max_stored
    }
}

/// Decoded result of a pick read-back.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PickHit {
    /// Node ids from the root to the drawn object.
    pub path: Vec<NodeId>,
    pub part_id: u32,
}

impl PickHit {
    /// The innermost node that drew the pixel.
    #[must_use]
    pub fn node(&self) -> Option<NodeId> {
        self.path.last().copied()
    }
}

/// The current pick selection as seen by draw passes.
///
/// Each selected id carries a draw flag recording whether a single-shot pick
/// scene was already drawn for it in the current pass.
#[derive(Debug, Clone, Default)]
pub struct PickSelection {
    ids: Vec<NodeId>,
    drawn: Vec<bool>,
    part_id: u32,
}

impl PickSelection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, hit: &PickHit) {
        self.ids.clone_from(&hit.path);
        self.drawn = vec![false; self.ids.len()];
        self.part_id = hit.part_id;
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.drawn.clear();
        self.part_id = 0;
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn ids(&self) -> &[NodeId] {
        &self.ids
    }

    #[must_use]
    pub fn part_id(&self) -> u32 {
        self.part_id
    }

    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.ids.contains(&id)
    }

    /// First selected id found in `map`, with its draw flag.
    #[must_use]
    pub fn find(&self, map: &FxHashSet<NodeId>) -> Option<bool> {
        self.ids
            .iter()
            .position(|id| map.contains(id))
            .map(|i| self.drawn[i])
    }

    /// Marks the first selected id found in `map` as drawn.
    pub fn flag_drawn(&mut self, map: &FxHashSet<NodeId>) {
        if let Some(i) = self.ids.iter().position(|id| map.contains(id)) {
            self.drawn[i] = true;
        }
    }

    /// Called at the start of every render pass.
    pub fn reset_draw_flags(&mut self) {
        self.drawn.fill(false);
    }
}
