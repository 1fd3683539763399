//! Re-encodes edited components back into the image.
//!
//! Every call re-derives its diff by re-extracting the current data and
//! comparing payloads byte for byte; there is no dirty-flag tracking. A
//! call that finds no differences performs zero image writes. After any
//! write the whole directory table is re-serialized in one pass so no
//! entry can keep an address from an earlier relocation in the same run.

use std::collections::BTreeMap;

use log::{debug, info, warn};

use crate::codec;
use crate::directory::{ComponentKind, Directory, TableLayout, RELOCATION_ORDER};
use crate::error::{Error, Result};
use crate::extractor::Extractor;
use crate::grid::Grid;
use crate::image::Image;
use crate::objects::{ObjectTable, OBJECT_RECORD_SIZE};

/// A proposed new value for one component.
#[derive(Debug, Clone)]
pub enum ComponentData {
    Map(Grid),
    Objects(ObjectTable),
}

impl ComponentData {
    /// The canonical decompressed payload this value encodes to.
    fn payload(&self, kind: ComponentKind) -> Vec<u8> {
        match self {
            ComponentData::Map(grid) => match kind.fixed_dims() {
                Some(_) => grid.to_fixed_payload(),
                None => grid.to_payload(),
            },
            ComponentData::Objects(table) => table.to_payload(),
        }
    }
}

/// Edits for one level, keyed by component. Kinds not named are left
/// untouched; `None` asks for the absent sentinel.
#[derive(Debug, Clone, Default)]
pub struct LevelPatch {
    components: BTreeMap<ComponentKind, Option<ComponentData>>,
}

impl LevelPatch {
    pub fn new() -> Self {
        LevelPatch::default()
    }

    pub fn set(&mut self, kind: ComponentKind, data: Option<ComponentData>) {
        self.components.insert(kind, data);
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ComponentKind, &Option<ComponentData>)> {
        self.components.iter()
    }
}

pub struct Patcher<'a> {
    image: &'a mut Image,
    directory: &'a mut Directory,
}

impl<'a> Patcher<'a> {
    pub fn new(image: &'a mut Image, directory: &'a mut Directory) -> Self {
        Patcher { image, directory }
    }

    /// Apply `patch` to `level`. Returns whether anything differed.
    ///
    /// `relocate` opts the base layout into appending; the extended layout
    /// always relocates. Relocation rewrites every present component of
    /// the level, changed or not, so the level stays contiguous.
    pub fn apply_level_patch(
        &mut self,
        level: usize,
        patch: &LevelPatch,
        relocate: bool,
    ) -> Result<bool> {
        let relocate = relocate || !self.directory.layout().supports_in_place();

        // Diff phase: re-extract and compare canonical payloads. An empty
        // payload counts as absent on both sides so a pointer to a bare
        // terminator and a missing pointer compare equal.
        let mut changed: BTreeMap<ComponentKind, Option<Vec<u8>>> = BTreeMap::new();
        {
            let extractor = Extractor::new(self.image, self.directory);
            for (&kind, data) in patch.iter() {
                if !self.directory.layout().has_component(kind) {
                    return Err(Error::ComponentNotInLayout {
                        layout: self.directory.layout().name(),
                        kind,
                    });
                }

                let current = extractor
                    .extract_component(level, kind)?
                    .map(|slice| slice.payload)
                    .filter(|payload| !payload.is_empty());
                let proposed = data
                    .as_ref()
                    .map(|d| d.payload(kind))
                    .filter(|payload| !payload.is_empty());

                if current != proposed {
                    changed.insert(kind, proposed);
                }
            }
        }

        if changed.is_empty() {
            return Ok(false);
        }

        if relocate {
            self.relocate_level(level, &changed)?;
        } else {
            let truncated = self.patch_in_place(level, &changed)?;
            if truncated > 0 {
                warn!(
                    "level {}: {} component(s) truncated to fit their slots",
                    level, truncated
                );
            }
        }

        // Full rewrite, every level, one pass.
        self.directory.write_table(self.image)?;
        info!("level {}: patched {} component(s)", level, changed.len());
        Ok(true)
    }

    /// Append every present component of the level at the end of the
    /// image in the fixed relocation order, 4-byte aligned, and repoint
    /// the entry. Unchanged components are recopied from their original
    /// spans.
    fn relocate_level(
        &mut self,
        level: usize,
        changed: &BTreeMap<ComponentKind, Option<Vec<u8>>>,
    ) -> Result<()> {
        let mut blocks: Vec<(ComponentKind, Option<Vec<u8>>)> = Vec::new();
        {
            let extractor = Extractor::new(self.image, self.directory);
            let layout = self.directory.layout();

            for kind in RELOCATION_ORDER {
                if !layout.has_component(kind) {
                    continue;
                }
                match changed.get(&kind) {
                    Some(Some(payload)) => {
                        blocks.push((kind, Some(encode_block(layout, kind, payload))));
                    }
                    Some(None) => blocks.push((kind, None)),
                    None => match extractor.extract_component(level, kind)? {
                        Some(slice) => {
                            let raw = self.image.slice(slice.offset, slice.disk_len)?;
                            blocks.push((kind, Some(raw.to_vec())));
                        }
                        None => blocks.push((kind, None)),
                    },
                }
            }
        }

        for (kind, block) in blocks {
            let addr = match block {
                Some(bytes) => {
                    self.image.align(4);
                    let offset = self.image.append(&bytes);
                    Some(self.image.offset_to_addr(offset))
                }
                None => None,
            };
            self.directory.entry_mut(level)?.set_component(kind, addr);
        }

        Ok(())
    }

    /// Rewrite changed components over their existing slots, each bounded
    /// by the next placed address. An encoding that does not fit is
    /// truncated at a token boundary and reported, not failed. Returns how
    /// many components were truncated.
    fn patch_in_place(
        &mut self,
        level: usize,
        changed: &BTreeMap<ComponentKind, Option<Vec<u8>>>,
    ) -> Result<usize> {
        let mut truncated = 0;
        let placed = self.directory.placed_addresses();
        // Bound every slot by the image end as it was before this call so
        // an in-place write can never reach a block appended below.
        let original_end = self.image.len();

        for (&kind, proposed) in changed {
            let current_addr = self.directory.entry(level)?.component(kind);

            let payload = match proposed {
                Some(payload) => payload,
                None => {
                    self.directory.entry_mut(level)?.set_component(kind, None);
                    continue;
                }
            };

            let addr = match current_addr {
                Some(addr) => addr,
                None => {
                    // No slot to reuse: this one component relocates.
                    let block = encode_block(self.directory.layout(), kind, payload);
                    self.image.align(4);
                    let offset = self.image.append(&block);
                    let addr = self.image.offset_to_addr(offset);
                    self.directory.entry_mut(level)?.set_component(kind, Some(addr));
                    continue;
                }
            };

            let offset = self
                .image
                .addr_to_offset(addr)
                .ok_or(Error::BadAddress { addr })?;

            // Gap to the next placed address, or to the end of the image.
            let gap = placed
                .iter()
                .find(|&&a| a > addr)
                .map(|&a| (a - addr) as usize)
                .unwrap_or(original_end - offset);
            let budget = gap.saturating_sub(4);

            let (stream, consumed) = codec::compress_bounded(payload, budget);
            if consumed < payload.len() {
                truncated += 1;
                debug!(
                    "level {}: {} does not fit its {} byte slot, kept {} of {} payload bytes",
                    level,
                    kind,
                    gap,
                    consumed,
                    payload.len()
                );
            }

            self.image.write_u32(offset, consumed as u32)?;
            self.image.write_bytes(offset + 4, &stream)?;
        }

        Ok(truncated)
    }
}

/// Encode one component's on-disk block from its canonical payload.
fn encode_block(layout: &dyn TableLayout, kind: ComponentKind, payload: &[u8]) -> Vec<u8> {
    if !layout.compressed(kind) {
        let mut out = payload.to_vec();
        out.extend_from_slice(&[0u8; OBJECT_RECORD_SIZE]);
        return out;
    }

    let stream = codec::compress(payload);
    if layout.size_prefixed(kind) {
        let mut out = Vec::with_capacity(4 + stream.len());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&stream);
        out
    } else {
        stream
    }
}
