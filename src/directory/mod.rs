//! The in-image tables of per-level pointers and flags.
//!
//! Two cartridge revisions share one table shape but differ in base
//! address, record width and component set; [`TableLayout`] captures the
//! differences and [`Directory`] owns the decoded table. The table is read
//! wholesale when the image is opened, mutated only by the patcher, and
//! rewritten wholesale after every successful patch so no entry can hold a
//! stale address within a run.

pub mod base;
pub mod extended;

use std::fmt;
use std::io;

use serde::Serialize;

use crate::binary_utils::{self, RecordField};
use crate::error::{Error, Result};
use crate::image::Image;

pub use base::BaseLayout;
pub use extended::ExtendedLayout;

pub const MINIMAP_WIDTH: usize = 32;
pub const MINIMAP_HEIGHT: usize = 32;

/// One named data blob belonging to a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Physical,
    Graphical,
    Graphical2,
    Background,
    Minimap,
    Objects,
}

/// Relocated components are appended in this fixed order so a rewritten
/// level stays contiguous.
pub const RELOCATION_ORDER: [ComponentKind; 6] = [
    ComponentKind::Physical,
    ComponentKind::Graphical,
    ComponentKind::Graphical2,
    ComponentKind::Background,
    ComponentKind::Minimap,
    ComponentKind::Objects,
];

impl ComponentKind {
    pub fn short_name(self) -> &'static str {
        match self {
            ComponentKind::Physical => "physical",
            ComponentKind::Graphical => "graphical",
            ComponentKind::Graphical2 => "graphical2",
            ComponentKind::Background => "background",
            ComponentKind::Minimap => "minimap",
            ComponentKind::Objects => "objects",
        }
    }

    /// Hex column width used by this component's text form.
    pub fn pad_width(self) -> usize {
        match self {
            ComponentKind::Minimap => 2,
            _ => 4,
        }
    }

    /// Dimensions of headerless fixed-size components.
    pub fn fixed_dims(self) -> Option<(usize, usize)> {
        match self {
            ComponentKind::Minimap => Some((MINIMAP_WIDTH, MINIMAP_HEIGHT)),
            _ => None,
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// One decoded directory record. Pointers hold memory-mapped addresses;
/// `None` stands for the layout's absent sentinel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub physical: Option<u32>,
    pub graphical: Option<u32>,
    pub graphical2: Option<u32>,
    pub background: Option<u32>,
    pub minimap: Option<u32>,
    pub objects: Option<u32>,
    pub palette: Option<u32>,
    pub flags: u32,
}

impl DirectoryEntry {
    pub fn component(&self, kind: ComponentKind) -> Option<u32> {
        match kind {
            ComponentKind::Physical => self.physical,
            ComponentKind::Graphical => self.graphical,
            ComponentKind::Graphical2 => self.graphical2,
            ComponentKind::Background => self.background,
            ComponentKind::Minimap => self.minimap,
            ComponentKind::Objects => self.objects,
        }
    }

    pub fn set_component(&mut self, kind: ComponentKind, addr: Option<u32>) {
        match kind {
            ComponentKind::Physical => self.physical = addr,
            ComponentKind::Graphical => self.graphical = addr,
            ComponentKind::Graphical2 => self.graphical2 = addr,
            ComponentKind::Background => self.background = addr,
            ComponentKind::Minimap => self.minimap = addr,
            ComponentKind::Objects => self.objects = addr,
        }
    }
}

/// Table geometry and record coding for one cartridge revision.
pub trait TableLayout {
    fn name(&self) -> &'static str;

    /// Memory address of the first record.
    fn table_addr(&self) -> u32;

    fn level_count(&self) -> usize;

    fn fields(&self) -> &'static [RecordField];

    fn entry_width(&self) -> usize {
        binary_utils::record_width(self.fields())
    }

    /// Component kinds this revision stores.
    fn components(&self) -> &'static [ComponentKind];

    fn has_component(&self, kind: ComponentKind) -> bool {
        self.components().contains(&kind)
    }

    /// Whether `kind`'s on-disk block starts with a 4-byte LE
    /// uncompressed-length prefix.
    fn size_prefixed(&self, kind: ComponentKind) -> bool;

    /// Whether `kind` is stored as a codec stream at all. Object tables
    /// live as raw records so the terminator scan can run over the image.
    fn compressed(&self, kind: ComponentKind) -> bool {
        !matches!(kind, ComponentKind::Objects)
    }

    /// Whether components may be rewritten over their existing slots.
    fn supports_in_place(&self) -> bool;

    /// Whether the flags word carries the pixel-depth sub-field.
    fn has_depth_mode(&self) -> bool;

    fn decode_entry(&self, raw: &[u8]) -> io::Result<DirectoryEntry>;

    fn encode_entry(&self, entry: &DirectoryEntry) -> Vec<u8>;
}

/// The decoded level table, single source of truth for every address.
pub struct Directory {
    layout: Box<dyn TableLayout>,
    entries: Vec<DirectoryEntry>,
}

impl Directory {
    /// Read the whole table out of the image.
    pub fn read(image: &Image, layout: Box<dyn TableLayout>) -> Result<Self> {
        let table_addr = layout.table_addr();
        let offset = image
            .addr_to_offset(table_addr)
            .ok_or(Error::TableOutOfBounds { addr: table_addr })?;

        let width = layout.entry_width();
        let count = layout.level_count();
        if offset + count * width > image.len() {
            return Err(Error::TableOutOfBounds { addr: table_addr });
        }

        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let raw = image.slice(offset + i * width, width)?;
            entries.push(layout.decode_entry(raw)?);
        }

        Ok(Directory { layout, entries })
    }

    pub fn layout(&self) -> &dyn TableLayout {
        &*self.layout
    }

    pub fn level_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, level: usize) -> Result<&DirectoryEntry> {
        self.entries.get(level).ok_or(Error::LevelOutOfRange {
            index: level,
            count: self.entries.len(),
        })
    }

    pub fn entry_mut(&mut self, level: usize) -> Result<&mut DirectoryEntry> {
        let count = self.entries.len();
        self.entries.get_mut(level).ok_or(Error::LevelOutOfRange {
            index: level,
            count,
        })
    }

    /// Address-translated file offset of one component, `None` when the
    /// entry holds the absent sentinel.
    pub fn component_offset(
        &self,
        image: &Image,
        level: usize,
        kind: ComponentKind,
    ) -> Result<Option<usize>> {
        match self.entry(level)?.component(kind) {
            Some(addr) => {
                let offset = image
                    .addr_to_offset(addr)
                    .ok_or(Error::BadAddress { addr })?;
                Ok(Some(offset))
            }
            None => Ok(None),
        }
    }

    /// Stored uncompressed length of a size-prefixed component's block;
    /// `None` for absent components and prefix-less kinds.
    pub fn stored_length(
        &self,
        image: &Image,
        level: usize,
        kind: ComponentKind,
    ) -> Result<Option<u32>> {
        if !self.layout.size_prefixed(kind) || !self.layout.compressed(kind) {
            return Ok(None);
        }
        match self.component_offset(image, level, kind)? {
            Some(offset) => Ok(Some(image.read_u32(offset)?)),
            None => Ok(None),
        }
    }

    /// Serialize every entry back over the table region in one pass.
    pub fn write_table(&self, image: &mut Image) -> Result<()> {
        let table_addr = self.layout.table_addr();
        let offset = image
            .addr_to_offset(table_addr)
            .ok_or(Error::TableOutOfBounds { addr: table_addr })?;

        let width = self.layout.entry_width();
        for (i, entry) in self.entries.iter().enumerate() {
            let bytes = self.layout.encode_entry(entry);
            image.write_bytes(offset + i * width, &bytes)?;
        }
        Ok(())
    }

    /// Every address the directory currently points at, plus the table
    /// itself, sorted. Used to bound in-place rewrites.
    pub fn placed_addresses(&self) -> Vec<u32> {
        let mut addresses = vec![self.layout.table_addr()];
        for entry in &self.entries {
            for kind in RELOCATION_ORDER {
                if let Some(addr) = entry.component(kind) {
                    addresses.push(addr);
                }
            }
            if let Some(addr) = entry.palette {
                addresses.push(addr);
            }
        }
        addresses.sort_unstable();
        addresses
    }
}
