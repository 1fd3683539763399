//! Pulls level components out of the image into typed grids.

use log::warn;

use crate::codec;
use crate::directory::{ComponentKind, Directory, MINIMAP_HEIGHT, MINIMAP_WIDTH};
use crate::error::{Error, Result};
use crate::flags::LevelFlags;
use crate::grid::Grid;
use crate::image::Image;
use crate::objects::ObjectTable;

/// Cap on a stored uncompressed length; prefixes past this are treated as
/// corrupt instead of allocated.
const MAX_UNCOMPRESSED: usize = 1 << 20;

/// One component's decoded payload together with the raw span it occupies
/// on disk. The span is what a rewrite recopies and what bounds an
/// in-place write.
#[derive(Debug, Clone)]
pub struct ComponentSlice {
    /// File offset of the block, size prefix included.
    pub offset: usize,
    /// On-disk bytes consumed, size prefix included.
    pub disk_len: usize,
    /// Decompressed canonical payload.
    pub payload: Vec<u8>,
}

/// Everything one level holds.
#[derive(Debug, Clone)]
pub struct Level {
    pub physical: Grid,
    pub graphical: Option<Grid>,
    pub graphical2: Option<Grid>,
    pub background: Option<Grid>,
    pub minimap: Grid,
    pub objects: ObjectTable,
    pub flags: LevelFlags,
    /// Kinds that are actually present on disk, for the manifest and the
    /// no-op round trip through text files.
    pub present: Vec<ComponentKind>,
}

pub struct Extractor<'a> {
    image: &'a Image,
    directory: &'a Directory,
}

impl<'a> Extractor<'a> {
    pub fn new(image: &'a Image, directory: &'a Directory) -> Self {
        Extractor { image, directory }
    }

    /// Extract every present component of one level. An absent physical
    /// pointer or a bad level index is fatal for the level; everything
    /// else degrades to empty values.
    pub fn extract_level(&self, level: usize) -> Result<Level> {
        let entry = self.directory.entry(level)?;
        if entry.physical.is_none() {
            return Err(Error::MissingComponent {
                level,
                kind: ComponentKind::Physical,
            });
        }

        let layout = self.directory.layout();
        let mut present = Vec::new();

        let mut map_grid = |kind: ComponentKind| -> Result<Option<Grid>> {
            if !layout.has_component(kind) {
                return Ok(None);
            }
            let grid = match self.extract_component(level, kind)? {
                Some(slice) => Grid::from_payload(&slice.payload),
                None => return Ok(None),
            };
            if grid.is_empty() {
                return Ok(None);
            }
            present.push(kind);
            Ok(Some(grid))
        };

        let physical = map_grid(ComponentKind::Physical)?.ok_or(Error::MissingComponent {
            level,
            kind: ComponentKind::Physical,
        })?;
        let graphical = map_grid(ComponentKind::Graphical)?;
        let graphical2 = map_grid(ComponentKind::Graphical2)?;
        let background = map_grid(ComponentKind::Background)?;

        let minimap = match self.extract_component(level, ComponentKind::Minimap)? {
            Some(slice) if !slice.payload.is_empty() => {
                present.push(ComponentKind::Minimap);
                Grid::from_fixed_payload(MINIMAP_WIDTH, MINIMAP_HEIGHT, &slice.payload)
            }
            _ => Grid::new(MINIMAP_WIDTH, MINIMAP_HEIGHT),
        };

        let objects = if layout.has_component(ComponentKind::Objects) {
            match self.extract_component(level, ComponentKind::Objects)? {
                Some(slice) if !slice.payload.is_empty() => {
                    present.push(ComponentKind::Objects);
                    ObjectTable::from_payload(&slice.payload)
                }
                _ => ObjectTable::new(),
            }
        } else {
            ObjectTable::new()
        };

        let flags = LevelFlags::decode(entry.flags, layout.has_depth_mode());

        Ok(Level {
            physical,
            graphical,
            graphical2,
            background,
            minimap,
            objects,
            flags,
            present,
        })
    }

    /// Extract one component's payload and the raw span it was read from.
    /// An absent pointer yields `Ok(None)`; a pointer outside the image is
    /// fatal for the level.
    pub fn extract_component(
        &self,
        level: usize,
        kind: ComponentKind,
    ) -> Result<Option<ComponentSlice>> {
        let offset = match self.directory.component_offset(self.image, level, kind)? {
            Some(offset) => offset,
            None => return Ok(None),
        };

        let layout = self.directory.layout();

        if !layout.compressed(kind) {
            let (table, scanned) = ObjectTable::scan(self.image.tail(offset)?);
            return Ok(Some(ComponentSlice {
                offset,
                disk_len: scanned,
                payload: table.to_payload(),
            }));
        }

        if layout.size_prefixed(kind) {
            let size = self.image.read_u32(offset)? as usize;
            if size > MAX_UNCOMPRESSED {
                warn!(
                    "level {}: {} length prefix {:#x} is not plausible, skipping",
                    level, kind, size
                );
                return Ok(Some(ComponentSlice {
                    offset,
                    disk_len: 4,
                    payload: Vec::new(),
                }));
            }

            let src = self.image.tail(offset + 4)?;
            let (payload, consumed) = codec::decompress_span(src, size);
            if payload.len() < size {
                warn!(
                    "level {}: {} stream ends early ({} of {} bytes)",
                    level,
                    kind,
                    payload.len(),
                    size
                );
            }
            return Ok(Some(ComponentSlice {
                offset,
                disk_len: 4 + consumed,
                payload,
            }));
        }

        // Prefix-less stream: the decoded size is fixed at compile time.
        let size = kind
            .fixed_dims()
            .map(|(w, h)| w * h)
            .unwrap_or(0);
        let src = self.image.tail(offset)?;
        let (payload, consumed) = codec::decompress_span(src, size);
        if payload.len() < size {
            warn!(
                "level {}: {} stream ends early ({} of {} bytes)",
                level,
                kind,
                payload.len(),
                size
            );
        }
        Ok(Some(ComponentSlice {
            offset,
            disk_len: consumed,
            payload,
        }))
    }
}
