//! The expanded cartridge revision's level table.
//!
//! Fifty-two 32-byte records adding a secondary graphical overlay and an
//! object table. Pointers are signed; anything non-positive is the absent
//! sentinel. The object table is stored as raw records with no size
//! prefix, the minimap as a prefix-less stream of fixed decoded size, and
//! every write relocates, since the packed data leaves no slack to reuse.

use std::io;

use crate::binary_utils::{field, pack_record, unpack_record, RecordField};

use super::{ComponentKind, DirectoryEntry, TableLayout};

pub const TABLE_ADDR: u32 = 0x0804_7800;
pub const LEVEL_COUNT: usize = 52;

const FIELDS: [RecordField; 8] = [
    field("physical", 4),
    field("graphical", 4),
    field("graphical2", 4),
    field("background", 4),
    field("minimap", 4),
    field("objects", 4),
    field("palette", 4),
    field("flags", 4),
];

const COMPONENTS: [ComponentKind; 6] = [
    ComponentKind::Physical,
    ComponentKind::Graphical,
    ComponentKind::Graphical2,
    ComponentKind::Background,
    ComponentKind::Minimap,
    ComponentKind::Objects,
];

pub struct ExtendedLayout;

impl TableLayout for ExtendedLayout {
    fn name(&self) -> &'static str {
        "extended"
    }

    fn table_addr(&self) -> u32 {
        TABLE_ADDR
    }

    fn level_count(&self) -> usize {
        LEVEL_COUNT
    }

    fn fields(&self) -> &'static [RecordField] {
        &FIELDS
    }

    fn components(&self) -> &'static [ComponentKind] {
        &COMPONENTS
    }

    fn size_prefixed(&self, kind: ComponentKind) -> bool {
        !matches!(kind, ComponentKind::Minimap | ComponentKind::Objects)
    }

    fn supports_in_place(&self) -> bool {
        false
    }

    fn has_depth_mode(&self) -> bool {
        true
    }

    fn decode_entry(&self, raw: &[u8]) -> io::Result<DirectoryEntry> {
        let values = unpack_record(raw, &FIELDS)?;
        let pointer = |v: u32| if (v as i32) <= 0 { None } else { Some(v) };

        Ok(DirectoryEntry {
            physical: pointer(values[0]),
            graphical: pointer(values[1]),
            graphical2: pointer(values[2]),
            background: pointer(values[3]),
            minimap: pointer(values[4]),
            objects: pointer(values[5]),
            palette: pointer(values[6]),
            flags: values[7],
        })
    }

    fn encode_entry(&self, entry: &DirectoryEntry) -> Vec<u8> {
        let pointer = |p: Option<u32>| p.unwrap_or(0);
        pack_record(
            &[
                pointer(entry.physical),
                pointer(entry.graphical),
                pointer(entry.graphical2),
                pointer(entry.background),
                pointer(entry.minimap),
                pointer(entry.objects),
                pointer(entry.palette),
                entry.flags,
            ],
            &FIELDS,
        )
    }
}
