//! The original cartridge revision's level table.
//!
//! Thirty 24-byte records. Every pointer uses zero as the absent sentinel
//! and every compressed block carries its uncompressed-length prefix, so
//! components may be rewritten in place when the new encoding fits.

use std::io;

use crate::binary_utils::{field, pack_record, unpack_record, RecordField};

use super::{ComponentKind, DirectoryEntry, TableLayout};

pub const TABLE_ADDR: u32 = 0x0803_4C00;
pub const LEVEL_COUNT: usize = 30;

const FIELDS: [RecordField; 6] = [
    field("physical", 4),
    field("graphical", 4),
    field("background", 4),
    field("minimap", 4),
    field("palette", 4),
    field("flags", 4),
];

const COMPONENTS: [ComponentKind; 4] = [
    ComponentKind::Physical,
    ComponentKind::Graphical,
    ComponentKind::Background,
    ComponentKind::Minimap,
];

pub struct BaseLayout;

impl TableLayout for BaseLayout {
    fn name(&self) -> &'static str {
        "base"
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

    fn size_prefixed(&self, _kind: ComponentKind) -> bool {
        true
    }

    fn supports_in_place(&self) -> bool {
        true
    }

    fn has_depth_mode(&self) -> bool {
        false
    }

    fn decode_entry(&self, raw: &[u8]) -> io::Result<DirectoryEntry> {
        let values = unpack_record(raw, &FIELDS)?;
        let pointer = |v: u32| if v == 0 { None } else { Some(v) };

        Ok(DirectoryEntry {
            physical: pointer(values[0]),
            graphical: pointer(values[1]),
            background: pointer(values[2]),
            minimap: pointer(values[3]),
            palette: pointer(values[4]),
            flags: values[5],
            ..Default::default()
        })
    }

    fn encode_entry(&self, entry: &DirectoryEntry) -> Vec<u8> {
        let pointer = |p: Option<u32>| p.unwrap_or(0);
        pack_record(
            &[
                pointer(entry.physical),
                pointer(entry.graphical),
                pointer(entry.background),
                pointer(entry.minimap),
                pointer(entry.palette),
                entry.flags,
            ],
            &FIELDS,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_record_decodes_to_sentinels() {
        let layout = BaseLayout;
        let entry = layout.decode_entry(&[0u8; 24]).unwrap();
        assert_eq!(entry, DirectoryEntry::default());
        assert_eq!(layout.encode_entry(&entry), vec![0u8; 24]);
    }

    #[test]
    fn test_component_set() {
        let layout = BaseLayout;
        assert!(layout.has_component(ComponentKind::Physical));
        assert!(!layout.has_component(ComponentKind::Graphical2));
        assert!(!layout.has_component(ComponentKind::Objects));
        assert_eq!(layout.entry_width(), 24);
    }
}
