//! tlog-tile path layout and entry-bundle framing.

use purlog_merkle::Hash;

use crate::error::TileError;

/// Hashes per tile row.
pub const TILE_WIDTH: u64 = 256;

/// Tree levels per tile level: each tile level stores hashes at tree level
/// `tile_level * TILE_HEIGHT`.
pub const TILE_HEIGHT: u32 = 8;

/// Entries per bundle.
pub const ENTRY_BUNDLE_WIDTH: u64 = 256;

/// Path of the checkpoint file.
pub fn checkpoint_path() -> &'static str {
    "checkpoint"
}

/// Path of a hash tile. `width` is the number of hashes (1..=256); a width
/// below 256 yields the partial-tile form.
pub fn tile_path(level: u32, index: u64, width: u16) -> String {
    let mut p = format!("tile/{level}/{}", encode_index(index));
    if (width as u64) < TILE_WIDTH {
        p.push_str(&format!(".p/{width}"));
    }
    p
}

/// Path of an entry bundle, with the same partial convention as tiles.
pub fn entry_bundle_path(index: u64, width: u16) -> String {
    let mut p = format!("tile/entries/{}", encode_index(index));
    if (width as u64) < ENTRY_BUNDLE_WIDTH {
        p.push_str(&format!(".p/{width}"));
    }
    p
}

/// Encode a tile index as slash-separated 3-digit groups, all but the last
/// prefixed with `x`: `1234067` → `x001/x234/067`.
fn encode_index(index: u64) -> String {
    let digits = index.to_string();
    let pad = (3 - digits.len() % 3) % 3;
    let padded = format!("{}{}", "0".repeat(pad), digits);
    let groups: Vec<&str> = padded
        .as_bytes()
        .chunks(3)
        .map(|c| std::str::from_utf8(c).expect("ascii digits"))
        .collect();
    let last = groups.len() - 1;
    groups
        .iter()
        .enumerate()
        .map(|(i, g)| {
            if i == last {
                (*g).to_string()
            } else {
                format!("x{g}")
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Width of the tile at `(tile_level, tile_index)` for a tree of `size`
/// leaves, or `None` if the tile has no complete hashes yet.
pub fn tile_width(size: u64, tile_level: u32, tile_index: u64) -> Option<u16> {
    let count = size >> (tile_level * TILE_HEIGHT);
    let start = tile_index * TILE_WIDTH;
    if start >= count {
        return None;
    }
    Some(TILE_WIDTH.min(count - start) as u16)
}

/// Parse a hash tile of the given width into node hashes.
pub fn parse_hash_tile(bytes: &[u8], width: u16) -> Result<Vec<Hash>, TileError> {
    if bytes.len() != width as usize * 32 {
        return Err(TileError::BadTile(format!(
            "tile is {} bytes, want {} hashes",
            bytes.len(),
            width
        )));
    }
    Ok(bytes
        .chunks_exact(32)
        .map(|c| c.try_into().expect("chunk is 32 bytes"))
        .collect())
}

/// Frame entries into a bundle: each entry prefixed with its big-endian
/// u16 length.
pub fn encode_entry_bundle(entries: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(entries.iter().map(|e| e.len() + 2).sum());
    for entry in entries {
        out.extend_from_slice(&(entry.len() as u16).to_be_bytes());
        out.extend_from_slice(entry);
    }
    out
}

/// Parse a bundle back into entries.
pub fn parse_entry_bundle(bytes: &[u8]) -> Result<Vec<Vec<u8>>, TileError> {
    let mut entries = Vec::new();
    let mut rest = bytes;
    while !rest.is_empty() {
        if rest.len() < 2 {
            return Err(TileError::BadTile("truncated bundle length prefix".to_string()));
        }
        let len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
        rest = &rest[2..];
        if rest.len() < len {
            return Err(TileError::BadTile(format!(
                "bundle entry claims {len} bytes, {} remain",
                rest.len()
            )));
        }
        entries.push(rest[..len].to_vec());
        rest = &rest[len..];
    }
    Ok(entries)
}

/// One entry bundle within a leaf range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bundle {
    /// Bundle index.
    pub index: u64,
    /// Offset of the first relevant entry within the bundle.
    pub first: usize,
    /// Number of entries present in the bundle (its fetch width).
    pub width: u16,
}

/// The bundles covering leaves `[from, to)` of a tree with `to` or more
/// leaves. Widths are computed against `tree_size`.
pub fn bundle_range(from: u64, to: u64, tree_size: u64) -> impl Iterator<Item = Bundle> {
    debug_assert!(from <= to && to <= tree_size);
    let first_bundle = from / ENTRY_BUNDLE_WIDTH;
    let last_bundle = if to == from { first_bundle } else { (to - 1) / ENTRY_BUNDLE_WIDTH + 1 };
    (first_bundle..last_bundle).map(move |index| {
        let start = index * ENTRY_BUNDLE_WIDTH;
        let width = ENTRY_BUNDLE_WIDTH.min(tree_size - start) as u16;
        let first = if index == first_bundle {
            (from - start) as usize
        } else {
            0
        };
        Bundle { index, first, width }
    })
}
