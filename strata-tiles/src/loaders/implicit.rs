use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use new_string_template::template::Template;
use serde_json::Value;
use strata_geo::{morton2, morton3, BoundingVolume, TileId};

use crate::error::Error;
use crate::tile::{Tile, TileContentKind, TileDescription, TileModel};

use super::{fetch_bytes, resolve_url, TileLoadInput, TileLoadResult, TilesetContentLoader};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubdivisionScheme {
    Quadtree,
    Octree,
}

impl SubdivisionScheme {
    fn child_count(self) -> u64 {
        match self {
            SubdivisionScheme::Quadtree => 4,
            SubdivisionScheme::Octree => 8,
        }
    }

    fn power_of_two(self) -> u32 {
        match self {
            SubdivisionScheme::Quadtree => 2,
            SubdivisionScheme::Octree => 3,
        }
    }
}

/// One availability answer source: either the same answer for every tile,
/// or a bitstream indexed by level-offset plus Morton index.
#[derive(Clone, Debug)]
enum AvailabilityView {
    Constant(bool),
    Bitstream(bytes::Bytes),
}

impl AvailabilityView {
    fn is_available(&self, bit_index: u64) -> bool {
        match self {
            AvailabilityView::Constant(available) => *available,
            AvailabilityView::Bitstream(bits) => {
                let byte_index = (bit_index / 8) as usize;
                let bit_offset = (bit_index % 8) as u32;
                bits.get(byte_index)
                    .map(|byte| (byte >> bit_offset) & 1 == 1)
                    .unwrap_or(false)
            }
        }
    }
}

/// The availability answers for one subtree: which tiles exist, which have
/// content, and which child subtrees exist below the bottom level.
#[derive(Clone, Debug)]
pub struct SubtreeAvailability {
    scheme: SubdivisionScheme,
    subtree_levels: u32,
    tile_availability: AvailabilityView,
    content_availability: Vec<AvailabilityView>,
    child_subtree_availability: AvailabilityView,
}

impl SubtreeAvailability {
    /// A subtree where every tile and every content exists. Useful for
    /// tests and fully-populated datasets.
    pub fn constant(scheme: SubdivisionScheme, subtree_levels: u32, available: bool) -> Self {
        Self {
            scheme,
            subtree_levels,
            tile_availability: AvailabilityView::Constant(available),
            content_availability: vec![AvailabilityView::Constant(available)],
            child_subtree_availability: AvailabilityView::Constant(available),
        }
    }

    /// Bit index of a tile within the concatenated per-level bitstream:
    /// levels are laid out root-first, each level holding
    /// `child_count^level` bits in Morton order.
    fn tile_bit_index(&self, relative_level: u32, morton: u64) -> u64 {
        let tiles_in_level = 1u64 << (self.scheme.power_of_two() * relative_level);
        let level_offset = (tiles_in_level - 1) / (self.scheme.child_count() - 1);
        level_offset + morton
    }

    pub fn is_tile_available(&self, relative_level: u32, morton: u64) -> bool {
        if relative_level >= self.subtree_levels {
            return false;
        }
        self.tile_availability
            .is_available(self.tile_bit_index(relative_level, morton))
    }

    pub fn is_content_available(&self, relative_level: u32, morton: u64, content: usize) -> bool {
        if relative_level >= self.subtree_levels {
            return false;
        }
        self.content_availability
            .get(content)
            .map(|view| view.is_available(self.tile_bit_index(relative_level, morton)))
            .unwrap_or(false)
    }

    /// Whether the child subtree whose root sits `subtree_levels` below
    /// this subtree's root, at the given relative Morton index, exists.
    pub fn is_child_subtree_available(&self, child_morton: u64) -> bool {
        self.child_subtree_availability.is_available(child_morton)
    }

    /// Parses either a binary `subt` payload or a bare JSON subtree
    /// document.
    pub fn parse(
        scheme: SubdivisionScheme,
        subtree_levels: u32,
        data: &[u8],
    ) -> Result<Self, Error> {
        if data.len() >= 4 && &data[..4] == b"subt" {
            if data.len() < 24 {
                return Err(Error::InvalidSubtree("truncated header".to_string()));
            }
            let json_length =
                u64::from_le_bytes(data[8..16].try_into().unwrap_or_default()) as usize;
            let binary_length =
                u64::from_le_bytes(data[16..24].try_into().unwrap_or_default()) as usize;
            let json_end = 24 + json_length;
            let binary_end = json_end + binary_length;
            if data.len() < binary_end {
                return Err(Error::InvalidSubtree(
                    "chunk lengths exceed payload".to_string(),
                ));
            }
            let json: Value = serde_json::from_slice(&data[24..json_end])?;
            Self::from_json(scheme, subtree_levels, &json, &data[json_end..binary_end])
        } else {
            let json: Value = serde_json::from_slice(data)?;
            Self::from_json(scheme, subtree_levels, &json, &[])
        }
    }

    fn from_json(
        scheme: SubdivisionScheme,
        subtree_levels: u32,
        json: &Value,
        binary_body: &[u8],
    ) -> Result<Self, Error> {
        let buffer_views = json
            .get("bufferViews")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let view_bytes = |index: usize| -> Result<bytes::Bytes, Error> {
            let view = buffer_views
                .get(index)
                .ok_or_else(|| Error::InvalidSubtree(format!("missing bufferView {index}")))?;
            let offset = view
                .get("byteOffset")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize;
            let length = view
                .get("byteLength")
                .and_then(Value::as_u64)
                .ok_or_else(|| Error::InvalidSubtree("bufferView without byteLength".to_string()))?
                as usize;
            if offset + length > binary_body.len() {
                return Err(Error::InvalidSubtree(
                    "bufferView exceeds binary chunk".to_string(),
                ));
            }
            Ok(bytes::Bytes::copy_from_slice(
                &binary_body[offset..offset + length],
            ))
        };

        let parse_view = |value: &Value| -> Result<AvailabilityView, Error> {
            if let Some(constant) = value.get("constant").and_then(Value::as_u64) {
                return Ok(AvailabilityView::Constant(constant == 1));
            }
            // "bitstream" is the 1.1 name, "bufferView" the older one.
            let index = value
                .get("bitstream")
                .or_else(|| value.get("bufferView"))
                .and_then(Value::as_u64)
                .ok_or_else(|| {
                    Error::InvalidSubtree("availability has neither constant nor bitstream".into())
                })? as usize;
            Ok(AvailabilityView::Bitstream(view_bytes(index)?))
        };

        let tile_availability = parse_view(json.get("tileAvailability").ok_or_else(|| {
            Error::InvalidSubtree("missing tileAvailability".to_string())
        })?)?;

        let content_availability = match json.get("contentAvailability") {
            Some(Value::Array(entries)) => entries
                .iter()
                .map(&parse_view)
                .collect::<Result<Vec<_>, _>>()?,
            Some(single) => vec![parse_view(single)?],
            None => vec![AvailabilityView::Constant(false)],
        };

        let child_subtree_availability =
            parse_view(json.get("childSubtreeAvailability").ok_or_else(|| {
                Error::InvalidSubtree("missing childSubtreeAvailability".to_string())
            })?)?;

        Ok(Self {
            scheme,
            subtree_levels,
            tile_availability,
            content_availability,
            child_subtree_availability,
        })
    }
}

/// Absolute coordinates of an implicit tile, quadtree and octree alike
/// (`z` is zero for quadtrees).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct TileCoords {
    level: u32,
    x: u32,
    y: u32,
    z: u32,
}

impl TileCoords {
    fn from_id(id: &TileId) -> Option<Self> {
        match id {
            TileId::Quadtree(q) => Some(Self {
                level: q.level,
                x: q.x,
                y: q.y,
                z: 0,
            }),
            TileId::Octree(o) => Some(Self {
                level: o.level,
                x: o.x,
                y: o.y,
                z: o.z,
            }),
            _ => None,
        }
    }

    /// The root of the fixed-depth subtree this tile belongs to.
    fn subtree_root(&self, subtree_levels: u32) -> TileCoords {
        let root_level = (self.level / subtree_levels) * subtree_levels;
        let shift = self.level - root_level;
        TileCoords {
            level: root_level,
            x: self.x >> shift,
            y: self.y >> shift,
            z: self.z >> shift,
        }
    }

    /// Morton index relative to the subtree root `relative_level` above.
    fn relative_morton(&self, relative_level: u32, scheme: SubdivisionScheme) -> u64 {
        let mask = (1u32 << relative_level) - 1;
        match scheme {
            SubdivisionScheme::Quadtree => morton2(self.x & mask, self.y & mask),
            SubdivisionScheme::Octree => morton3(self.x & mask, self.y & mask, self.z & mask),
        }
    }
}

/// Loads implicitly-tiled content: tile addresses are quadtree or octree
/// coordinates, availability comes from fixed-depth subtree bitstreams, and
/// URLs are produced from `{level}/{x}/{y}` style templates.
pub struct ImplicitLoader {
    scheme: SubdivisionScheme,
    base_url: String,
    content_template: Template,
    content_template_text: String,
    subtree_template: Template,
    subtree_template_text: String,
    subtree_levels: u32,
    /// Total number of levels in the tree; tiles at `available_levels - 1`
    /// are the deepest possible.
    available_levels: u32,
    root_bounding_volume: BoundingVolume,
    root_geometric_error: f64,
    subtrees: RwLock<HashMap<TileCoords, Arc<SubtreeAvailability>>>,
}

impl ImplicitLoader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scheme: SubdivisionScheme,
        base_url: impl Into<String>,
        content_url_template: impl Into<String>,
        subtree_url_template: impl Into<String>,
        subtree_levels: u32,
        available_levels: u32,
        root_bounding_volume: BoundingVolume,
        root_geometric_error: f64,
    ) -> Self {
        let content_template_text = content_url_template.into();
        let subtree_template_text = subtree_url_template.into();
        Self {
            scheme,
            base_url: base_url.into(),
            content_template: Template::new(content_template_text.as_str()),
            content_template_text,
            subtree_template: Template::new(subtree_template_text.as_str()),
            subtree_template_text,
            subtree_levels: subtree_levels.max(1),
            available_levels,
            root_bounding_volume,
            root_geometric_error,
            subtrees: RwLock::new(HashMap::new()),
        }
    }

    pub fn quadtree(
        base_url: impl Into<String>,
        content_url_template: impl Into<String>,
        subtree_url_template: impl Into<String>,
        subtree_levels: u32,
        available_levels: u32,
        root_bounding_volume: BoundingVolume,
        root_geometric_error: f64,
    ) -> Self {
        Self::new(
            SubdivisionScheme::Quadtree,
            base_url,
            content_url_template,
            subtree_url_template,
            subtree_levels,
            available_levels,
            root_bounding_volume,
            root_geometric_error,
        )
    }

    pub fn octree(
        base_url: impl Into<String>,
        content_url_template: impl Into<String>,
        subtree_url_template: impl Into<String>,
        subtree_levels: u32,
        available_levels: u32,
        root_bounding_volume: BoundingVolume,
        root_geometric_error: f64,
    ) -> Self {
        Self::new(
            SubdivisionScheme::Octree,
            base_url,
            content_url_template,
            subtree_url_template,
            subtree_levels,
            available_levels,
            root_bounding_volume,
            root_geometric_error,
        )
    }

    /// The description of the tree's root tile, for seeding a tileset.
    pub fn root_description(&self) -> TileDescription {
        let id = match self.scheme {
            SubdivisionScheme::Quadtree => {
                TileId::Quadtree(strata_geo::QuadtreeTileId::new(0, 0, 0))
            }
            SubdivisionScheme::Octree => TileId::Octree(strata_geo::OctreeTileId::new(0, 0, 0, 0)),
        };
        TileDescription {
            id,
            bounding_volume: self.root_bounding_volume.clone(),
            content_bounding_volume: None,
            geometric_error: self.root_geometric_error,
            refine: None,
            transform: glam::DMat4::IDENTITY,
            unconditionally_refine: false,
            children: Vec::new(),
        }
    }

    /// Seeds the availability for a subtree root, for offline use and
    /// tests.
    pub fn insert_subtree(&self, level: u32, x: u32, y: u32, z: u32, subtree: SubtreeAvailability) {
        if let Ok(mut subtrees) = self.subtrees.write() {
            subtrees.insert(TileCoords { level, x, y, z }, Arc::new(subtree));
        }
    }

    fn render_template(
        &self,
        template: &Template,
        template_text: &str,
        coords: &TileCoords,
    ) -> Result<String, Error> {
        let mut values: HashMap<&str, String> = HashMap::new();
        values.insert("level", coords.level.to_string());
        values.insert("x", coords.x.to_string());
        values.insert("y", coords.y.to_string());
        values.insert("z", coords.z.to_string());
        let rendered = template
            .render(&values)
            .map_err(|error| Error::UrlTemplate {
                template: template_text.to_string(),
                message: error.to_string(),
            })?;
        Ok(resolve_url(&self.base_url, &rendered))
    }

    fn subtree_for(
        &self,
        root: TileCoords,
        input: &TileLoadInput,
    ) -> Result<Arc<SubtreeAvailability>, TileLoadResult> {
        if let Some(subtree) = self
            .subtrees
            .read()
            .ok()
            .and_then(|subtrees| subtrees.get(&root).cloned())
        {
            return Ok(subtree);
        }
        let url = self
            .render_template(&self.subtree_template, &self.subtree_template_text, &root)
            .map_err(TileLoadResult::failed)?;
        let data = fetch_bytes(&input.asset_accessor, &input.request_headers, &url)?;
        let subtree = SubtreeAvailability::parse(self.scheme, self.subtree_levels, &data)
            .map(Arc::new)
            .map_err(TileLoadResult::failed)?;
        if let Ok(mut subtrees) = self.subtrees.write() {
            subtrees.insert(root, subtree.clone());
        }
        Ok(subtree)
    }

    fn loaded_subtree(&self, root: TileCoords) -> Option<Arc<SubtreeAvailability>> {
        self.subtrees
            .read()
            .ok()
            .and_then(|subtrees| subtrees.get(&root).cloned())
    }

    fn child_coords(&self, parent: TileCoords) -> Vec<TileCoords> {
        let level = parent.level + 1;
        let mut children = Vec::with_capacity(self.scheme.child_count() as usize);
        let z_range = match self.scheme {
            SubdivisionScheme::Quadtree => 0..1,
            SubdivisionScheme::Octree => 0..2,
        };
        for dz in z_range {
            for dy in 0..2 {
                for dx in 0..2 {
                    children.push(TileCoords {
                        level,
                        x: parent.x * 2 + dx,
                        y: parent.y * 2 + dy,
                        z: parent.z * 2 + dz,
                    });
                }
            }
        }
        children
    }

    fn is_coords_available(&self, coords: TileCoords) -> bool {
        if coords.level >= self.available_levels {
            return false;
        }
        if coords.level == 0 {
            return true;
        }
        if coords.level % self.subtree_levels == 0 {
            // A subtree root: its existence is recorded in the parent
            // subtree's child-subtree availability.
            let parent_root = TileCoords {
                level: coords.level - self.subtree_levels,
                x: coords.x >> self.subtree_levels,
                y: coords.y >> self.subtree_levels,
                z: coords.z >> self.subtree_levels,
            };
            let Some(subtree) = self.loaded_subtree(parent_root) else {
                return false;
            };
            subtree
                .is_child_subtree_available(coords.relative_morton(self.subtree_levels, self.scheme))
        } else {
            let root = coords.subtree_root(self.subtree_levels);
            let Some(subtree) = self.loaded_subtree(root) else {
                return false;
            };
            let relative_level = coords.level - root.level;
            subtree.is_tile_available(
                relative_level,
                coords.relative_morton(relative_level, self.scheme),
            )
        }
    }

    fn tile_id_for(&self, coords: TileCoords) -> TileId {
        match self.scheme {
            SubdivisionScheme::Quadtree => TileId::Quadtree(strata_geo::QuadtreeTileId::new(
                coords.level,
                coords.x,
                coords.y,
            )),
            SubdivisionScheme::Octree => TileId::Octree(strata_geo::OctreeTileId::new(
                coords.level,
                coords.x,
                coords.y,
                coords.z,
            )),
        }
    }

    fn bounding_volume_for(&self, coords: TileCoords) -> BoundingVolume {
        match self.scheme {
            SubdivisionScheme::Quadtree => self.root_bounding_volume.quadtree_subdivision(
                &strata_geo::QuadtreeTileId::new(coords.level, coords.x, coords.y),
            ),
            SubdivisionScheme::Octree => self.root_bounding_volume.octree_subdivision(
                &strata_geo::OctreeTileId::new(coords.level, coords.x, coords.y, coords.z),
            ),
        }
    }

    fn geometric_error_for(&self, level: u32) -> f64 {
        self.root_geometric_error / (1u64 << level) as f64
    }
}

impl TilesetContentLoader for ImplicitLoader {
    fn load_tile_content(&self, input: &TileLoadInput) -> TileLoadResult {
        let Some(coords) = TileCoords::from_id(&input.tile_id) else {
            return TileLoadResult::failed(Error::UnsupportedTileId);
        };
        let root = coords.subtree_root(self.subtree_levels);
        let subtree = match self.subtree_for(root, input) {
            Ok(subtree) => subtree,
            Err(result) => return result,
        };
        let relative_level = coords.level - root.level;
        let morton = coords.relative_morton(relative_level, self.scheme);
        if !subtree.is_tile_available(relative_level, morton) {
            let mut result = TileLoadResult::success(TileContentKind::Empty);
            result
                .errors
                .warn("loaded a tile the subtree marks unavailable");
            return result;
        }
        if !subtree.is_content_available(relative_level, morton, 0) {
            return TileLoadResult::success(TileContentKind::Empty);
        }
        let url = match self.render_template(
            &self.content_template,
            &self.content_template_text,
            &coords,
        ) {
            Ok(url) => url,
            Err(error) => return TileLoadResult::failed(error),
        };
        match fetch_bytes(&input.asset_accessor, &input.request_headers, &url) {
            Ok(data) => TileLoadResult::success(TileContentKind::Render(TileModel {
                data,
                bounding_volume: None,
                credits: Vec::new(),
            })),
            Err(result) => result,
        }
    }

    fn create_child_tiles(&self, tile: &Tile) -> Option<Vec<TileDescription>> {
        let coords = TileCoords::from_id(&tile.id)?;
        if coords.level + 1 >= self.available_levels {
            return Some(Vec::new());
        }
        let children = self
            .child_coords(coords)
            .into_iter()
            .filter(|&child| self.is_coords_available(child))
            .map(|child| TileDescription {
                id: self.tile_id_for(child),
                bounding_volume: self.bounding_volume_for(child),
                content_bounding_volume: None,
                geometric_error: self.geometric_error_for(child.level),
                refine: None,
                transform: tile.transform,
                unconditionally_refine: false,
                children: Vec::new(),
            })
            .collect();
        Some(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;
    use strata_geo::BoundingSphere;

    fn bitstream(bits: &[u8]) -> AvailabilityView {
        // Bits given most-significant-first per byte boundary for
        // readability; pack LSB-first the way the format stores them.
        let mut bytes = vec![0u8; (bits.len() + 7) / 8];
        for (i, &bit) in bits.iter().enumerate() {
            if bit != 0 {
                bytes[i / 8] |= 1 << (i % 8);
            }
        }
        AvailabilityView::Bitstream(bytes::Bytes::from(bytes))
    }

    /// A two-level quadtree subtree: root available, children 0 and 3 (in
    /// Morton order) available, only child 3 has content.
    fn two_level_subtree() -> SubtreeAvailability {
        SubtreeAvailability {
            scheme: SubdivisionScheme::Quadtree,
            subtree_levels: 2,
            tile_availability: bitstream(&[1, 1, 0, 0, 1]),
            content_availability: vec![bitstream(&[0, 0, 0, 0, 1])],
            child_subtree_availability: bitstream(&[
                0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0,
            ]),
        }
    }

    #[test]
    fn bit_layout_matches_level_offsets() {
        let subtree = two_level_subtree();
        assert!(subtree.is_tile_available(0, 0));
        assert!(subtree.is_tile_available(1, 0));
        assert!(!subtree.is_tile_available(1, 1));
        assert!(!subtree.is_tile_available(1, 2));
        assert!(subtree.is_tile_available(1, 3));
        assert!(!subtree.is_content_available(0, 0, 0));
        assert!(subtree.is_content_available(1, 3, 0));
        // Child subtrees are addressed by Morton index alone.
        assert!(subtree.is_child_subtree_available(12));
        assert!(!subtree.is_child_subtree_available(0));
    }

    #[test]
    fn constant_views_answer_without_bit_math() {
        let subtree =
            SubtreeAvailability::constant(SubdivisionScheme::Quadtree, 2, true);
        assert!(subtree.is_tile_available(1, 3));
        assert!(subtree.is_content_available(0, 0, 0));
        assert!(!subtree.is_tile_available(2, 0));
    }

    #[test]
    fn binary_subtree_round_trip() {
        // One bufferView holding tile availability for 2 levels (5 bits:
        // all available), constant content, constant child subtrees.
        let body = vec![0b0001_1111u8];
        let json = serde_json::json!({
            "buffers": [{ "byteLength": 1 }],
            "bufferViews": [{ "buffer": 0, "byteOffset": 0, "byteLength": 1 }],
            "tileAvailability": { "bitstream": 0 },
            "contentAvailability": [{ "constant": 0 }],
            "childSubtreeAvailability": { "constant": 0 }
        });
        let json_text = serde_json::to_vec(&json).unwrap();
        let mut payload = Vec::new();
        payload.extend_from_slice(b"subt");
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.extend_from_slice(&(json_text.len() as u64).to_le_bytes());
        payload.extend_from_slice(&(body.len() as u64).to_le_bytes());
        payload.extend_from_slice(&json_text);
        payload.extend_from_slice(&body);

        let subtree =
            SubtreeAvailability::parse(SubdivisionScheme::Quadtree, 2, &payload).unwrap();
        assert!(subtree.is_tile_available(0, 0));
        assert!(subtree.is_tile_available(1, 3));
        assert!(!subtree.is_content_available(1, 3, 0));
        assert!(!subtree.is_child_subtree_available(0));
    }

    #[test]
    fn octree_bit_index_uses_power_of_three() {
        let subtree = SubtreeAvailability {
            scheme: SubdivisionScheme::Octree,
            subtree_levels: 2,
            // Level 0: 1 bit, level 1: 8 bits. Mark root and child 7.
            tile_availability: bitstream(&[1, 0, 0, 0, 0, 0, 0, 0, 1]),
            content_availability: vec![AvailabilityView::Constant(false)],
            child_subtree_availability: AvailabilityView::Constant(false),
        };
        assert!(subtree.is_tile_available(0, 0));
        assert!(subtree.is_tile_available(1, 7));
        assert!(!subtree.is_tile_available(1, 6));
    }

    fn test_loader(subtree_levels: u32, available_levels: u32) -> ImplicitLoader {
        ImplicitLoader::quadtree(
            "https://example.com/tiles/tileset.json",
            "content/{level}/{x}/{y}.glb",
            "subtrees/{level}/{x}/{y}.subtree",
            subtree_levels,
            available_levels,
            BoundingVolume::Sphere(BoundingSphere::new(DVec3::ZERO, 1000.0)),
            64.0,
        )
    }

    #[test]
    fn templates_render_resolved_urls() {
        let loader = test_loader(2, 4);
        let coords = TileCoords {
            level: 3,
            x: 5,
            y: 2,
            z: 0,
        };
        let url = loader
            .render_template(&loader.content_template, &loader.content_template_text, &coords)
            .unwrap();
        assert_eq!(url, "https://example.com/tiles/content/3/5/2.glb");
    }

    #[test]
    fn children_follow_subtree_availability() {
        let loader = test_loader(2, 4);
        loader.insert_subtree(0, 0, 0, 0, two_level_subtree());

        let root = Tile::new(
            TileId::Quadtree(strata_geo::QuadtreeTileId::new(0, 0, 0)),
            BoundingVolume::Sphere(BoundingSphere::new(DVec3::ZERO, 1000.0)),
            64.0,
        );
        let children = loader.create_child_tiles(&root).unwrap();
        // Morton 0 -> (0,0), Morton 3 -> (1,1).
        let ids: Vec<_> = children
            .iter()
            .filter_map(|c| c.id.as_quadtree().cloned())
            .map(|q| (q.x, q.y))
            .collect();
        assert_eq!(ids, vec![(0, 0), (1, 1)]);
        assert_eq!(children[0].geometric_error, 32.0);

        // Children of (1, 1) sit at level 2, which starts new subtrees.
        // Only child-subtree Morton 12 is set, which is (x=2, y=2).
        let parent = Tile::new(
            TileId::Quadtree(strata_geo::QuadtreeTileId::new(1, 1, 1)),
            BoundingVolume::Sphere(BoundingSphere::new(DVec3::ZERO, 1000.0)),
            32.0,
        );
        let children = loader.create_child_tiles(&parent).unwrap();
        let ids: Vec<_> = children
            .iter()
            .filter_map(|c| c.id.as_quadtree().cloned())
            .map(|q| (q.x, q.y))
            .collect();
        assert_eq!(ids, vec![(2, 2)]);
    }

    #[test]
    fn deepest_level_has_no_children() {
        let loader = test_loader(2, 2);
        let tile = Tile::new(
            TileId::Quadtree(strata_geo::QuadtreeTileId::new(1, 0, 0)),
            BoundingVolume::Sphere(BoundingSphere::new(DVec3::ZERO, 1000.0)),
            32.0,
        );
        assert!(loader.create_child_tiles(&tile).unwrap().is_empty());
    }
}
