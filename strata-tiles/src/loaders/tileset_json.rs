use glam::{DMat3, DMat4, DVec3};
use serde_json::Value;
use strata_geo::{BoundingRegion, BoundingSphere, BoundingVolume, GlobeRectangle, OrientedBoundingBox, TileId};

use crate::error::Error;
use crate::tile::{Tile, TileContentKind, TileDescription, TileModel, TileRefine};

use super::{fetch_bytes, resolve_url, TileLoadInput, TileLoadResult, TilesetContentLoader};

/// Loads tiles addressed by explicit content URLs from a `tileset.json`
/// tree, including nested external tilesets.
///
/// Tiles without content carry an empty URL and resolve to empty content
/// without touching the network.
#[derive(Default)]
pub struct TilesetJsonLoader;

impl TilesetJsonLoader {
    pub fn new() -> Self {
        Self
    }

    /// Parses a whole tileset document into the description of its root
    /// tile. `base_url` is the URL the document was fetched from; content
    /// URLs are resolved against it.
    pub fn parse_tileset_json(base_url: &str, json: &Value) -> Result<TileDescription, Error> {
        let root = json
            .get("root")
            .ok_or_else(|| Error::InvalidTileset("missing root tile".to_string()))?;
        parse_tile(base_url, root)
    }
}

impl TilesetContentLoader for TilesetJsonLoader {
    fn load_tile_content(&self, input: &TileLoadInput) -> TileLoadResult {
        let Some(url) = input.tile_id.as_url() else {
            return TileLoadResult::failed(Error::UnsupportedTileId);
        };
        if url.is_empty() {
            return TileLoadResult::success(TileContentKind::Empty);
        }
        let data = match fetch_bytes(&input.asset_accessor, &input.request_headers, url) {
            Ok(data) => data,
            Err(result) => return result,
        };
        if looks_like_json(&data) {
            // External tileset: its root splices in as this tile's child.
            let json: Value = match serde_json::from_slice(&data) {
                Ok(json) => json,
                Err(error) => return TileLoadResult::failed(error.into()),
            };
            match Self::parse_tileset_json(url, &json) {
                Ok(root) => TileLoadResult::success(TileContentKind::External {
                    children: vec![root],
                }),
                Err(error) => TileLoadResult::failed(error),
            }
        } else {
            TileLoadResult::success(TileContentKind::Render(TileModel {
                data,
                bounding_volume: None,
                credits: Vec::new(),
            }))
        }
    }

    fn create_child_tiles(&self, tile: &Tile) -> Option<Vec<TileDescription>> {
        match &tile.content.kind {
            TileContentKind::External { children } => Some(children.clone()),
            _ => None,
        }
    }
}

fn looks_like_json(data: &[u8]) -> bool {
    data.iter()
        .find(|b| !b.is_ascii_whitespace())
        .map(|&b| b == b'{')
        .unwrap_or(false)
}

fn parse_tile(base_url: &str, json: &Value) -> Result<TileDescription, Error> {
    let bounding_volume = parse_bounding_volume(json.get("boundingVolume").ok_or_else(|| {
        Error::InvalidTileset("tile is missing a boundingVolume".to_string())
    })?)?;
    let geometric_error = json
        .get("geometricError")
        .and_then(Value::as_f64)
        .ok_or_else(|| Error::InvalidTileset("tile is missing geometricError".to_string()))?;

    let content_url = json
        .get("content")
        .and_then(|content| content.get("uri").or_else(|| content.get("url")))
        .and_then(Value::as_str)
        .map(|uri| resolve_url(base_url, uri))
        .unwrap_or_default();
    let content_bounding_volume = json
        .get("content")
        .and_then(|content| content.get("boundingVolume"))
        .map(parse_bounding_volume)
        .transpose()?;

    let refine = match json.get("refine").and_then(Value::as_str) {
        Some("ADD") | Some("add") => Some(TileRefine::Add),
        Some("REPLACE") | Some("replace") => Some(TileRefine::Replace),
        Some(other) => {
            return Err(Error::InvalidTileset(format!("unknown refine mode {other}")));
        }
        None => None,
    };

    let transform = match json.get("transform") {
        Some(value) => parse_transform(value)?,
        None => DMat4::IDENTITY,
    };

    let mut children = Vec::new();
    if let Some(child_values) = json.get("children").and_then(Value::as_array) {
        for child in child_values {
            children.push(parse_tile(base_url, child)?);
        }
    }

    Ok(TileDescription {
        id: TileId::Url(content_url),
        bounding_volume,
        content_bounding_volume,
        geometric_error,
        refine,
        transform,
        unconditionally_refine: false,
        children,
    })
}

fn parse_numbers(value: &Value, expected: usize, what: &str) -> Result<Vec<f64>, Error> {
    let numbers: Option<Vec<f64>> = value
        .as_array()
        .map(|values| values.iter().filter_map(Value::as_f64).collect());
    match numbers {
        Some(numbers) if numbers.len() == expected => Ok(numbers),
        _ => Err(Error::InvalidTileset(format!(
            "{what} must be an array of {expected} numbers"
        ))),
    }
}

fn parse_bounding_volume(json: &Value) -> Result<BoundingVolume, Error> {
    if let Some(values) = json.get("box") {
        let n = parse_numbers(values, 12, "boundingVolume.box")?;
        return Ok(BoundingVolume::Box(OrientedBoundingBox::new(
            DVec3::new(n[0], n[1], n[2]),
            DMat3::from_cols(
                DVec3::new(n[3], n[4], n[5]),
                DVec3::new(n[6], n[7], n[8]),
                DVec3::new(n[9], n[10], n[11]),
            ),
        )));
    }
    if let Some(values) = json.get("region") {
        let n = parse_numbers(values, 6, "boundingVolume.region")?;
        return Ok(BoundingVolume::Region(BoundingRegion::new(
            GlobeRectangle::new(n[0], n[1], n[2], n[3]),
            n[4],
            n[5],
        )));
    }
    if let Some(values) = json.get("sphere") {
        let n = parse_numbers(values, 4, "boundingVolume.sphere")?;
        return Ok(BoundingVolume::Sphere(BoundingSphere::new(
            DVec3::new(n[0], n[1], n[2]),
            n[3],
        )));
    }
    Err(Error::InvalidTileset(
        "boundingVolume has no box, region or sphere".to_string(),
    ))
}

fn parse_transform(value: &Value) -> Result<DMat4, Error> {
    let n = parse_numbers(value, 16, "transform")?;
    let mut columns = [0.0; 16];
    columns.copy_from_slice(&n);
    Ok(DMat4::from_cols_array(&columns))
}
