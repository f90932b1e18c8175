//! Content loaders: each knows how to turn a tile ID into content bytes on
//! a worker thread, and how to describe a tile's children on the main
//! thread once that content has been applied.

mod ellipsoid;
mod implicit;
mod ion;
mod tileset_json;

pub use ellipsoid::EllipsoidTilesetLoader;
pub use implicit::{ImplicitLoader, SubdivisionScheme, SubtreeAvailability};
pub use ion::IonTilesetLoader;
pub use tileset_json::TilesetJsonLoader;

use std::sync::Arc;

use strata_geo::{BoundingVolume, TileId};

use crate::error::{Error, ErrorList};
use crate::externals::AssetAccessor;
use crate::tile::{Tile, TileContentKind, TileDescription};

/// Everything a loader may touch while producing content on a worker
/// thread. Deliberately contains no tile-tree references.
pub struct TileLoadInput {
    pub tile_id: TileId,
    pub asset_accessor: Arc<dyn AssetAccessor>,
    pub request_headers: Vec<(String, String)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileLoadResultState {
    Success,
    Failed,
    /// Transient failure; the tile goes back to eligible-for-loading.
    RetryLater,
}

pub struct TileLoadResult {
    pub state: TileLoadResultState,
    pub content: TileContentKind,
    pub updated_bounding_volume: Option<BoundingVolume>,
    /// HTTP status of the failing response, when that is what went wrong.
    pub status_code: Option<u16>,
    pub errors: ErrorList,
}

impl TileLoadResult {
    pub fn success(content: TileContentKind) -> Self {
        Self {
            state: TileLoadResultState::Success,
            content,
            updated_bounding_volume: None,
            status_code: None,
            errors: ErrorList::default(),
        }
    }

    pub fn failed(error: Error) -> Self {
        let status_code = error.status_code();
        Self {
            state: TileLoadResultState::Failed,
            content: TileContentKind::Unknown,
            updated_bounding_volume: None,
            status_code,
            errors: ErrorList::from_error(error),
        }
    }

    pub fn retry_later(error: Error) -> Self {
        let status_code = error.status_code();
        Self {
            state: TileLoadResultState::RetryLater,
            content: TileContentKind::Unknown,
            updated_bounding_volume: None,
            status_code,
            errors: ErrorList::from_error(error),
        }
    }
}

/// A source of tile content and tile hierarchy.
///
/// `load_tile_content` runs on worker threads and must not touch shared
/// tree state; `create_child_tiles` runs on the main thread after the load
/// result has been applied to the tile.
pub trait TilesetContentLoader: Send + Sync {
    fn load_tile_content(&self, input: &TileLoadInput) -> TileLoadResult;

    /// Descriptions for this tile's children, or `None` to leave the tile
    /// as it is. Children are instantiated by the caller in one batch.
    fn create_child_tiles(&self, tile: &Tile) -> Option<Vec<TileDescription>>;
}

/// Classifies an HTTP status for load-failure handling: server-side and
/// throttling statuses are worth retrying, client errors are not.
pub(crate) fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 429 || status == 408
}

/// Fetches one asset, mapping transport errors and retryable statuses to
/// `RetryLater` and hard HTTP failures to `Failed`.
pub(crate) fn fetch_bytes(
    accessor: &Arc<dyn AssetAccessor>,
    headers: &[(String, String)],
    url: &str,
) -> Result<bytes::Bytes, TileLoadResult> {
    let request = match accessor.get(url, headers) {
        Ok(request) => request,
        Err(error) => return Err(TileLoadResult::retry_later(error)),
    };
    let Some(response) = request.response else {
        return Err(TileLoadResult::retry_later(Error::Request {
            url: url.to_string(),
            message: "no response".to_string(),
        }));
    };
    if (200..300).contains(&response.status) {
        Ok(response.data)
    } else if is_retryable_status(response.status) {
        Err(TileLoadResult::retry_later(Error::HttpStatus {
            url: url.to_string(),
            status: response.status,
        }))
    } else {
        Err(TileLoadResult::failed(Error::HttpStatus {
            url: url.to_string(),
            status: response.status,
        }))
    }
}

/// Resolves `relative` against `base` the way a browser would, for the
/// common cases tileset URLs hit: absolute URLs pass through, leading `/`
/// replaces the path, anything else replaces the last path segment.
pub(crate) fn resolve_url(base: &str, relative: &str) -> String {
    if relative.starts_with("http://")
        || relative.starts_with("https://")
        || relative.starts_with("file://")
        || relative.starts_with("data:")
    {
        return relative.to_string();
    }
    let (origin, path) = match base.find("://") {
        Some(scheme_end) => {
            let after_scheme = scheme_end + 3;
            match base[after_scheme..].find('/') {
                Some(slash) => base.split_at(after_scheme + slash),
                None => (base, ""),
            }
        }
        None => ("", base),
    };
    let path = path.split(['?', '#']).next().unwrap_or("");
    if let Some(stripped) = relative.strip_prefix('/') {
        return format!("{origin}/{stripped}");
    }
    let directory = match path.rfind('/') {
        Some(slash) => &path[..=slash],
        None => "/",
    };
    format!("{origin}{directory}{relative}")
}
