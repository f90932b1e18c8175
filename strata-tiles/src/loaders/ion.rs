use std::sync::{Arc, Mutex, RwLock};

use serde::Deserialize;

use crate::error::Error;
use crate::tile::{Tile, TileDescription};

use super::{TileLoadInput, TileLoadResult, TileLoadResultState, TilesetContentLoader};

struct TokenInfo {
    token: String,
    generation: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndpointResponse {
    access_token: String,
}

/// Wraps another loader with Cesium ion authorization: every request
/// carries a bearer token, and a 401 triggers one deduplicated token
/// refresh against the asset endpoint followed by a single retry with the
/// fresh token. A 401 on that retry is a permanent failure, as is a
/// refresh that hands back the token that just failed.
pub struct IonTilesetLoader {
    inner: Arc<dyn TilesetContentLoader>,
    endpoint_url: String,
    token: RwLock<TokenInfo>,
    refresh_lock: Mutex<()>,
}

impl IonTilesetLoader {
    pub fn new(
        inner: Arc<dyn TilesetContentLoader>,
        endpoint_url: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            inner,
            endpoint_url: endpoint_url.into(),
            token: RwLock::new(TokenInfo {
                token: access_token.into(),
                generation: 0,
            }),
            refresh_lock: Mutex::new(()),
        }
    }

    /// The standard ion endpoint URL for an asset.
    pub fn endpoint_url(asset_id: u64, ion_access_token: &str) -> String {
        format!(
            "https://api.cesium.com/v1/assets/{asset_id}/endpoint?access_token={ion_access_token}"
        )
    }

    fn current_token(&self) -> (String, u64) {
        match self.token.read() {
            Ok(info) => (info.token.clone(), info.generation),
            Err(_) => (String::new(), 0),
        }
    }

    fn fetch_fresh_token(&self, input: &TileLoadInput) -> Result<String, Error> {
        let request = input
            .asset_accessor
            .get(&self.endpoint_url, &input.request_headers)?;
        let response = request.response.ok_or_else(|| Error::Request {
            url: self.endpoint_url.clone(),
            message: "no response from token endpoint".to_string(),
        })?;
        if !(200..300).contains(&response.status) {
            return Err(Error::HttpStatus {
                url: self.endpoint_url.clone(),
                status: response.status,
            });
        }
        let endpoint: EndpointResponse = serde_json::from_slice(&response.data)?;
        Ok(endpoint.access_token)
    }

    /// Refreshes the shared token once, no matter how many tiles hit 401
    /// concurrently, and returns the token to retry with. Errs when the
    /// endpoint is unreachable or mints the token that just failed.
    fn refreshed_token(&self, input: &TileLoadInput, used_generation: u64) -> Result<String, Error> {
        let (current, generation) = self.current_token();
        if generation != used_generation {
            // Someone already refreshed.
            return Ok(current);
        }
        let _guard = self.refresh_lock.lock().ok();
        let (stale_token, generation) = self.current_token();
        if generation != used_generation {
            return Ok(stale_token);
        }
        let token = self.fetch_fresh_token(input)?;
        if token == stale_token {
            return Err(Error::HttpStatus {
                url: self.endpoint_url.clone(),
                status: 401,
            });
        }
        log::info!("refreshed ion access token");
        if let Ok(mut info) = self.token.write() {
            info.token = token.clone();
            info.generation += 1;
        }
        Ok(token)
    }

    fn load_with_token(&self, input: &TileLoadInput, token: &str) -> TileLoadResult {
        let mut headers = input.request_headers.clone();
        headers.retain(|(name, _)| !name.eq_ignore_ascii_case("authorization"));
        headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        let authorized = TileLoadInput {
            tile_id: input.tile_id.clone(),
            asset_accessor: input.asset_accessor.clone(),
            request_headers: headers,
        };
        self.inner.load_tile_content(&authorized)
    }
}

impl TilesetContentLoader for IonTilesetLoader {
    fn load_tile_content(&self, input: &TileLoadInput) -> TileLoadResult {
        let (token, generation) = self.current_token();
        let result = self.load_with_token(input, &token);
        if result.state == TileLoadResultState::Success || result.status_code != Some(401) {
            return result;
        }
        let fresh = match self.refreshed_token(input, generation) {
            Ok(token) => token,
            Err(error) => return TileLoadResult::failed(error),
        };
        let mut retried = self.load_with_token(input, &fresh);
        if retried.state != TileLoadResultState::Success && retried.status_code == Some(401) {
            // The fresh token is rejected too; retrying cannot help.
            retried.state = TileLoadResultState::Failed;
        }
        retried
    }

    fn create_child_tiles(&self, tile: &Tile) -> Option<Vec<TileDescription>> {
        self.inner.create_child_tiles(tile)
    }
}
