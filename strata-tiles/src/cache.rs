use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::Error;
use crate::externals::{AssetAccessor, AssetRequest, AssetResponse};
use crate::tile::{TileArena, TileHandle};

/// The per-tileset least-recently-visited list of tiles with loaded
/// content, threaded through the tiles' own link fields. Visited tiles move
/// to the tail, so the head is always the best eviction candidate.
#[derive(Default)]
pub struct LoadedTileList {
    head: Option<TileHandle>,
    tail: Option<TileHandle>,
    count: usize,
}

impl LoadedTileList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn head(&self) -> Option<TileHandle> {
        self.head
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn contains(&self, arena: &TileArena, tile: TileHandle) -> bool {
        arena.get(tile).map(|t| t.lru_linked).unwrap_or(false)
    }

    pub fn next(&self, arena: &TileArena, tile: TileHandle) -> Option<TileHandle> {
        arena.get(tile).and_then(|t| t.lru_next)
    }

    /// Moves the tile to the tail, linking it in first if needed.
    pub fn mark_visited(&mut self, arena: &mut TileArena, tile: TileHandle) {
        if self.tail == Some(tile) {
            return;
        }
        self.unlink(arena, tile);
        self.push_tail(arena, tile);
    }

    pub fn remove(&mut self, arena: &mut TileArena, tile: TileHandle) {
        self.unlink(arena, tile);
    }

    fn push_tail(&mut self, arena: &mut TileArena, tile: TileHandle) {
        let old_tail = self.tail;
        {
            let Some(t) = arena.get_mut(tile) else {
                return;
            };
            t.lru_prev = old_tail;
            t.lru_next = None;
            t.lru_linked = true;
        }
        match old_tail {
            Some(tail) => {
                if let Some(t) = arena.get_mut(tail) {
                    t.lru_next = Some(tile);
                }
            }
            None => self.head = Some(tile),
        }
        self.tail = Some(tile);
        self.count += 1;
    }

    fn unlink(&mut self, arena: &mut TileArena, tile: TileHandle) {
        let (prev, next) = match arena.get(tile) {
            Some(t) if t.lru_linked => (t.lru_prev, t.lru_next),
            _ => return,
        };
        match prev {
            Some(prev) => {
                if let Some(t) = arena.get_mut(prev) {
                    t.lru_next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(next) => {
                if let Some(t) = arena.get_mut(next) {
                    t.lru_prev = prev;
                }
            }
            None => self.tail = prev,
        }
        if let Some(t) = arena.get_mut(tile) {
            t.lru_prev = None;
            t.lru_next = None;
            t.lru_linked = false;
        }
        self.count -= 1;
    }
}

/// One tileset's footprint as seen by the [`TilesetGlobalCache`].
#[derive(Clone, Copy, Debug)]
struct TilesetCacheEntry {
    tileset_id: u64,
    data_bytes: i64,
    actively_rendering: bool,
}

/// Tracks recently-visible tilesets across the whole application so that
/// ones no longer on screen give their memory back first. Owned by the
/// embedder; each tileset reports in once per frame.
pub struct TilesetGlobalCache {
    pub maximum_total_bytes: i64,
    entries: Vec<TilesetCacheEntry>,
}

impl TilesetGlobalCache {
    pub fn new(maximum_total_bytes: i64) -> Self {
        Self {
            maximum_total_bytes,
            entries: Vec::new(),
        }
    }

    /// Records a tileset as the most recently visible one.
    pub fn update(&mut self, tileset_id: u64, data_bytes: i64, actively_rendering: bool) {
        self.entries.retain(|entry| entry.tileset_id != tileset_id);
        self.entries.push(TilesetCacheEntry {
            tileset_id,
            data_bytes,
            actively_rendering,
        });
    }

    pub fn remove(&mut self, tileset_id: u64) {
        self.entries.retain(|entry| entry.tileset_id != tileset_id);
    }

    /// Walks from the most recent tileset backwards accumulating data
    /// sizes; once the running total passes the budget, older tilesets
    /// should unload — unless they are actively rendering.
    pub fn tilesets_to_unload(&self) -> Vec<u64> {
        let mut total = 0i64;
        let mut to_unload = Vec::new();
        for entry in self.entries.iter().rev() {
            total += entry.data_bytes;
            if total > self.maximum_total_bytes && !entry.actively_rendering {
                to_unload.push(entry.tileset_id);
            }
        }
        to_unload
    }
}

/// Cache key: the full request identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

#[derive(Clone)]
pub struct CachedContent {
    pub response: AssetResponse,
    /// Opaque caller-attached bytes stored alongside the response, e.g.
    /// post-processed content.
    pub client_data: Option<bytes::Bytes>,
}

struct CacheSlot {
    content: CachedContent,
    last_used: u64,
}

/// An in-memory write-back cache of tile content responses with an item
/// cap. A persistent variant can live behind the same accessor interface.
pub struct TileContentCache {
    max_items: usize,
    counter: u64,
    slots: HashMap<CacheKey, CacheSlot>,
}

impl TileContentCache {
    pub fn new(max_items: usize) -> Self {
        Self {
            max_items: max_items.max(1),
            counter: 0,
            slots: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<CachedContent> {
        self.counter += 1;
        let counter = self.counter;
        self.slots.get_mut(key).map(|slot| {
            slot.last_used = counter;
            slot.content.clone()
        })
    }

    pub fn put(&mut self, key: CacheKey, content: CachedContent) {
        self.counter += 1;
        self.slots.insert(
            key,
            CacheSlot {
                content,
                last_used: self.counter,
            },
        );
        while self.slots.len() > self.max_items {
            let Some(oldest) = self
                .slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            self.slots.remove(&oldest);
        }
    }

    /// Attaches client data to an existing entry. Returns whether the
    /// entry existed.
    pub fn set_client_data(&mut self, key: &CacheKey, data: bytes::Bytes) -> bool {
        match self.slots.get_mut(key) {
            Some(slot) => {
                slot.content.client_data = Some(data);
                true
            }
            None => false,
        }
    }
}

/// Wraps an accessor with a [`TileContentCache`]: hits synthesize a
/// completed request without touching the network, misses delegate and
/// write back.
pub struct CachingAssetAccessor {
    inner: Arc<dyn AssetAccessor>,
    cache: Mutex<TileContentCache>,
}

impl CachingAssetAccessor {
    pub fn new(inner: Arc<dyn AssetAccessor>, max_items: usize) -> Self {
        Self {
            inner,
            cache: Mutex::new(TileContentCache::new(max_items)),
        }
    }

    pub fn client_data(&self, url: &str, headers: &[(String, String)]) -> Option<bytes::Bytes> {
        let key = CacheKey {
            url: url.to_string(),
            headers: headers.to_vec(),
        };
        self.cache
            .lock()
            .ok()
            .and_then(|mut cache| cache.get(&key))
            .and_then(|content| content.client_data)
    }

    pub fn set_client_data(
        &self,
        url: &str,
        headers: &[(String, String)],
        data: bytes::Bytes,
    ) -> bool {
        let key = CacheKey {
            url: url.to_string(),
            headers: headers.to_vec(),
        };
        self.cache
            .lock()
            .ok()
            .map(|mut cache| cache.set_client_data(&key, data))
            .unwrap_or(false)
    }
}

impl AssetAccessor for CachingAssetAccessor {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<AssetRequest, Error> {
        let key = CacheKey {
            url: url.to_string(),
            headers: headers.to_vec(),
        };
        if let Some(content) = self.cache.lock().ok().and_then(|mut cache| cache.get(&key)) {
            return Ok(AssetRequest {
                method: "GET".to_string(),
                url: url.to_string(),
                headers: headers.to_vec(),
                response: Some(content.response),
            });
        }
        let request = self.inner.get(url, headers)?;
        if let Some(response) = &request.response {
            if (200..300).contains(&response.status) {
                if let Ok(mut cache) = self.cache.lock() {
                    cache.put(
                        key,
                        CachedContent {
                            response: response.clone(),
                            client_data: None,
                        },
                    );
                }
            }
        }
        Ok(request)
    }

    fn request(
        &self,
        method: &str,
        url: &str,
        headers: &[(String, String)],
        body: &[u8],
    ) -> Result<AssetRequest, Error> {
        // Only GETs are cacheable.
        self.inner.request(method, url, headers, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use strata_geo::{BoundingSphere, BoundingVolume, QuadtreeTileId, TileId};

    use crate::tile::Tile;

    fn tile(arena: &mut TileArena, level: u32, x: u32) -> TileHandle {
        arena.insert(Tile::new(
            TileId::Quadtree(QuadtreeTileId::new(level, x, 0)),
            BoundingVolume::Sphere(BoundingSphere::new(glam::DVec3::ZERO, 1.0)),
            1.0,
        ))
    }

    #[test]
    fn visited_tiles_move_to_the_tail() {
        let mut arena = TileArena::new();
        let mut list = LoadedTileList::new();
        let a = tile(&mut arena, 1, 0);
        let b = tile(&mut arena, 1, 1);
        let c = tile(&mut arena, 1, 2);
        list.mark_visited(&mut arena, a);
        list.mark_visited(&mut arena, b);
        list.mark_visited(&mut arena, c);
        assert_eq!(list.head(), Some(a));
        assert_eq!(list.len(), 3);

        // Re-visiting the head sends it to the back.
        list.mark_visited(&mut arena, a);
        assert_eq!(list.head(), Some(b));
        assert_eq!(list.next(&arena, b), Some(c));
        assert_eq!(list.next(&arena, c), Some(a));
        assert_eq!(list.next(&arena, a), None);

        list.remove(&mut arena, c);
        assert_eq!(list.next(&arena, b), Some(a));
        assert_eq!(list.len(), 2);
        assert!(!list.contains(&arena, c));
    }

    #[test]
    fn global_cache_purges_older_inactive_tilesets() {
        let mut cache = TilesetGlobalCache::new(100);
        cache.update(1, 60, false);
        cache.update(2, 60, false);
        cache.update(3, 30, true);
        // Walking back: 3 (30), 2 (90), 1 (150 > 100, inactive) -> purge 1.
        assert_eq!(cache.tilesets_to_unload(), vec![1]);

        // An actively rendering tileset is spared even over budget.
        cache.update(1, 60, true);
        // Order now 2, 3, 1: 1 (60), 3 (90), 2 (150 > 100) -> purge 2.
        assert_eq!(cache.tilesets_to_unload(), vec![2]);
    }

    #[test]
    fn content_cache_caps_items_by_recency() {
        let mut cache = TileContentCache::new(2);
        let key = |url: &str| CacheKey {
            url: url.to_string(),
            headers: Vec::new(),
        };
        let content = CachedContent {
            response: AssetResponse {
                status: 200,
                content_type: None,
                headers: Vec::new(),
                data: bytes::Bytes::from_static(b"x"),
            },
            client_data: None,
        };
        cache.put(key("a"), content.clone());
        cache.put(key("b"), content.clone());
        assert!(cache.get(&key("a")).is_some());
        cache.put(key("c"), content.clone());
        assert_eq!(cache.len(), 2);
        // "b" was the least recently used.
        assert!(cache.get(&key("b")).is_none());
        assert!(cache.get(&key("a")).is_some());
        assert!(cache.get(&key("c")).is_some());
    }

    struct CountingAccessor {
        hits: AtomicU32,
    }

    impl AssetAccessor for CountingAccessor {
        fn get(&self, url: &str, headers: &[(String, String)]) -> Result<AssetRequest, Error> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(AssetRequest {
                method: "GET".to_string(),
                url: url.to_string(),
                headers: headers.to_vec(),
                response: Some(AssetResponse {
                    status: 200,
                    content_type: None,
                    headers: Vec::new(),
                    data: bytes::Bytes::from_static(b"payload"),
                }),
            })
        }

        fn request(
            &self,
            _method: &str,
            url: &str,
            headers: &[(String, String)],
            _body: &[u8],
        ) -> Result<AssetRequest, Error> {
            self.get(url, headers)
        }
    }

    #[test]
    fn caching_accessor_serves_hits_and_stores_client_data() {
        let inner = Arc::new(CountingAccessor {
            hits: AtomicU32::new(0),
        });
        let accessor = CachingAssetAccessor::new(inner.clone(), 16);
        let headers: Vec<(String, String)> = Vec::new();

        let first = accessor.get("https://x/t.b3dm", &headers).unwrap();
        assert_eq!(first.response.unwrap().data.as_ref(), b"payload");
        let second = accessor.get("https://x/t.b3dm", &headers).unwrap();
        assert_eq!(second.response.unwrap().data.as_ref(), b"payload");
        assert_eq!(inner.hits.load(Ordering::SeqCst), 1);

        // Different headers are a different cache identity.
        let other = vec![("Authorization".to_string(), "Bearer t".to_string())];
        accessor.get("https://x/t.b3dm", &other).unwrap();
        assert_eq!(inner.hits.load(Ordering::SeqCst), 2);

        assert!(accessor.set_client_data(
            "https://x/t.b3dm",
            &headers,
            bytes::Bytes::from_static(b"decoded")
        ));
        assert_eq!(
            accessor.client_data("https://x/t.b3dm", &headers).unwrap(),
            bytes::Bytes::from_static(b"decoded")
        );
        assert!(accessor.client_data("https://x/t.b3dm", &other).is_none());
    }
}
