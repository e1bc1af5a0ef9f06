use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::CacheSettings;
use crate::ingestion::{
    BuildingParser, CityGmlParser, RasterDecoder, SourceFormat, XyzRasterDecoder,
};

use super::fetch::expand_url;
use super::masking::mask_tile;
use super::{Fetcher, GridTile, TileError, TileKey, TileKind, VectorTile};

/// Counters per acquisition tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub memory_hits: usize,
    pub cache_file_loads: usize,
    pub raw_loads: usize,
    pub downloads: usize,
    pub masked_derivations: usize,
}

/// Key-addressed store of grid and building tiles.
///
/// A tile is resolved through memory, the binary cache file, the raw source
/// file and finally a remote fetch of the raw source; each successful tier
/// populates the faster ones. Tiles stay resident for the lifetime of the
/// cache.
pub struct TileCache {
    settings: CacheSettings,
    grids: HashMap<(TileKey, TileKind), GridTile>,
    vectors: HashMap<TileKey, VectorTile>,
    decoder: Box<dyn RasterDecoder>,
    parser: Box<dyn BuildingParser>,
    fetcher: Box<dyn Fetcher>,
    stats: CacheStats,
}

impl TileCache {
    /// Cache with the built-in decoders and, with the `http` feature, an
    /// HTTP fetcher.
    pub fn new(settings: CacheSettings) -> Self {
        #[cfg(feature = "http")]
        let fetcher: Box<dyn Fetcher> = match super::fetch::HttpFetcher::new() {
            Ok(http) => Box::new(http),
            Err(e) => {
                warn!(%e, "HTTP fetcher unavailable, remote tiles disabled");
                Box::new(super::OfflineFetcher)
            }
        };
        #[cfg(not(feature = "http"))]
        let fetcher: Box<dyn Fetcher> = Box::new(super::OfflineFetcher);

        Self::with_collaborators(
            settings,
            Box::new(XyzRasterDecoder),
            Box::new(CityGmlParser),
            fetcher,
        )
    }

    pub fn with_collaborators(
        settings: CacheSettings,
        decoder: Box<dyn RasterDecoder>,
        parser: Box<dyn BuildingParser>,
        fetcher: Box<dyn Fetcher>,
    ) -> Self {
        Self {
            settings,
            grids: HashMap::new(),
            vectors: HashMap::new(),
            decoder,
            parser,
            fetcher,
            stats: CacheStats::default(),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Binary cache file of `(key, kind)`.
    pub fn cache_path(&self, key: TileKey, kind: TileKind) -> PathBuf {
        self.settings
            .cache_dir
            .join(kind.as_str())
            .join(format!("{key}.bin"))
    }

    /// Raw source file of `(key, kind)`.
    pub fn raw_path(&self, key: TileKey, kind: TileKind) -> PathBuf {
        self.settings
            .raw_dir
            .join(kind.as_str())
            .join(format!("{key}.{}", kind.raw_extension()))
    }

    /// Resident grid tile, without acquisition.
    pub fn grid(&self, key: TileKey, kind: TileKind) -> Option<&GridTile> {
        self.grids.get(&(key, kind))
    }

    /// Resident building tile, without acquisition.
    pub fn vector(&self, key: TileKey) -> Option<&VectorTile> {
        self.vectors.get(&key.snapped(TileKind::Lod2.width_km()))
    }

    /// Sample of the resident `kind` grid at the world point `(x, y)`.
    pub fn sample(&self, kind: TileKind, x: f64, y: f64) -> Result<f32, TileError> {
        let key = TileKey::for_point(x, y, kind);
        self.grid(key, kind)
            .ok_or(TileError::NotAvailable { key, kind })?
            .sample_at(x, y)
    }

    pub fn load_grid(&mut self, key: TileKey, kind: TileKind) -> Result<&GridTile, TileError> {
        if !kind.is_grid() {
            return Err(TileError::NotAvailable { key, kind });
        }
        let slot = (key, kind);
        if self.grids.contains_key(&slot) {
            self.stats.memory_hits += 1;
            return Ok(&self.grids[&slot]);
        }

        let cache_path = self.cache_path(key, kind);
        let tile = match self.read_grid_cache(&cache_path, key, kind) {
            Some(tile) => {
                self.stats.cache_file_loads += 1;
                tile
            }
            None => {
                let tile = match kind {
                    TileKind::DomMasked => self.derive_masked(key)?,
                    _ => self.grid_from_raw(key, kind)?,
                };
                if let Err(e) = tile.write_to(&cache_path) {
                    warn!(path = %cache_path.display(), error = %e, "Failed to write tile cache");
                }
                tile
            }
        };

        debug!(key = %key, kind = %kind, width = tile.width(), "Grid tile resident");
        Ok(self.grids.entry(slot).or_insert(tile))
    }

    pub fn load_vector(&mut self, key: TileKey) -> Result<&VectorTile, TileError> {
        let key = key.snapped(TileKind::Lod2.width_km());
        if self.vectors.contains_key(&key) {
            self.stats.memory_hits += 1;
            return Ok(&self.vectors[&key]);
        }

        let cache_path = self.cache_path(key, TileKind::Lod2);
        let tile = match self.read_vector_cache(&cache_path) {
            Some(tile) => {
                self.stats.cache_file_loads += 1;
                tile
            }
            None => {
                let raw = self.raw_source(key, TileKind::Lod2)?;
                let records = self.parser.parse(&raw)?;
                let tile = VectorTile::from_records(&records, key);
                self.stats.raw_loads += 1;
                if let Err(e) = tile.write_to(&cache_path) {
                    warn!(path = %cache_path.display(), error = %e, "Failed to write tile cache");
                }
                tile
            }
        };

        debug!(key = %key, polygons = tile.len(), "Building tile resident");
        Ok(self.vectors.entry(key).or_insert(tile))
    }

    fn read_grid_cache(&self, path: &Path, key: TileKey, kind: TileKind) -> Option<GridTile> {
        if !path.exists() {
            return None;
        }
        let expected = self.settings.grid_width();
        match GridTile::read_from(path, &format!("{kind}_{key}")) {
            Ok(tile) if tile.width() == expected && tile.rows() == expected => Some(tile),
            Ok(tile) => {
                warn!(
                    path = %path.display(),
                    width = tile.width(),
                    expected,
                    "Cached grid has a different resolution, rebuilding"
                );
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable grid cache, rebuilding");
                None
            }
        }
    }

    fn read_vector_cache(&self, path: &Path) -> Option<VectorTile> {
        if !path.exists() {
            return None;
        }
        VectorTile::read_from(path)
            .inspect_err(|e| {
                warn!(path = %path.display(), error = %e, "Unreadable building cache, rebuilding");
            })
            .ok()
    }

    fn grid_from_raw(&mut self, key: TileKey, kind: TileKind) -> Result<GridTile, TileError> {
        let raw = self.raw_source(key, kind)?;
        let raster = self.decoder.decode(&raw)?;
        self.stats.raw_loads += 1;
        Ok(GridTile::from_raster(
            &raster,
            key,
            self.settings.grid_width(),
            &format!("{kind}_{key}"),
        ))
    }

    /// DOM of `key` with the ground footprints of the covering building
    /// tile excised.
    fn derive_masked(&mut self, key: TileKey) -> Result<GridTile, TileError> {
        let threads = self.settings.threads;
        let dom = self.load_grid(key, TileKind::Dom)?.clone();
        let buildings = self.load_vector(key.snapped(TileKind::Lod2.width_km()))?;
        let masked = mask_tile(&dom, buildings.polygons(), threads)?;
        self.stats.masked_derivations += 1;
        info!(key = %key, "Derived masked surface tile");
        Ok(masked.with_name(format!("{}_{key}", TileKind::DomMasked)))
    }

    /// Local raw file for `(key, kind)`, downloading it first if absent.
    fn raw_source(&mut self, key: TileKey, kind: TileKind) -> Result<PathBuf, TileError> {
        let raw = self.raw_path(key, kind);
        if !raw.exists() {
            let Some(template) = self.settings.urls.template(kind) else {
                debug!(key = %key, kind = %kind, "No raw source and no URL");
                return Err(TileError::NotAvailable { key, kind });
            };
            let url = expand_url(template, key);
            if let Err(e) = self.fetcher.fetch(&url, &raw) {
                warn!(key = %key, kind = %kind, error = %e, "Raw source download failed");
                return Err(TileError::NotAvailable { key, kind });
            }
            self.stats.downloads += 1;
            info!(key = %key, kind = %kind, url, "Downloaded raw source");
        }

        let expected = match kind {
            TileKind::Lod2 => SourceFormat::CityGml,
            _ => SourceFormat::Xyz,
        };
        let found = SourceFormat::from_path(&raw)?;
        if found != expected {
            return Err(TileError::Decode(format!(
                "{} is {found}, expected {expected}",
                raw.display()
            )));
        }
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vector;
    use crate::tiles::{MASKED_VALUE, OfflineFetcher};
    use std::fs;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> CacheSettings {
        CacheSettings {
            cache_dir: dir.path().join("cache"),
            raw_dir: dir.path().join("raw"),
            urls: Default::default(),
            resolution: 100.0,
            threads: 2,
        }
    }

    fn offline(settings: CacheSettings) -> TileCache {
        TileCache::with_collaborators(
            settings,
            Box::new(XyzRasterDecoder),
            Box::new(CityGmlParser),
            Box::new(OfflineFetcher),
        )
    }

    /// Flat XYZ raster with 100 m spacing covering one tile.
    fn flat_xyz(key: TileKey, height: f64) -> String {
        let (ox, oy) = key.origin();
        let mut text = String::new();
        for row in 0..10 {
            for col in 0..10 {
                let x = ox + 50.0 + col as f64 * 100.0;
                let y = oy + 50.0 + row as f64 * 100.0;
                text.push_str(&format!("{x} {y} {height}\n"));
            }
        }
        text
    }

    fn write_raw(cache: &TileCache, key: TileKey, kind: TileKind, content: &str) {
        let path = cache.raw_path(key, kind);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    const KEY: TileKey = TileKey::new(352, 5650);

    #[test]
    fn missing_everywhere_is_not_available() {
        let dir = TempDir::new().unwrap();
        let mut cache = offline(settings(&dir));
        let err = cache.load_grid(KEY, TileKind::Dgm).unwrap_err();
        assert!(matches!(
            err,
            TileError::NotAvailable { key: KEY, kind: TileKind::Dgm }
        ));

        let mut s = settings(&dir);
        s.urls.dgm = Some("http://unreachable/{e}_{n}.xyz".into());
        let mut cache = offline(s);
        assert!(matches!(
            cache.load_grid(KEY, TileKind::Dgm),
            Err(TileError::NotAvailable { .. })
        ));
        assert_eq!(cache.stats().downloads, 0);
    }

    #[test]
    fn raw_load_then_memory_hit() {
        let dir = TempDir::new().unwrap();
        let mut cache = offline(settings(&dir));
        write_raw(&cache, KEY, TileKind::Dgm, &flat_xyz(KEY, 100.0));

        let first = cache.load_grid(KEY, TileKind::Dgm).unwrap().clone();
        assert_eq!(first.width(), 10);
        assert_eq!(first.name(), "dgm_352_5650");
        assert!(cache.cache_path(KEY, TileKind::Dgm).exists());

        let second = cache.load_grid(KEY, TileKind::Dgm).unwrap().clone();
        assert_eq!(first, second);
        assert_eq!(
            cache.stats(),
            CacheStats {
                memory_hits: 1,
                raw_loads: 1,
                ..Default::default()
            }
        );
        assert_eq!(cache.sample(TileKind::Dgm, 352_555.0, 5_650_555.0).unwrap(), 100.0);
    }

    #[test]
    fn cache_file_served_by_fresh_cache() {
        let dir = TempDir::new().unwrap();
        let mut cache = offline(settings(&dir));
        write_raw(&cache, KEY, TileKind::Dgm, &flat_xyz(KEY, 42.0));
        let built = cache.load_grid(KEY, TileKind::Dgm).unwrap().clone();

        fs::remove_file(cache.raw_path(KEY, TileKind::Dgm)).unwrap();
        let mut fresh = offline(settings(&dir));
        assert_eq!(fresh.load_grid(KEY, TileKind::Dgm).unwrap(), &built);
        assert_eq!(fresh.stats().cache_file_loads, 1);
        assert_eq!(fresh.stats().raw_loads, 0);
    }

    #[test]
    fn corrupt_cache_file_falls_through_to_raw() {
        let dir = TempDir::new().unwrap();
        let mut cache = offline(settings(&dir));
        write_raw(&cache, KEY, TileKind::Dgm, &flat_xyz(KEY, 7.0));
        let path = cache.cache_path(KEY, TileKind::Dgm);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"GTL1garbage").unwrap();

        let tile = cache.load_grid(KEY, TileKind::Dgm).unwrap();
        assert_eq!(tile.get(0, 0).unwrap(), 7.0);
        assert_eq!(cache.stats().raw_loads, 1);
        assert_eq!(cache.stats().cache_file_loads, 0);
    }

    #[test]
    fn cache_file_of_other_resolution_is_rebuilt() {
        let dir = TempDir::new().unwrap();
        let mut cache = offline(settings(&dir));
        write_raw(&cache, KEY, TileKind::Dgm, &flat_xyz(KEY, 7.0));
        GridTile::filled(4, Vector::new(352_000.0, 5_650_000.0, 0.0), 1.0, "old")
            .write_to(&cache.cache_path(KEY, TileKind::Dgm))
            .unwrap();

        assert_eq!(cache.load_grid(KEY, TileKind::Dgm).unwrap().width(), 10);
        assert_eq!(cache.stats().raw_loads, 1);
    }

    #[test]
    fn vector_tiles_snap_to_even_keys() {
        let dir = TempDir::new().unwrap();
        let mut cache = offline(settings(&dir));
        write_raw(&cache, KEY, TileKind::Lod2, "<root/>");

        assert!(cache.load_vector(TileKey::new(353, 5651)).unwrap().is_empty());
        assert!(cache.vector(TileKey::new(352, 5651)).is_some());
        cache.load_vector(KEY).unwrap();
        assert_eq!(cache.stats().memory_hits, 1);
        assert!(cache.cache_path(KEY, TileKind::Lod2).exists());
    }

    #[test]
    fn file_layout_per_kind() {
        let dir = TempDir::new().unwrap();
        let cache = offline(settings(&dir));
        assert_eq!(
            cache.raw_path(KEY, TileKind::Dgm),
            dir.path().join("raw").join("dgm").join("352_5650.xyz")
        );
        assert_eq!(
            cache.raw_path(KEY, TileKind::Lod2).file_name().unwrap(),
            "352_5650.gml"
        );
        assert_eq!(
            cache.cache_path(KEY, TileKind::DomMasked),
            dir.path().join("cache").join("dom_masked").join("352_5650.bin")
        );
    }

    #[test]
    fn undecodable_raw_source_fails() {
        let dir = TempDir::new().unwrap();
        let mut cache = offline(settings(&dir));
        write_raw(&cache, KEY, TileKind::Dgm, "not a raster\n");
        assert!(matches!(
            cache.load_grid(KEY, TileKind::Dgm),
            Err(TileError::Decode(_))
        ));
        assert!(!cache.cache_path(KEY, TileKind::Dgm).exists());
    }

    /// Writes a fixed body and counts requests.
    struct StubFetcher {
        body: String,
        calls: Arc<AtomicUsize>,
        urls: Arc<Mutex<Vec<String>>>,
    }

    impl Fetcher for StubFetcher {
        fn fetch(&self, url: &str, dest: &Path) -> Result<(), TileError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().unwrap().push(url.to_string());
            fs::create_dir_all(dest.parent().unwrap())?;
            fs::write(dest, &self.body)?;
            Ok(())
        }
    }

    #[test]
    fn remote_fetch_populates_raw_and_cache() {
        let dir = TempDir::new().unwrap();
        let mut s = settings(&dir);
        s.urls.dom = Some("https://example.org/dom/{e}/{n}.xyz".into());
        let calls = Arc::new(AtomicUsize::new(0));
        let urls = Arc::new(Mutex::new(Vec::new()));
        let mut cache = TileCache::with_collaborators(
            s,
            Box::new(XyzRasterDecoder),
            Box::new(CityGmlParser),
            Box::new(StubFetcher {
                body: flat_xyz(KEY, 130.0),
                calls: calls.clone(),
                urls: urls.clone(),
            }),
        );

        assert_eq!(cache.load_grid(KEY, TileKind::Dom).unwrap().get(5, 5).unwrap(), 130.0);
        cache.load_grid(KEY, TileKind::Dom).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(urls.lock().unwrap()[0], "https://example.org/dom/352/5650.xyz");
        assert!(cache.raw_path(KEY, TileKind::Dom).exists());
        assert_eq!(cache.stats().downloads, 1);
        assert_eq!(cache.stats().raw_loads, 1);
    }

    const BUILDING: &str = r#"<core:CityModel xmlns:core="c" xmlns:bldg="b" xmlns:gml="g">
  <bldg:Building gml:id="B1"><bldg:boundedBy><bldg:GroundSurface gml:id="G1">
    <gml:Polygon><gml:exterior><gml:LinearRing><gml:posList>
      352410 5650410 100 352590 5650410 100 352590 5650590 100 352410 5650590 100 352410 5650410 100
    </gml:posList></gml:LinearRing></gml:exterior></gml:Polygon>
  </bldg:GroundSurface></bldg:boundedBy></bldg:Building>
</core:CityModel>"#;

    #[test]
    fn masked_tile_is_derived_once_and_cached() {
        let dir = TempDir::new().unwrap();
        let mut cache = offline(settings(&dir));
        write_raw(&cache, KEY, TileKind::Dom, &flat_xyz(KEY, 130.0));
        write_raw(&cache, KEY, TileKind::Lod2, BUILDING);

        let masked = cache.load_grid(KEY, TileKind::DomMasked).unwrap().clone();
        assert_eq!(masked.name(), "dom_masked_352_5650");
        assert_eq!(masked.get(5, 5).unwrap(), MASKED_VALUE);
        assert_eq!(masked.get(0, 0).unwrap(), 130.0);
        assert_eq!(cache.stats().masked_derivations, 1);
        assert!(cache.grid(KEY, TileKind::Dom).is_some());

        let mut fresh = offline(settings(&dir));
        assert_eq!(fresh.load_grid(KEY, TileKind::DomMasked).unwrap(), &masked);
        assert_eq!(fresh.stats().masked_derivations, 0);
        assert_eq!(fresh.stats().cache_file_loads, 1);
    }

    #[test]
    fn building_kind_is_not_a_grid() {
        let dir = TempDir::new().unwrap();
        let mut cache = offline(settings(&dir));
        assert!(cache.load_grid(KEY, TileKind::Lod2).is_err());
        assert!(matches!(
            cache.sample(TileKind::Dgm, 352_500.0, 5_650_500.0),
            Err(TileError::NotAvailable { .. })
        ));
    }
}
