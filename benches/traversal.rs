use criterion::{criterion_group, criterion_main, Criterion};
use terrain_raytracer::config::CacheSettings;
use terrain_raytracer::geometry::{PipMode, Plane, Polygon, SurfaceType, Vector};
use terrain_raytracer::ingestion::{CityGmlParser, XyzRasterDecoder};
use terrain_raytracer::raytracing::{evaluate_segment, fresnel_zone, traversal};
use terrain_raytracer::tiles::masking::mask_tile;
use terrain_raytracer::tiles::{GridTile, OfflineFetcher, TileCache, TileKey, TileKind};

const KEY: TileKey = TileKey::new(352, 5650);

/// Cache at 1 m resolution with one resident tile of each grid kind.
fn resident_cache(dir: &tempfile::TempDir) -> TileCache {
    let settings = CacheSettings {
        cache_dir: dir.path().join("cache"),
        raw_dir: dir.path().join("raw"),
        urls: Default::default(),
        resolution: 1.0,
        threads: 4,
    };
    let origin = Vector::new(352_000.0, 5_650_000.0, 0.0);
    for kind in TileKind::GRIDS {
        let path = settings.cache_dir.join(kind.as_str()).join(format!("{KEY}.bin"));
        GridTile::filled(1000, origin, 100.0, kind.as_str())
            .write_to(&path)
            .unwrap();
    }
    let mut cache = TileCache::with_collaborators(
        settings,
        Box::new(XyzRasterDecoder),
        Box::new(CityGmlParser),
        Box::new(OfflineFetcher),
    );
    for kind in TileKind::GRIDS {
        cache.load_grid(KEY, kind).unwrap();
    }
    cache
}

fn bench_traversal(c: &mut Criterion) {
    let start = Vector::new(352_001.5, 5_650_003.5, 150.0);
    let end = Vector::new(352_998.5, 5_650_902.5, 120.0);

    c.bench_function("walk_1km_1m_cells", |b| {
        b.iter(|| traversal::walk(&start, &end, 1.0));
    });

    let dir = tempfile::TempDir::new().unwrap();
    let cache = resident_cache(&dir);
    c.bench_function("evaluate_segment_1km_three_grids", |b| {
        b.iter(|| evaluate_segment(&cache, &start, &end, false).unwrap());
    });
}

fn bench_point_in_polygon(c: &mut Criterion) {
    let footprint = fresnel_zone(
        &Vector::new(352_000.0, 5_650_000.0, 30.0),
        &Vector::new(353_000.0, 5_651_000.0, 30.0),
        40.0,
    )
    .unwrap();
    let probes: Vec<Vector> = (0..1000)
        .map(|i| Vector::new(352_000.0 + i as f64, 5_650_000.0 + i as f64 * 0.97, 0.0))
        .collect();

    c.bench_function("pip_flat_fresnel_72_vertices_1k", |b| {
        b.iter(|| {
            probes
                .iter()
                .filter(|p| footprint.is_point_in_polygon(p, PipMode::Flat))
                .count()
        });
    });

    let plane = Plane::from_coefficients(1.0, 1.0, 0.0, -10_000.0).unwrap();
    let mut wall = Polygon::new(plane, SurfaceType::Wall);
    for (x, z) in [(0.0, 0.0), (40.0, 0.0), (40.0, 30.0), (0.0, 30.0)] {
        wall.add_point(Vector::new(x, 10_000.0 - x, z)).unwrap();
    }
    let probe = Vector::new(20.0, 9_980.0, 15.0);
    c.bench_function("pip_spatial_tilted_wall", |b| {
        b.iter(|| wall.is_point_in_polygon(&probe, PipMode::Spatial));
    });
}

fn bench_masking(c: &mut Criterion) {
    let dom = GridTile::filled(1000, Vector::new(352_000.0, 5_650_000.0, 0.0), 120.0, "dom");
    let footprints: Vec<Polygon> = (0..64)
        .map(|i| {
            let x0 = 352_020.0 + (i % 8) as f64 * 120.0;
            let y0 = 5_650_020.0 + (i / 8) as f64 * 120.0;
            let mut p = Polygon::new(Plane::horizontal(100.0), SurfaceType::Ground);
            for (x, y) in [(x0, y0), (x0 + 25.0, y0), (x0 + 25.0, y0 + 18.0), (x0, y0 + 18.0)] {
                p.add_point(Vector::new(x, y, 100.0)).unwrap();
            }
            p
        })
        .collect();

    c.bench_function("mask_tile_64_footprints_4_workers", |b| {
        b.iter(|| mask_tile(&dom, &footprints, 4).unwrap());
    });
}

criterion_group!(benches, bench_traversal, bench_point_in_polygon, bench_masking);
criterion_main!(benches);
