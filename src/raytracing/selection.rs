use crate::config::SelectionMethod;
use crate::geometry::{PipMode, Polygon, SurfaceType, Vector};

/// A surface chosen as reflector for one path.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Reflection point, the surface centroid.
    pub point: Vector,
    pub id: Option<String>,
    pub area: f64,
}

impl Candidate {
    fn from_polygon(polygon: &Polygon) -> Self {
        Self {
            point: polygon.centroid(),
            id: polygon.id().map(str::to_string),
            area: polygon.area(),
        }
    }
}

/// Reflector candidates among `polygons` for a path leaving `start`.
///
/// A polygon qualifies when it is not a ground footprint, its centroid
/// lies inside `footprint` and, if `max_plane_distance` is positive, its
/// base plane is at most that far from `start`. The qualifying set is then
/// reduced according to `method`.
pub fn select_candidates<'a>(
    polygons: impl IntoIterator<Item = &'a Polygon>,
    footprint: &Polygon,
    start: &Vector,
    method: SelectionMethod,
    max_plane_distance: f64,
) -> Vec<Candidate> {
    let qualifying: Vec<&Polygon> = polygons
        .into_iter()
        .filter(|p| p.surface() != SurfaceType::Ground && p.len() >= 3)
        .filter(|p| match p.plane() {
            Some(plane) => max_plane_distance <= 0.0 || plane.distance_to_point(start) <= max_plane_distance,
            None => false,
        })
        .filter(|p| footprint.is_point_in_polygon(&p.centroid(), PipMode::Flat))
        .collect();

    let chosen: Vec<&Polygon> = match method {
        SelectionMethod::All => qualifying,
        SelectionMethod::MaxArea => qualifying
            .into_iter()
            .max_by(|a, b| a.area().total_cmp(&b.area()))
            .into_iter()
            .collect(),
        SelectionMethod::MinDistance => qualifying
            .into_iter()
            .min_by(|a, b| {
                a.centroid()
                    .distance(start)
                    .total_cmp(&b.centroid().distance(start))
            })
            .into_iter()
            .collect(),
    };

    chosen.into_iter().map(Candidate::from_polygon).collect()
}
