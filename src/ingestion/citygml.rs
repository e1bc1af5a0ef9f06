use std::fs;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use tracing::{debug, warn};

use crate::geometry::{SurfaceType, Vector};
use crate::tiles::TileError;

/// Building-level roof attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoofInfo {
    pub roof_type: Option<String>,
    pub measured_height: Option<f64>,
}

/// One parsed building surface ring.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildingSurface {
    pub id: Option<String>,
    pub surface: SurfaceType,
    pub points: Vec<Vector>,
    pub roof: Option<RoofInfo>,
}

/// Parses a raw building file into surface records.
pub trait BuildingParser: Send + Sync {
    fn parse(&self, path: &Path) -> Result<Vec<BuildingSurface>, TileError>;
}

/// Streaming CityGML (LOD2) reader.
///
/// Emits one record per exterior ring of every `gml:Polygon` inside a
/// boundary surface; interior rings are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct CityGmlParser;

impl BuildingParser for CityGmlParser {
    fn parse(&self, path: &Path) -> Result<Vec<BuildingSurface>, TileError> {
        let xml = fs::read_to_string(path)?;
        self.parse_str(&xml)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    PosList,
    Pos,
    RoofType,
    MeasuredHeight,
}

fn surface_for(local: &[u8]) -> Option<SurfaceType> {
    match local {
        b"GroundSurface" => Some(SurfaceType::Ground),
        b"RoofSurface" => Some(SurfaceType::Roof),
        b"WallSurface" => Some(SurfaceType::Wall),
        b"ClosureSurface" | b"OuterCeilingSurface" | b"OuterFloorSurface" => {
            Some(SurfaceType::Other)
        }
        _ => None,
    }
}

fn gml_id(e: &BytesStart<'_>) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == b"id")
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

impl CityGmlParser {
    pub fn parse_str(&self, xml: &str) -> Result<Vec<BuildingSurface>, TileError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut records = Vec::new();
        let mut roof = RoofInfo::default();
        let mut surface: Option<(SurfaceType, Option<String>)> = None;
        let mut polygon_id: Option<String> = None;
        let mut ring: Vec<Vector> = Vec::new();
        let mut in_interior = false;
        let mut capture: Option<Capture> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let local = e.local_name();
                    match local.as_ref() {
                        b"Building" | b"BuildingPart" => roof = RoofInfo::default(),
                        b"roofType" => capture = Some(Capture::RoofType),
                        b"measuredHeight" => capture = Some(Capture::MeasuredHeight),
                        b"Polygon" if surface.is_some() => {
                            polygon_id = gml_id(&e);
                            ring.clear();
                        }
                        b"interior" => in_interior = true,
                        b"posList" if surface.is_some() && !in_interior => {
                            capture = Some(Capture::PosList)
                        }
                        b"pos" if surface.is_some() && !in_interior => {
                            capture = Some(Capture::Pos)
                        }
                        name => {
                            if let Some(kind) = surface_for(name) {
                                surface = Some((kind, gml_id(&e)));
                            }
                        }
                    }
                }
                Ok(Event::End(e)) => {
                    let local = e.local_name();
                    match local.as_ref() {
                        b"interior" => in_interior = false,
                        b"Polygon" => {
                            if let Some((kind, surface_id)) = &surface {
                                if ring.len() >= 3 {
                                    records.push(BuildingSurface {
                                        id: polygon_id.take().or_else(|| surface_id.clone()),
                                        surface: *kind,
                                        points: std::mem::take(&mut ring),
                                        roof: (roof != RoofInfo::default())
                                            .then(|| roof.clone()),
                                    });
                                } else if !ring.is_empty() {
                                    warn!(points = ring.len(), "Skipping degenerate ring");
                                    ring.clear();
                                }
                            }
                        }
                        name if surface_for(name).is_some() => surface = None,
                        _ => {}
                    }
                    capture = None;
                }
                Ok(Event::Text(t)) => {
                    let Some(what) = capture else { continue };
                    let text = t
                        .unescape()
                        .map_err(|e| TileError::Decode(format!("CityGML text: {e}")))?;
                    match what {
                        Capture::PosList | Capture::Pos => {
                            ring.extend(parse_coordinates(&text)?);
                        }
                        Capture::RoofType => roof.roof_type = Some(text.trim().to_string()),
                        Capture::MeasuredHeight => {
                            roof.measured_height = text.trim().parse::<f64>().ok()
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(TileError::Decode(format!(
                        "CityGML at byte {}: {e}",
                        reader.buffer_position()
                    )));
                }
                _ => {}
            }
        }

        debug!(surfaces = records.len(), "Parsed CityGML");
        Ok(records)
    }
}

/// Parse a whitespace-separated list of 3-D coordinates.
fn parse_coordinates(text: &str) -> Result<Vec<Vector>, TileError> {
    let values: Vec<f64> = text
        .split_whitespace()
        .map(str::parse::<f64>)
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| TileError::Decode(format!("bad coordinate: {e}")))?;
    if values.len() % 3 != 0 {
        return Err(TileError::Decode(format!(
            "{} coordinate values are not 3-D points",
            values.len()
        )));
    }
    Ok(values
        .chunks_exact(3)
        .map(|c| Vector::new(c[0], c[1], c[2]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<core:CityModel xmlns:core="http://www.opengis.net/citygml/2.0"
    xmlns:bldg="http://www.opengis.net/citygml/building/2.0"
    xmlns:gml="http://www.opengis.net/gml">
  <core:cityObjectMember>
    <bldg:Building gml:id="DENW_1">
      <bldg:roofType>1000</bldg:roofType>
      <bldg:measuredHeight uom="urn:adv:uom:m">6.5</bldg:measuredHeight>
      <bldg:boundedBy>
        <bldg:GroundSurface gml:id="ground-1">
          <bldg:lod2MultiSurface><gml:MultiSurface><gml:surfaceMember>
            <gml:Polygon gml:id="poly-ground">
              <gml:exterior><gml:LinearRing>
                <gml:posList srsDimension="3">0 0 100 10 0 100 10 10 100 0 10 100 0 0 100</gml:posList>
              </gml:LinearRing></gml:exterior>
            </gml:Polygon>
          </gml:surfaceMember></gml:MultiSurface></bldg:lod2MultiSurface>
        </bldg:GroundSurface>
      </bldg:boundedBy>
      <bldg:boundedBy>
        <bldg:WallSurface gml:id="wall-1">
          <bldg:lod2MultiSurface><gml:MultiSurface><gml:surfaceMember>
            <gml:Polygon>
              <gml:exterior><gml:LinearRing>
                <gml:pos>0 0 100</gml:pos>
                <gml:pos>10 0 100</gml:pos>
                <gml:pos>10 0 106.5</gml:pos>
                <gml:pos>0 0 106.5</gml:pos>
              </gml:LinearRing></gml:exterior>
              <gml:interior><gml:LinearRing>
                <gml:posList>2 0 101 3 0 101 3 0 102</gml:posList>
              </gml:LinearRing></gml:interior>
            </gml:Polygon>
          </gml:surfaceMember></gml:MultiSurface></bldg:lod2MultiSurface>
        </bldg:WallSurface>
      </bldg:boundedBy>
    </bldg:Building>
  </core:cityObjectMember>
</core:CityModel>
"#;

    #[test]
    fn parses_surfaces_and_roof_metadata() {
        let records = CityGmlParser.parse_str(SAMPLE).unwrap();
        assert_eq!(records.len(), 2);

        let ground = &records[0];
        assert_eq!(ground.surface, SurfaceType::Ground);
        assert_eq!(ground.id.as_deref(), Some("poly-ground"));
        assert_eq!(ground.points.len(), 5);
        assert_eq!(ground.points[2], Vector::new(10.0, 10.0, 100.0));
        let roof = ground.roof.as_ref().unwrap();
        assert_eq!(roof.roof_type.as_deref(), Some("1000"));
        assert_eq!(roof.measured_height, Some(6.5));

        let wall = &records[1];
        assert_eq!(wall.surface, SurfaceType::Wall);
        assert_eq!(wall.id.as_deref(), Some("wall-1"));
        assert_eq!(wall.points.len(), 4, "interior ring ignored");
    }

    #[test]
    fn polygons_outside_surfaces_are_ignored() {
        let xml = r#"<root xmlns:gml="http://www.opengis.net/gml">
            <gml:Polygon><gml:exterior><gml:LinearRing>
              <gml:posList>0 0 0 1 0 0 1 1 0</gml:posList>
            </gml:LinearRing></gml:exterior></gml:Polygon></root>"#;
        assert!(CityGmlParser.parse_str(xml).unwrap().is_empty());
    }

    #[test]
    fn malformed_coordinates_fail() {
        let xml = r#"<bldg:RoofSurface xmlns:bldg="b" xmlns:gml="g"><gml:Polygon>
            <gml:exterior><gml:LinearRing><gml:posList>0 0 0 1 0</gml:posList>
            </gml:LinearRing></gml:exterior></gml:Polygon></bldg:RoofSurface>"#;
        assert!(matches!(
            CityGmlParser.parse_str(xml),
            Err(TileError::Decode(_))
        ));
    }

    #[test]
    fn parser_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("352_5650.gml");
        fs::write(&path, SAMPLE).unwrap();
        assert_eq!(CityGmlParser.parse(&path).unwrap().len(), 2);
    }
}
