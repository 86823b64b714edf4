use crate::error::NormalizeError;
use crate::pipeline::types::{FieldRecord, NormalizedField};
use geo::{Area, BooleanOps};
use geo_types::{Coord, LineString, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which record attribute identifies a field when dissolving.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FieldNameKey {
    #[default]
    Name,
    Crop,
    Hybrid,
}

impl FieldNameKey {
    fn value<'a>(&self, record: &'a FieldRecord) -> Option<&'a str> {
        let value = match self {
            Self::Name => record.name.as_deref(),
            Self::Crop => record.crop_name.as_deref(),
            Self::Hybrid => record.hybrid_name.as_deref(),
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Crop => "crop_name",
            Self::Hybrid => "hybrid_name",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NormalizeOutput {
    pub fields: Vec<NormalizedField>,
    pub rejected: Vec<NormalizeError>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum GeoJson {
    Polygon {
        coordinates: Vec<Vec<Vec<f64>>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<Vec<f64>>>>,
    },
    Feature {
        #[serde(default)]
        geometry: Option<Box<GeoJson>>,
    },
}

fn to_ring(positions: &[Vec<f64>]) -> Result<LineString<f64>, String> {
    if positions.len() < 3 {
        return Err(format!("ring has {} position(s), need at least 3", positions.len()));
    }
    let coords = positions
        .iter()
        .map(|p| match p.as_slice() {
            [x, y, ..] if x.is_finite() && y.is_finite() => Ok(Coord { x: *x, y: *y }),
            _ => Err(format!("invalid position {:?}", p)),
        })
        .collect::<Result<Vec<_>, _>>()?;
    // Polygon::new closes the ring if the last position does not repeat the first
    Ok(LineString::from(coords))
}

fn to_polygon(rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>, String> {
    let (exterior, interiors) = rings
        .split_first()
        .ok_or_else(|| "polygon has no rings".to_string())?;
    let interiors = interiors
        .iter()
        .map(|r| to_ring(r))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(to_ring(exterior)?, interiors))
}

fn to_geo(geojson: GeoJson) -> Result<Option<MultiPolygon<f64>>, String> {
    match geojson {
        GeoJson::Polygon { coordinates } => Ok(Some(MultiPolygon(vec![to_polygon(&coordinates)?]))),
        GeoJson::MultiPolygon { coordinates } => {
            let polygons = coordinates
                .iter()
                .map(|p| to_polygon(p))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(MultiPolygon(polygons)))
        }
        GeoJson::Feature { geometry } => match geometry {
            Some(inner) => to_geo(*inner),
            None => Ok(None),
        },
    }
}

/// Parse a serialized GeoJSON polygon (or a Feature wrapping one).
///
/// Returns `Ok(None)` for a JSON `null` or a Feature without geometry.
pub fn parse_geometry(raw: &str) -> Result<Option<MultiPolygon<f64>>, String> {
    let parsed: Option<GeoJson> = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    match parsed {
        Some(geojson) => to_geo(geojson),
        None => Ok(None),
    }
}

fn ring_coords(ring: &LineString<f64>) -> Vec<[f64; 2]> {
    ring.coords().map(|c| [c.x, c.y]).collect()
}

fn polygon_coords(poly: &Polygon<f64>) -> Vec<Vec<[f64; 2]>> {
    std::iter::once(poly.exterior())
        .chain(poly.interiors().iter())
        .map(ring_coords)
        .collect()
}

/// Convert a dissolved field geometry back to a GeoJSON geometry object.
pub fn to_geojson(mp: &MultiPolygon<f64>) -> serde_json::Value {
    match mp.0.as_slice() {
        [single] => serde_json::json!({
            "type": "Polygon",
            "coordinates": polygon_coords(single),
        }),
        polygons => serde_json::json!({
            "type": "MultiPolygon",
            "coordinates": polygons.iter().map(polygon_coords).collect::<Vec<_>>(),
        }),
    }
}

/// Planar area of the dissolved geometry, in squared coordinate units.
pub fn geometry_area(mp: &MultiPolygon<f64>) -> f64 {
    mp.unsigned_area()
}

struct FieldGroup {
    name: String,
    parts: Vec<MultiPolygon<f64>>,
    hectares: f64,
    record_ids: Vec<String>,
}

impl FieldGroup {
    fn dissolve(self) -> NormalizedField {
        let mut parts = self.parts.into_iter();
        let geometry = match parts.next() {
            Some(first) => parts.fold(first, |acc, part| acc.union(&part)),
            None => MultiPolygon(vec![]),
        };
        NormalizedField {
            name: self.name,
            geometry,
            hectares: self.hectares,
            record_ids: self.record_ids,
        }
    }
}

/// Dissolve field records by `key`: drop rows without a usable area, union the
/// polygons of rows sharing a key and sum their hectares.
///
/// Rows with malformed geometry or no key value are rejected individually and
/// reported in [`NormalizeOutput::rejected`]; the rest of the batch proceeds.
pub fn normalize(records: &[FieldRecord], key: FieldNameKey) -> NormalizeOutput {
    let mut groups: Vec<FieldGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut rejected = Vec::new();

    for record in records {
        let geometry = match record.geometry.as_deref().map(parse_geometry) {
            None => None,
            Some(Ok(geometry)) => geometry,
            Some(Err(reason)) => {
                tracing::warn!("Rejecting field record {}: {}", record.id, reason);
                rejected.push(NormalizeError::Geometry {
                    record_id: record.id.clone(),
                    reason,
                });
                continue;
            }
        };

        let hectares = match record.hectares {
            None => continue,
            Some(h) if h == 0.0 => continue,
            Some(h) if !h.is_finite() || h < 0.0 => {
                tracing::warn!("Dropping field record {} with area {}", record.id, h);
                continue;
            }
            Some(h) => h,
        };

        let Some(name) = key.value(record) else {
            rejected.push(NormalizeError::MissingKey {
                record_id: record.id.clone(),
                key: key.label().to_string(),
            });
            continue;
        };

        let slot = *index.entry(name.to_string()).or_insert_with(|| {
            groups.push(FieldGroup {
                name: name.to_string(),
                parts: Vec::new(),
                hectares: 0.0,
                record_ids: Vec::new(),
            });
            groups.len() - 1
        });

        let group = &mut groups[slot];
        group.hectares += hectares;
        group.record_ids.push(record.id.clone());
        if let Some(geometry) = geometry {
            group.parts.push(geometry);
        }
    }

    let fields: Vec<NormalizedField> = groups.into_iter().map(FieldGroup::dissolve).collect();
    tracing::debug!(
        "Normalized {} record(s) into {} field(s), {} rejected",
        records.len(),
        fields.len(),
        rejected.len()
    );

    NormalizeOutput { fields, rejected }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> String {
        serde_json::json!({
            "type": "Polygon",
            "coordinates": [[
                [x0, y0], [x0 + size, y0], [x0 + size, y0 + size], [x0, y0 + size], [x0, y0]
            ]]
        })
        .to_string()
    }

    fn record(id: &str, name: &str, geometry: Option<String>, hectares: Option<f64>) -> FieldRecord {
        FieldRecord {
            id: id.to_string(),
            name: Some(name.to_string()),
            geometry,
            hectares,
            crop_name: None,
            hybrid_name: None,
        }
    }

    #[test]
    fn test_drops_null_and_zero_area() {
        let records = vec![
            record("1", "A", Some(square(0.0, 0.0, 1.0)), Some(0.0)),
            record("2", "B", Some(square(0.0, 0.0, 1.0)), None),
        ];
        let out = normalize(&records, FieldNameKey::Name);
        assert!(out.fields.is_empty());
        assert!(out.rejected.is_empty());
    }

    #[test]
    fn test_merges_duplicates_without_double_counting_overlap() {
        // Two 2x2 squares overlapping on a 1x2 strip
        let records = vec![
            record("1", "A", Some(square(0.0, 0.0, 2.0)), Some(2.0)),
            record("2", "A", Some(square(1.0, 0.0, 2.0)), Some(3.0)),
            record("3", "C", Some(square(10.0, 10.0, 1.0)), Some(4.0)),
        ];
        let out = normalize(&records, FieldNameKey::Name);

        assert_eq!(out.fields.len(), 2);
        let a = &out.fields[0];
        assert_eq!(a.name, "A");
        assert!((a.hectares - 5.0).abs() < 1e-9);
        assert_eq!(a.record_ids, vec!["1".to_string(), "2".to_string()]);
        assert!((geometry_area(&a.geometry) - 6.0).abs() < 1e-9);

        let c = &out.fields[1];
        assert_eq!(c.name, "C");
        assert!((c.hectares - 4.0).abs() < 1e-9);
        assert!((geometry_area(&c.geometry) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_disjoint_parts_become_multipolygon() {
        let records = vec![
            record("1", "A", Some(square(0.0, 0.0, 1.0)), Some(1.0)),
            record("2", "A", Some(square(5.0, 5.0, 1.0)), Some(1.0)),
        ];
        let out = normalize(&records, FieldNameKey::Name);
        assert_eq!(out.fields[0].geometry.0.len(), 2);
        assert!((geometry_area(&out.fields[0].geometry) - 2.0).abs() < 1e-9);
        assert_eq!(to_geojson(&out.fields[0].geometry)["type"], "MultiPolygon");
    }

    #[test]
    fn test_malformed_geometry_names_record_and_batch_continues() {
        let records = vec![
            record("bad-1", "A", Some("{\"type\": \"Polygon\"".to_string()), Some(1.0)),
            record("2", "B", Some(square(0.0, 0.0, 1.0)), Some(1.0)),
        ];
        let out = normalize(&records, FieldNameKey::Name);
        assert_eq!(out.fields.len(), 1);
        assert_eq!(out.fields[0].name, "B");
        match &out.rejected[..] {
            [NormalizeError::Geometry { record_id, .. }] => assert_eq!(record_id, "bad-1"),
            other => panic!("unexpected rejections: {:?}", other),
        }
    }

    #[test]
    fn test_missing_geometry_is_not_an_error() {
        let records = vec![record("1", "A", None, Some(3.0))];
        let out = normalize(&records, FieldNameKey::Name);
        assert_eq!(out.fields.len(), 1);
        assert!(out.fields[0].geometry.0.is_empty());
        assert!(out.rejected.is_empty());
    }

    #[test]
    fn test_group_by_crop_rejects_rows_without_crop() {
        let mut soy = record("1", "A", Some(square(0.0, 0.0, 1.0)), Some(1.0));
        soy.crop_name = Some("Soja".to_string());
        let no_crop = record("2", "B", Some(square(3.0, 0.0, 1.0)), Some(1.0));

        let out = normalize(&[soy, no_crop], FieldNameKey::Crop);
        assert_eq!(out.fields.len(), 1);
        assert_eq!(out.fields[0].name, "Soja");
        assert!(matches!(
            &out.rejected[0],
            NormalizeError::MissingKey { record_id, .. } if record_id == "2"
        ));
    }

    #[test]
    fn test_parse_geometry_variants() {
        let feature = r#"{"type": "Feature", "properties": {}, "geometry": {"type": "MultiPolygon",
            "coordinates": [[[[0,0],[1,0],[1,1],[0,0]]]]}}"#;
        let parsed = parse_geometry(feature).unwrap().unwrap();
        assert_eq!(parsed.0.len(), 1);

        assert!(parse_geometry("null").unwrap().is_none());
        assert!(parse_geometry(r#"{"type": "Feature", "geometry": null}"#)
            .unwrap()
            .is_none());
        assert!(parse_geometry(r#"{"type": "Point", "coordinates": [0, 0]}"#).is_err());
        assert!(parse_geometry(r#"{"type": "Polygon", "coordinates": [[[0,0],[1,1]]]}"#).is_err());
        assert!(parse_geometry(r#"{"type": "Polygon", "coordinates": []}"#).is_err());
    }
}
