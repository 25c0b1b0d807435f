use super::as_f64;
use crate::{Error, Result};

use serde_json::{json, Value};

/// A point on the sphere, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Builds a point, rejecting coordinates outside the valid ranges.
    pub fn new(latitude: f64, longitude: f64) -> Result<GeoPoint> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(Error::invalid_json(
                "GeoPoint latitude and longitude must be valid numbers",
            ));
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::invalid_json(format!(
                "GeoPoint latitude out of bounds: {latitude}"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::invalid_json(format!(
                "GeoPoint longitude out of bounds: {longitude}"
            )));
        }
        Ok(GeoPoint {
            latitude,
            longitude,
        })
    }

    /// Parses `{"__type": "GeoPoint", "latitude": .., "longitude": ..}`. The
    /// `__type` tag is optional.
    pub fn from_json(value: &Value) -> Result<GeoPoint> {
        let Value::Object(object) = value else {
            return Err(Error::invalid_json(format!("invalid GeoPoint: {value}")));
        };

        if let Some(ty) = object.get("__type") {
            if ty != "GeoPoint" {
                return Err(Error::invalid_json(format!("invalid GeoPoint: {value}")));
            }
        }

        match (
            object.get("latitude").and_then(as_f64),
            object.get("longitude").and_then(as_f64),
        ) {
            (Some(latitude), Some(longitude)) => GeoPoint::new(latitude, longitude),
            _ => Err(Error::invalid_json(
                "GeoPoint latitude and longitude must be valid numbers",
            )),
        }
    }

    /// Parses a `[longitude, latitude]` pair.
    pub fn from_lng_lat(value: &Value) -> Result<GeoPoint> {
        match value.as_array().map(Vec::as_slice) {
            Some([lng, lat]) => match (as_f64(lat), as_f64(lng)) {
                (Some(latitude), Some(longitude)) => GeoPoint::new(latitude, longitude),
                _ => Err(Error::invalid_json(format!("invalid coordinate pair: {value}"))),
            },
            _ => Err(Error::invalid_json(format!("invalid coordinate pair: {value}"))),
        }
    }

    /// Parses either a GeoPoint object or a `[longitude, latitude]` pair.
    pub fn from_json_or_pair(value: &Value) -> Result<GeoPoint> {
        if value.is_array() {
            GeoPoint::from_lng_lat(value)
        } else {
            GeoPoint::from_json(value)
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "__type": "GeoPoint",
            "latitude": self.latitude,
            "longitude": self.longitude,
        })
    }
}

/// A closed ring of at least three distinct vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    /// Vertices in order; the last vertex repeats the first.
    pub ring: Vec<GeoPoint>,
}

impl Polygon {
    /// Parses `{"__type": "Polygon", "coordinates": [[lat, lng], ..]}`.
    pub fn from_json(value: &Value) -> Result<Polygon> {
        match value.get("coordinates") {
            Some(coordinates) if value.get("__type").and_then(Value::as_str) == Some("Polygon") => {
                Polygon::from_coordinates(coordinates)
            }
            _ => Err(Error::invalid_json(format!("invalid Polygon: {value}"))),
        }
    }

    /// Builds a polygon from `[latitude, longitude]` pairs, closing the ring
    /// when the last pair differs from the first.
    pub fn from_coordinates(coordinates: &Value) -> Result<Polygon> {
        let Some(pairs) = coordinates.as_array() else {
            return Err(Error::invalid_json("Polygon coordinates must be an array"));
        };

        if pairs.len() < 3 {
            return Err(Error::invalid_json("Polygon must have at least 3 values"));
        }

        let mut ring = pairs
            .iter()
            .map(|pair| match pair.as_array().map(Vec::as_slice) {
                Some([lat, lng]) => match (as_f64(lat), as_f64(lng)) {
                    (Some(latitude), Some(longitude)) => GeoPoint::new(latitude, longitude),
                    _ => Err(Error::invalid_json(format!("invalid Polygon vertex: {pair}"))),
                },
                _ => Err(Error::invalid_json(format!("invalid Polygon vertex: {pair}"))),
            })
            .collect::<Result<Vec<_>>>()?;

        Polygon::close(&mut ring);

        let mut distinct: Vec<GeoPoint> = vec![];
        for point in &ring {
            if !distinct.contains(point) {
                distinct.push(*point);
            }
        }
        if distinct.len() < 3 {
            return Err(Error::invalid_json(
                "GeoJSON: Loop must have at least 3 different vertices",
            ));
        }

        Ok(Polygon { ring })
    }

    fn close(ring: &mut Vec<GeoPoint>) {
        if ring.first() != ring.last() {
            if let Some(first) = ring.first().copied() {
                ring.push(first);
            }
        }
    }

    /// `[[lat, lng], ..]`, the JSON object model's coordinate order.
    pub fn coordinates(&self) -> Value {
        Value::Array(
            self.ring
                .iter()
                .map(|point| json!([point.latitude, point.longitude]))
                .collect(),
        )
    }

    pub fn to_json(&self) -> Value {
        json!({
            "__type": "Polygon",
            "coordinates": self.coordinates(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_ring_is_closed() {
        let polygon = Polygon::from_coordinates(&json!([[0, 0], [0, 1], [1, 1]])).unwrap();
        assert_eq!(polygon.ring.len(), 4);
        assert_eq!(polygon.ring.first(), polygon.ring.last());
    }

    #[test]
    fn closed_ring_is_kept() {
        let polygon =
            Polygon::from_coordinates(&json!([[0, 0], [0, 1], [1, 1], [0, 0]])).unwrap();
        assert_eq!(polygon.ring.len(), 4);
    }

    #[test]
    fn degenerate_ring() {
        let err = Polygon::from_coordinates(&json!([[0, 0], [0, 1], [0, 0]])).unwrap_err();
        assert!(err.is_invalid_json());
    }

    #[test]
    fn latitude_bounds() {
        assert!(GeoPoint::new(91.0, 0.0).unwrap_err().is_invalid_json());
        assert!(GeoPoint::new(0.0, -181.0).unwrap_err().is_invalid_json());
        assert!(GeoPoint::new(-90.0, 180.0).is_ok());
    }
}
