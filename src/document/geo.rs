//! Geo-spatial values: legacy `{x, y}` points and GeoJSON geometries.
//!
//! Coordinates are always emitted as `[longitude, latitude]`, i.e. `[x, y]`.

use bson::{Bson, Document as BsonDocument, doc};

/// Legacy coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Flat legacy shape `{x, y}`.
    #[must_use]
    pub fn to_legacy(&self) -> BsonDocument {
        doc! { "x": self.x, "y": self.y }
    }

    fn coordinates(&self) -> Bson {
        Bson::Array(vec![Bson::Double(self.x), Bson::Double(self.y)])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeoJson {
    Point(Point),
    MultiPoint(Vec<Point>),
    LineString(Vec<Point>),
    /// Outer ring first, then holes. Rings are expected to be closed.
    Polygon(Vec<Vec<Point>>),
}

impl GeoJson {
    #[must_use]
    pub fn point(x: f64, y: f64) -> Self {
        Self::Point(Point::new(x, y))
    }

    #[must_use]
    pub fn polygon(ring: Vec<Point>) -> Self {
        Self::Polygon(vec![ring])
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Point(_) => "Point",
            Self::MultiPoint(_) => "MultiPoint",
            Self::LineString(_) => "LineString",
            Self::Polygon(_) => "Polygon",
        }
    }

    /// GeoJSON wire shape `{type, coordinates}`.
    #[must_use]
    pub fn to_document(&self) -> BsonDocument {
        let coordinates = match self {
            Self::Point(p) => p.coordinates(),
            Self::MultiPoint(points) | Self::LineString(points) => ring(points),
            Self::Polygon(rings) => Bson::Array(rings.iter().map(|r| ring(r)).collect()),
        };
        doc! { "type": self.type_name(), "coordinates": coordinates }
    }
}

impl From<Point> for GeoJson {
    fn from(p: Point) -> Self {
        Self::Point(p)
    }
}

fn ring(points: &[Point]) -> Bson {
    Bson::Array(points.iter().map(Point::coordinates).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_coordinates_are_lng_lat() {
        let d = GeoJson::point(100.0, 50.0).to_document();
        assert_eq!(d.get_str("type").unwrap(), "Point");
        let coords = d.get_array("coordinates").unwrap();
        assert_eq!(coords, &vec![Bson::Double(100.0), Bson::Double(50.0)]);
    }

    #[test]
    fn polygon_nests_rings() {
        let poly = GeoJson::polygon(vec![
            Point::new(0.0, 0.0),
            Point::new(100.0, 100.0),
            Point::new(100.0, 0.0),
            Point::new(0.0, 0.0),
        ]);
        let d = poly.to_document();
        assert_eq!(d.get_str("type").unwrap(), "Polygon");
        let rings = d.get_array("coordinates").unwrap();
        assert_eq!(rings.len(), 1);
        match &rings[0] {
            Bson::Array(points) => assert_eq!(points.len(), 4),
            other => panic!("unexpected ring {other:?}"),
        }
    }

    #[test]
    fn legacy_shape() {
        assert_eq!(Point::new(10.0, 20.0).to_legacy(), doc! { "x": 10.0, "y": 20.0 });
    }
}
