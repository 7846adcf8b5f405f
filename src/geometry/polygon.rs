//! Simple polygons over floor-plan coordinates
//!
//! Polygons are stored as an ordered vertex list and are implicitly closed:
//! the last vertex connects back to the first.

use serde::{Deserialize, Serialize};

use crate::core::{BoundingBox, Position};
use crate::validation::GeometryError;

/// Areas at or below this magnitude are treated as degenerate
const AREA_EPSILON: f64 = 1e-12;

/// Crossing-number containment test.
///
/// A ray is cast from `point` towards `+x`. An edge counts as a crossing when
/// it straddles the point's y-coordinate under the half-open rule
/// `y0 <= y < y1` (or `y1 <= y < y0`) and its intersection with the scan line
/// lies strictly to the right of the point. Vertical edges intersect the scan
/// line at their own x.
///
/// The half-open rule makes boundary points deterministic: points on a
/// bottom or left edge are inside, points on a top or right edge are outside.
pub fn point_in_polygon(vertices: &[Position], point: &Position) -> bool {
    let n = vertices.len();
    let mut crossings = 0usize;

    for i in 0..n {
        let a = vertices[i];
        let b = vertices[(i + 1) % n];

        let straddles = (a.y <= point.y && point.y < b.y) || (b.y <= point.y && point.y < a.y);
        if !straddles {
            continue;
        }

        let x_cross = if a.x == b.x {
            a.x
        } else {
            let slope = (b.y - a.y) / (b.x - a.x);
            a.x + (point.y - a.y) / slope
        };

        if point.x < x_cross {
            crossings += 1;
        }
    }

    crossings % 2 == 1
}

/// Axis-aligned extent of a vertex list, `None` when empty
pub fn bounding_box(vertices: &[Position]) -> Option<BoundingBox> {
    let first = vertices.first()?;
    let init = BoundingBox::new(first.x, first.y, first.x, first.y);
    Some(vertices.iter().skip(1).fold(init, |bbox, v| BoundingBox {
        min_x: bbox.min_x.min(v.x),
        min_y: bbox.min_y.min(v.y),
        max_x: bbox.max_x.max(v.x),
        max_y: bbox.max_y.max(v.y),
    }))
}

/// A closed polygon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<[f64; 2]>", into = "Vec<[f64; 2]>")]
pub struct Polygon {
    vertices: Vec<Position>,
}

impl From<Vec<[f64; 2]>> for Polygon {
    fn from(points: Vec<[f64; 2]>) -> Self {
        Self::new(points.into_iter().map(Position::from).collect())
    }
}

impl From<Polygon> for Vec<[f64; 2]> {
    fn from(polygon: Polygon) -> Self {
        polygon.vertices.iter().map(|v| [v.x, v.y]).collect()
    }
}

impl Polygon {
    /// Wrap a vertex list without validating it; see [`Polygon::validate`]
    pub fn new(vertices: Vec<Position>) -> Self {
        Self { vertices }
    }

    pub fn from_points(points: &[[f64; 2]]) -> Self {
        Self::new(points.iter().copied().map(Position::from).collect())
    }

    pub fn vertices(&self) -> &[Position] {
        &self.vertices
    }

    /// Edges in order, including the closing edge
    pub fn edges(&self) -> impl Iterator<Item = (Position, Position)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }

    pub fn contains(&self, point: &Position) -> bool {
        point_in_polygon(&self.vertices, point)
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        bounding_box(&self.vertices)
    }

    /// Shoelace area; positive for counter-clockwise winding
    pub fn signed_area(&self) -> f64 {
        self.edges().map(|(a, b)| a.x * b.y - b.x * a.y).sum::<f64>() / 2.0
    }

    /// Reject polygons the containment test is not defined for: fewer than
    /// three vertices, non-finite coordinates, repeated consecutive vertices,
    /// zero area, or crossing edges.
    pub fn validate(&self, name: &str) -> Result<(), GeometryError> {
        let n = self.vertices.len();
        if n < 3 {
            return Err(GeometryError::TooFewVertices { polygon: name.to_string(), count: n });
        }

        if let Some(index) = self.vertices.iter().position(|v| !v.is_finite()) {
            return Err(GeometryError::NonFiniteVertex { polygon: name.to_string(), index });
        }

        if let Some(index) = self.edges().position(|(a, b)| a == b) {
            return Err(GeometryError::ZeroLengthEdge { polygon: name.to_string(), index });
        }

        if self.signed_area().abs() <= AREA_EPSILON {
            return Err(GeometryError::ZeroArea { polygon: name.to_string() });
        }

        let edges: Vec<_> = self.edges().collect();
        for i in 0..n {
            for j in (i + 1)..n {
                // Neighbouring edges share a vertex by construction
                let adjacent = j == i + 1 || (i == 0 && j == n - 1);
                if adjacent {
                    continue;
                }
                if segments_intersect(edges[i], edges[j]) {
                    return Err(GeometryError::SelfIntersecting {
                        polygon: name.to_string(),
                        first_edge: i,
                        second_edge: j,
                    });
                }
            }
        }

        Ok(())
    }
}

fn orientation(a: Position, b: Position, c: Position) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn on_segment(a: Position, b: Position, p: Position) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

/// Closed-segment intersection, touching and collinear overlap included
fn segments_intersect((p1, p2): (Position, Position), (q1, q2): (Position, Position)) -> bool {
    let d1 = orientation(q1, q2, p1);
    let d2 = orientation(q1, q2, p2);
    let d3 = orientation(p1, p2, q1);
    let d4 = orientation(p1, p2, q2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && on_segment(q1, q2, p1))
        || (d2 == 0.0 && on_segment(q1, q2, p2))
        || (d3 == 0.0 && on_segment(p1, p2, q1))
        || (d4 == 0.0 && on_segment(p1, p2, q2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Polygon {
        Polygon::from_points(&[[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]])
    }

    #[test]
    fn test_square_interior_and_exterior() {
        let sq = square();
        assert!(sq.contains(&Position::new(5.0, 5.0)));
        assert!(!sq.contains(&Position::new(15.0, 5.0)));
        assert!(!sq.contains(&Position::new(-0.1, 5.0)));
        assert!(!sq.contains(&Position::new(5.0, 10.5)));
    }

    #[test]
    fn test_boundary_follows_half_open_rule() {
        let sq = square();
        // Bottom and left edges are inside
        assert!(sq.contains(&Position::new(0.0, 5.0)));
        assert!(sq.contains(&Position::new(5.0, 0.0)));
        assert!(sq.contains(&Position::new(0.0, 0.0)));
        // Top and right edges are outside
        assert!(!sq.contains(&Position::new(10.0, 5.0)));
        assert!(!sq.contains(&Position::new(5.0, 10.0)));
        assert!(!sq.contains(&Position::new(10.0, 10.0)));
        assert!(!sq.contains(&Position::new(10.0, 0.0)));
        assert!(!sq.contains(&Position::new(0.0, 10.0)));
    }

    #[test]
    fn test_winding_does_not_matter() {
        let clockwise = Polygon::from_points(&[[0.0, 0.0], [0.0, 10.0], [10.0, 10.0], [10.0, 0.0]]);
        assert!(clockwise.contains(&Position::new(5.0, 5.0)));
        assert!(clockwise.signed_area() < 0.0);
        assert!(square().signed_area() > 0.0);
    }

    #[test]
    fn test_concave_polygon() {
        // L-shape with the notch at the top right
        let l_shape = Polygon::from_points(&[
            [0.0, 0.0], [10.0, 0.0], [10.0, 4.0], [4.0, 4.0], [4.0, 10.0], [0.0, 10.0],
        ]);
        assert!(l_shape.contains(&Position::new(2.0, 8.0)));
        assert!(l_shape.contains(&Position::new(8.0, 2.0)));
        assert!(!l_shape.contains(&Position::new(8.0, 8.0)));
        // Scan line through the notch vertex height
        assert!(l_shape.contains(&Position::new(2.0, 4.0)));
    }

    #[test]
    fn test_sloped_edges() {
        let triangle = Polygon::from_points(&[[0.0, 0.0], [10.0, 0.0], [5.0, 10.0]]);
        assert!(triangle.contains(&Position::new(5.0, 5.0)));
        assert!(!triangle.contains(&Position::new(1.0, 8.0)));
        assert!(!triangle.contains(&Position::new(9.0, 8.0)));
    }

    #[test]
    fn test_bounding_box() {
        let tri = Polygon::from_points(&[[2.0, -1.0], [7.0, 3.0], [-4.0, 5.5]]);
        assert_eq!(tri.bounding_box(), Some(BoundingBox::new(-4.0, -1.0, 7.0, 5.5)));
        assert_eq!(bounding_box(&[]), None);
    }

    #[test]
    fn test_validate_accepts_simple_polygons() {
        assert!(square().validate("square").is_ok());
    }

    #[test]
    fn test_validate_rejects_degenerate_polygons() {
        let two = Polygon::from_points(&[[0.0, 0.0], [1.0, 1.0]]);
        assert_eq!(
            two.validate("line"),
            Err(GeometryError::TooFewVertices { polygon: "line".to_string(), count: 2 })
        );

        let repeated = Polygon::from_points(&[[0.0, 0.0], [1.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
        assert!(matches!(repeated.validate("r"), Err(GeometryError::ZeroLengthEdge { index: 1, .. })));

        let closed_explicitly = Polygon::from_points(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [0.0, 0.0]]);
        assert!(matches!(closed_explicitly.validate("c"), Err(GeometryError::ZeroLengthEdge { index: 3, .. })));

        let flat = Polygon::from_points(&[[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]]);
        assert!(matches!(flat.validate("flat"), Err(GeometryError::ZeroArea { .. })));
    }

    #[test]
    fn test_validate_rejects_bow_tie() {
        let bow_tie = Polygon::from_points(&[[0.0, 0.0], [10.0, 10.0], [10.0, 0.0], [0.0, 6.0]]);
        assert!(matches!(
            bow_tie.validate("bow"),
            Err(GeometryError::SelfIntersecting { first_edge: 0, second_edge: 2, .. })
        ));
    }

    #[test]
    fn test_serde_as_point_list() {
        let polygon: Polygon = serde_json::from_str("[[0,0],[4,0],[4,3]]").unwrap();
        assert_eq!(polygon.vertices().len(), 3);
        assert_eq!(serde_json::to_string(&polygon).unwrap(), "[[0.0,0.0],[4.0,0.0],[4.0,3.0]]");
    }
}
