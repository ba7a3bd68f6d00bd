//! Geometry helpers: WKT output, canonical normalization, union, simplify
//! and line subsampling.

use std::cmp::Ordering;
use std::fmt::Write;

use geo::{
    Area, BooleanOps, ConvexHull, Coord, CoordsIter, Geometry, GeometryCollection, LineString,
    MultiPolygon, Point, Polygon, Simplify,
};
use log::{debug, trace};

/// Context handed to [`GeometryOperator::apply`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperatorContext {
    /// Maximum number of vertices kept by [`GeometryOperator::SubsampleLine`].
    pub subsample_count: usize,
    /// Tolerance for [`GeometryOperator::Simplify`]; no simplification when unset.
    pub distance_tolerance: Option<f64>,
}

/// Geometry transformation applied by the location-style processors.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryOperator {
    Identity,
    SubsampleLine,
    Simplify,
    Normalize,
    /// Apply each operator in order.
    Chain(Vec<GeometryOperator>),
}

impl GeometryOperator {
    pub fn apply(&self, geometry: Geometry<f64>, context: &OperatorContext) -> Geometry<f64> {
        match self {
            GeometryOperator::Identity => geometry,
            GeometryOperator::SubsampleLine => subsample_line(geometry, context.subsample_count),
            GeometryOperator::Simplify => match context.distance_tolerance {
                Some(tolerance) => simplify(geometry, tolerance),
                None => geometry,
            },
            GeometryOperator::Normalize => normalize(geometry),
            GeometryOperator::Chain(operators) => operators
                .iter()
                .fold(geometry, |geometry, operator| operator.apply(geometry, context)),
        }
    }
}

/// Indices kept when reducing `len` samples to at most `count`.
pub fn subsample_indices(len: usize, count: usize) -> impl Iterator<Item = usize> {
    let keep = if count == 0 { len } else { len.min(count) };
    (0..keep).map(move |i| if keep < len { i * len / keep } else { i })
}

/// Keep at most `count` vertices of a line string. Other geometries pass through.
pub fn subsample_line(geometry: Geometry<f64>, count: usize) -> Geometry<f64> {
    match geometry {
        Geometry::LineString(line) if count > 0 && line.0.len() > count => {
            let coords = subsample_indices(line.0.len(), count).map(|i| line.0[i]).collect();
            Geometry::LineString(LineString::new(coords))
        }
        other => other,
    }
}

/// Douglas-Peucker simplification. The input is kept when the result
/// degenerates.
pub fn simplify(geometry: Geometry<f64>, tolerance: f64) -> Geometry<f64> {
    let simplified = match &geometry {
        Geometry::LineString(g) => Geometry::LineString(g.simplify(&tolerance)),
        Geometry::MultiLineString(g) => Geometry::MultiLineString(g.simplify(&tolerance)),
        Geometry::Polygon(g) => Geometry::Polygon(g.simplify(&tolerance)),
        Geometry::MultiPolygon(g) => Geometry::MultiPolygon(g.simplify(&tolerance)),
        _ => return geometry,
    };
    trace!(
        "Simplified {} -> {} coordinates",
        geometry.coords_count(),
        simplified.coords_count()
    );
    if is_valid(&simplified) {
        simplified
    } else {
        geometry
    }
}

/// Structural validity: finite coordinates, lines with at least two
/// vertices, closed rings with at least four vertices and non-zero area.
pub fn is_valid(geometry: &Geometry<f64>) -> bool {
    if !geometry.coords_iter().all(|c| c.x.is_finite() && c.y.is_finite()) {
        return false;
    }
    match geometry {
        Geometry::LineString(line) => line.0.len() >= 2,
        Geometry::MultiLineString(lines) => lines.0.iter().all(|l| l.0.len() >= 2),
        Geometry::Polygon(polygon) => is_valid_polygon(polygon),
        Geometry::MultiPolygon(polygons) => {
            !polygons.0.is_empty() && polygons.0.iter().all(is_valid_polygon)
        }
        Geometry::GeometryCollection(collection) => collection.0.iter().all(is_valid),
        _ => true,
    }
}

fn is_valid_polygon(polygon: &Polygon<f64>) -> bool {
    let ring_ok = |ring: &LineString<f64>| ring.0.len() >= 4 && ring.is_closed();
    ring_ok(polygon.exterior())
        && polygon.interiors().iter().all(ring_ok)
        && polygon.unsigned_area() > 0.0
}

/// A single point for one coordinate, otherwise a line string through all
/// of them in order.
pub fn points_to_line(points: &[Point<f64>]) -> Option<Geometry<f64>> {
    match points {
        [] => None,
        [point] => Some(Geometry::Point(*point)),
        _ => Some(Geometry::LineString(points.iter().map(|p| p.0).collect())),
    }
}

/// Union of polygons. Unusable inputs (zero area, non-finite) are skipped.
pub fn union_polygons(polygons: Vec<Polygon<f64>>) -> Option<Geometry<f64>> {
    let mut usable = polygons
        .into_iter()
        .filter(|p| is_valid(&Geometry::Polygon(p.clone())));
    let first = usable.next()?;
    let merged = usable.fold(MultiPolygon::new(vec![first]), |acc, polygon| {
        acc.union(&MultiPolygon::new(vec![polygon]))
    });
    Some(collapse(merged))
}

/// Merge two geometries. Polygonal inputs are unioned; anything else is
/// kept side by side in a collection.
pub fn merge(a: Geometry<f64>, b: Geometry<f64>) -> Geometry<f64> {
    match (polygons_of(&a), polygons_of(&b)) {
        (Some(mut left), Some(right)) => {
            left.extend(right);
            union_polygons(left).unwrap_or(a)
        }
        _ => {
            debug!("Merging non-polygonal geometries into a collection");
            let mut members = Vec::new();
            for geometry in [a, b] {
                match geometry {
                    Geometry::GeometryCollection(collection) => members.extend(collection.0),
                    other => members.push(other),
                }
            }
            Geometry::GeometryCollection(GeometryCollection::new_from(members))
        }
    }
}

/// Replace an invalid geometry by its convex hull; `None` when even the
/// hull is invalid.
pub fn repair(geometry: Geometry<f64>) -> Option<Geometry<f64>> {
    if is_valid(&geometry) {
        return Some(geometry);
    }
    let hull = Geometry::Polygon(geometry.convex_hull());
    is_valid(&hull).then_some(hull)
}

pub(crate) fn polygons_of(geometry: &Geometry<f64>) -> Option<Vec<Polygon<f64>>> {
    match geometry {
        Geometry::Polygon(p) => Some(vec![p.clone()]),
        Geometry::MultiPolygon(mp) => Some(mp.0.clone()),
        Geometry::Rect(r) => Some(vec![r.to_polygon()]),
        _ => None,
    }
}

fn collapse(mut merged: MultiPolygon<f64>) -> Geometry<f64> {
    if merged.0.len() == 1 {
        Geometry::Polygon(merged.0.remove(0))
    } else {
        Geometry::MultiPolygon(merged)
    }
}

/// Canonical form for comparison: line strings start at their smaller end,
/// polygon rings start at their smallest vertex with the shell clockwise
/// and holes counter-clockwise, and collection members are sorted.
pub fn normalize(geometry: Geometry<f64>) -> Geometry<f64> {
    match geometry {
        Geometry::LineString(line) => Geometry::LineString(normalize_line(line)),
        Geometry::Polygon(polygon) => Geometry::Polygon(normalize_polygon(polygon)),
        Geometry::MultiPoint(mut points) => {
            points.0.sort_by(|a, b| cmp_coord(&a.0, &b.0));
            Geometry::MultiPoint(points)
        }
        Geometry::MultiLineString(mut lines) => {
            lines.0 = lines.0.into_iter().map(normalize_line).collect();
            lines.0.sort_by(|a, b| cmp_coords(&a.0, &b.0));
            Geometry::MultiLineString(lines)
        }
        Geometry::MultiPolygon(mut polygons) => {
            polygons.0 = polygons.0.into_iter().map(normalize_polygon).collect();
            polygons.0.sort_by(|a, b| cmp_coords(&a.exterior().0, &b.exterior().0));
            Geometry::MultiPolygon(polygons)
        }
        Geometry::GeometryCollection(collection) => Geometry::GeometryCollection(
            GeometryCollection::new_from(collection.0.into_iter().map(normalize).collect()),
        ),
        Geometry::Rect(rect) => Geometry::Polygon(normalize_polygon(rect.to_polygon())),
        Geometry::Triangle(triangle) => Geometry::Polygon(normalize_polygon(triangle.to_polygon())),
        other => other,
    }
}

fn normalize_line(mut line: LineString<f64>) -> LineString<f64> {
    let n = line.0.len();
    for i in 0..n / 2 {
        match cmp_coord(&line.0[i], &line.0[n - 1 - i]) {
            Ordering::Less => break,
            Ordering::Greater => {
                line.0.reverse();
                break;
            }
            Ordering::Equal => {}
        }
    }
    line
}

fn normalize_polygon(polygon: Polygon<f64>) -> Polygon<f64> {
    let (exterior, interiors) = polygon.into_inner();
    let exterior = normalize_ring(exterior, true);
    let mut interiors: Vec<_> = interiors
        .into_iter()
        .map(|ring| normalize_ring(ring, false))
        .collect();
    interiors.sort_by(|a, b| cmp_coords(&a.0, &b.0));
    Polygon::new(exterior, interiors)
}

fn normalize_ring(ring: LineString<f64>, clockwise: bool) -> LineString<f64> {
    if ring.0.len() < 4 || !ring.is_closed() {
        return ring;
    }
    let mut unique = ring.0[..ring.0.len() - 1].to_vec();
    let start = unique
        .iter()
        .enumerate()
        .min_by(|a, b| cmp_coord(a.1, b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    unique.rotate_left(start);
    unique.push(unique[0]);
    if is_ccw(&unique) == clockwise {
        unique.reverse();
    }
    LineString::new(unique)
}

fn is_ccw(ring: &[Coord<f64>]) -> bool {
    let twice_area: f64 = ring.windows(2).map(|w| w[0].x * w[1].y - w[1].x * w[0].y).sum();
    twice_area > 0.0
}

fn cmp_coord(a: &Coord<f64>, b: &Coord<f64>) -> Ordering {
    a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y))
}

fn cmp_coords(a: &[Coord<f64>], b: &[Coord<f64>]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(a, b)| cmp_coord(a, b))
        .find(|o| o.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

/// Well-known text in the `POINT (x y)` / `POLYGON ((x y, ...))` style.
///
/// Coordinates use the shortest representation that parses back to the
/// same `f64`: `20` rather than `20.000000`, `2.123456789` rather than
/// `2.123457`.
pub fn to_wkt(geometry: &Geometry<f64>) -> String {
    let mut out = String::new();
    write_geometry(&mut out, geometry);
    out
}

fn write_geometry(out: &mut String, geometry: &Geometry<f64>) {
    match geometry {
        Geometry::Point(p) => {
            out.push_str("POINT (");
            write_coord(out, &p.0);
            out.push(')');
        }
        Geometry::Line(l) => {
            out.push_str("LINESTRING ");
            write_sequence(out, &[l.start, l.end]);
        }
        Geometry::LineString(l) => {
            if begin(out, "LINESTRING", l.0.is_empty()) {
                write_sequence(out, &l.0);
            }
        }
        Geometry::Polygon(p) => {
            if begin(out, "POLYGON", p.exterior().0.is_empty()) {
                write_polygon(out, p);
            }
        }
        Geometry::MultiPoint(mp) => {
            if begin(out, "MULTIPOINT", mp.0.is_empty()) {
                write_list(out, &mp.0, |out, p| {
                    out.push('(');
                    write_coord(out, &p.0);
                    out.push(')');
                });
            }
        }
        Geometry::MultiLineString(ml) => {
            if begin(out, "MULTILINESTRING", ml.0.is_empty()) {
                write_list(out, &ml.0, |out, l| write_sequence(out, &l.0));
            }
        }
        Geometry::MultiPolygon(mp) => {
            if begin(out, "MULTIPOLYGON", mp.0.is_empty()) {
                write_list(out, &mp.0, write_polygon);
            }
        }
        Geometry::GeometryCollection(gc) => {
            if begin(out, "GEOMETRYCOLLECTION", gc.0.is_empty()) {
                write_list(out, &gc.0, write_geometry);
            }
        }
        Geometry::Rect(r) => write_geometry(out, &Geometry::Polygon(r.to_polygon())),
        Geometry::Triangle(t) => write_geometry(out, &Geometry::Polygon(t.to_polygon())),
    }
}

/// Write the tag; returns false when the geometry is empty and no body follows.
fn begin(out: &mut String, tag: &str, empty: bool) -> bool {
    out.push_str(tag);
    if empty {
        out.push_str(" EMPTY");
        false
    } else {
        out.push(' ');
        true
    }
}

fn write_polygon(out: &mut String, polygon: &Polygon<f64>) {
    out.push('(');
    write_sequence(out, &polygon.exterior().0);
    for ring in polygon.interiors() {
        out.push_str(", ");
        write_sequence(out, &ring.0);
    }
    out.push(')');
}

fn write_list<T>(out: &mut String, items: &[T], item: impl Fn(&mut String, &T)) {
    out.push('(');
    for (i, value) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        item(out, value);
    }
    out.push(')');
}

fn write_sequence(out: &mut String, coords: &[Coord<f64>]) {
    write_list(out, coords, write_coord);
}

fn write_coord(out: &mut String, coord: &Coord<f64>) {
    let _ = write!(out, "{} {}", coord.x, coord.y);
}
