#![warn(missing_docs)]

//! Geometric feature descriptors for the kinema assembly solver.
//!
//! The solver never evaluates geometry itself. It only needs to know what
//! kind of sub-element a reference names (vertex, edge, face), the analytic
//! type of that element, and the radius of circular edges and curved faces.
//! [`ShapeQuery`] is the seam to whatever geometry kernel owns the shapes;
//! [`ShapeTable`] is the in-memory implementation stored with documents.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Element kinds
// =============================================================================

/// Topological kind of a named sub-element (`"Vertex3"`, `"Edge14"`, `"Face7"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    /// A point.
    Vertex,
    /// A curve.
    Edge,
    /// A surface patch.
    Face,
}

/// Error returned when an element name has no recognized kind prefix.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognized element type: {0:?}")]
pub struct ParseElementError(pub String);

impl FromStr for ElementKind {
    type Err = ParseElementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match element_type(s) {
            "Vertex" => Ok(Self::Vertex),
            "Edge" => Ok(Self::Edge),
            "Face" => Ok(Self::Face),
            other => Err(ParseElementError(other.to_string())),
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Vertex => "Vertex",
            Self::Edge => "Edge",
            Self::Face => "Face",
        };
        f.write_str(s)
    }
}

/// Alphabetic prefix of an element name: `"Edge14"` → `"Edge"`.
pub fn element_type(name: &str) -> &str {
    let end = name
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(name.len());
    &name[..end]
}

// =============================================================================
// Curve and surface kinds
// =============================================================================

/// The analytic type of an edge's curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CurveKind {
    /// Straight line segment.
    Line,
    /// Circle or circular arc.
    Circle,
    /// Ellipse or elliptic arc.
    Ellipse,
    /// B-spline or NURBS curve.
    BSpline,
    /// Anything else the kernel reports.
    Other,
}

/// The analytic type of a face's surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurfaceKind {
    /// Infinite plane.
    Plane,
    /// Cylindrical surface.
    Cylinder,
    /// Conical surface.
    Cone,
    /// Spherical surface.
    Sphere,
    /// Toroidal surface.
    Torus,
    /// B-spline or NURBS surface.
    BSpline,
    /// Anything else the kernel reports.
    Other,
}

// =============================================================================
// Elements
// =============================================================================

/// Descriptor of one sub-element of a shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Element {
    /// A vertex.
    Vertex,
    /// An edge with its curve type. `radius` is meaningful for circles only.
    Edge {
        /// Curve type.
        curve: CurveKind,
        /// Circle radius.
        #[serde(default)]
        radius: f64,
    },
    /// A face with its surface type. `radius` is meaningful for cylinders,
    /// spheres, cones (base) and tori (major).
    Face {
        /// Surface type.
        surface: SurfaceKind,
        /// Characteristic radius.
        #[serde(default)]
        radius: f64,
    },
}

impl Element {
    /// A vertex.
    pub fn vertex() -> Self {
        Self::Vertex
    }

    /// A straight edge.
    pub fn line() -> Self {
        Self::Edge {
            curve: CurveKind::Line,
            radius: 0.0,
        }
    }

    /// A circular edge of the given radius.
    pub fn circle(radius: f64) -> Self {
        Self::Edge {
            curve: CurveKind::Circle,
            radius,
        }
    }

    /// A planar face.
    pub fn plane() -> Self {
        Self::face(SurfaceKind::Plane, 0.0)
    }

    /// A cylindrical face of the given radius.
    pub fn cylinder(radius: f64) -> Self {
        Self::face(SurfaceKind::Cylinder, radius)
    }

    /// A spherical face of the given radius.
    pub fn sphere(radius: f64) -> Self {
        Self::face(SurfaceKind::Sphere, radius)
    }

    /// A face of any surface type.
    pub fn face(surface: SurfaceKind, radius: f64) -> Self {
        Self::Face { surface, radius }
    }

    /// Topological kind of this element.
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Vertex => ElementKind::Vertex,
            Self::Edge { .. } => ElementKind::Edge,
            Self::Face { .. } => ElementKind::Face,
        }
    }
}

// =============================================================================
// Geometry kernel seam
// =============================================================================

/// Read access to the geometry kernel.
///
/// Objects are addressed by their document-qualified id, elements by their
/// name within the object's shape.
pub trait ShapeQuery {
    /// Descriptor of `element` on `object`'s shape, if both exist.
    fn element(&self, object: &str, element: &str) -> Option<Element>;

    /// Curve type of an edge.
    fn curve_kind(&self, object: &str, element: &str) -> Option<CurveKind> {
        match self.element(object, element)? {
            Element::Edge { curve, .. } => Some(curve),
            _ => None,
        }
    }

    /// Surface type of a face.
    fn surface_kind(&self, object: &str, element: &str) -> Option<SurfaceKind> {
        match self.element(object, element)? {
            Element::Face { surface, .. } => Some(surface),
            _ => None,
        }
    }

    /// Radius of a circular edge, 0 for anything else.
    fn edge_radius(&self, object: &str, element: &str) -> f64 {
        match self.element(object, element) {
            Some(Element::Edge {
                curve: CurveKind::Circle,
                radius,
            }) => radius,
            _ => 0.0,
        }
    }

    /// Radius of a cylindrical or spherical face, 0 for anything else.
    fn face_radius(&self, object: &str, element: &str) -> f64 {
        match self.element(object, element) {
            Some(Element::Face {
                surface: SurfaceKind::Cylinder | SurfaceKind::Sphere,
                radius,
            }) => radius,
            _ => 0.0,
        }
    }
}

/// In-memory element table keyed by object id then element name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeTable {
    objects: BTreeMap<String, BTreeMap<String, Element>>,
}

impl ShapeTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `element` under `object`.
    pub fn insert(&mut self, object: impl Into<String>, name: impl Into<String>, element: Element) {
        self.objects
            .entry(object.into())
            .or_default()
            .insert(name.into(), element);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, object: impl Into<String>, name: impl Into<String>, element: Element) -> Self {
        self.insert(object, name, element);
        self
    }

    /// Number of elements registered for `object`.
    pub fn element_count(&self, object: &str) -> usize {
        self.objects.get(object).map_or(0, BTreeMap::len)
    }

    /// True when no element is registered.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ShapeQuery for ShapeTable {
    fn element(&self, object: &str, element: &str) -> Option<Element> {
        self.objects.get(object)?.get(element).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_type_prefix() {
        assert_eq!(element_type("Edge14"), "Edge");
        assert_eq!(element_type("Face7"), "Face");
        assert_eq!(element_type("Vertex"), "Vertex");
        assert_eq!(element_type("12"), "");
    }

    #[test]
    fn test_parse_element_kind() {
        assert_eq!("Vertex3".parse::<ElementKind>(), Ok(ElementKind::Vertex));
        assert_eq!("Edge1".parse::<ElementKind>(), Ok(ElementKind::Edge));
        assert_eq!("Face22".parse::<ElementKind>(), Ok(ElementKind::Face));
        assert!("Wire1".parse::<ElementKind>().is_err());
    }

    #[test]
    fn test_radius_queries() {
        let table = ShapeTable::new()
            .with("Box", "Edge1", Element::line())
            .with("Shaft", "Edge2", Element::circle(4.0))
            .with("Shaft", "Face1", Element::cylinder(2.0))
            .with("Ball", "Face1", Element::sphere(3.0))
            .with("Ring", "Face1", Element::face(SurfaceKind::Torus, 9.0));

        assert_eq!(table.edge_radius("Box", "Edge1"), 0.0);
        assert_eq!(table.edge_radius("Shaft", "Edge2"), 4.0);
        assert_eq!(table.face_radius("Shaft", "Face1"), 2.0);
        assert_eq!(table.face_radius("Ball", "Face1"), 3.0);
        assert_eq!(table.face_radius("Ring", "Face1"), 0.0);
        assert_eq!(table.face_radius("Missing", "Face1"), 0.0);
    }

    #[test]
    fn test_kind_queries() {
        let table = ShapeTable::new()
            .with("Box", "Face1", Element::plane())
            .with("Box", "Edge1", Element::line());
        assert_eq!(table.surface_kind("Box", "Face1"), Some(SurfaceKind::Plane));
        assert_eq!(table.surface_kind("Box", "Edge1"), None);
        assert_eq!(table.curve_kind("Box", "Edge1"), Some(CurveKind::Line));
        assert_eq!(table.element_count("Box"), 2);
        assert_eq!(table.element("Box", "Vertex1"), None);
    }

    #[test]
    fn test_table_json() {
        let table = ShapeTable::new().with("Shaft", "Face1", Element::cylinder(2.5));
        let json = serde_json::to_string(&table).unwrap();
        assert!(json.contains("\"type\":\"face\""));
        let back: ShapeTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }
}
