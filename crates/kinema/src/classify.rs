//! Geometric classification of Distance joints.
//!
//! A Distance joint is realized by a different solver primitive depending on
//! what its two endpoints are: two planes become a planar joint, a plane and a
//! cylinder a line-in-plane joint, and so on. [`classify_features`] decides the
//! category for a pair of element descriptors and whether the pair has to be
//! swapped so the higher-priority feature sits on endpoint 1.

use kinema_geom::{CurveKind, ElementKind, ShapeQuery, SurfaceKind};
use kinema_ir::{JointDef, Reference};
use serde::{Deserialize, Serialize};

use crate::resolve::Resolver;

/// Category of a Distance joint, named after its canonical endpoint pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum DistanceType {
    PointPoint,
    LineLine,
    LineCircle,
    CircleCircle,

    PlanePlane,
    PlaneCylinder,
    PlaneSphere,
    PlaneCone,
    PlaneTorus,
    CylinderCylinder,
    CylinderSphere,
    CylinderCone,
    CylinderTorus,
    ConeCone,
    ConeTorus,
    ConeSphere,
    TorusTorus,
    TorusSphere,
    SphereSphere,

    PointPlane,
    PointCylinder,
    PointSphere,
    PointCone,
    PointTorus,

    LinePlane,
    LineCylinder,
    LineSphere,
    LineCone,
    LineTorus,

    CurvePlane,
    CurveCylinder,
    CurveSphere,
    CurveCone,
    CurveTorus,

    PointLine,
    PointCurve,

    Other,
}

/// What sits at one endpoint, as far as classification cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// A vertex.
    Vertex,
    /// An edge with its curve kind.
    Edge(CurveKind),
    /// A face with its surface kind.
    Face(SurfaceKind),
    /// Unrecognized element name.
    Unknown,
}

/// Result of classifying an endpoint pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// The category.
    pub distance_type: DistanceType,
    /// Whether the endpoints must be exchanged to reach canonical order.
    pub swapped: bool,
}

impl Classification {
    fn new(distance_type: DistanceType, swapped: bool) -> Self {
        Self {
            distance_type,
            swapped,
        }
    }
}

/// Rank of a surface in the face/face priority order, lower first.
fn surface_rank(kind: SurfaceKind) -> Option<u8> {
    match kind {
        SurfaceKind::Plane => Some(0),
        SurfaceKind::Cylinder => Some(1),
        SurfaceKind::Cone => Some(2),
        SurfaceKind::Torus => Some(3),
        SurfaceKind::Sphere => Some(4),
        _ => None,
    }
}

/// Face/face table, `first` being the higher-priority surface.
fn face_face(first: SurfaceKind, second: SurfaceKind) -> DistanceType {
    use DistanceType::*;
    use SurfaceKind as S;
    match (first, second) {
        (S::Plane, S::Plane) => PlanePlane,
        (S::Plane, S::Cylinder) => PlaneCylinder,
        (S::Plane, S::Sphere) => PlaneSphere,
        (S::Plane, S::Cone) => PlaneCone,
        (S::Plane, S::Torus) => PlaneTorus,
        (S::Cylinder, S::Cylinder) => CylinderCylinder,
        (S::Cylinder, S::Sphere) => CylinderSphere,
        (S::Cylinder, S::Cone) => CylinderCone,
        (S::Cylinder, S::Torus) => CylinderTorus,
        (S::Cone, S::Cone) => ConeCone,
        (S::Cone, S::Torus) => ConeTorus,
        (S::Cone, S::Sphere) => ConeSphere,
        (S::Torus, S::Torus) => TorusTorus,
        (S::Torus, S::Sphere) => TorusSphere,
        (S::Sphere, S::Sphere) => SphereSphere,
        _ => Other,
    }
}

fn vertex_face(face: SurfaceKind) -> DistanceType {
    match face {
        SurfaceKind::Plane => DistanceType::PointPlane,
        SurfaceKind::Cylinder => DistanceType::PointCylinder,
        SurfaceKind::Sphere => DistanceType::PointSphere,
        SurfaceKind::Cone => DistanceType::PointCone,
        SurfaceKind::Torus => DistanceType::PointTorus,
        _ => DistanceType::Other,
    }
}

fn edge_face(edge: CurveKind, face: SurfaceKind) -> DistanceType {
    use DistanceType::*;
    let line = edge == CurveKind::Line;
    match face {
        SurfaceKind::Plane if line => LinePlane,
        SurfaceKind::Cylinder if line => LineCylinder,
        SurfaceKind::Sphere if line => LineSphere,
        SurfaceKind::Cone if line => LineCone,
        SurfaceKind::Torus if line => LineTorus,
        SurfaceKind::Plane => CurvePlane,
        SurfaceKind::Cylinder => CurveCylinder,
        SurfaceKind::Sphere => CurveSphere,
        SurfaceKind::Cone => CurveCone,
        SurfaceKind::Torus => CurveTorus,
        _ => Other,
    }
}

fn edge_edge(c1: CurveKind, c2: CurveKind) -> Classification {
    use CurveKind::{Circle, Line};
    if c1 == Line || c2 == Line {
        // line first
        let swapped = c1 != Line;
        let other = if swapped { c1 } else { c2 };
        let ty = match other {
            Line => DistanceType::LineLine,
            Circle => DistanceType::LineCircle,
            _ => DistanceType::Other,
        };
        return Classification::new(ty, swapped);
    }
    if c1 == Circle || c2 == Circle {
        let swapped = c1 != Circle;
        let other = if swapped { c1 } else { c2 };
        let ty = if other == Circle {
            DistanceType::CircleCircle
        } else {
            DistanceType::Other
        };
        return Classification::new(ty, swapped);
    }
    Classification::new(DistanceType::Other, false)
}

/// Classify an endpoint pair and report whether it must be swapped.
pub fn classify_features(f1: Feature, f2: Feature) -> Classification {
    use Feature::*;
    match (f1, f2) {
        (Vertex, Vertex) => Classification::new(DistanceType::PointPoint, false),
        (Edge(c1), Edge(c2)) => edge_edge(c1, c2),
        (Face(s1), Face(s2)) => {
            let (r1, r2) = (surface_rank(s1), surface_rank(s2));
            match (r1, r2) {
                (None, None) => Classification::new(DistanceType::Other, false),
                _ => {
                    // an unranked surface never takes the first slot
                    let swapped = match (r1, r2) {
                        (Some(a), Some(b)) => b < a,
                        (None, Some(_)) => true,
                        _ => false,
                    };
                    let (first, second) = if swapped { (s2, s1) } else { (s1, s2) };
                    Classification::new(face_face(first, second), swapped)
                }
            }
        }
        // face first
        (Face(s), Vertex) => Classification::new(vertex_face(s), false),
        (Vertex, Face(s)) => Classification::new(vertex_face(s), true),
        (Face(s), Edge(c)) => Classification::new(edge_face(c, s), false),
        (Edge(c), Face(s)) => Classification::new(edge_face(c, s), true),
        // edge first
        (Edge(c), Vertex) => Classification::new(vertex_edge(c), false),
        (Vertex, Edge(c)) => Classification::new(vertex_edge(c), true),
        _ => Classification::new(DistanceType::Other, false),
    }
}

fn vertex_edge(edge: CurveKind) -> DistanceType {
    if edge == CurveKind::Line {
        DistanceType::PointLine
    } else {
        DistanceType::PointCurve
    }
}

/// Describe the element a reference points at.
///
/// Geometry is looked up on the link-resolved shape owner; an element the
/// kernel does not know keeps its topological kind with an `Other` geometry.
pub fn feature_of(resolver: &Resolver<'_>, shapes: &dyn ShapeQuery, reference: &Reference) -> Feature {
    let Some(kind) = reference.element_kind() else {
        return Feature::Unknown;
    };
    let owner = resolver
        .object(reference)
        .and_then(|o| resolver.linked_object(&o))
        .unwrap_or_default();
    let element = reference.element_name();
    match kind {
        ElementKind::Vertex => Feature::Vertex,
        ElementKind::Edge => Feature::Edge(shapes.curve_kind(&owner, element).unwrap_or(CurveKind::Other)),
        ElementKind::Face => {
            Feature::Face(shapes.surface_kind(&owner, element).unwrap_or(SurfaceKind::Other))
        }
    }
}

/// Classify a stored joint without touching it.
pub fn classify_joint(resolver: &Resolver<'_>, shapes: &dyn ShapeQuery, joint: &JointDef) -> Classification {
    let f1 = feature_of(resolver, shapes, &joint.reference1);
    let f2 = feature_of(resolver, shapes, &joint.reference2);
    classify_features(f1, f2)
}

/// Classify `joint` and bring it into canonical order, swapping references
/// and local frames together when needed.
pub fn canonicalize(resolver: &Resolver<'_>, shapes: &dyn ShapeQuery, joint: &mut JointDef) -> DistanceType {
    let classification = classify_joint(resolver, shapes, joint);
    if classification.swapped {
        joint.swap_endpoints();
    }
    classification.distance_type
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinema_geom::{Element, ShapeTable};
    use kinema_ir::{DocObject, Document, JointType, ObjectKind};
    use kinema_math::Placement;

    const SURFACES: [SurfaceKind; 5] = [
        SurfaceKind::Plane,
        SurfaceKind::Cylinder,
        SurfaceKind::Cone,
        SurfaceKind::Torus,
        SurfaceKind::Sphere,
    ];

    #[test]
    fn test_face_pairs_are_order_independent() {
        for (i, a) in SURFACES.iter().enumerate() {
            for (j, b) in SURFACES.iter().enumerate() {
                let ab = classify_features(Feature::Face(*a), Feature::Face(*b));
                let ba = classify_features(Feature::Face(*b), Feature::Face(*a));
                assert_eq!(ab.distance_type, ba.distance_type, "{a:?}/{b:?}");
                assert_ne!(ab.distance_type, DistanceType::Other);
                assert_eq!(ab.swapped, j < i, "{a:?}/{b:?}");
            }
        }
    }

    #[test]
    fn test_face_table() {
        let c = classify_features(Feature::Face(SurfaceKind::Sphere), Feature::Face(SurfaceKind::Plane));
        assert_eq!(c, Classification::new(DistanceType::PlaneSphere, true));
        let c = classify_features(Feature::Face(SurfaceKind::Cone), Feature::Face(SurfaceKind::Sphere));
        assert_eq!(c, Classification::new(DistanceType::ConeSphere, false));
        let c = classify_features(Feature::Face(SurfaceKind::BSpline), Feature::Face(SurfaceKind::Plane));
        assert_eq!(c, Classification::new(DistanceType::Other, true));
    }

    #[test]
    fn test_edges() {
        let line = Feature::Edge(CurveKind::Line);
        let circle = Feature::Edge(CurveKind::Circle);
        let spline = Feature::Edge(CurveKind::BSpline);
        assert_eq!(classify_features(line, line).distance_type, DistanceType::LineLine);
        assert_eq!(
            classify_features(circle, line),
            Classification::new(DistanceType::LineCircle, true)
        );
        assert_eq!(
            classify_features(spline, circle),
            Classification::new(DistanceType::Other, true)
        );
        assert_eq!(
            classify_features(circle, circle),
            Classification::new(DistanceType::CircleCircle, false)
        );
        assert_eq!(classify_features(spline, spline).distance_type, DistanceType::Other);
    }

    #[test]
    fn test_mixed_kinds() {
        let v = Feature::Vertex;
        assert_eq!(classify_features(v, v).distance_type, DistanceType::PointPoint);
        assert_eq!(
            classify_features(v, Feature::Face(SurfaceKind::Cylinder)),
            Classification::new(DistanceType::PointCylinder, true)
        );
        assert_eq!(
            classify_features(Feature::Face(SurfaceKind::Plane), Feature::Edge(CurveKind::Line)),
            Classification::new(DistanceType::LinePlane, false)
        );
        assert_eq!(
            classify_features(Feature::Edge(CurveKind::Circle), Feature::Face(SurfaceKind::Torus)),
            Classification::new(DistanceType::CurveTorus, true)
        );
        assert_eq!(
            classify_features(v, Feature::Edge(CurveKind::Line)),
            Classification::new(DistanceType::PointLine, true)
        );
        assert_eq!(
            classify_features(Feature::Edge(CurveKind::Ellipse), v).distance_type,
            DistanceType::PointCurve
        );
        assert_eq!(classify_features(Feature::Unknown, v).distance_type, DistanceType::Other);
    }

    #[test]
    fn test_canonicalize_swaps_joint() {
        let mut doc = Document::new();
        doc.add_object("Assembly", DocObject::new(ObjectKind::Assembly).with_children(["A", "B"]));
        doc.add_object("A", DocObject::new(ObjectKind::Feature));
        doc.add_object("B", DocObject::new(ObjectKind::Feature));
        let shapes = ShapeTable::new()
            .with("A", "Face1", Element::cylinder(2.0))
            .with("B", "Face3", Element::plane());
        let p1 = Placement::from_translation(1.0, 0.0, 0.0);
        let p2 = Placement::from_translation(0.0, 1.0, 0.0);
        let mut joint = JointDef::new(
            "Distance",
            JointType::Distance,
            Reference::new("Assembly", "A.Face1"),
            Reference::new("Assembly", "B.Face3"),
        )
        .with_placements(p1, p2);

        let ty = canonicalize(&Resolver::new(&doc), &shapes, &mut joint);
        assert_eq!(ty, DistanceType::PlaneCylinder);
        assert_eq!(joint.name, "Distance");
        assert_eq!(joint.reference1.sub, "B.Face3");
        assert_eq!(joint.placement1, p2);
        assert_eq!(joint.placement2, p1);

        // already canonical, stable
        assert_eq!(canonicalize(&Resolver::new(&doc), &shapes, &mut joint), DistanceType::PlaneCylinder);
        assert_eq!(joint.reference1.sub, "B.Face3");
    }
}
