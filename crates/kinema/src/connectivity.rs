//! Part connectivity over the active joint set.
//!
//! Every query is a pure function of two explicit inputs: the grounded parts
//! and the active joint edges. Questions of the form "would this part still
//! be connected without that joint" are answered by building a second
//! [`Connectivity`] over a filtered edge list instead of toggling joints.

use std::collections::HashSet;

use kinema_ir::{Document, JointType, ObjectId};
use tracing::warn;

use crate::resolve::Resolver;

/// One of the two endpoints of a joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Endpoint 1.
    First,
    /// Endpoint 2.
    Second,
}

impl Side {
    /// Endpoint number, 1 or 2.
    pub fn number(self) -> usize {
        match self {
            Side::First => 1,
            Side::Second => 2,
        }
    }

    /// The other endpoint.
    pub fn opposite(self) -> Side {
        match self {
            Side::First => Side::Second,
            Side::Second => Side::First,
        }
    }
}

/// A joint endpoint: the joint's index in the document plus a side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Index of the joint in [`Document::joints`].
    pub joint: usize,
    /// Which endpoint.
    pub side: Side,
}

/// An active joint reduced to what connectivity needs.
#[derive(Debug, Clone, PartialEq)]
pub struct JointEdge {
    /// Index of the joint in [`Document::joints`].
    pub joint: usize,
    /// Joint name.
    pub name: String,
    /// Joint type.
    pub joint_type: JointType,
    /// Moving part of endpoint 1.
    pub part1: ObjectId,
    /// Moving part of endpoint 2.
    pub part2: ObjectId,
}

impl JointEdge {
    /// Moving part at `side`.
    pub fn part(&self, side: Side) -> &ObjectId {
        match side {
            Side::First => &self.part1,
            Side::Second => &self.part2,
        }
    }

    /// Whether `part` sits at either endpoint.
    pub fn touches(&self, part: &str) -> bool {
        self.part1 == part || self.part2 == part
    }

    /// Whether this joint carries kinematic connectivity.
    pub fn is_connecting(&self) -> bool {
        is_connecting(self.joint_type)
    }
}

/// Coupling joints (rack-pinion, screw, gears, belt) relate motions but do
/// not attach a part to the rest of the assembly.
pub fn is_connecting(joint_type: JointType) -> bool {
    !matches!(
        joint_type,
        JointType::RackPinion | JointType::Screw | JointType::Gears | JointType::Belt
    )
}

/// A part discovered by a traversal and the endpoint it was reached through
/// (`None` for seeds).
#[derive(Debug, Clone, PartialEq)]
pub struct ObjRef {
    /// The part.
    pub part: ObjectId,
    /// Endpoint of the discovering joint on this part's side.
    pub via: Option<Endpoint>,
}

/// Active joints of a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveJoints {
    /// Joints with two resolvable, distinct moving parts.
    pub edges: Vec<JointEdge>,
    /// Names of activated joints with a missing or self-referencing endpoint.
    pub rejected: Vec<String>,
}

/// Collect the activated joints of `doc` whose endpoints resolve to two
/// different moving parts.
pub fn active_joints(doc: &Document) -> ActiveJoints {
    let resolver = Resolver::new(doc);
    let mut active = ActiveJoints::default();
    for (index, joint) in doc.joints.iter().enumerate() {
        if !joint.activated {
            continue;
        }
        let part1 = resolver.moving_part(&joint.reference1);
        let part2 = resolver.moving_part(&joint.reference2);
        match (part1, part2) {
            (Some(part1), Some(part2)) if part1 != part2 => active.edges.push(JointEdge {
                joint: index,
                name: joint.name.clone(),
                joint_type: joint.joint_type,
                part1,
                part2,
            }),
            _ => active.rejected.push(joint.name.clone()),
        }
    }
    active
}

/// Result of [`Connectivity::prune_unconnected`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pruned {
    /// Joints with both parts reachable from ground.
    pub kept: Vec<JointEdge>,
    /// Joints touching an unreachable part.
    pub removed: Vec<JointEdge>,
}

/// Connectivity queries over grounded parts and active joints.
#[derive(Debug, Clone, Copy)]
pub struct Connectivity<'a> {
    grounded: &'a [ObjectId],
    joints: &'a [JointEdge],
}

impl<'a> Connectivity<'a> {
    /// Create a view over `grounded` parts and `joints`.
    pub fn new(grounded: &'a [ObjectId], joints: &'a [JointEdge]) -> Self {
        Self { grounded, joints }
    }

    /// The joint edges this view was built from.
    pub fn joints(&self) -> &'a [JointEdge] {
        self.joints
    }

    fn edge(&self, joint: usize) -> Option<&'a JointEdge> {
        self.joints.iter().find(|e| e.joint == joint)
    }

    /// Whether `part` is held by a grounding record.
    pub fn is_part_grounded(&self, part: &str) -> bool {
        self.grounded.iter().any(|g| g == part)
    }

    /// Parts directly attached to `part` through connecting joints, each with
    /// the endpoint on the attached part's side.
    pub fn connected_parts(&self, part: &str) -> Vec<ObjRef> {
        let mut out = Vec::new();
        for edge in self.joints.iter().filter(|e| e.is_connecting()) {
            let side = if edge.part1 == part {
                Side::Second
            } else if edge.part2 == part {
                Side::First
            } else {
                continue;
            };
            out.push(ObjRef {
                part: edge.part(side).clone(),
                via: Some(Endpoint {
                    joint: edge.joint,
                    side,
                }),
            });
        }
        out
    }

    /// Every part reachable from `seeds` (seeds first, with no endpoint).
    pub fn reachable_from(&self, seeds: &[ObjectId]) -> Vec<ObjRef> {
        let mut visited: HashSet<ObjectId> = HashSet::new();
        let mut found = Vec::new();
        let mut stack = Vec::new();

        for seed in seeds {
            if visited.insert(seed.clone()) {
                found.push(ObjRef {
                    part: seed.clone(),
                    via: None,
                });
                stack.push(seed.clone());
            }
        }

        while let Some(current) = stack.pop() {
            for next in self.connected_parts(&current) {
                if !visited.insert(next.part.clone()) {
                    continue;
                }
                stack.push(next.part.clone());
                found.push(next);
            }
        }
        found
    }

    /// Every part reachable from the grounded parts.
    pub fn reachable_parts(&self) -> Vec<ObjRef> {
        self.reachable_from(self.grounded)
    }

    /// Whether `part` is grounded or reachable from a grounded part.
    pub fn is_part_connected(&self, part: &str) -> bool {
        self.reachable_parts().iter().any(|r| r.part == part)
    }

    /// Split the joints into those between reachable parts and the rest.
    /// The removed ones are logged.
    pub fn prune_unconnected(&self) -> Pruned {
        let reachable: HashSet<ObjectId> =
            self.reachable_parts().into_iter().map(|r| r.part).collect();
        let mut pruned = Pruned::default();
        for edge in self.joints {
            if reachable.contains(&edge.part1) && reachable.contains(&edge.part2) {
                pruned.kept.push(edge.clone());
            } else {
                warn!("{} is unconnected to a grounded part so it is ignored", edge.name);
                pruned.removed.push(edge.clone());
            }
        }
        pruned
    }

    /// Joints with `part` at either endpoint.
    pub fn joints_of_part(&self, part: &str) -> Vec<&'a JointEdge> {
        self.joints.iter().filter(|e| e.touches(part)).collect()
    }

    /// Whether the part at `side` of `joint` is connected to ground through
    /// that joint alone: it is not grounded itself, and stays connected when
    /// every other joint touching it is left out.
    pub fn is_joint_connecting_part_to_ground(&self, joint: usize, side: Side) -> bool {
        let Some(edge) = self.edge(joint) else {
            return false;
        };
        if !edge.is_connecting() {
            return false;
        }
        let part = edge.part(side);
        if self.is_part_grounded(part) || !self.is_part_connected(part) {
            return false;
        }
        let isolated: Vec<JointEdge> = self
            .joints
            .iter()
            .filter(|e| e.joint == joint || !e.touches(part))
            .cloned()
            .collect();
        Connectivity::new(self.grounded, &isolated).is_part_connected(part)
    }

    /// First joint of `part` found to connect an endpoint to ground, with
    /// the endpoint that tested positive.
    pub fn joint_of_part_connecting_to_ground(&self, part: &str) -> Option<Endpoint> {
        for edge in self.joints_of_part(part) {
            for side in [Side::First, Side::Second] {
                if self.is_joint_connecting_part_to_ground(edge.joint, side) {
                    return Some(Endpoint {
                        joint: edge.joint,
                        side,
                    });
                }
            }
        }
        None
    }

    /// Part on the far side of a ground-connecting endpoint.
    fn upstream_of(&self, endpoint: Endpoint) -> Option<&'a ObjectId> {
        self.edge(endpoint.joint)
            .map(|e| e.part(endpoint.side.opposite()))
    }

    /// Chain of parts from ground down to `part`, following each part's
    /// ground-connecting joint upstream. Ends early on a cycle or when a part
    /// has no such joint.
    pub fn upstream_parts(&self, part: &str) -> Vec<ObjectId> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(part.to_string());
        while let Some(p) = current.take() {
            if !visited.insert(p.clone()) {
                break;
            }
            chain.push(p.clone());
            if self.is_part_grounded(&p) {
                break;
            }
            current = self
                .joint_of_part_connecting_to_ground(&p)
                .and_then(|ep| self.upstream_of(ep))
                .cloned();
        }
        chain.reverse();
        chain
    }

    /// Walk upstream through Fixed joints to the first part attached by a
    /// movable joint. Returns that part and its ground-connecting endpoint.
    pub fn upstream_moving_part(&self, part: &str) -> Option<(ObjectId, Endpoint)> {
        let mut visited = HashSet::new();
        let mut current = part.to_string();
        loop {
            if self.is_part_grounded(&current) || !visited.insert(current.clone()) {
                return None;
            }
            let endpoint = self.joint_of_part_connecting_to_ground(&current)?;
            let edge = self.edge(endpoint.joint)?;
            if edge.joint_type != JointType::Fixed {
                return Some((current, endpoint));
            }
            current = self.upstream_of(endpoint)?.clone();
        }
    }

    /// Parts that lose their ground connection when `joint` is left out,
    /// found among those still attached to `part`.
    pub fn downstream_parts(&self, part: &str, joint: usize) -> Vec<ObjRef> {
        let without: Vec<JointEdge> = self
            .joints
            .iter()
            .filter(|e| e.joint != joint)
            .cloned()
            .collect();
        let reduced = Connectivity::new(self.grounded, &without);
        let grounded: HashSet<ObjectId> =
            reduced.reachable_parts().into_iter().map(|r| r.part).collect();
        reduced
            .reachable_from(&[part.to_string()])
            .into_iter()
            .filter(|r| r.part != part && !grounded.contains(&r.part))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(joint: usize, ty: JointType, a: &str, b: &str) -> JointEdge {
        JointEdge {
            joint,
            name: format!("J{joint}"),
            joint_type: ty,
            part1: a.into(),
            part2: b.into(),
        }
    }

    fn ids(refs: &[ObjRef]) -> Vec<&str> {
        let mut v: Vec<&str> = refs.iter().map(|r| r.part.as_str()).collect();
        v.sort_unstable();
        v
    }

    #[test]
    fn test_reachable_with_cycle() {
        let grounded = vec!["A".to_string()];
        let joints = vec![
            edge(0, JointType::Revolute, "A", "B"),
            edge(1, JointType::Revolute, "B", "C"),
            edge(2, JointType::Revolute, "C", "A"),
            edge(3, JointType::Revolute, "D", "E"),
        ];
        let c = Connectivity::new(&grounded, &joints);
        let reach = c.reachable_parts();
        assert_eq!(ids(&reach), vec!["A", "B", "C"]);
        assert_eq!(reach[0].via, None);
        assert!(c.is_part_connected("C"));
        assert!(!c.is_part_connected("D"));
    }

    #[test]
    fn test_prune_is_idempotent() {
        let grounded = vec!["A".to_string()];
        let joints = vec![
            edge(0, JointType::Revolute, "A", "B"),
            edge(1, JointType::Slider, "X", "Y"),
            edge(2, JointType::Fixed, "B", "C"),
        ];
        let first = Connectivity::new(&grounded, &joints).prune_unconnected();
        assert_eq!(first.kept.len(), 2);
        assert_eq!(first.removed[0].name, "J1");
        let second = Connectivity::new(&grounded, &first.kept).prune_unconnected();
        assert_eq!(second.kept, first.kept);
        assert!(second.removed.is_empty());
    }

    #[test]
    fn test_joint_between_grounded_parts_is_kept() {
        let grounded = vec!["A".to_string(), "B".to_string()];
        let joints = vec![edge(0, JointType::Distance, "A", "B")];
        let pruned = Connectivity::new(&grounded, &joints).prune_unconnected();
        assert_eq!(pruned.kept.len(), 1);
    }

    #[test]
    fn test_coupling_only_part_is_pruned() {
        let grounded = vec!["A".to_string()];
        for ty in [JointType::Gears, JointType::Belt, JointType::Screw, JointType::RackPinion] {
            let joints = vec![
                edge(0, JointType::Revolute, "A", "B"),
                edge(1, ty, "B", "C"),
            ];
            let c = Connectivity::new(&grounded, &joints);
            assert!(!c.is_part_connected("C"));
            let pruned = c.prune_unconnected();
            assert_eq!(pruned.removed.len(), 1, "{ty:?}");
            assert_eq!(pruned.removed[0].joint, 1);
        }
    }

    #[test]
    fn test_joint_connecting_to_ground() {
        // A(ground) -J0- B -J1- C, and a loop C -J2- A
        let grounded = vec!["A".to_string()];
        let chain = vec![
            edge(0, JointType::Revolute, "A", "B"),
            edge(1, JointType::Revolute, "B", "C"),
        ];
        let c = Connectivity::new(&grounded, &chain);
        assert!(c.is_joint_connecting_part_to_ground(0, Side::Second));
        assert!(!c.is_joint_connecting_part_to_ground(0, Side::First));
        assert!(c.is_joint_connecting_part_to_ground(1, Side::Second));
        assert_eq!(
            c.joint_of_part_connecting_to_ground("C"),
            Some(Endpoint { joint: 1, side: Side::Second })
        );

        let mut looped = chain.clone();
        looped.push(edge(2, JointType::Revolute, "C", "A"));
        let c = Connectivity::new(&grounded, &looped);
        // the loop gives B a second path to ground through C
        assert!(c.is_joint_connecting_part_to_ground(1, Side::First));
        assert!(c.is_joint_connecting_part_to_ground(2, Side::First));
        assert!(!c.is_joint_connecting_part_to_ground(2, Side::Second));
    }

    #[test]
    fn test_upstream_chain() {
        let grounded = vec!["A".to_string()];
        let joints = vec![
            edge(0, JointType::Revolute, "A", "B"),
            edge(1, JointType::Fixed, "B", "C"),
            edge(2, JointType::Fixed, "C", "D"),
        ];
        let c = Connectivity::new(&grounded, &joints);
        assert_eq!(c.upstream_parts("D"), vec!["A", "B", "C", "D"]);
        assert_eq!(c.upstream_parts("A"), vec!["A"]);

        let (part, endpoint) = c.upstream_moving_part("D").unwrap();
        assert_eq!(part, "B");
        assert_eq!(endpoint.joint, 0);
        assert_eq!(c.upstream_moving_part("A"), None);
    }

    #[test]
    fn test_upstream_of_unconnected_part() {
        let grounded = vec!["A".to_string()];
        let joints = vec![edge(0, JointType::Revolute, "X", "Y")];
        let c = Connectivity::new(&grounded, &joints);
        assert_eq!(c.upstream_parts("Y"), vec!["Y"]);
        assert_eq!(c.upstream_moving_part("Y"), None);
    }

    #[test]
    fn test_downstream_parts() {
        let grounded = vec!["A".to_string()];
        let joints = vec![
            edge(0, JointType::Revolute, "A", "B"),
            edge(1, JointType::Revolute, "B", "C"),
            edge(2, JointType::Fixed, "C", "D"),
            edge(3, JointType::Revolute, "A", "E"),
        ];
        let c = Connectivity::new(&grounded, &joints);
        assert_eq!(ids(&c.downstream_parts("B", 0)), vec!["C", "D"]);
        assert_eq!(ids(&c.downstream_parts("C", 1)), vec!["D"]);
        assert!(c.downstream_parts("E", 0).is_empty());
    }

    #[test]
    fn test_active_joints_rejects_bad_endpoints() {
        use kinema_ir::{DocObject, JointDef, ObjectKind, Reference};

        let mut doc = Document::new();
        doc.add_object("Assembly", DocObject::new(ObjectKind::Assembly).with_children(["A", "B"]));
        doc.add_object("A", DocObject::new(ObjectKind::Part));
        doc.add_object("B", DocObject::new(ObjectKind::Part));
        let r = |s: &str| Reference::new("Assembly", s);
        doc.joints.push(JointDef::new("Good", JointType::Revolute, r("A.Face1"), r("B.Face1")));
        doc.joints.push(JointDef::new("Self", JointType::Ball, r("A.Face1"), r("A.Edge1")));
        doc.joints.push(JointDef::new("Dangling", JointType::Fixed, r("A.Face1"), r("Gone.Face1")));
        let mut off = JointDef::new("Off", JointType::Revolute, r("A.Face1"), r("B.Face2"));
        off.activated = false;
        doc.joints.push(off);

        let active = active_joints(&doc);
        assert_eq!(active.edges.len(), 1);
        assert_eq!(active.edges[0].part2, "B");
        assert_eq!(active.rejected, vec!["Self", "Dangling"]);
    }
}
