//! Reference resolution.
//!
//! A [`Reference`] names an element through a dotted path of containers
//! (`"Part.Body.Face6"`) starting from a root object, usually the assembly.
//! Two different objects can be read off that path:
//!
//! - the **moving part**, the rigid body the solver simulates;
//! - the **shape owner**, the object the element (and the authored local
//!   frame) belongs to.
//!
//! Links switch the document context to their target's document, so a path
//! can run through several linked documents.

use std::collections::HashSet;

use kinema_ir::{qualify, split_id, DocObject, Document, ObjectId, ObjectKind, Reference};
use kinema_math::Placement;

/// Read-only view of a document answering reference questions.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    doc: &'a Document,
}

impl<'a> Resolver<'a> {
    /// Create a resolver over `doc`.
    pub fn new(doc: &'a Document) -> Self {
        Self { doc }
    }

    /// The underlying document.
    pub fn document(&self) -> &'a Document {
        self.doc
    }

    /// Follow a link chain starting at `obj` (in context `ctx`) to the first
    /// non-link object. Returns its context and name, `None` when the chain is
    /// broken or cyclic.
    fn follow_link<'s>(
        &self,
        ctx: Option<&'s str>,
        name: &'s str,
    ) -> Option<(Option<&'s str>, &'s str, &'a DocObject)>
    where
        'a: 's,
    {
        let mut ctx = ctx;
        let mut name = name;
        let mut seen = HashSet::new();
        loop {
            let obj = self.doc.lookup(ctx, name)?;
            if !seen.insert(qualify(ctx, name)) {
                return None;
            }
            match &obj.kind {
                ObjectKind::Link { target, document } => {
                    if let Some(d) = document {
                        ctx = Some(d.as_str());
                    }
                    name = target.as_str();
                }
                _ => return Some((ctx, name, obj)),
            }
        }
    }

    /// Context in which the children of `obj` live.
    fn child_context<'s>(
        &self,
        ctx: Option<&'s str>,
        name: &'s str,
        obj: &DocObject,
    ) -> Option<&'s str>
    where
        'a: 's,
    {
        if obj.is_link() {
            if let Some((target_ctx, _, _)) = self.follow_link(ctx, name) {
                return target_ctx;
            }
        }
        ctx
    }

    /// Qualified id of the object at the end of `id`'s link chain, or `id`
    /// itself when it is not a link.
    pub fn linked_object(&self, id: &str) -> Option<ObjectId> {
        let (ctx, name) = split_id(id);
        self.follow_link(ctx, name)
            .map(|(ctx, name, _)| qualify(ctx, name))
    }

    /// The rigid body that moves when `reference` moves.
    ///
    /// Walks the reference's root object followed by its path; nothing is
    /// selected before the walk has passed the assembly. Groups, link groups
    /// and flexible sub-assemblies are transparent.
    pub fn moving_part(&self, reference: &Reference) -> Option<ObjectId> {
        let (mut ctx, root) = split_id(&reference.object);
        let mut names = vec![root];
        names.extend(reference.names());

        let mut passed_assembly = false;
        for name in names {
            let Some(obj) = self.doc.lookup(ctx, name) else {
                continue;
            };
            let id = qualify(ctx, name);
            ctx = self.child_context(ctx, name, obj);

            if !passed_assembly {
                passed_assembly = id == self.doc.assembly;
                continue;
            }

            match obj.kind {
                ObjectKind::Group | ObjectKind::LinkGroup => continue,
                ObjectKind::SubAssembly { rigid: false } => continue,
                _ => return Some(id),
            }
        }
        None
    }

    /// The object owning the referenced element, the one the authored local
    /// frame is relative to.
    pub fn object(&self, reference: &Reference) -> Option<ObjectId> {
        let (mut ctx, _) = split_id(&reference.object);
        let names = reference.names();

        for (i, name) in names.iter().enumerate() {
            let obj = self.doc.lookup(ctx, name)?;
            let id = qualify(ctx, name);
            let next = names.get(i + 1).copied();

            match &obj.kind {
                ObjectKind::Group => continue,
                // the last-but-one name is the selection
                _ if i + 2 == names.len() => return Some(id),
                ObjectKind::Assembly
                | ObjectKind::Part
                | ObjectKind::SubAssembly { .. }
                | ObjectKind::LinkGroup => continue,
                ObjectKind::Body => return Some(self.body_child(ctx, obj, next).unwrap_or(id)),
                ObjectKind::Feature | ObjectKind::Datum => return Some(id),
                ObjectKind::Link { .. } => {
                    let (target_ctx, _, target) = self.follow_link(ctx, *name)?;
                    match target.kind {
                        ObjectKind::Body => {
                            return Some(self.body_child(target_ctx, target, next).unwrap_or(id))
                        }
                        ObjectKind::Feature | ObjectKind::Datum => return Some(id),
                        _ => ctx = target_ctx,
                    }
                }
            }
        }
        None
    }

    /// Datum or sketch child of `body` named `next`.
    fn body_child(&self, ctx: Option<&str>, body: &DocObject, next: Option<&str>) -> Option<ObjectId> {
        let next = next?;
        if !body.children.iter().any(|c| c == next) {
            return None;
        }
        let child = self.doc.lookup(ctx, next)?;
        matches!(child.kind, ObjectKind::Datum).then(|| qualify(ctx, next))
    }

    /// Global placement of `target`, composed along `reference`'s path from
    /// its root object. Identity when `target` is not on the path.
    pub fn global_placement(&self, target: &str, reference: &Reference) -> Placement {
        let (mut ctx, root_name) = split_id(&reference.object);
        let Some(root) = self.doc.lookup(ctx, root_name) else {
            return Placement::identity();
        };
        let mut plc = root.placement;
        if qualify(ctx, root_name) == target {
            return plc;
        }
        ctx = self.child_context(ctx, root_name, root);

        for name in reference.names() {
            let Some(obj) = self.doc.lookup(ctx, name) else {
                return Placement::identity();
            };
            plc = plc * obj.placement;
            if qualify(ctx, name) == target {
                return plc;
            }
            ctx = self.child_context(ctx, name, obj);
        }
        Placement::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinema_math::Vec3;

    /// Assembly
    /// ├─ Base (Part) ─ BaseBody (Body) ─ Sketch (Datum)
    /// ├─ Folder (Group) ─ Arm (Part) ─ ArmBox (Feature)
    /// ├─ Flex (flexible SubAssembly) ─ Link1 (Link -> lib#Bracket)
    /// └─ Stiff (rigid SubAssembly) ─ Pin (Feature)
    fn doc() -> Document {
        let mut doc = Document::new();
        doc.add_object(
            "Assembly",
            DocObject::new(ObjectKind::Assembly).with_children(["Base", "Folder", "Flex", "Stiff"]),
        );
        doc.add_object(
            "Base",
            DocObject::new(ObjectKind::Part)
                .at(Placement::from_translation(1.0, 0.0, 0.0))
                .with_children(["BaseBody"]),
        );
        doc.add_object(
            "BaseBody",
            DocObject::new(ObjectKind::Body)
                .at(Placement::from_translation(0.0, 2.0, 0.0))
                .with_children(["Sketch"]),
        );
        doc.add_object("Sketch", DocObject::new(ObjectKind::Datum));
        doc.add_object("Folder", DocObject::new(ObjectKind::Group).with_children(["Arm"]));
        doc.add_object("Arm", DocObject::new(ObjectKind::Part).with_children(["ArmBox"]));
        doc.add_object("ArmBox", DocObject::new(ObjectKind::Feature));
        doc.add_object(
            "Flex",
            DocObject::new(ObjectKind::SubAssembly { rigid: false }).with_children(["Link1"]),
        );
        doc.add_object(
            "Link1",
            DocObject::new(ObjectKind::Link {
                target: "Bracket".into(),
                document: Some("lib".into()),
            }),
        );
        doc.add_object(
            "Stiff",
            DocObject::new(ObjectKind::SubAssembly { rigid: true }).with_children(["Pin"]),
        );
        doc.add_object("Pin", DocObject::new(ObjectKind::Feature));

        let mut lib = Document::new();
        lib.add_object("Bracket", DocObject::new(ObjectKind::Part).with_children(["Plate"]));
        lib.add_object("Plate", DocObject::new(ObjectKind::Feature));
        doc.external.insert("lib".into(), lib);
        doc
    }

    fn r(sub: &str) -> Reference {
        Reference::new("Assembly", sub)
    }

    #[test]
    fn test_moving_part_skips_groups() {
        let doc = doc();
        let res = Resolver::new(&doc);
        assert_eq!(res.moving_part(&r("Base.BaseBody.Face1")).as_deref(), Some("Base"));
        assert_eq!(res.moving_part(&r("Folder.Arm.ArmBox.Edge2")).as_deref(), Some("Arm"));
    }

    #[test]
    fn test_moving_part_through_flexible_subassembly() {
        let doc = doc();
        let res = Resolver::new(&doc);
        // the flexible sub-assembly is transparent, the link is the part
        assert_eq!(res.moving_part(&r("Flex.Link1.Plate.Face1")).as_deref(), Some("Link1"));
        // a rigid one moves as a whole
        assert_eq!(res.moving_part(&r("Stiff.Pin.Face1")).as_deref(), Some("Stiff"));
    }

    #[test]
    fn test_moving_part_requires_assembly() {
        let doc = doc();
        let res = Resolver::new(&doc);
        assert_eq!(res.moving_part(&Reference::new("Base", "BaseBody.Face1")), None);
        assert_eq!(res.moving_part(&r("")), None);
    }

    #[test]
    fn test_object_rules() {
        let doc = doc();
        let res = Resolver::new(&doc);
        assert_eq!(res.object(&r("Base.BaseBody.Face1")).as_deref(), Some("BaseBody"));
        assert_eq!(res.object(&r("Base.BaseBody.Sketch.Edge1")).as_deref(), Some("Sketch"));
        assert_eq!(res.object(&r("Folder.Arm.ArmBox.Edge2")).as_deref(), Some("ArmBox"));
        assert_eq!(res.object(&r("Flex.Link1.Plate.Face1")).as_deref(), Some("lib#Plate"));
        assert_eq!(res.object(&r("Missing.Face1")), None);
    }

    #[test]
    fn test_linked_object() {
        let doc = doc();
        let res = Resolver::new(&doc);
        assert_eq!(res.linked_object("Link1").as_deref(), Some("lib#Bracket"));
        assert_eq!(res.linked_object("ArmBox").as_deref(), Some("ArmBox"));
        assert_eq!(res.linked_object("Nope"), None);
    }

    #[test]
    fn test_cyclic_link_is_broken() {
        let mut doc = doc();
        doc.add_object(
            "LoopA",
            DocObject::new(ObjectKind::Link { target: "LoopB".into(), document: None }),
        );
        doc.add_object(
            "LoopB",
            DocObject::new(ObjectKind::Link { target: "LoopA".into(), document: None }),
        );
        assert_eq!(Resolver::new(&doc).linked_object("LoopA"), None);
    }

    #[test]
    fn test_global_placement() {
        let doc = doc();
        let res = Resolver::new(&doc);
        let reference = r("Base.BaseBody.Face1");
        let body = res.global_placement("BaseBody", &reference);
        assert!((body.position() - Vec3::new(1.0, 2.0, 0.0)).norm() < 1e-12);
        let base = res.global_placement("Base", &reference);
        assert!((base.position() - Vec3::new(1.0, 0.0, 0.0)).norm() < 1e-12);
        assert!(res.global_placement("Assembly", &reference).is_identity());
        assert!(res.global_placement("Arm", &reference).is_identity());
    }
}
