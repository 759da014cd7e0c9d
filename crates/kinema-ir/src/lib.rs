#![warn(missing_docs)]

//! Document model for the kinema assembly solver.
//!
//! A document is a flat table of named objects (containers, bodies, features,
//! links) plus the assembly-level records the solver consumes: joints,
//! grounding records, motions and simulations. Linked documents are carried
//! inline under [`Document::external`] and addressed with qualified ids of the
//! form `"doc#Name"`.
//!
//! The model is purely declarative. Resolution of references and all frame
//! math happen in the `kinema` crate.

mod joint;

use std::collections::BTreeMap;

use kinema_geom::ShapeTable;
use kinema_math::Placement;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use joint::{
    GroundRecord, JointDef, JointLimits, JointType, MotionDef, MotionType, Reference,
    SimulationDef,
};

/// Document-qualified object identifier: `"Name"` for objects of the root
/// document, `"doc#Name"` for objects of a linked document.
pub type ObjectId = String;

/// Separator between document and object name in an [`ObjectId`].
pub const DOC_SEPARATOR: char = '#';

/// Build an [`ObjectId`] for `name` in document `doc` (`None` = root).
pub fn qualify(doc: Option<&str>, name: &str) -> ObjectId {
    match doc {
        Some(d) => format!("{d}{DOC_SEPARATOR}{name}"),
        None => name.to_string(),
    }
}

/// Split an [`ObjectId`] into its document and object name.
pub fn split_id(id: &str) -> (Option<&str>, &str) {
    match id.split_once(DOC_SEPARATOR) {
        Some((doc, name)) => (Some(doc), name),
        None => (None, id),
    }
}

/// Errors raised by document access.
#[derive(Error, Debug)]
pub enum IrError {
    /// JSON (de)serialization failed.
    #[error("invalid document JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// No object with this id.
    #[error("object not found: {0}")]
    UnknownObject(String),

    /// No joint with this name.
    #[error("joint not found: {0}")]
    UnknownJoint(String),
}

/// What a document object is, as far as assembly resolution cares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectKind {
    /// The assembly root.
    Assembly,
    /// Rigid container of bodies and features.
    Part,
    /// Nested assembly. A flexible one is transparent to part resolution.
    SubAssembly {
        /// Whether the sub-assembly moves as one rigid body.
        #[serde(default = "default_rigid")]
        rigid: bool,
    },
    /// Folder with no placement semantics.
    Group,
    /// Link array; its children are its elements.
    LinkGroup,
    /// Indirection to another object, possibly in a linked document.
    Link {
        /// Target object name.
        target: String,
        /// Linked document, `None` when the target is in the link's document.
        #[serde(default)]
        document: Option<String>,
    },
    /// Feature container owning datums and sketches.
    Body,
    /// Shape-owning solid.
    Feature,
    /// Sketch or datum plane/line/point living in a body.
    Datum,
}

fn default_rigid() -> bool {
    true
}

/// A document object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocObject {
    /// What the object is.
    pub kind: ObjectKind,
    /// Frame relative to the parent container.
    #[serde(default)]
    pub placement: Placement,
    /// Optional mass for the solver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mass: Option<f64>,
    /// Names of child objects in the same document.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
}

impl DocObject {
    /// Object of `kind` at identity.
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            placement: Placement::identity(),
            mass: None,
            children: Vec::new(),
        }
    }

    /// Builder-style placement assignment.
    pub fn at(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    /// Builder-style children assignment.
    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children = children.into_iter().map(Into::into).collect();
        self
    }

    /// True for links.
    pub fn is_link(&self) -> bool {
        matches!(self.kind, ObjectKind::Link { .. })
    }
}

/// A kinema document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Format version string.
    pub version: String,
    /// Name of the assembly object.
    pub assembly: String,
    /// All objects, keyed by name.
    #[serde(default)]
    pub objects: BTreeMap<String, DocObject>,
    /// Assembly joints.
    #[serde(default)]
    pub joints: Vec<JointDef>,
    /// Grounding records.
    #[serde(default)]
    pub grounds: Vec<GroundRecord>,
    /// Motion drivers.
    #[serde(default)]
    pub motions: Vec<MotionDef>,
    /// Simulations.
    #[serde(default)]
    pub simulations: Vec<SimulationDef>,
    /// Element descriptors, keyed by qualified object id.
    #[serde(default)]
    pub shapes: ShapeTable,
    /// Linked documents, keyed by document name.
    #[serde(default)]
    pub external: BTreeMap<String, Document>,
}

impl Default for Document {
    fn default() -> Self {
        let mut objects = BTreeMap::new();
        objects.insert("Assembly".to_string(), DocObject::new(ObjectKind::Assembly));
        Self {
            version: "0.1".to_string(),
            assembly: "Assembly".to_string(),
            objects,
            joints: Vec::new(),
            grounds: Vec::new(),
            motions: Vec::new(),
            simulations: Vec::new(),
            shapes: ShapeTable::new(),
            external: BTreeMap::new(),
        }
    }
}

impl Document {
    /// Create a document holding an empty assembly named `"Assembly"`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, IrError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, IrError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Insert (or replace) an object of the root document.
    pub fn add_object(&mut self, name: impl Into<String>, object: DocObject) {
        self.objects.insert(name.into(), object);
    }

    /// Object named `name` in document context `doc` (`None` = root).
    pub fn lookup(&self, doc: Option<&str>, name: &str) -> Option<&DocObject> {
        match doc {
            None => self.objects.get(name),
            Some(d) => self.external.get(d)?.objects.get(name),
        }
    }

    /// Object by qualified id.
    pub fn object(&self, id: &str) -> Option<&DocObject> {
        let (doc, name) = split_id(id);
        self.lookup(doc, name)
    }

    /// Mutable object by qualified id.
    pub fn object_mut(&mut self, id: &str) -> Option<&mut DocObject> {
        let (doc, name) = split_id(id);
        match doc {
            None => self.objects.get_mut(name),
            Some(d) => self.external.get_mut(d)?.objects.get_mut(name),
        }
    }

    /// Placement of an object by qualified id.
    pub fn placement(&self, id: &str) -> Option<Placement> {
        self.object(id).map(|o| o.placement)
    }

    /// Overwrite the placement of an object.
    pub fn set_placement(&mut self, id: &str, placement: Placement) -> Result<(), IrError> {
        let obj = self
            .object_mut(id)
            .ok_or_else(|| IrError::UnknownObject(id.to_string()))?;
        obj.placement = placement;
        Ok(())
    }

    /// Joint by name.
    pub fn joint(&self, name: &str) -> Option<&JointDef> {
        self.joints.iter().find(|j| j.name == name)
    }

    /// Mutable joint by name.
    pub fn joint_mut(&mut self, name: &str) -> Option<&mut JointDef> {
        self.joints.iter_mut().find(|j| j.name == name)
    }

    /// Remove a joint by name, returning it.
    pub fn remove_joint(&mut self, name: &str) -> Result<JointDef, IrError> {
        let idx = self
            .joints
            .iter()
            .position(|j| j.name == name)
            .ok_or_else(|| IrError::UnknownJoint(name.to_string()))?;
        Ok(self.joints.remove(idx))
    }

    /// Simulation by name.
    pub fn simulation(&self, name: &str) -> Option<&SimulationDef> {
        self.simulations.iter().find(|s| s.name == name)
    }

    /// Motion by name.
    pub fn motion(&self, name: &str) -> Option<&MotionDef> {
        self.motions.iter().find(|m| m.name == name)
    }

    /// True when `id` is the object of some grounding record.
    pub fn is_grounded(&self, id: &str) -> bool {
        self.grounds.iter().any(|g| g.object == id)
    }

    /// Objects held by grounding records, in record order.
    pub fn grounded_objects(&self) -> Vec<ObjectId> {
        self.grounds.iter().map(|g| g.object.clone()).collect()
    }

    /// Direct children of the assembly object.
    pub fn assembly_children(&self) -> &[String] {
        self.objects
            .get(&self.assembly)
            .map_or(&[], |a| a.children.as_slice())
    }
}
