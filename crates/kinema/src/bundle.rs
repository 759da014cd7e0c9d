//! Per-run arena mapping document objects to solver parts.
//!
//! Normally every moving part gets its own solver part. During a drag, parts
//! welded together by Fixed joints are bundled into one solver part: the
//! first one registered becomes the main object and the others ride along at
//! a constant offset.

use std::collections::{BTreeMap, HashMap};

use kinema_ir::{Document, JointType, ObjectId};
use kinema_math::Placement;
use kinema_solver::{SolverModel, SolverPart};

use crate::connectivity::JointEdge;

/// Where a document object lives in the solver model.
#[derive(Debug, Clone, PartialEq)]
pub struct ArenaEntry {
    /// Index into [`SolverModel::parts`].
    pub part: usize,
    /// Solver part name.
    pub name: String,
    /// Frame of the object relative to the solver part. Identity for the
    /// main object of a bundle.
    pub offset: Placement,
    main: bool,
}

impl ArenaEntry {
    /// Whether this object owns its solver part.
    pub fn is_main(&self) -> bool {
        self.main
    }
}

/// Object id → solver part association for one run or drag session.
#[derive(Debug, Clone, Default)]
pub struct PartArena {
    entries: BTreeMap<ObjectId, ArenaEntry>,
}

impl PartArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every association.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entry of `obj`.
    pub fn get(&self, obj: &str) -> Option<&ArenaEntry> {
        self.entries.get(obj)
    }

    /// Whether `obj` has been registered.
    pub fn contains(&self, obj: &str) -> bool {
        self.entries.contains_key(obj)
    }

    /// All entries, ordered by object id.
    pub fn iter(&self) -> impl Iterator<Item = (&ObjectId, &ArenaEntry)> {
        self.entries.iter()
    }

    /// Number of registered objects.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Objects sharing solver part `part`.
    pub fn objects_of(&self, part: usize) -> Vec<&ObjectId> {
        self.entries
            .iter()
            .filter(|(_, e)| e.part == part)
            .map(|(id, _)| id)
            .collect()
    }

    fn insert(&mut self, obj: ObjectId, entry: ArenaEntry) {
        self.entries.insert(obj, entry);
    }
}

/// Registers document objects as solver parts.
pub struct PartRegistrar<'a> {
    /// Source of placements and masses.
    pub doc: &'a Document,
    /// Caller-provided masses, taking precedence over the document.
    pub masses: &'a HashMap<ObjectId, f64>,
    /// Active joints, walked for Fixed welds when bundling.
    pub joints: &'a [JointEdge],
    /// Weld Fixed-joined objects into one solver part.
    pub bundle_fixed: bool,
}

impl PartRegistrar<'_> {
    fn mass_of(&self, obj: &str) -> f64 {
        self.masses
            .get(obj)
            .copied()
            .or_else(|| self.doc.object(obj).and_then(|o| o.mass))
            .unwrap_or(1.0)
    }

    /// Entry for `obj`, creating its solver part on first use.
    ///
    /// Returns `None` when `obj` is not in the document.
    pub fn register(
        &self,
        arena: &mut PartArena,
        model: &mut SolverModel,
        obj: &str,
    ) -> Option<ArenaEntry> {
        if let Some(entry) = arena.get(obj) {
            return Some(entry.clone());
        }
        let placement = self.doc.placement(obj)?;
        let index = model.add_part(SolverPart::new(obj, placement, self.mass_of(obj)));
        let entry = ArenaEntry {
            part: index,
            name: obj.to_string(),
            offset: Placement::identity(),
            main: true,
        };
        arena.insert(obj.to_string(), entry.clone());

        if self.bundle_fixed {
            self.bundle(arena, obj, &placement, index);
        }
        Some(entry)
    }

    /// Attach every object welded to `main` through Fixed joints.
    fn bundle(&self, arena: &mut PartArena, main: &str, main_plc: &Placement, index: usize) {
        let inverse = main_plc.inverse();
        let mut stack = vec![main.to_string()];
        while let Some(current) = stack.pop() {
            for edge in self.joints.iter().filter(|e| e.touches(&current)) {
                if edge.joint_type != JointType::Fixed {
                    continue;
                }
                let other = if edge.part1 == current {
                    &edge.part2
                } else {
                    &edge.part1
                };
                if arena.contains(other) {
                    continue;
                }
                let Some(plc) = self.doc.placement(other) else {
                    continue;
                };
                arena.insert(
                    other.clone(),
                    ArenaEntry {
                        part: index,
                        name: main.to_string(),
                        offset: inverse * plc,
                        main: false,
                    },
                );
                stack.push(other.clone());
            }
        }
    }
}
