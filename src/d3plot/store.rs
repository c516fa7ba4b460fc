//! In-memory database of the decoded model: nodes, the three element
//! families, parts, and their append-only per-timestep result streams.
//!
//! Entities are addressed by dense index (file order) or by external id
//! through lookup maps; elements reference nodes by external id, never
//! by pointer.

use std::collections::HashMap;

/// The three element families of the format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// 2-node beams.
    Beam,
    /// 4-node shells.
    Shell,
    /// 8-node solids.
    Solid,
}

/// A mesh node with its per-timestep kinematic streams.
#[derive(Debug)]
pub struct Node {
    id: i32,
    coords: [f32; 3],
    disp: Vec<[f32; 3]>,
    vel: Vec<[f32; 3]>,
    accel: Vec<[f32; 3]>,
}

impl Node {
    fn new(id: i32, coords: [f32; 3]) -> Self {
        Self {
            id,
            coords,
            disp: Vec::new(),
            vel: Vec::new(),
            accel: Vec::new(),
        }
    }

    /// External node id.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Initial coordinates.
    pub fn coords(&self) -> &[f32; 3] {
        &self.coords
    }

    /// Displacement per read timestep.
    pub fn disp(&self) -> &[[f32; 3]] {
        &self.disp
    }

    /// Velocity per read timestep.
    pub fn vel(&self) -> &[[f32; 3]] {
        &self.vel
    }

    /// Acceleration per read timestep.
    pub fn accel(&self) -> &[[f32; 3]] {
        &self.accel
    }

    pub(crate) fn add_disp(&mut self, value: [f32; 3]) {
        self.disp.push(value);
    }

    pub(crate) fn add_vel(&mut self, value: [f32; 3]) {
        self.vel.push(value);
    }

    pub(crate) fn add_accel(&mut self, value: [f32; 3]) {
        self.accel.push(value);
    }

    pub(crate) fn clear_disp(&mut self) {
        self.disp.clear();
    }

    pub(crate) fn clear_vel(&mut self) {
        self.vel.clear();
    }

    pub(crate) fn clear_accel(&mut self) {
        self.accel.clear();
    }
}

/// An element with its per-timestep result streams.
///
/// Unrequested variables never grow their stream, so stream lengths can
/// differ from one another but never exceed the timestep count.
#[derive(Debug)]
pub struct Element {
    id: i32,
    kind: ElementKind,
    node_ids: Vec<i32>,
    material_index: i32,
    is_rigid: bool,
    energy: Vec<f32>,
    plastic_strain: Vec<f32>,
    stress: Vec<[f32; 6]>,
    stress_mises: Vec<f32>,
    strain: Vec<[f32; 6]>,
    history_vars: Vec<Vec<f32>>,
}

impl Element {
    fn new(id: i32, kind: ElementKind, node_ids: Vec<i32>, material_index: i32) -> Self {
        Self {
            id,
            kind,
            node_ids,
            material_index,
            is_rigid: false,
            energy: Vec::new(),
            plastic_strain: Vec::new(),
            stress: Vec::new(),
            stress_mises: Vec::new(),
            strain: Vec::new(),
            history_vars: Vec::new(),
        }
    }

    /// External element id.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// The element family.
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// External ids of the connected nodes.
    pub fn node_ids(&self) -> &[i32] {
        &self.node_ids
    }

    /// One-based material index from the connectivity block.
    pub fn material_index(&self) -> i32 {
        self.material_index
    }

    /// Whether the element is backed by a rigid material (shells only);
    /// rigid shells carry no state data.
    pub fn is_rigid(&self) -> bool {
        self.is_rigid
    }

    pub fn energy(&self) -> &[f32] {
        &self.energy
    }

    pub fn plastic_strain(&self) -> &[f32] {
        &self.plastic_strain
    }

    pub fn stress(&self) -> &[[f32; 6]] {
        &self.stress
    }

    pub fn stress_mises(&self) -> &[f32] {
        &self.stress_mises
    }

    pub fn strain(&self) -> &[[f32; 6]] {
        &self.strain
    }

    pub fn history_vars(&self) -> &[Vec<f32>] {
        &self.history_vars
    }

    pub(crate) fn set_is_rigid(&mut self, is_rigid: bool) {
        self.is_rigid = is_rigid;
    }

    pub(crate) fn add_energy(&mut self, value: f32) {
        self.energy.push(value);
    }

    pub(crate) fn add_plastic_strain(&mut self, value: f32) {
        self.plastic_strain.push(value);
    }

    pub(crate) fn add_stress(&mut self, value: [f32; 6]) {
        self.stress.push(value);
    }

    pub(crate) fn add_stress_mises(&mut self, value: f32) {
        self.stress_mises.push(value);
    }

    pub(crate) fn add_strain(&mut self, value: [f32; 6]) {
        self.strain.push(value);
    }

    /// Append history values for one timestep. A later read pass for
    /// further indices extends the existing row of that timestep.
    pub(crate) fn add_history_vars(&mut self, values: Vec<f32>, i_state: usize) {
        if let Some(row) = self.history_vars.get_mut(i_state) {
            row.extend(values);
        } else {
            self.history_vars.push(values);
        }
    }

    pub(crate) fn clear_energy(&mut self) {
        self.energy.clear();
    }

    pub(crate) fn clear_plastic_strain(&mut self) {
        self.plastic_strain.clear();
    }

    pub(crate) fn clear_stress(&mut self) {
        self.stress.clear();
    }

    pub(crate) fn clear_stress_mises(&mut self) {
        self.stress_mises.clear();
    }

    pub(crate) fn clear_strain(&mut self) {
        self.strain.clear();
    }

    pub(crate) fn clear_history_vars(&mut self) {
        self.history_vars.clear();
    }
}

/// A part: external id plus its name from the part-title section.
#[derive(Debug)]
pub struct Part {
    id: i32,
    name: String,
}

impl Part {
    /// External part id.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Part name, whitespace-trimmed.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The model store. Owns all entities; the decoders are its only
/// mutators.
#[derive(Debug, Default)]
pub struct Store {
    nodes: Vec<Node>,
    node_index: HashMap<i32, usize>,
    beams: Vec<Element>,
    beam_index: HashMap<i32, usize>,
    shells: Vec<Element>,
    shell_index: HashMap<i32, usize>,
    solids: Vec<Element>,
    solid_index: HashMap<i32, usize>,
    parts: Vec<Part>,
    part_index: HashMap<i32, usize>,
}

impl Store {
    /// Preallocate an element family before bulk insertion.
    pub fn reserve(&mut self, kind: ElementKind, count: usize) {
        self.family_mut(kind).reserve(count);
    }

    pub(crate) fn reserve_nodes(&mut self, count: usize) {
        self.nodes.reserve(count);
    }

    pub(crate) fn add_node(&mut self, id: i32, coords: [f32; 3]) {
        self.node_index.insert(id, self.nodes.len());
        self.nodes.push(Node::new(id, coords));
    }

    pub(crate) fn add_element(
        &mut self,
        kind: ElementKind,
        id: i32,
        node_ids: Vec<i32>,
        material_index: i32,
    ) {
        let index = self.family(kind).len();
        match kind {
            ElementKind::Beam => self.beam_index.insert(id, index),
            ElementKind::Shell => self.shell_index.insert(id, index),
            ElementKind::Solid => self.solid_index.insert(id, index),
        };
        self.family_mut(kind)
            .push(Element::new(id, kind, node_ids, material_index));
    }

    /// Register a part; a repeated id only updates the name.
    pub(crate) fn add_part(&mut self, id: i32, name: String) {
        if let Some(&index) = self.part_index.get(&id) {
            self.parts[index].name = name;
        } else {
            self.part_index.insert(id, self.parts.len());
            self.parts.push(Part { id, name });
        }
    }

    fn family(&self, kind: ElementKind) -> &Vec<Element> {
        match kind {
            ElementKind::Beam => &self.beams,
            ElementKind::Shell => &self.shells,
            ElementKind::Solid => &self.solids,
        }
    }

    fn family_mut(&mut self, kind: ElementKind) -> &mut Vec<Element> {
        match kind {
            ElementKind::Beam => &mut self.beams,
            ElementKind::Shell => &mut self.shells,
            ElementKind::Solid => &mut self.solids,
        }
    }

    /// All nodes, in file order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Node by dense index.
    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    /// Node by external id.
    pub fn node_by_id(&self, id: i32) -> Option<&Node> {
        self.node_index.get(&id).map(|&index| &self.nodes[index])
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// All elements of one family, in file order.
    pub fn elements(&self, kind: ElementKind) -> &[Element] {
        self.family(kind)
    }

    /// Element by family and dense index.
    pub fn element(&self, kind: ElementKind, index: usize) -> Option<&Element> {
        self.family(kind).get(index)
    }

    /// Element by family and external id.
    pub fn element_by_id(&self, kind: ElementKind, id: i32) -> Option<&Element> {
        let index = match kind {
            ElementKind::Beam => self.beam_index.get(&id),
            ElementKind::Shell => self.shell_index.get(&id),
            ElementKind::Solid => self.solid_index.get(&id),
        };
        index.map(|&index| &self.family(kind)[index])
    }

    pub fn n_elements(&self, kind: ElementKind) -> usize {
        self.family(kind).len()
    }

    /// All parts, in file order.
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Part by external id.
    pub fn part_by_id(&self, id: i32) -> Option<&Part> {
        self.part_index.get(&id).map(|&index| &self.parts[index])
    }

    pub fn n_parts(&self) -> usize {
        self.parts.len()
    }

    pub(crate) fn node_mut(&mut self, index: usize) -> &mut Node {
        &mut self.nodes[index]
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    pub(crate) fn element_mut(&mut self, kind: ElementKind, index: usize) -> &mut Element {
        &mut self.family_mut(kind)[index]
    }

    pub(crate) fn elements_mut(&mut self, kind: ElementKind) -> &mut [Element] {
        self.family_mut(kind)
    }
}
