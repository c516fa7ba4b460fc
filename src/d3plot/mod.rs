//! Core d3plot reader module.

pub mod buffer;
pub mod control;
pub mod error;
pub mod geometry;
pub mod request;
mod state;
pub mod store;
pub mod utils;

use std::path::Path;

use log::{debug, info};

use buffer::{CompressedBuffer, PlainBuffer, WordBuffer};
use control::Control;
use geometry::Numbering;
use request::LoadedVars;
use store::{ElementKind, Store};

pub use error::{D3plotError, Result};

/// Reader for LS-DYNA d3plot result files.
///
/// Opening a file decodes the control block, the geometry (nodes,
/// element connectivities, external numbering, part names) and then
/// walks the state segments for the requested variables. Further
/// variables can be loaded later through [`read_states`], which re-walks
/// the segments with the same transition rules.
///
/// [`read_states`]: D3plotReader::read_states
pub struct D3plotReader {
    pub(crate) buffer: Box<dyn WordBuffer>,
    pub(crate) compressed: bool,
    pub(crate) control: Control,
    /// Part count from the geometry phase; compressed state segments
    /// must agree with it.
    pub(crate) numprop: usize,
    pub(crate) word_position: usize,
    pub(crate) word_position_states: usize,
    pub(crate) timesteps: Vec<f32>,
    pub(crate) store: Store,
    pub(crate) loaded: LoadedVars,
}

impl D3plotReader {
    /// Open a d3plot file and read the given state variables.
    ///
    /// `variables` may be empty: the geometry is decoded and the state
    /// segments are still walked once to build the timestep table.
    /// With `compressed` the file is opened through the chunked zlib
    /// back-end instead of the plain multi-file back-end.
    ///
    /// # Errors
    /// Fails on I/O problems, on any unsupported format feature
    /// (double precision, SPH, ALE, thick shells, temperatures, rigid
    /// road), on structural inconsistencies (missing section sentinels,
    /// numbering-pointer mismatches, rigid-shell count mismatch), and
    /// on requests for variables the file does not carry.
    pub fn new<S: AsRef<str>>(
        path: impl AsRef<Path>,
        variables: &[S],
        compressed: bool,
    ) -> Result<Self> {
        let path = path.as_ref();
        info!("opening d3plot: {}", path.display());

        let mut buffer: Box<dyn WordBuffer> = if compressed {
            Box::new(CompressedBuffer::open(path)?)
        } else {
            Box::new(PlainBuffer::open(path)?)
        };
        buffer.load_geometry()?;

        debug!("parsing control block");
        let mut control = Control::from_buffer(buffer.as_ref())?;
        let mut word_position = control.header_words();

        geometry::read_material_section(buffer.as_ref(), &mut control, &mut word_position)?;

        debug!("reading geometry");
        let node_coords = geometry::read_nodes(buffer.as_ref(), &control, &mut word_position)?;
        let solids = geometry::read_solids(buffer.as_ref(), &control, &mut word_position)?;
        word_position += 9 * control.nelth;
        let beams = geometry::read_beams(buffer.as_ref(), &control, &mut word_position)?;
        let shells = geometry::read_shells(buffer.as_ref(), &control, &mut word_position)?;
        let numbering = geometry::read_numbering(buffer.as_ref(), &control, &mut word_position)?;
        geometry::expect_section_end(buffer.as_ref(), word_position, "geometry")?;
        word_position += 1;

        debug!("reading parts");
        buffer.free_geometry();
        buffer.load_parts()?;
        if compressed {
            // The part segment opens with an end marker word.
            word_position = 1;
        }
        let (parts, numprop) = geometry::read_parts(buffer.as_ref(), &mut word_position)?;
        buffer.free_parts();

        let store = build_store(&control, node_coords, solids, beams, shells, &numbering, parts)?;
        info!(
            "model: {} nodes, {} beams, {} shells ({} rigid), {} solids, {} parts",
            store.n_nodes(),
            store.n_elements(ElementKind::Beam),
            store.n_elements(ElementKind::Shell),
            control.numrbe,
            store.n_elements(ElementKind::Solid),
            store.n_parts()
        );

        let mut reader = Self {
            buffer,
            compressed,
            control,
            numprop,
            word_position,
            word_position_states: 0,
            timesteps: Vec::new(),
            store,
            loaded: LoadedVars::default(),
        };

        // The segment walk must run even for an empty request so the
        // compressed back-end reaches its end of stream.
        reader.read_states(variables)?;
        info!("read {} state(s)", reader.timesteps.len());
        Ok(reader)
    }

    /// Simulation time of every decoded state.
    pub fn timesteps(&self) -> &[f32] {
        &self.timesteps
    }

    /// Number of decoded states.
    pub fn n_states(&self) -> usize {
        self.timesteps.len()
    }

    /// Title string from the control block.
    pub fn title(&self) -> &str {
        &self.control.title
    }

    /// The decoded control block.
    pub fn control(&self) -> &Control {
        &self.control
    }

    /// The model store (nodes, elements, parts and their results).
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Node by dense index.
    pub fn node(&self, index: usize) -> Option<&store::Node> {
        self.store.node(index)
    }

    /// Node by external id.
    pub fn node_by_id(&self, id: i32) -> Option<&store::Node> {
        self.store.node_by_id(id)
    }

    /// All elements of one family.
    pub fn elements(&self, kind: ElementKind) -> &[store::Element] {
        self.store.elements(kind)
    }

    /// Element by family and dense index.
    pub fn element(&self, kind: ElementKind, index: usize) -> Option<&store::Element> {
        self.store.element(kind, index)
    }

    /// Element by family and external id.
    pub fn element_by_id(&self, kind: ElementKind, id: i32) -> Option<&store::Element> {
        self.store.element_by_id(kind, id)
    }

    /// All parts.
    pub fn parts(&self) -> &[store::Part] {
        self.store.parts()
    }

    /// Part by external id.
    pub fn part_by_id(&self, id: i32) -> Option<&store::Part> {
        self.store.part_by_id(id)
    }

    /// Log a summary of the model.
    pub fn info(&self) {
        let c = &self.control;
        info!("title : {}", c.title);
        info!("nNodes: {}", c.numnp);
        info!("nElem2: {}  nElem4: {}  nElem8: {}", c.nel2, c.nel4, c.nel8);
        info!(
            "nMats-Solver: {}  nMats-Input: {}",
            c.nmmat,
            c.n_input_materials()
        );
        info!("disp: {}  vel: {}  accel: {}", c.iu, c.iv, c.ia);
        info!(
            "shell-stress: {}  shell-plstrn: {}  shell-forces: {}  shell-stuff: {}",
            c.ioshl1, c.ioshl2, c.ioshl3, c.ioshl4
        );
        info!("shell-strn: {}  shell-nInteg: {}", c.istrn, c.maxint);
        info!("nVar1D: {}  nVar2D: {}  nVar3D: {}", c.nv1d, c.nv2d, c.nv3d);
        info!("state-globals: {}", c.nglbv);
        info!("states: {}", self.timesteps.len());
    }

    /// Drop the named per-timestep result streams and allow the same
    /// variables to be read again. An empty list clears everything.
    ///
    /// Geometry and the timestep table are preserved.
    pub fn clear<S: AsRef<str>>(&mut self, variables: &[S]) -> Result<()> {
        if variables.is_empty() {
            return self.clear(&[
                "disp",
                "vel",
                "accel",
                "energy",
                "plastic_strain",
                "strain",
                "stress",
                "stress_mises",
                "history shell",
                "history solid",
            ]);
        }

        let mut drop_disp = false;
        let mut drop_vel = false;
        let mut drop_accel = false;
        let mut drop_energy = false;
        let mut drop_plastic_strain = false;
        let mut drop_strain = false;
        let mut drop_stress = false;
        let mut drop_stress_mises = false;
        let mut drop_history_shell = false;
        let mut drop_history_solid = false;

        for variable in variables {
            let variable = variable.as_ref();
            if variable.contains("disp") {
                drop_disp = true;
            } else if variable.contains("vel") {
                drop_vel = true;
            } else if variable.contains("accel") {
                drop_accel = true;
            } else if variable.contains("energy") {
                drop_energy = true;
            } else if variable.contains("plastic_strain") {
                drop_plastic_strain = true;
            } else if variable.contains("stress_mises") {
                drop_stress_mises = true;
            } else if variable.contains("strain") {
                drop_strain = true;
            } else if variable.contains("stress") {
                drop_stress = true;
            } else if variable.contains("history") {
                // Without a family keyword both histories go.
                if variable.contains("shell") {
                    drop_history_shell = true;
                } else if variable.contains("solid") {
                    drop_history_solid = true;
                } else {
                    drop_history_shell = true;
                    drop_history_solid = true;
                }
            } else {
                return Err(D3plotError::UnknownVariable(variable.to_string()));
            }
        }

        if drop_disp || drop_vel || drop_accel {
            for node in self.store.nodes_mut() {
                if drop_disp {
                    node.clear_disp();
                }
                if drop_vel {
                    node.clear_vel();
                }
                if drop_accel {
                    node.clear_accel();
                }
            }
            self.loaded.disp &= !drop_disp;
            self.loaded.vel &= !drop_vel;
            self.loaded.accel &= !drop_accel;
        }

        let any_element = drop_energy
            || drop_plastic_strain
            || drop_strain
            || drop_stress
            || drop_stress_mises
            || drop_history_shell
            || drop_history_solid;
        if any_element {
            for kind in [ElementKind::Shell, ElementKind::Solid] {
                let drop_history = match kind {
                    ElementKind::Shell => drop_history_shell,
                    _ => drop_history_solid,
                };
                for element in self.store.elements_mut(kind) {
                    if drop_energy {
                        element.clear_energy();
                    }
                    if drop_plastic_strain {
                        element.clear_plastic_strain();
                    }
                    if drop_strain {
                        element.clear_strain();
                    }
                    if drop_stress {
                        element.clear_stress();
                    }
                    if drop_stress_mises {
                        element.clear_stress_mises();
                    }
                    if drop_history {
                        element.clear_history_vars();
                    }
                }
            }
            self.loaded.energy &= !drop_energy;
            self.loaded.plastic_strain &= !drop_plastic_strain;
            self.loaded.strain &= !drop_strain;
            self.loaded.stress &= !drop_stress;
            self.loaded.stress_mises &= !drop_stress_mises;
            if drop_history_shell {
                self.loaded.history_shell.clear();
            }
            if drop_history_solid {
                self.loaded.history_solid.clear();
            }
        }

        Ok(())
    }
}

/// Resolve a one-based node index from a connectivity block to the
/// external node id.
fn node_id_at(numbering: &Numbering, index: i32) -> Result<i32> {
    if index >= 1 {
        if let Some(&id) = numbering.node_ids.get(index as usize - 1) {
            return Ok(id);
        }
    }
    Err(D3plotError::InvalidFormat(format!(
        "element references unknown node index {}",
        index
    )))
}

/// Populate the store from the raw geometry buffers.
fn build_store(
    control: &Control,
    node_coords: Vec<[f32; 3]>,
    solids: Vec<[i32; 9]>,
    beams: Vec<[i32; 3]>,
    shells: Vec<[i32; 5]>,
    numbering: &Numbering,
    parts: Vec<(i32, String)>,
) -> Result<Store> {
    let id_counts = [
        ("node", numbering.node_ids.len(), node_coords.len()),
        ("solid", numbering.solid_ids.len(), solids.len()),
        ("beam", numbering.beam_ids.len(), beams.len()),
        ("shell", numbering.shell_ids.len(), shells.len()),
    ];
    for (what, ids, entities) in id_counts {
        if ids != entities {
            return Err(D3plotError::InvalidFormat(format!(
                "{} numbering and {} buffers have different sizes ({} != {})",
                what, what, ids, entities
            )));
        }
    }

    let mut store = Store::default();

    store.reserve_nodes(node_coords.len());
    for (&id, coords) in numbering.node_ids.iter().zip(node_coords) {
        store.add_node(id, coords);
    }

    store.reserve(ElementKind::Beam, beams.len());
    for (i_element, beam) in beams.iter().enumerate() {
        let node_ids = vec![
            node_id_at(numbering, beam[0])?,
            node_id_at(numbering, beam[1])?,
        ];
        store.add_element(
            ElementKind::Beam,
            numbering.beam_ids[i_element],
            node_ids,
            beam[2],
        );
    }

    // Material indexes in the connectivity are one-based.
    let mut n_rigid_shells = 0usize;
    store.reserve(ElementKind::Shell, shells.len());
    for (i_element, shell) in shells.iter().enumerate() {
        let node_ids = shell[..4]
            .iter()
            .map(|&index| node_id_at(numbering, index))
            .collect::<Result<Vec<_>>>()?;
        let material = shell[4];
        store.add_element(
            ElementKind::Shell,
            numbering.shell_ids[i_element],
            node_ids,
            material,
        );
        if control.mattyp
            && material >= 1
            && control.irbtyp.get(material as usize - 1) == Some(&20)
        {
            store
                .element_mut(ElementKind::Shell, i_element)
                .set_is_rigid(true);
            n_rigid_shells += 1;
        }
    }
    if n_rigid_shells != control.numrbe {
        return Err(D3plotError::CountMismatch {
            what: "rigid shells",
            expected: control.numrbe as i64,
            found: n_rigid_shells as i64,
        });
    }

    store.reserve(ElementKind::Solid, solids.len());
    for (i_element, solid) in solids.iter().enumerate() {
        let node_ids = solid[..8]
            .iter()
            .map(|&index| node_id_at(numbering, index))
            .collect::<Result<Vec<_>>>()?;
        store.add_element(
            ElementKind::Solid,
            numbering.solid_ids[i_element],
            node_ids,
            solid[8],
        );
    }

    for (id, name) in parts {
        store.add_part(id, name);
    }

    Ok(store)
}
