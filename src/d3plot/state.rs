//! The state decoder: walks every state segment, scans the state
//! records, and pushes the planned variables into the store.
//!
//! All word offsets inside a state record are functions of the control
//! block. The record starts with the simulation time, followed by the
//! global variables, the node vectors (disp, vel, accel), the beam
//! block, the shell block (rigid shells omitted), the solid block and
//! the optional deletion table.

use log::{debug, trace};

use super::buffer::WordBuffer;
use super::control::Control;
use super::error::{D3plotError, Result};
use super::geometry;
use super::request::{self, ReadPlan};
use super::store::{ElementKind, Node, Store};
use super::utils::mises_stress;
use super::D3plotReader;

impl D3plotReader {
    /// Read the requested state variables, walking every state segment.
    ///
    /// Idempotent re-entry point: variables that are already loaded are
    /// dropped from the plan, and if nothing remains to read the walk
    /// is skipped entirely. The first invocation additionally builds
    /// the timestep table, and therefore always walks the segments even
    /// with an empty plan.
    pub fn read_states<S: AsRef<str>>(&mut self, variables: &[S]) -> Result<()> {
        if variables.is_empty() && !self.timesteps.is_empty() {
            return Err(D3plotError::EmptyRequest);
        }

        let plan = request::parse_requests(variables, &self.control, &self.loaded)?;
        if plan.is_empty() && !self.timesteps.is_empty() {
            return Ok(());
        }

        let record_len = self.control.state_record_len();
        let first_scan = self.timesteps.is_empty();

        if first_scan {
            self.buffer.init_first_state_segment()?;
            self.word_position_states = self.word_position;
        } else {
            self.buffer.rewind_state_segments()?;
            self.word_position = self.word_position_states;
        }

        let mut i_state = 0usize;
        let mut first_segment_done = false;

        while self.buffer.has_next_state_segment() {
            self.buffer.read_next_state_segment()?;

            if !self.compressed && first_segment_done {
                // Continuation files restart their word origin at 0.
                self.word_position = 0;
            }
            if self.compressed {
                // Every compressed state segment repeats the part block
                // behind an end marker; revalidate the part count and
                // skip over the block.
                let numprop_states = self.buffer.read_i32(2)?;
                if numprop_states != self.numprop as i32 {
                    return Err(D3plotError::CountMismatch {
                        what: "parts in state segment",
                        expected: self.numprop as i64,
                        found: numprop_states as i64,
                    });
                }
                self.word_position = 1 + 1 + (self.numprop + 1) * 19 + 1;
            }
            trace!("state segment starts at word {}", self.word_position);

            while !geometry::is_file_end(self.buffer.as_ref(), self.word_position)? {
                if first_scan {
                    let time = self.buffer.read_f32(self.word_position)?;
                    trace!("state {} at time {}", i_state, time);
                    self.timesteps.push(time);
                }

                let control = &self.control;
                let buffer = self.buffer.as_ref();
                let store = &mut self.store;

                let node_base = self.word_position + 1 + control.nglbv;
                let node_stride = control.numnp * control.ndim;
                let mut node_block = 0usize;
                if control.iu {
                    if plan.disp.is_some() {
                        read_node_vectors(buffer, store, control, node_base, Node::add_disp)?;
                    }
                    node_block += 1;
                }
                if control.iv {
                    if plan.vel.is_some() {
                        let start = node_base + node_block * node_stride;
                        read_node_vectors(buffer, store, control, start, Node::add_vel)?;
                    }
                    node_block += 1;
                }
                if control.ia && plan.accel.is_some() {
                    let start = node_base + node_block * node_stride;
                    read_node_vectors(buffer, store, control, start, Node::add_accel)?;
                }

                if plan.wants_element_data() {
                    let elem_base = node_base
                        + (control.iu as usize + control.iv as usize + control.ia as usize)
                            * control.numnp
                            * control.ndim;
                    let shell_start =
                        elem_base + control.nv3d * control.nel8 + control.nv1d * control.nel2;
                    read_shell_block(buffer, store, control, &plan, shell_start, i_state)?;
                    read_solid_block(buffer, store, control, &plan, elem_base, i_state)?;
                }

                self.word_position += record_len;
                i_state += 1;
            }

            first_segment_done = true;
        }

        self.buffer.end_states();
        self.loaded.absorb(&plan);
        debug!("read {} state(s)", i_state);
        Ok(())
    }
}

/// Read one per-node vector block (`numnp` groups of `ndim` floats).
fn read_node_vectors(
    buffer: &dyn WordBuffer,
    store: &mut Store,
    control: &Control,
    start: usize,
    add: fn(&mut Node, [f32; 3]),
) -> Result<()> {
    let mut value = [0.0f32; 3];
    for i_node in 0..control.numnp {
        buffer.read_f32_range(start + i_node * control.ndim, &mut value)?;
        add(store.node_mut(i_node), value);
    }
    Ok(())
}

/// Decode the layered shell block of one state record.
///
/// Rigid shells do not appear in the state stream: the element index
/// advances past them while the word cursor stays put.
fn read_shell_block(
    buffer: &dyn WordBuffer,
    store: &mut Store,
    control: &Control,
    plan: &ReadPlan,
    start: usize,
    i_state: usize,
) -> Result<()> {
    if control.nv2d == 0 || control.nel4 == 0 {
        return Ok(());
    }

    let n_layers = control.maxint;
    let layer_size = control.shell_layer_size();
    let plastic_offset = 6 * control.ioshl1 as usize;
    let history_base = plastic_offset + control.ioshl2 as usize;

    let mut element_start = start;
    let mut history_acc = vec![0.0f32; plan.history_shell.len()];

    for i_element in 0..control.nel4 {
        let is_rigid = store
            .element(ElementKind::Shell, i_element)
            .map(|element| element.is_rigid())
            .unwrap_or(false);
        if is_rigid {
            continue;
        }

        let mut stress_acc = [0.0f32; 6];
        let mut mises_acc = 0.0f32;
        let mut plastic_acc = 0.0f32;
        history_acc.iter_mut().for_each(|value| *value = 0.0);

        for layer in 0..n_layers {
            let layer_start = element_start + layer * layer_size;

            if control.ioshl2 {
                if let Some(mode) = plan.plastic_strain {
                    let value = buffer.read_f32(layer_start + plastic_offset)?;
                    mode.accumulate(&mut plastic_acc, value, layer, n_layers);
                }
            }

            if control.ioshl1 && (plan.stress.is_some() || plan.stress_mises.is_some()) {
                let mut tensor = [0.0f32; 6];
                buffer.read_f32_range(layer_start, &mut tensor)?;
                if let Some(mode) = plan.stress {
                    mode.accumulate6(&mut stress_acc, &tensor, layer, n_layers);
                }
                if let Some(mode) = plan.stress_mises {
                    mode.accumulate(&mut mises_acc, mises_stress(&tensor), layer, n_layers);
                }
            }

            for (slot, (index, mode)) in plan.history_shell.iter().enumerate() {
                if *index > control.neips {
                    continue;
                }
                let value = buffer.read_f32(layer_start + history_base + index - 1)?;
                mode.accumulate(&mut history_acc[slot], value, layer, n_layers);
            }
        }

        let element = store.element_mut(ElementKind::Shell, i_element);
        if control.ioshl2 && plan.plastic_strain.is_some() {
            element.add_plastic_strain(plastic_acc);
        }
        if control.ioshl1 && plan.stress.is_some() {
            element.add_stress(stress_acc);
        }
        if control.ioshl1 && plan.stress_mises.is_some() {
            element.add_stress_mises(mises_acc);
        }
        if !plan.history_shell.is_empty() {
            let values: Vec<f32> = plan
                .history_shell
                .iter()
                .zip(history_acc.iter())
                .filter(|((index, _), _)| *index <= control.neips)
                .map(|(_, value)| *value)
                .collect();
            element.add_history_vars(values, i_state);
        }

        // The strain tensors sit at the record tail as two 6-word
        // samples (inner surface, then outer surface). In the layout
        // with a trailing energy word the tail shifts by one.
        if control.istrn {
            if let Some(mode) = plan.strain {
                let tail = if control.nv2d >= 45 { 13 } else { 12 };
                let strain_start = element_start + control.nv2d - tail;
                let mut inner = [0.0f32; 6];
                let mut outer = [0.0f32; 6];
                buffer.read_f32_range(strain_start, &mut inner)?;
                buffer.read_f32_range(strain_start + 6, &mut outer)?;

                let mut strain = [0.0f32; 6];
                for component in 0..6 {
                    strain[component] = mode.reduce_samples(inner[component], outer[component]);
                }
                element.add_strain(strain);
            }
        }

        // Internal energy is always the last word of the shell record;
        // the strain layout below 45 words has no energy word at all.
        if control.ioshl4
            && plan.energy.is_some()
            && (!control.istrn || control.nv2d >= 45)
        {
            element.add_energy(buffer.read_f32(element_start + control.nv2d - 1)?);
        }

        element_start += control.nv2d;
    }

    Ok(())
}

/// Decode the solid block of one state record. Solids have no layers:
/// every variable sits at a fixed offset, and there is no energy word.
fn read_solid_block(
    buffer: &dyn WordBuffer,
    store: &mut Store,
    control: &Control,
    plan: &ReadPlan,
    start: usize,
    i_state: usize,
) -> Result<()> {
    if control.nv3d == 0 || control.nel8 == 0 {
        return Ok(());
    }

    let mut element_start = start;
    for i_element in 0..control.nel8 {
        let mut tensor = [0.0f32; 6];
        if plan.stress.is_some() || plan.stress_mises.is_some() {
            buffer.read_f32_range(element_start, &mut tensor)?;
        }

        let element = store.element_mut(ElementKind::Solid, i_element);
        if plan.stress.is_some() {
            element.add_stress(tensor);
        }
        if plan.stress_mises.is_some() {
            element.add_stress_mises(mises_stress(&tensor));
        }
        if plan.plastic_strain.is_some() {
            element.add_plastic_strain(buffer.read_f32(element_start + 6)?);
        }
        if control.istrn && plan.strain.is_some() {
            let mut strain = [0.0f32; 6];
            buffer.read_f32_range(element_start + control.nv3d - 6, &mut strain)?;
            element.add_strain(strain);
        }
        if !plan.history_solid.is_empty() {
            let mut values = Vec::with_capacity(plan.history_solid.len());
            for (index, _) in &plan.history_solid {
                if *index > control.neiph {
                    continue;
                }
                values.push(buffer.read_f32(element_start + 6 + index)?);
            }
            element.add_history_vars(values, i_state);
        }

        element_start += control.nv3d;
    }

    Ok(())
}
