//! Reader for the LS-DYNA d3plot binary result format.
//!
//! A d3plot result is a stream of 32-bit little-endian words, appended
//! sequentially by the solver and possibly split across several physical
//! files. This crate decodes the control block, the mesh geometry
//! (nodes, beams, shells, solids, parts) and a user-selected subset of
//! the per-state result variables: displacements, velocities,
//! accelerations, stresses, strains, plastic strain, internal energy
//! and history variables, each indexed by timestep.
//!
//! Shell results are sampled per through-thickness integration layer in
//! the file; a reduction mode (`max`, `min`, `outer`, `mid`, `inner`,
//! `mean`) appended to the request string folds the layers into one
//! value per element.
//!
//! ```no_run
//! use d3plot_reader::{D3plotReader, ElementKind};
//!
//! let reader = D3plotReader::new("run/d3plot", &["disp", "stress_mises max"], false)?;
//! println!("{} states", reader.n_states());
//! for shell in reader.elements(ElementKind::Shell) {
//!     if !shell.is_rigid() {
//!         println!("shell {}: {:?}", shell.id(), shell.stress_mises());
//!     }
//! }
//! # Ok::<(), d3plot_reader::D3plotError>(())
//! ```

pub mod d3plot;

pub use d3plot::control::{Control, DeletionTable};
pub use d3plot::error::{D3plotError, Result};
pub use d3plot::request::Reduction;
pub use d3plot::store::{Element, ElementKind, Node, Part, Store};
pub use d3plot::D3plotReader;
