//! Dockyard Molecules - the docking pipeline behind the web form.
//!
//! One run goes through these stages in order:
//! 1. Sanitizing the uploaded receptor (dropping CONECT records)
//! 2. Preparing the ligand from SMILES (Open Babel)
//! 3. Docking (AutoDock Vina)
//! 4. Extracting the affinity table and the top pose

pub mod affinity;
pub mod cancel;
pub mod docking;
pub mod ligand;
pub mod pipeline;
pub mod pose;
pub mod receptor;
pub mod search_box;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testing;

pub use dockyard_common::Result;
