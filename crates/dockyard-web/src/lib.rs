//! dockyard-web: single-page docking UI.
//!
//!   - Receptor upload, search box and SMILES form
//!   - Background docking runs with live progress over SSE
//!   - Result page with 3D viewer and PDBQT downloads

pub mod handlers;
pub mod router;
pub mod runs;
pub mod session;
pub mod sse;
pub mod state;
pub mod viewer;
