pub mod lru;
pub mod simulation;
pub mod trace;

pub use lru::{Geometry, GeometryError, LruCache};
pub use simulation::{AccessOutcome, Simulation, Step, Summary};
pub use trace::{OpKind, Operation, TraceFile, TraceParseError};

#[cfg(all(target_arch = "wasm32", target_os = "unknown"))]
use wasm_bindgen::prelude::*;

#[cfg(all(target_arch = "wasm32", target_os = "unknown"))]
#[wasm_bindgen]
pub fn run_simulation(
    trace: &str,
    set_index_bits: u32,
    lines_per_set: usize,
    block_offset_bits: u32,
) -> String {
    let geometry = Geometry::new(set_index_bits, lines_per_set, block_offset_bits);

    let mut simulation = match Simulation::new(geometry) {
        Ok(simulation) => simulation,
        Err(e) => return format!("invalid cache geometry: {e}"),
    };

    match TraceFile::try_from(trace) {
        Ok(trace) => simulation.run(trace.operations(), |_, _| {}).to_string(),
        Err(e) => format!("failed to parse access trace file: {e}"),
    }
}
