//! lopdf backed document engine

mod annotations;
mod destinations;
pub mod engine;
mod form;
pub mod metadata;
mod objects;
mod outline;

pub use engine::{LopdfEngine, PdfDocument};
pub use metadata::{inspect, DocumentInfo};
