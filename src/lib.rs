//! Transforming Hashed OTUs to RGB.
//!
//! Sketch vectors are coloured element-wise ([`colour`]), kept in a keyed
//! store ([`store`]) and later looked up for the most abundant genera of each
//! sample in an OTU table ([`otu_table`]), which are painted row by row onto
//! a square image ([`canvas`]).

pub mod canvas;
pub mod colour;
pub mod error;
pub mod otu_table;
pub mod pipeline;
pub mod raw_sketch;
pub mod store;

pub use canvas::{Canvas, PAD_COLOUR};
pub use colour::{Channel, Colour, ColourSketch, Notation};
pub use error::{Result, ThorError};
pub use otu_table::{OtuTable, TableFormat, TableState, TopEntry};
pub use store::{ColourSketchStore, PADDING_KEY};
