pub mod blend;
pub mod brush;
pub mod color;
pub mod commands;
pub mod document;
pub mod element;
pub mod id;
pub mod observers;
pub mod raster;
pub mod smoother;
pub mod state;
pub mod stroke;
pub mod util;

use id::DaubID;
