//! Sphere `.rmp` tile maps: binary decoder, in-memory model and a builder for
//! assembling map streams.

pub mod builder;
pub mod decode;
pub mod error;
pub mod model;
mod reader;

pub use decode::{decode_map, Tileset, TilesetLoader, MAP_SIGNATURE, MAP_VERSION};
pub use error::MapError;
pub use model::{
    Layer, LayerProps, Map, MapOrigin, MapScripts, PersonScripts, PersonSpawn, Rect, StringSlot,
    Trigger, Zone,
};
