//! Writer for `.rmp` bytes.
//!
//! Produces the exact layout `decode_map` reads. Used to build fixtures for
//! tests across the workspace and by tools that want to emit small maps.

use crate::decode::{
    ENTITY_PERSON, ENTITY_RESERVED, ENTITY_TRIGGER, HEADER_RESERVED, LAYER_RESERVED,
    MAP_SIGNATURE, MAP_VERSION, PERSON_SCRIPT_COUNT, PERSON_TRAILER, ZONE_RESERVED,
};
use crate::model::{MapScripts, StringSlot};

/// A person entity as it will be written.
#[derive(Debug, Clone, Default)]
pub struct PersonRecord {
    name: String,
    spriteset: String,
    x: u16,
    y: u16,
    layer: u16,
    scripts: [String; 5],
    extras: Vec<String>,
    declared_count: Option<u16>,
}

impl PersonRecord {
    pub fn new(name: &str, spriteset: &str, x: u16, y: u16, layer: u16) -> Self {
        Self {
            name: name.to_string(),
            spriteset: spriteset.to_string(),
            x,
            y,
            layer,
            ..Default::default()
        }
    }

    pub fn create(mut self, source: &str) -> Self {
        self.scripts[0] = source.to_string();
        self
    }

    pub fn destroy(mut self, source: &str) -> Self {
        self.scripts[1] = source.to_string();
        self
    }

    pub fn touch(mut self, source: &str) -> Self {
        self.scripts[2] = source.to_string();
        self
    }

    pub fn talk(mut self, source: &str) -> Self {
        self.scripts[3] = source.to_string();
        self
    }

    pub fn command(mut self, source: &str) -> Self {
        self.scripts[4] = source.to_string();
        self
    }

    /// Append a script past the five known ones.
    pub fn extra(mut self, source: &str) -> Self {
        self.extras.push(source.to_string());
        self
    }

    /// Override the script count written to the file without changing which
    /// scripts follow it. Only useful for producing malformed maps.
    pub fn declared_script_count(mut self, count: u16) -> Self {
        self.declared_count = Some(count);
        self
    }
}

#[derive(Debug, Clone)]
struct EntityRecord {
    x: u16,
    y: u16,
    layer: u16,
    kind: u16,
    payload: Vec<u8>,
}

#[derive(Debug, Clone)]
struct LayerRecord {
    width: i16,
    height: i16,
    tiles: Vec<i32>,
}

#[derive(Debug, Clone)]
pub struct MapBuilder {
    version: i16,
    width: i16,
    height: i16,
    origin: (i16, i16, i8, i8),
    toric: bool,
    scripts: MapScripts,
    layers: Vec<LayerRecord>,
    entities: Vec<EntityRecord>,
    zones: Vec<[u16; 6]>,
    tileset: Vec<u8>,
}

impl MapBuilder {
    /// Start a map whose layers default to `width` x `height` tiles.
    pub fn new(width: i16, height: i16) -> Self {
        Self {
            version: MAP_VERSION,
            width,
            height,
            origin: (0, 0, 0, 0),
            toric: false,
            scripts: MapScripts::default(),
            layers: Vec::new(),
            entities: Vec::new(),
            zones: Vec::new(),
            tileset: Vec::new(),
        }
    }

    pub fn version(mut self, version: i16) -> Self {
        self.version = version;
        self
    }

    pub fn origin(mut self, x: i16, y: i16, layer: i8, direction: i8) -> Self {
        self.origin = (x, y, layer, direction);
        self
    }

    pub fn toric(mut self, toric: bool) -> Self {
        self.toric = toric;
        self
    }

    pub fn script(mut self, slot: StringSlot, value: &str) -> Self {
        self.scripts.set(slot, value);
        self
    }

    /// Add a layer of the map's default size. Tiles are truncated to `i16`.
    pub fn layer(self, tiles: Vec<i32>) -> Self {
        let (width, height) = (self.width, self.height);
        self.sized_layer(width, height, tiles)
    }

    pub fn sized_layer(mut self, width: i16, height: i16, tiles: Vec<i32>) -> Self {
        self.layers.push(LayerRecord {
            width,
            height,
            tiles,
        });
        self
    }

    pub fn person(mut self, person: PersonRecord) -> Self {
        let mut payload = Vec::new();
        put_string(&mut payload, &person.name);
        put_string(&mut payload, &person.spriteset);
        let count = person
            .declared_count
            .unwrap_or(PERSON_SCRIPT_COUNT + person.extras.len() as u16);
        payload.extend_from_slice(&count.to_le_bytes());
        for script in person.scripts.iter().chain(&person.extras) {
            put_string(&mut payload, script);
        }
        payload.extend_from_slice(&[0; PERSON_TRAILER]);
        self.entities.push(EntityRecord {
            x: person.x,
            y: person.y,
            layer: person.layer,
            kind: ENTITY_PERSON,
            payload,
        });
        self
    }

    pub fn trigger(mut self, x: u16, y: u16, layer: u16, script: &str) -> Self {
        let mut payload = Vec::new();
        put_string(&mut payload, script);
        self.entities.push(EntityRecord {
            x,
            y,
            layer,
            kind: ENTITY_TRIGGER,
            payload,
        });
        self
    }

    /// Add an entity with an arbitrary type code and body.
    pub fn raw_entity(mut self, x: u16, y: u16, layer: u16, kind: u16, payload: Vec<u8>) -> Self {
        self.entities.push(EntityRecord {
            x,
            y,
            layer,
            kind,
            payload,
        });
        self
    }

    pub fn zone(mut self, x1: u16, y1: u16, x2: u16, y2: u16, layer: u16, steps: u16) -> Self {
        self.zones.push([x1, y1, x2, y2, layer, steps]);
        self
    }

    /// Bytes appended after the zones. Only read when no tileset file is named.
    pub fn embedded_tileset(mut self, bytes: Vec<u8>) -> Self {
        self.tileset = bytes;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();

        out.extend_from_slice(MAP_SIGNATURE);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.push(0);
        out.push(self.layers.len() as u8);
        out.push(0);
        out.extend_from_slice(&(self.entities.len() as i16).to_le_bytes());
        out.extend_from_slice(&self.origin.0.to_le_bytes());
        out.extend_from_slice(&self.origin.1.to_le_bytes());
        out.push(self.origin.2 as u8);
        out.push(self.origin.3 as u8);
        out.extend_from_slice(&(StringSlot::COUNT as i16).to_le_bytes());
        out.extend_from_slice(&(self.zones.len() as i16).to_le_bytes());
        out.push(u8::from(self.toric));
        out.extend_from_slice(&[0; HEADER_RESERVED]);

        for value in self.scripts.as_slice() {
            put_string(&mut out, value);
        }

        for (i, layer) in self.layers.iter().enumerate() {
            out.extend_from_slice(&layer.width.to_le_bytes());
            out.extend_from_slice(&layer.height.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            for factor in [1.0f32, 1.0, 0.0, 0.0] {
                out.extend_from_slice(&factor.to_le_bytes());
            }
            out.extend_from_slice(&0i32.to_le_bytes());
            out.push(0);
            out.extend_from_slice(&[0; LAYER_RESERVED]);
            put_string(&mut out, &format!("layer {i}"));
            for &tile in &layer.tiles {
                out.extend_from_slice(&(tile as i16).to_le_bytes());
            }
        }

        for entity in &self.entities {
            for field in [entity.x, entity.y, entity.layer, entity.kind] {
                out.extend_from_slice(&field.to_le_bytes());
            }
            out.extend_from_slice(&[0; ENTITY_RESERVED]);
            out.extend_from_slice(&entity.payload);
        }

        for zone in &self.zones {
            for field in zone {
                out.extend_from_slice(&field.to_le_bytes());
            }
            out.extend_from_slice(&[0; ZONE_RESERVED]);
            put_string(&mut out, "");
        }

        out.extend_from_slice(&self.tileset);
        out
    }
}

fn put_string(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(&(value.len() as u16).to_le_bytes());
    out.extend_from_slice(value.as_bytes());
}
