//! `.rmp` version 1 decoder.
//!
//! Stream layout, all little-endian:
//!
//!   header (256 bytes) -> string table -> layers -> entities -> zones -> [tileset]
//!
//! The tileset is embedded at the tail of the stream when string slot 0 is
//! empty; otherwise slot 0 names a tileset file that the loader resolves.
//! Decoding either yields a complete `Map` or an error. Nothing partial
//! escapes: every buffer built along the way is owned by locals and dropped
//! on the error path.

use std::io::Read;

use crate::error::MapError;
use crate::model::{
    Layer, LayerProps, Map, MapOrigin, MapScripts, PersonScripts, PersonSpawn, Rect, Trigger, Zone,
};
use crate::reader::ByteReader;

pub const MAP_SIGNATURE: &[u8; 4] = b".rmp";
pub const MAP_VERSION: i16 = 1;

pub(crate) const HEADER_RESERVED: usize = 234;
pub(crate) const LAYER_RESERVED: usize = 3;
pub(crate) const ENTITY_RESERVED: usize = 8;
pub(crate) const ZONE_RESERVED: usize = 4;
pub(crate) const PERSON_TRAILER: usize = 16;
pub(crate) const PERSON_SCRIPT_COUNT: u16 = 5;

pub(crate) const ENTITY_PERSON: u16 = 1;
pub(crate) const ENTITY_TRIGGER: u16 = 2;

/// The part of a tile atlas the map engine needs to know about.
pub trait Tileset {
    /// Tile width and height in pixels.
    fn tile_size(&self) -> (i32, i32);
}

/// Resolves a map's tileset, either from the rest of the map stream or by name.
pub trait TilesetLoader {
    type Tileset: Tileset;

    /// Decode a tileset stored inline, starting at the current stream position.
    fn load_embedded(&mut self, stream: &mut dyn Read) -> Result<Self::Tileset, MapError>;

    /// Load the tileset a map refers to by file name (relative to the maps directory).
    fn load_file(&mut self, name: &str) -> Result<Self::Tileset, MapError>;
}

#[derive(Debug, Clone, Copy)]
struct MapHeader {
    layer_count: usize,
    entity_count: usize,
    origin: MapOrigin,
    string_count: usize,
    zone_count: usize,
    is_toric: bool,
}

pub fn decode_map<R, L>(source: R, loader: &mut L) -> Result<Map<L::Tileset>, MapError>
where
    R: Read,
    L: TilesetLoader + ?Sized,
{
    let mut reader = ByteReader::new(source);
    let header = read_header(&mut reader)?;

    let mut table = Vec::with_capacity(header.string_count);
    for i in 0..header.string_count {
        table.push(reader.read_lstring(&format!("string {i}"))?);
    }
    let scripts = MapScripts::from_table(table);

    let mut layers: Vec<Layer> = Vec::with_capacity(header.layer_count);
    for i in 0..header.layer_count {
        let layer = read_layer(&mut reader, i)?;
        if let Some(first) = layers.first() {
            if (layer.width(), layer.height()) != (first.width(), first.height()) {
                return Err(MapError::format(format!(
                    "layer {i} is {}x{} but layer 0 is {}x{}",
                    layer.width(),
                    layer.height(),
                    first.width(),
                    first.height()
                )));
            }
        }
        layers.push(layer);
    }

    let mut persons = Vec::new();
    let mut triggers = Vec::new();
    for i in 0..header.entity_count {
        let context = format!("entity {i}");
        let x = reader.read_u16(&context)?;
        let y = reader.read_u16(&context)?;
        let z = reader.read_u16(&context)?;
        let kind = reader.read_u16(&context)?;
        reader.skip(ENTITY_RESERVED as u64, &context)?;

        match kind {
            ENTITY_PERSON => {
                persons.push(read_person(&mut reader, i, (x.into(), y.into(), z.into()))?);
            }
            ENTITY_TRIGGER => {
                let script = reader.read_lstring(&format!("trigger script of entity {i}"))?;
                triggers.push(Trigger { script });
            }
            other => {
                return Err(MapError::format(format!(
                    "entity {i} has unknown type {other}"
                )));
            }
        }
    }

    let mut zones = Vec::with_capacity(header.zone_count);
    for i in 0..header.zone_count {
        let context = format!("zone {i}");
        let x1 = reader.read_u16(&context)?;
        let y1 = reader.read_u16(&context)?;
        let x2 = reader.read_u16(&context)?;
        let y2 = reader.read_u16(&context)?;
        let layer = reader.read_u16(&context)?;
        let steps = reader.read_u16(&context)?;
        reader.skip(ZONE_RESERVED as u64, &context)?;
        reader.read_lstring(&format!("zone {i} script"))?;
        zones.push(Zone {
            area: Rect {
                x1: x1.into(),
                y1: y1.into(),
                x2: x2.into(),
                y2: y2.into(),
            },
            layer: layer.into(),
            steps: steps.into(),
        });
    }

    let tileset_name = scripts.tileset_file().to_string();
    let tileset = if tileset_name.is_empty() {
        log::debug!("Map embeds its tileset at offset {}", reader.position());
        loader.load_embedded(reader.inner_mut())
    } else {
        loader.load_file(&tileset_name)
    }
    .map_err(|err| match err {
        MapError::Resource(_) => err,
        other => MapError::Resource(format!(
            "tileset '{}' could not be loaded: {other}",
            if tileset_name.is_empty() {
                "<embedded>"
            } else {
                &tileset_name
            }
        )),
    })?;

    log::debug!(
        "Decoded map: {} layer(s), {} person(s), {} trigger(s), {} zone(s), toric={}",
        layers.len(),
        persons.len(),
        triggers.len(),
        zones.len(),
        header.is_toric
    );

    Ok(Map {
        is_toric: header.is_toric,
        origin: header.origin,
        tileset,
        layers,
        persons,
        triggers,
        zones,
        scripts,
    })
}

fn read_header<R: Read>(reader: &mut ByteReader<R>) -> Result<MapHeader, MapError> {
    const CONTEXT: &str = "map header";

    let signature: [u8; 4] = reader.read_array(CONTEXT)?;
    if &signature != MAP_SIGNATURE {
        return Err(MapError::format(format!(
            "bad signature {:?}, expected {:?}",
            String::from_utf8_lossy(&signature),
            String::from_utf8_lossy(MAP_SIGNATURE)
        )));
    }
    let version = reader.read_i16(CONTEXT)?;
    if version != MAP_VERSION {
        return Err(MapError::format(format!(
            "unsupported map version {version}, only version {MAP_VERSION} is supported"
        )));
    }

    let _map_type = reader.read_u8(CONTEXT)?;
    let layer_count = reader.read_i8(CONTEXT)?;
    reader.skip(1, CONTEXT)?;
    let entity_count = reader.read_i16(CONTEXT)?;
    let start_x = reader.read_i16(CONTEXT)?;
    let start_y = reader.read_i16(CONTEXT)?;
    let start_layer = reader.read_i8(CONTEXT)?;
    let start_direction = reader.read_i8(CONTEXT)?;
    let string_count = reader.read_i16(CONTEXT)?;
    let zone_count = reader.read_i16(CONTEXT)?;
    let toric = reader.read_u8(CONTEXT)?;
    reader.skip(HEADER_RESERVED as u64, CONTEXT)?;

    if layer_count < 1 {
        return Err(MapError::format(format!(
            "map must have at least one layer, header declares {layer_count}"
        )));
    }

    Ok(MapHeader {
        layer_count: layer_count as usize,
        entity_count: non_negative(entity_count, "entity count")?,
        origin: MapOrigin {
            x: start_x.into(),
            y: start_y.into(),
            layer: start_layer.into(),
            direction: start_direction.into(),
        },
        string_count: non_negative(string_count, "string count")?,
        zone_count: non_negative(zone_count, "zone count")?,
        is_toric: toric != 0,
    })
}

fn read_layer<R: Read>(reader: &mut ByteReader<R>, index: usize) -> Result<Layer, MapError> {
    let context = format!("layer {index} header");
    let width = reader.read_i16(&context)?;
    let height = reader.read_i16(&context)?;
    let flags = reader.read_u16(&context)?;
    let parallax_x = reader.read_f32(&context)?;
    let parallax_y = reader.read_f32(&context)?;
    let scrolling_x = reader.read_f32(&context)?;
    let scrolling_y = reader.read_f32(&context)?;
    let segment_count = reader.read_i32(&context)?;
    let reflective = reader.read_u8(&context)?;
    reader.skip(LAYER_RESERVED as u64, &context)?;

    if width <= 0 || height <= 0 {
        return Err(MapError::format(format!(
            "layer {index} has invalid size {width}x{height}"
        )));
    }

    reader.read_lstring(&format!("layer {index} name"))?;
    let tile_count = width as usize * height as usize;
    let tiles = reader.read_i16_run(tile_count, &format!("layer {index} tiles"))?;

    let mut layer = Layer::new(width.into(), height.into(), tiles)?;
    layer.props = LayerProps {
        flags,
        parallax: (parallax_x, parallax_y),
        scrolling: (scrolling_x, scrolling_y),
        segment_count,
        reflective: reflective != 0,
    };
    Ok(layer)
}

fn read_person<R: Read>(
    reader: &mut ByteReader<R>,
    index: usize,
    (x, y, layer): (i32, i32, i32),
) -> Result<PersonSpawn, MapError> {
    let name = reader.read_lstring(&format!("person name of entity {index}"))?;
    let spriteset = reader.read_lstring(&format!("spriteset of person '{name}'"))?;

    let script_count = reader.read_u16(&format!("script count of person '{name}'"))?;
    if script_count < PERSON_SCRIPT_COUNT {
        return Err(MapError::format(format!(
            "person '{name}' declares {script_count} scripts, at least {PERSON_SCRIPT_COUNT} required"
        )));
    }

    let context = format!("scripts of person '{name}'");
    let mut read_script = || -> Result<Option<String>, MapError> {
        let source = reader.read_lstring(&context)?;
        Ok((!source.is_empty()).then_some(source))
    };
    let scripts = PersonScripts {
        on_create: read_script()?,
        on_destroy: read_script()?,
        on_touch: read_script()?,
        on_talk: read_script()?,
        on_command: read_script()?,
    };

    for _ in PERSON_SCRIPT_COUNT..script_count {
        reader.read_lstring(&format!("extra script of person '{name}'"))?;
    }
    reader.skip(PERSON_TRAILER as u64, &format!("trailer of person '{name}'"))?;

    Ok(PersonSpawn {
        name,
        spriteset,
        x,
        y,
        layer,
        scripts,
    })
}

fn non_negative(value: i16, what: &str) -> Result<usize, MapError> {
    usize::try_from(value)
        .map_err(|_| MapError::format(format!("{what} cannot be negative, got {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{MapBuilder, PersonRecord};
    use crate::model::StringSlot;

    /// Test tileset: the embedded form is two `u16`s (tile width, height).
    #[derive(Debug, Clone, PartialEq)]
    struct FakeTileset {
        size: (i32, i32),
        source: String,
    }

    impl Tileset for FakeTileset {
        fn tile_size(&self) -> (i32, i32) {
            self.size
        }
    }

    #[derive(Default)]
    struct FakeLoader {
        known_files: Vec<String>,
        requested: Vec<String>,
    }

    impl TilesetLoader for FakeLoader {
        type Tileset = FakeTileset;

        fn load_embedded(&mut self, stream: &mut dyn Read) -> Result<FakeTileset, MapError> {
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf)?;
            Ok(FakeTileset {
                size: (
                    u16::from_le_bytes([buf[0], buf[1]]).into(),
                    u16::from_le_bytes([buf[2], buf[3]]).into(),
                ),
                source: "<embedded>".to_string(),
            })
        }

        fn load_file(&mut self, name: &str) -> Result<FakeTileset, MapError> {
            self.requested.push(name.to_string());
            if self.known_files.iter().any(|known| known == name) {
                Ok(FakeTileset {
                    size: (16, 16),
                    source: name.to_string(),
                })
            } else {
                Err(MapError::Resource(format!("no tileset named {name}")))
            }
        }
    }

    fn embedded_tiles(w: u16, h: u16) -> Vec<u8> {
        let mut bytes = w.to_le_bytes().to_vec();
        bytes.extend_from_slice(&h.to_le_bytes());
        bytes
    }

    fn sample_builder() -> MapBuilder {
        MapBuilder::new(4, 3)
            .origin(2, 1, 0, 2)
            .script(StringSlot::Music, "town.ogg")
            .script(StringSlot::Entry, "entered = true")
            .script(StringSlot::LeaveNorth, "north()")
            .script(StringSlot::LeaveWest, "west()")
            .layer((0..12).collect())
            .layer((100..112).collect())
            .person(
                PersonRecord::new("guard", "guard.rss", 3, 4, 1)
                    .create("made()")
                    .talk("hello()"),
            )
            .trigger(5, 6, 0, "stepped()")
            .person(PersonRecord::new("cat", "cat.rss", 7, 8, 0))
            .zone(0, 0, 32, 32, 0, 8)
            .embedded_tileset(embedded_tiles(16, 8))
    }

    #[test]
    fn decodes_layers_entities_and_scripts() {
        let bytes = sample_builder().build();
        let mut loader = FakeLoader::default();
        let map = decode_map(&bytes[..], &mut loader).expect("well-formed map should decode");

        assert!(!map.is_toric);
        assert_eq!(
            map.origin,
            MapOrigin {
                x: 2,
                y: 1,
                layer: 0,
                direction: 2
            }
        );
        assert_eq!(map.layer_count(), 2);
        assert_eq!(map.layers[0].tiles(), (0..12).collect::<Vec<_>>().as_slice());
        assert_eq!(map.layers[1].tile(3, 2), Some(111));
        assert_eq!(map.size_in_tiles(), (4, 3));

        assert_eq!(map.scripts.get(StringSlot::Tileset), "");
        assert_eq!(map.scripts.music_file(), "town.ogg");
        assert_eq!(map.scripts.get(StringSlot::LegacyScript), "");
        assert_eq!(map.scripts.entry_script(), "entered = true");
        assert_eq!(map.scripts.get(StringSlot::LeaveNorth), "north()");
        assert_eq!(map.scripts.get(StringSlot::LeaveWest), "west()");

        assert_eq!(map.persons.len(), 2);
        let guard = &map.persons[0];
        assert_eq!(guard.name, "guard");
        assert_eq!(guard.spriteset, "guard.rss");
        assert_eq!((guard.x, guard.y, guard.layer), (3, 4, 1));
        assert_eq!(guard.scripts.on_create.as_deref(), Some("made()"));
        assert_eq!(guard.scripts.on_talk.as_deref(), Some("hello()"));
        assert_eq!(guard.scripts.on_destroy, None);
        assert_eq!(map.persons[1].name, "cat");

        assert_eq!(map.triggers.len(), 1);
        assert_eq!(map.triggers[0].script, "stepped()");
        assert_eq!(map.zones.len(), 1);
        assert_eq!(map.zones[0].steps, 8);
        assert_eq!(map.zones[0].area.x2, 32);

        assert_eq!(map.tile_size(), (16, 8));
        assert_eq!(map.pixel_size(), (64, 24));
        assert!(loader.requested.is_empty());
    }

    #[test]
    fn toric_flag_and_negative_tiles_survive() {
        let bytes = MapBuilder::new(2, 2)
            .toric(true)
            .layer(vec![-1, 0, 32767, -32768])
            .embedded_tileset(embedded_tiles(8, 8))
            .build();
        let map = decode_map(&bytes[..], &mut FakeLoader::default()).unwrap();
        assert!(map.is_toric);
        assert_eq!(map.layers[0].tiles(), &[-1, 0, 32767, -32768]);
    }

    #[test]
    fn bad_signature_is_format_error() {
        let mut bytes = sample_builder().build();
        bytes[0..4].copy_from_slice(b".rss");
        let err = decode_map(&bytes[..], &mut FakeLoader::default()).unwrap_err();
        assert!(matches!(err, MapError::Format(_)), "got {err:?}");
    }

    #[test]
    fn unsupported_version_is_format_error() {
        let bytes = sample_builder().version(2).build();
        let err = decode_map(&bytes[..], &mut FakeLoader::default()).unwrap_err();
        match err {
            MapError::Format(message) => assert!(message.contains("version 2")),
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn bad_header_never_touches_the_loader() {
        let bytes = sample_builder().version(3).build();
        let mut loader = FakeLoader {
            known_files: vec!["tiles.rts".into()],
            ..Default::default()
        };
        assert!(decode_map(&bytes[..], &mut loader).is_err());
        assert!(loader.requested.is_empty());
    }

    #[test]
    fn truncated_stream_reports_truncation() {
        let bytes = sample_builder().build();
        for cut in [10, 256, 300, bytes.len() - 6] {
            let err = decode_map(&bytes[..cut], &mut FakeLoader::default()).unwrap_err();
            assert!(
                matches!(err, MapError::Truncated { .. } | MapError::Resource(_)),
                "cut at {cut} gave {err:?}"
            );
        }
        let err = decode_map(&bytes[..300], &mut FakeLoader::default()).unwrap_err();
        assert!(matches!(err, MapError::Truncated { .. }));
    }

    #[test]
    fn person_with_exactly_five_scripts_reads_no_extras() {
        let bytes = MapBuilder::new(1, 1)
            .layer(vec![0])
            .person(PersonRecord::new("p", "p.rss", 0, 0, 0).command("walk()"))
            .trigger(0, 0, 0, "after()")
            .embedded_tileset(embedded_tiles(4, 4))
            .build();
        let map = decode_map(&bytes[..], &mut FakeLoader::default()).unwrap();
        assert_eq!(map.persons[0].scripts.on_command.as_deref(), Some("walk()"));
        assert_eq!(map.triggers[0].script, "after()");
    }

    #[test]
    fn person_extra_scripts_are_discarded() {
        let bytes = MapBuilder::new(1, 1)
            .layer(vec![0])
            .person(
                PersonRecord::new("p", "p.rss", 0, 0, 0)
                    .destroy("bye()")
                    .extra("unused one")
                    .extra("unused two"),
            )
            .trigger(0, 0, 0, "after()")
            .embedded_tileset(embedded_tiles(4, 4))
            .build();
        let map = decode_map(&bytes[..], &mut FakeLoader::default()).unwrap();
        let scripts = &map.persons[0].scripts;
        assert_eq!(scripts.on_destroy.as_deref(), Some("bye()"));
        assert_eq!(scripts.on_command, None);
        // The trigger after the person decodes only if both extras and the
        // 16-byte trailer were consumed exactly.
        assert_eq!(map.triggers[0].script, "after()");
        assert_eq!(map.tile_size(), (4, 4));
    }

    #[test]
    fn person_with_too_few_scripts_is_format_error() {
        let bytes = MapBuilder::new(1, 1)
            .layer(vec![0])
            .person(PersonRecord::new("p", "p.rss", 0, 0, 0).declared_script_count(4))
            .embedded_tileset(embedded_tiles(4, 4))
            .build();
        let err = decode_map(&bytes[..], &mut FakeLoader::default()).unwrap_err();
        assert!(matches!(err, MapError::Format(_)));
    }

    #[test]
    fn unknown_entity_type_is_format_error() {
        let bytes = MapBuilder::new(1, 1)
            .layer(vec![0])
            .raw_entity(0, 0, 0, 3, Vec::new())
            .embedded_tileset(embedded_tiles(4, 4))
            .build();
        match decode_map(&bytes[..], &mut FakeLoader::default()).unwrap_err() {
            MapError::Format(message) => assert!(message.contains("unknown type 3")),
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn mismatched_layer_sizes_are_rejected() {
        let bytes = MapBuilder::new(2, 2)
            .layer(vec![0; 4])
            .sized_layer(3, 2, vec![0; 6])
            .embedded_tileset(embedded_tiles(4, 4))
            .build();
        match decode_map(&bytes[..], &mut FakeLoader::default()).unwrap_err() {
            MapError::Format(message) => assert!(message.contains("layer 1 is 3x2")),
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn zero_layers_is_format_error() {
        let bytes = MapBuilder::new(1, 1)
            .embedded_tileset(embedded_tiles(4, 4))
            .build();
        assert!(matches!(
            decode_map(&bytes[..], &mut FakeLoader::default()),
            Err(MapError::Format(_))
        ));
    }

    #[test]
    fn named_tileset_goes_through_loader() {
        let bytes = MapBuilder::new(1, 1)
            .script(StringSlot::Tileset, "town.rts")
            .layer(vec![7])
            .build();
        let mut loader = FakeLoader {
            known_files: vec!["town.rts".into()],
            ..Default::default()
        };
        let map = decode_map(&bytes[..], &mut loader).unwrap();
        assert_eq!(map.tileset.source, "town.rts");
        assert_eq!(loader.requested, vec!["town.rts".to_string()]);
    }

    #[test]
    fn missing_tileset_is_resource_error() {
        let bytes = MapBuilder::new(1, 1)
            .script(StringSlot::Tileset, "gone.rts")
            .layer(vec![7])
            .build();
        let err = decode_map(&bytes[..], &mut FakeLoader::default()).unwrap_err();
        assert!(matches!(err, MapError::Resource(_)));
    }

    #[test]
    fn truncated_embedded_tileset_is_resource_error() {
        let bytes = MapBuilder::new(1, 1)
            .layer(vec![7])
            .embedded_tileset(vec![16])
            .build();
        match decode_map(&bytes[..], &mut FakeLoader::default()).unwrap_err() {
            MapError::Resource(message) => assert!(message.contains("<embedded>")),
            other => panic!("expected resource error, got {other:?}"),
        }
    }

    #[test]
    fn header_is_256_bytes() {
        let bytes = MapBuilder::new(1, 1).build();
        assert_eq!(bytes.len(), 256 + 2 * StringSlot::COUNT);
        // The layer count check fires before any short read would.
        assert!(matches!(
            decode_map(&bytes[..], &mut FakeLoader::default()),
            Err(MapError::Format(_))
        ));
    }
}
