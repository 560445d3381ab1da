//! Minimal person store backing the engine's person registry.
//!
//! Persons walk one pixel per `Move` command and carry out at most one move
//! per tick; `Face` commands apply immediately. Touch, talk and command
//! scripts are stored but nothing here triggers them.

use std::collections::VecDeque;

use glam::IVec2;
use tw_engine::{Direction, PersonCommand, PersonId, PersonScriptKind};

#[derive(Debug, Clone)]
pub struct Person<S> {
    pub id: PersonId,
    pub name: String,
    pub spriteset: String,
    pub position: IVec2,
    pub layer: i32,
    pub facing: Direction,
    pub persistent: bool,
    scripts: [Option<S>; 5],
    commands: VecDeque<PersonCommand>,
}

#[cfg(test)]
impl<S> Person<S> {
    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }
}

#[derive(Debug)]
pub struct PersonStore<S> {
    persons: Vec<Person<S>>,
    next_id: u32,
}

impl<S> Default for PersonStore<S> {
    fn default() -> Self {
        Self {
            persons: Vec::new(),
            next_id: 1,
        }
    }
}

impl<S> PersonStore<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, name: &str, spriteset: &str, persistent: bool) -> PersonId {
        let id = PersonId(self.next_id);
        self.next_id += 1;
        self.persons.push(Person {
            id,
            name: name.to_string(),
            spriteset: spriteset.to_string(),
            position: IVec2::ZERO,
            layer: 0,
            facing: Direction::South,
            persistent,
            scripts: Default::default(),
            commands: VecDeque::new(),
        });
        log::debug!("Created person '{name}' ({id}, persistent={persistent})");
        id
    }

    /// First person with this name.
    pub fn find(&self, name: &str) -> Option<PersonId> {
        self.persons.iter().find(|p| p.name == name).map(|p| p.id)
    }

    pub fn get(&self, id: PersonId) -> Option<&Person<S>> {
        self.persons.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: PersonId) -> Option<&mut Person<S>> {
        self.persons.iter_mut().find(|p| p.id == id)
    }

    pub fn by_name_mut(&mut self, name: &str) -> Option<&mut Person<S>> {
        self.persons.iter_mut().find(|p| p.name == name)
    }

    pub fn contains(&self, id: PersonId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Person<S>> {
        self.persons.iter()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.persons.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
    }

    /// Remove a person by name, handing back its destroy script.
    pub fn destroy(&mut self, name: &str) -> Option<Option<S>> {
        let index = self.persons.iter().position(|p| p.name == name)?;
        let mut person = self.persons.remove(index);
        log::debug!("Destroyed person '{}' ({})", person.name, person.id);
        Some(person.scripts[PersonScriptKind::Destroy.index()].take())
    }

    pub fn set_position(&mut self, id: PersonId, x: i32, y: i32, layer: i32) {
        if let Some(person) = self.get_mut(id) {
            person.position = IVec2::new(x, y);
            person.layer = layer;
        }
    }

    /// Stored position. Coordinates are never wrapped, so a person past the
    /// edge of a bounded map keeps its off-map position.
    pub fn position(&self, id: PersonId) -> Option<IVec2> {
        self.get(id).map(|person| person.position)
    }

    pub fn queue_command(&mut self, id: PersonId, command: PersonCommand) {
        if let Some(person) = self.get_mut(id) {
            person.commands.push_back(command);
        }
    }

    pub fn set_script(&mut self, id: PersonId, kind: PersonScriptKind, script: Option<S>) {
        if let Some(person) = self.get_mut(id) {
            person.scripts[kind.index()] = script;
        }
    }

    pub fn update(&mut self) {
        for person in &mut self.persons {
            while let Some(command) = person.commands.pop_front() {
                match command {
                    PersonCommand::Face(direction) => person.facing = direction,
                    PersonCommand::Move(direction) => {
                        person.position += direction.delta();
                        break;
                    }
                }
            }
        }
    }

    /// Drop every person that does not survive a map change. Persistent
    /// persons always stay; `preserve` keeps everyone. Returns the destroy
    /// scripts of the removed persons.
    pub fn reset(&mut self, preserve: bool) -> Vec<S> {
        let mut destroyed = Vec::new();
        self.persons.retain_mut(|person| {
            if preserve || person.persistent {
                person.commands.clear();
                return true;
            }
            if let Some(script) = person.scripts[PersonScriptKind::Destroy.index()].take() {
                destroyed.push(script);
            }
            false
        });
        destroyed
    }
}
