use std::fmt::Display;

use arrayvec::ArrayVec;
use ordered_float::OrderedFloat as OF;
use serde::{ Deserialize, Serialize };

use crate::{ ContactFeature, Generation, Impact, ObjectId, WallTime };

/// Objects an event depends on
pub type Subjects = ArrayVec<ObjectId, 2>;

/// Anything an [`EventQueue`](crate::EventQueue) can order
pub trait QueuedEvent {
    type Key: Ord + Copy + std::fmt::Debug;

    fn key(&self) -> Self::Key;
    fn subjects(&self) -> Subjects;
}

/// An object as it was when a prediction was computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub object: ObjectId,
    pub generation: Generation,
}

impl Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.object, self.generation)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum GameEventKind {
    /// The pair's boundaries touch
    Collision(Impact),
    /// A resting vertex slides past the end of its supporting segment
    ContactLoss(ContactFeature),
}

/// A predicted occurrence in simulation time involving two objects
#[derive(Debug, Clone, Copy)]
pub struct GameEvent {
    pub time: f64,
    /// The pair, in the order the prediction was computed with
    pub pair: [Dependency; 2],
    pub kind: GameEventKind,
}

impl GameEvent {
    pub fn ids(&self) -> [ObjectId; 2] {
        self.pair.map(|dep| dep.object)
    }
}

impl QueuedEvent for GameEvent {
    type Key = OF<f64>;

    fn key(&self) -> Self::Key {
        OF(self.time)
    }

    fn subjects(&self) -> Subjects {
        self.ids().into()
    }
}

impl Display for GameEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b] = self.pair;
        match self.kind {
            GameEventKind::Collision(_) => write!(f, "collision({a}, {b}) at {}s", self.time),
            GameEventKind::ContactLoss(_) => write!(f, "contact-loss({a}, {b}) at {}s", self.time),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyState {
    Pressed,
    Released,
}

/// A key transition, stamped with the time the device reported it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEvent {
    pub timestamp: WallTime,
    pub key: KeyId,
    pub state: KeyState,
    /// Object the input acts upon
    pub target: ObjectId,
}

impl QueuedEvent for InputEvent {
    type Key = WallTime;

    fn key(&self) -> Self::Key {
        self.timestamp
    }

    fn subjects(&self) -> Subjects {
        let mut subjects = Subjects::new();
        subjects.push(self.target);
        subjects
    }
}
