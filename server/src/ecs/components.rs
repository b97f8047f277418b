//! Plain data components attached to entities
//!
//! Components carry no identity of their own; they live in the slot of their
//! entity's index inside a per-type [`SparseArray`](super::SparseArray).

use super::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Velocity {
    pub vx: f32,
    pub vy: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Health {
    pub hp: i32,
    pub max_hp: i32,
}

impl Health {
    pub fn new(max_hp: i32) -> Self {
        Self { hp: max_hp, max_hp }
    }

    pub fn is_dead(&self) -> bool {
        self.hp <= 0
    }

    /// Remaining health as a fraction of the maximum
    pub fn ratio(&self) -> f32 {
        if self.max_hp <= 0 {
            return 0.0;
        }
        self.hp.max(0) as f32 / self.max_hp as f32
    }
}

/// Axis-aligned bounding box, centred on the entity position
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Collision {
    pub width: f32,
    pub height: f32,
}

impl Collision {
    pub fn square(size: f32) -> Self {
        Self {
            width: size,
            height: size,
        }
    }

    /// Whether two boxes placed at `a` and `b` overlap. Touching edges do not count.
    pub fn overlaps(&self, a: &Position, other: &Collision, b: &Position) -> bool {
        let dx = (a.x - b.x).abs();
        let dy = (a.y - b.y).abs();
        dx < (self.width + other.width) / 2.0 && dy < (self.height + other.height) / 2.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Attack {
    pub damage: i32,
    pub range: f32,
    /// Seconds between two shots
    pub cooldown: f32,
    /// Seconds left until the next shot is allowed
    pub ready_in: f32,
}

impl Attack {
    pub fn new(damage: i32, range: f32, cooldown: f32) -> Self {
        Self {
            damage,
            range,
            cooldown,
            ready_in: 0.0,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready_in <= 0.0
    }

    pub fn trigger(&mut self) {
        self.ready_in = self.cooldown;
    }
}

/// Damage dealt on contact by the entity carrying it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Damage {
    pub amount: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Damageable {
    pub can_be_damaged: bool,
}

/// Facing of the entity, used to aim shots
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Direction {
    pub dx: f32,
    pub dy: f32,
}

impl Default for Direction {
    fn default() -> Self {
        Self { dx: 1.0, dy: 0.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drawable {
    pub sprite_id: u16,
    pub visible: bool,
}

impl Drawable {
    pub fn visible(sprite_id: u16) -> Self {
        Self {
            sprite_id,
            visible: true,
        }
    }
}

/// Marks an entity driven by a connected client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controllable {
    pub player_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AiState {
    #[default]
    Idle,
    Patrol,
    Attack,
    Flee,
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AiBrain {
    pub state: AiState,
    /// Seconds spent in the current state
    pub timer: f32,
}

impl AiBrain {
    pub fn transition(&mut self, state: AiState) {
        if self.state != state {
            self.state = state;
            self.timer = 0.0;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Score {
    pub score: i32,
    pub high_score: i32,
}

impl Score {
    pub fn add(&mut self, points: i32) {
        self.score += points;
        self.high_score = self.high_score.max(self.score);
    }
}

/// Side an entity fights for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Faction {
    Players,
    Enemies,
}

/// A shot in flight, remembering who fired it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projectile {
    pub owner: Entity,
    pub faction: Faction,
}
