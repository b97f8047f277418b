//! Authoritative simulation built on the ECS registry
//!
//! `GameState` owns the registry and advances it one fixed step at a time.
//! Systems run in a fixed order every tick and only ever walk the registry in
//! ascending entity order, so two states built from the same seed and fed the
//! same inputs stay identical. Anything clients need to hear about outside
//! snapshots is queued as a [`GameEvent`] for the server to broadcast.

use crate::ecs::components::{
    AiBrain, AiState, Attack, Collision, Controllable, Damage, Damageable, Direction, Drawable,
    Faction, Health, Position, Projectile, Score, Velocity,
};
use crate::ecs::{EcsError, Entity, Registry};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    sprite, InputCommand, Packet, SnapshotEntity, ENEMY_MAX_HP, ENEMY_SIZE, ENEMY_SPEED,
    PLAYER_MAX_HP, PLAYER_SIZE, PLAYER_SPEED, PROJECTILE_SIZE, PROJECTILE_SPEED, WORLD_HEIGHT,
    WORLD_WIDTH,
};
use std::collections::BTreeSet;

const PLAYER_FIRE_COOLDOWN: f32 = 0.25;
const PLAYER_SHOT_DAMAGE: i32 = 8;

const ENEMY_FIRE_COOLDOWN: f32 = 1.5;
const ENEMY_SHOT_DAMAGE: i32 = 10;
const ENEMY_ATTACK_RANGE: f32 = 600.0;
const ENEMY_IDLE_TIME: f32 = 0.5;
const ENEMY_SPAWN_INTERVAL: f32 = 2.0;
const MAX_ENEMIES: usize = 16;
/// Health ratio under which an enemy turns tail
const FLEE_RATIO: f32 = 0.25;

const KILL_POINTS: i32 = 100;

/// Something clients must be told about outside of snapshots
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GameEvent {
    EntityCreated {
        entity: Entity,
        x: f32,
        y: f32,
        sprite: u16,
    },
    EntityDestroyed {
        entity: Entity,
    },
    Damaged {
        entity: Entity,
        amount: i32,
    },
    GameOver,
}

impl GameEvent {
    /// Wire form of the event, `None` if the entity id does not fit the protocol.
    pub fn to_packet(&self) -> Option<Packet> {
        let packet = match *self {
            GameEvent::EntityCreated {
                entity,
                x,
                y,
                sprite,
            } => Packet::EntityCreate {
                id: entity.wire_id()?,
                x,
                y,
                sprite,
            },
            GameEvent::EntityDestroyed { entity } => Packet::EntityDestroy {
                id: entity.wire_id()?,
            },
            GameEvent::Damaged { entity, amount } => Packet::DamageEvent {
                id: entity.wire_id()?,
                amount: u16::try_from(amount.max(0)).unwrap_or(u16::MAX),
            },
            GameEvent::GameOver => Packet::GameOver,
        };
        Some(packet)
    }
}

pub struct GameState {
    pub tick: u32,
    registry: Registry,
    rng: StdRng,
    events: Vec<GameEvent>,
    /// Player entities still alive
    players: BTreeSet<Entity>,
    /// Players killed in the current round
    players_lost: usize,
    /// Players that left the current round alive
    players_left: usize,
    spawn_timer: f32,
    game_over: bool,
}

impl GameState {
    pub fn new(seed: u64) -> Self {
        let mut registry = Registry::new();
        registry.register_component::<Position>();
        registry.register_component::<Velocity>();
        registry.register_component::<Health>();
        registry.register_component::<Collision>();
        registry.register_component::<Attack>();
        registry.register_component::<Damage>();
        registry.register_component::<Damageable>();
        registry.register_component::<Direction>();
        registry.register_component::<Drawable>();
        registry.register_component::<Controllable>();
        registry.register_component::<AiBrain>();
        registry.register_component::<Score>();
        registry.register_component::<Faction>();
        registry.register_component::<Projectile>();

        debug!("Game state created with seed {}", seed);
        Self {
            tick: 0,
            registry,
            rng: StdRng::seed_from_u64(seed),
            events: Vec::new(),
            players: BTreeSet::new(),
            players_lost: 0,
            players_left: 0,
            spawn_timer: ENEMY_SPAWN_INTERVAL,
            game_over: false,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn alive_players(&self) -> usize {
        self.players.len()
    }

    pub fn is_player(&self, entity: Entity) -> bool {
        self.players.contains(&entity)
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    pub fn enemy_count(&self) -> usize {
        self.registry
            .get_components::<AiBrain>()
            .map_or(0, |brains| brains.iter().count())
    }

    /// Drains the events queued since the last call.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    /// Spawns the ship controlled by `player_id` on the left side of the world.
    pub fn spawn_player(&mut self, player_id: u32) -> Entity {
        let lane_span = WORLD_HEIGHT - PLAYER_SIZE * 4.0;
        let y = PLAYER_SIZE * 2.0 + (player_id as f32 * PLAYER_SIZE * 3.0) % lane_span;
        let position = Position {
            x: PLAYER_SIZE * 2.0,
            y,
        };

        let entity = self.registry.create_entity();
        self.registry.emplace_component(entity, position);
        self.registry.emplace_component(entity, Velocity::default());
        self.registry.emplace_component(entity, Health::new(PLAYER_MAX_HP));
        self.registry
            .emplace_component(entity, Collision::square(PLAYER_SIZE));
        self.registry.emplace_component(
            entity,
            Attack::new(PLAYER_SHOT_DAMAGE, WORLD_WIDTH, PLAYER_FIRE_COOLDOWN),
        );
        self.registry.emplace_component(
            entity,
            Damageable {
                can_be_damaged: true,
            },
        );
        self.registry.emplace_component(entity, Direction::default());
        self.registry
            .emplace_component(entity, Drawable::visible(sprite::PLAYER));
        self.registry
            .emplace_component(entity, Controllable { player_id });
        self.registry.emplace_component(entity, Score::default());
        self.registry.emplace_component(entity, Faction::Players);

        self.players.insert(entity);
        self.game_over = false;

        info!(
            "Spawned player {} as entity {} at ({}, {})",
            player_id, entity, position.x, position.y
        );
        self.emit_created(entity, position, sprite::PLAYER);
        entity
    }

    /// Removes a player that left the session. Returns false if it was not alive.
    pub fn remove_player(&mut self, entity: Entity) -> bool {
        if !self.players.remove(&entity) {
            return false;
        }
        self.players_left += 1;
        self.destroy(entity);
        info!("Removed player entity {}", entity);
        true
    }

    pub fn spawn_enemy(&mut self, x: f32, y: f32) -> Entity {
        let position = Position { x, y };

        let entity = self.registry.create_entity();
        self.registry.emplace_component(entity, position);
        self.registry.emplace_component(entity, Velocity::default());
        self.registry.emplace_component(entity, Health::new(ENEMY_MAX_HP));
        self.registry
            .emplace_component(entity, Collision::square(ENEMY_SIZE));
        self.registry.emplace_component(
            entity,
            Attack::new(ENEMY_SHOT_DAMAGE, ENEMY_ATTACK_RANGE, ENEMY_FIRE_COOLDOWN),
        );
        self.registry.emplace_component(
            entity,
            Damageable {
                can_be_damaged: true,
            },
        );
        self.registry
            .emplace_component(entity, Direction { dx: -1.0, dy: 0.0 });
        self.registry
            .emplace_component(entity, Drawable::visible(sprite::ENEMY));
        self.registry.emplace_component(entity, AiBrain::default());
        self.registry.emplace_component(entity, Faction::Enemies);

        debug!("Spawned enemy {} at ({}, {})", entity, x, y);
        self.emit_created(entity, position, sprite::ENEMY);
        entity
    }

    /// Applies one input command to a living player entity.
    ///
    /// Returns false, changing nothing, when `entity` is not a living player.
    pub fn apply_input(&mut self, entity: Entity, command: &InputCommand) -> bool {
        if !self.players.contains(&entity) {
            return false;
        }

        let dx = sanitize_axis(command.dx);
        let dy = sanitize_axis(command.dy);

        if let Some(velocity) = self.registry.get_mut::<Velocity>(entity) {
            velocity.vx = dx * PLAYER_SPEED;
            velocity.vy = dy * PLAYER_SPEED;
        }
        if dx != 0.0 || dy != 0.0 {
            if let Some(direction) = self.registry.get_mut::<Direction>(entity) {
                let (nx, ny) = normalize(dx, dy);
                direction.dx = nx;
                direction.dy = ny;
            }
        }

        if command.shooting {
            let aim = self
                .registry
                .get::<Direction>(entity)
                .map_or((1.0, 0.0), |d| (d.dx, d.dy));
            self.try_fire(entity, Faction::Players, aim);
        }
        true
    }

    /// Advances the simulation by one fixed step of `dt` seconds.
    ///
    /// `clients_connected` gates the game-over check: a round nobody is
    /// watching ends silently.
    pub fn step(&mut self, dt: f32, clients_connected: bool) {
        self.tick = self.tick.wrapping_add(1);

        self.update_cooldowns(dt);
        self.spawn_enemies(dt);
        self.update_ai(dt);
        self.update_movement(dt);
        self.enforce_bounds();
        self.resolve_projectile_hits();
        self.remove_dead();
        self.check_game_over(clients_connected);
    }

    /// Every visible entity with a position, in ascending entity order.
    pub fn snapshot(&self) -> Result<Vec<SnapshotEntity>, EcsError> {
        let positions = self.registry.get_components::<Position>()?;
        let velocities = self.registry.get_components::<Velocity>()?;
        let drawables = self.registry.get_components::<Drawable>()?;

        Ok(positions
            .iter()
            .filter_map(|(index, position)| {
                let drawable = drawables.get(index).filter(|d| d.visible)?;
                let velocity = velocities.get(index).copied().unwrap_or_default();
                Some(SnapshotEntity {
                    id: u32::try_from(index).ok()?,
                    x: position.x,
                    y: position.y,
                    vx: velocity.vx,
                    vy: velocity.vy,
                    sprite: drawable.sprite_id,
                })
            })
            .collect())
    }

    fn update_cooldowns(&mut self, dt: f32) {
        self.registry.view1::<Attack, _>(|_, attack| {
            attack.ready_in = (attack.ready_in - dt).max(0.0);
        });
    }

    fn spawn_enemies(&mut self, dt: f32) {
        if self.players.is_empty() {
            return;
        }
        self.spawn_timer -= dt;
        if self.spawn_timer > 0.0 {
            return;
        }
        self.spawn_timer = ENEMY_SPAWN_INTERVAL;

        if self.enemy_count() >= MAX_ENEMIES {
            return;
        }
        let half = ENEMY_SIZE / 2.0;
        let y = self.rng.gen_range(half..WORLD_HEIGHT - half);
        self.spawn_enemy(WORLD_WIDTH - half, y);
    }

    fn update_ai(&mut self, dt: f32) {
        let mut targets = Vec::new();
        self.registry
            .view2::<Controllable, Position, _>(|_, _, position| targets.push(*position));

        let mut attackers = Vec::new();
        self.registry.view4::<AiBrain, Position, Velocity, Health, _>(
            |entity, brain, position, velocity, health| {
                brain.timer += dt;

                let in_range = nearest(position, &targets)
                    .filter(|(_, distance)| *distance <= ENEMY_ATTACK_RANGE);

                let next = if health.is_dead() {
                    AiState::Dead
                } else if health.ratio() < FLEE_RATIO {
                    AiState::Flee
                } else if in_range.is_some() {
                    AiState::Attack
                } else if brain.state == AiState::Idle && brain.timer < ENEMY_IDLE_TIME {
                    AiState::Idle
                } else {
                    AiState::Patrol
                };
                brain.transition(next);

                let (vx, vy) = match brain.state {
                    AiState::Idle | AiState::Dead => (0.0, 0.0),
                    AiState::Patrol => (-ENEMY_SPEED, 0.0),
                    AiState::Flee => (ENEMY_SPEED, 0.0),
                    AiState::Attack => (-ENEMY_SPEED * 0.5, 0.0),
                };
                velocity.vx = vx;
                velocity.vy = vy;

                if let Some((target, _)) = in_range.filter(|_| brain.state == AiState::Attack) {
                    let aim = normalize(target.x - position.x, target.y - position.y);
                    attackers.push((entity, aim));
                }
            },
        );

        for (entity, aim) in attackers {
            if let Some(direction) = self.registry.get_mut::<Direction>(entity) {
                direction.dx = aim.0;
                direction.dy = aim.1;
            }
            self.try_fire(entity, Faction::Enemies, aim);
        }
    }

    fn update_movement(&mut self, dt: f32) {
        self.registry
            .view2::<Position, Velocity, _>(|_, position, velocity| {
                position.x += velocity.vx * dt;
                position.y += velocity.vy * dt;
            });
    }

    fn enforce_bounds(&mut self) {
        self.registry
            .view3::<Controllable, Position, Collision, _>(|_, _, position, size| {
                let half_w = size.width / 2.0;
                let half_h = size.height / 2.0;
                position.x = position.x.clamp(half_w, WORLD_WIDTH - half_w);
                position.y = position.y.clamp(half_h, WORLD_HEIGHT - half_h);
            });

        let mut escaped = Vec::new();
        self.registry.view1::<Position, _>(|entity, position| {
            let inside = (0.0..=WORLD_WIDTH).contains(&position.x)
                && (0.0..=WORLD_HEIGHT).contains(&position.y);
            if !inside {
                escaped.push(entity);
            }
        });

        for entity in escaped {
            if !self.players.contains(&entity) {
                self.destroy(entity);
            }
        }
    }

    fn resolve_projectile_hits(&mut self) {
        let mut shots = Vec::new();
        self.registry
            .view4::<Projectile, Position, Collision, Damage, _>(
                |entity, projectile, position, size, damage| {
                    shots.push((entity, *projectile, *position, *size, damage.amount));
                },
            );
        if shots.is_empty() {
            return;
        }

        let mut targets = Vec::new();
        self.registry
            .view4::<Damageable, Faction, Position, Collision, _>(
                |entity, damageable, faction, position, size| {
                    if damageable.can_be_damaged {
                        targets.push((entity, *faction, *position, *size));
                    }
                },
            );

        let mut spent = Vec::new();
        for (shot, projectile, shot_position, shot_size, amount) in shots {
            let hit = targets
                .iter()
                .find(|(target, faction, position, size)| {
                    *target != projectile.owner
                        && *faction != projectile.faction
                        && shot_size.overlaps(&shot_position, size, position)
                        && self
                            .registry
                            .get::<Health>(*target)
                            .is_some_and(|health| !health.is_dead())
                })
                .map(|(target, ..)| *target);
            let Some(target) = hit else {
                continue;
            };

            spent.push(shot);
            let Some(health) = self.registry.get_mut::<Health>(target) else {
                continue;
            };
            health.hp -= amount;
            let killed = health.is_dead();

            debug!("Entity {} hit {} for {}", shot, target, amount);
            self.events.push(GameEvent::Damaged {
                entity: target,
                amount,
            });

            if killed {
                if let Some(score) = self.registry.get_mut::<Score>(projectile.owner) {
                    score.add(KILL_POINTS);
                }
            }
        }

        for shot in spent {
            self.destroy(shot);
        }
    }

    fn remove_dead(&mut self) {
        let mut dead = Vec::new();
        self.registry.view1::<Health, _>(|entity, health| {
            if health.is_dead() {
                dead.push(entity);
            }
        });

        for entity in dead {
            if self.players.remove(&entity) {
                self.players_lost += 1;
                info!("Player entity {} was destroyed", entity);
            }
            self.destroy(entity);
        }
    }

    /// Ends the round once no player is alive. It is only a game over when
    /// every player of the round died.
    fn check_game_over(&mut self, clients_connected: bool) {
        if self.game_over || !self.players.is_empty() {
            return;
        }
        let all_died = self.players_lost > 0 && self.players_left == 0;
        self.players_lost = 0;
        self.players_left = 0;

        if all_died && clients_connected {
            self.game_over = true;
            info!("Game over at tick {}", self.tick);
            self.events.push(GameEvent::GameOver);
        }
    }

    fn try_fire(&mut self, shooter: Entity, faction: Faction, aim: (f32, f32)) -> Option<Entity> {
        let attack = self.registry.get_mut::<Attack>(shooter)?;
        if !attack.is_ready() {
            return None;
        }
        attack.trigger();
        let damage = attack.damage;

        let origin = *self.registry.get::<Position>(shooter)?;
        Some(self.spawn_projectile(shooter, faction, origin, aim, damage))
    }

    fn spawn_projectile(
        &mut self,
        owner: Entity,
        faction: Faction,
        origin: Position,
        (dx, dy): (f32, f32),
        damage: i32,
    ) -> Entity {
        let sprite_id = match faction {
            Faction::Players => sprite::PLAYER_SHOT,
            Faction::Enemies => sprite::ENEMY_SHOT,
        };
        let position = Position {
            x: origin.x + dx * PROJECTILE_SIZE,
            y: origin.y + dy * PROJECTILE_SIZE,
        };

        let entity = self.registry.create_entity();
        self.registry.emplace_component(entity, position);
        self.registry.emplace_component(
            entity,
            Velocity {
                vx: dx * PROJECTILE_SPEED,
                vy: dy * PROJECTILE_SPEED,
            },
        );
        self.registry
            .emplace_component(entity, Collision::square(PROJECTILE_SIZE));
        self.registry
            .emplace_component(entity, Damage { amount: damage });
        self.registry
            .emplace_component(entity, Projectile { owner, faction });
        self.registry
            .emplace_component(entity, Drawable::visible(sprite_id));

        self.emit_created(entity, position, sprite_id);
        entity
    }

    fn destroy(&mut self, entity: Entity) {
        self.registry.destroy_entity(entity);
        self.events.push(GameEvent::EntityDestroyed { entity });
    }

    fn emit_created(&mut self, entity: Entity, position: Position, sprite: u16) {
        self.events.push(GameEvent::EntityCreated {
            entity,
            x: position.x,
            y: position.y,
            sprite,
        });
    }
}

/// Clamps an input axis to -1..=1, mapping NaN and infinities to 0.
fn sanitize_axis(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

fn normalize(dx: f32, dy: f32) -> (f32, f32) {
    let length = (dx * dx + dy * dy).sqrt();
    if length == 0.0 {
        (0.0, 0.0)
    } else {
        (dx / length, dy / length)
    }
}

/// Closest target to `from` and its distance
fn nearest(from: &Position, targets: &[Position]) -> Option<(Position, f32)> {
    targets
        .iter()
        .map(|target| {
            let distance = ((target.x - from.x).powi(2) + (target.y - from.y).powi(2)).sqrt();
            (*target, distance)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn input(entity: Entity, dx: f32, dy: f32, shooting: bool) -> InputCommand {
        InputCommand {
            entity: entity.wire_id().unwrap(),
            dx,
            dy,
            shooting,
        }
    }

    fn position_of(game: &GameState, entity: Entity) -> Position {
        *game.registry().get::<Position>(entity).unwrap()
    }

    #[test]
    fn test_new_registers_every_component() {
        let game = GameState::new(1);
        let registry = game.registry();

        assert!(registry.is_registered::<Position>());
        assert!(registry.is_registered::<AiBrain>());
        assert!(registry.is_registered::<Projectile>());
        assert!(game.snapshot().unwrap().is_empty());
        assert_eq!(game.tick, 0);
    }

    #[test]
    fn test_spawn_player_emits_create_and_appears_in_snapshot() {
        let mut game = GameState::new(1);
        let player = game.spawn_player(1);

        let events = game.take_events();
        assert!(matches!(
            events.as_slice(),
            [GameEvent::EntityCreated { entity, sprite: sprite::PLAYER, .. }] if *entity == player
        ));
        assert!(game.take_events().is_empty());

        let snapshot = game.snapshot().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, player.wire_id().unwrap());
        assert_eq!(snapshot[0].sprite, sprite::PLAYER);
        assert_eq!(game.alive_players(), 1);
    }

    #[test]
    fn test_input_for_unknown_entity_is_ignored() {
        let mut game = GameState::new(1);
        let player = game.spawn_player(1);
        let before = game.snapshot().unwrap();

        let stranger = Entity::new(999);
        assert!(!game.apply_input(stranger, &input(stranger, 1.0, 0.0, true)));

        assert_eq!(game.snapshot().unwrap(), before);
        assert!(game.is_player(player));
        assert!(!game.is_player(stranger));
    }

    #[test]
    fn test_input_moves_player() {
        let mut game = GameState::new(1);
        let player = game.spawn_player(1);
        let start = position_of(&game, player);

        assert!(game.apply_input(player, &input(player, 1.0, 0.0, false)));
        game.step(0.1, true);

        let end = position_of(&game, player);
        assert_approx_eq!(end.x - start.x, PLAYER_SPEED * 0.1, 1e-3);
        assert_approx_eq!(end.y, start.y, 1e-6);
        assert_eq!(game.tick, 1);
    }

    #[test]
    fn test_input_axes_are_sanitized() {
        let mut game = GameState::new(1);
        let player = game.spawn_player(1);

        game.apply_input(player, &input(player, f32::NAN, 5.0, false));

        let velocity = game.registry().get::<Velocity>(player).unwrap();
        assert_eq!(velocity.vx, 0.0);
        assert_eq!(velocity.vy, PLAYER_SPEED);
    }

    #[test]
    fn test_player_clamped_to_world() {
        let mut game = GameState::new(1);
        let player = game.spawn_player(1);

        game.apply_input(player, &input(player, -1.0, -1.0, false));
        for _ in 0..20 {
            game.step(0.1, true);
        }

        let position = position_of(&game, player);
        assert_approx_eq!(position.x, PLAYER_SIZE / 2.0, 1e-6);
        assert_approx_eq!(position.y, PLAYER_SIZE / 2.0, 1e-6);
        assert!(game.is_player(player));
    }

    #[test]
    fn test_shooting_respects_cooldown() {
        let mut game = GameState::new(1);
        let player = game.spawn_player(1);
        game.take_events();

        game.apply_input(player, &input(player, 0.0, 0.0, true));
        game.apply_input(player, &input(player, 0.0, 0.0, true));

        let shots: Vec<_> = game
            .take_events()
            .into_iter()
            .filter(|event| {
                matches!(event, GameEvent::EntityCreated { sprite: sprite::PLAYER_SHOT, .. })
            })
            .collect();
        assert_eq!(shots.len(), 1);

        game.step(PLAYER_FIRE_COOLDOWN, true);
        game.apply_input(player, &input(player, 0.0, 0.0, true));
        assert!(game.take_events().iter().any(|event| {
            matches!(event, GameEvent::EntityCreated { sprite: sprite::PLAYER_SHOT, .. })
        }));
    }

    #[test]
    fn test_projectile_kill_credits_score() {
        let mut game = GameState::new(1);
        let player = game.spawn_player(1);
        let origin = position_of(&game, player);
        let enemy = game.spawn_enemy(origin.x + 40.0, origin.y);
        game.registry_mut().get_mut::<Health>(enemy).unwrap().hp = PLAYER_SHOT_DAMAGE;
        game.take_events();

        game.apply_input(player, &input(player, 0.0, 0.0, true));
        game.step(0.05, true);

        let events = game.take_events();
        assert!(events.contains(&GameEvent::Damaged {
            entity: enemy,
            amount: PLAYER_SHOT_DAMAGE
        }));
        assert!(events.contains(&GameEvent::EntityDestroyed { entity: enemy }));
        assert!(!game.registry().has_component::<Position>(enemy));
        assert_eq!(
            game.registry().get::<Score>(player).unwrap().score,
            KILL_POINTS
        );
    }

    #[test]
    fn test_last_player_death_triggers_game_over_once() {
        let mut game = GameState::new(1);
        let player = game.spawn_player(1);
        game.take_events();

        game.registry_mut().get_mut::<Health>(player).unwrap().hp = 0;
        game.step(0.01, true);

        let events = game.take_events();
        assert!(events.contains(&GameEvent::EntityDestroyed { entity: player }));
        assert_eq!(events.last(), Some(&GameEvent::GameOver));
        assert!(game.is_game_over());
        assert_eq!(game.alive_players(), 0);

        game.step(0.01, true);
        assert!(!game.take_events().contains(&GameEvent::GameOver));

        // A new player starts a fresh round
        game.spawn_player(2);
        assert!(!game.is_game_over());
    }

    #[test]
    fn test_remove_player() {
        let mut game = GameState::new(1);
        let player = game.spawn_player(1);
        game.take_events();

        assert!(game.remove_player(player));
        assert_eq!(
            game.take_events(),
            vec![GameEvent::EntityDestroyed { entity: player }]
        );
        assert!(!game.remove_player(player));

        // Leaving is not dying
        game.step(0.01, true);
        assert!(!game.is_game_over());
    }

    #[test]
    fn test_survivor_leaving_after_death_is_not_game_over() {
        let mut game = GameState::new(1);
        let fallen = game.spawn_player(1);
        let survivor = game.spawn_player(2);
        game.registry_mut().get_mut::<Health>(fallen).unwrap().hp = 0;
        game.step(0.01, true);
        assert_eq!(game.alive_players(), 1);
        game.take_events();

        assert!(game.remove_player(survivor));
        game.step(0.01, true);

        assert_eq!(
            game.take_events(),
            vec![GameEvent::EntityDestroyed { entity: survivor }]
        );
        assert!(!game.is_game_over());

        // The abandoned round does not count against the next one
        let next = game.spawn_player(3);
        game.registry_mut().get_mut::<Health>(next).unwrap().hp = 0;
        game.step(0.01, true);
        assert!(game.is_game_over());
    }

    #[test]
    fn test_game_over_needs_a_connected_client() {
        let mut game = GameState::new(1);
        let player = game.spawn_player(1);
        game.registry_mut().get_mut::<Health>(player).unwrap().hp = 0;

        game.step(0.01, false);

        assert!(!game.take_events().contains(&GameEvent::GameOver));
        assert!(!game.is_game_over());
    }

    #[test]
    fn test_enemy_idles_then_patrols() {
        let mut game = GameState::new(1);
        let enemy = game.spawn_enemy(1000.0, 500.0);

        game.step(0.3, true);
        assert_eq!(
            game.registry().get::<AiBrain>(enemy).unwrap().state,
            AiState::Idle
        );

        game.step(0.3, true);
        assert_eq!(
            game.registry().get::<AiBrain>(enemy).unwrap().state,
            AiState::Patrol
        );
        assert_eq!(
            game.registry().get::<Velocity>(enemy).unwrap().vx,
            -ENEMY_SPEED
        );
    }

    #[test]
    fn test_wounded_enemy_flees() {
        let mut game = GameState::new(1);
        let enemy = game.spawn_enemy(1000.0, 500.0);
        game.registry_mut().get_mut::<Health>(enemy).unwrap().hp = 5;

        game.step(0.1, true);

        assert_eq!(
            game.registry().get::<AiBrain>(enemy).unwrap().state,
            AiState::Flee
        );
        assert!(game.registry().get::<Velocity>(enemy).unwrap().vx > 0.0);
    }

    #[test]
    fn test_enemy_in_range_attacks() {
        let mut game = GameState::new(1);
        let player = game.spawn_player(1);
        let origin = position_of(&game, player);
        let enemy = game.spawn_enemy(origin.x + 300.0, origin.y);
        game.take_events();

        game.step(0.01, true);

        assert_eq!(
            game.registry().get::<AiBrain>(enemy).unwrap().state,
            AiState::Attack
        );
        assert!(game.take_events().iter().any(|event| {
            matches!(event, GameEvent::EntityCreated { sprite: sprite::ENEMY_SHOT, .. })
        }));
        let direction = game.registry().get::<Direction>(enemy).unwrap();
        assert_approx_eq!(direction.dx, -1.0, 1e-5);
    }

    #[test]
    fn test_projectile_leaving_world_is_destroyed() {
        let mut game = GameState::new(1);
        let player = game.spawn_player(1);
        game.apply_input(player, &input(player, 0.0, 0.0, true));
        let shot = game
            .take_events()
            .into_iter()
            .find_map(|event| match event {
                GameEvent::EntityCreated {
                    entity,
                    sprite: sprite::PLAYER_SHOT,
                    ..
                } => Some(entity),
                _ => None,
            })
            .unwrap();

        game.registry_mut().get_mut::<Position>(shot).unwrap().x = WORLD_WIDTH + 50.0;
        game.enforce_bounds();

        assert!(!game.registry().has_component::<Projectile>(shot));
        assert!(game
            .take_events()
            .contains(&GameEvent::EntityDestroyed { entity: shot }));
    }

    #[test]
    fn test_spawner_is_deterministic_per_seed() {
        let run = |seed| {
            let mut game = GameState::new(seed);
            game.spawn_player(1);
            game.step(ENEMY_SPAWN_INTERVAL, true);
            game.snapshot().unwrap()
        };

        let first = run(7);
        assert_eq!(first, run(7));
        assert_eq!(
            first
                .iter()
                .filter(|entity| entity.sprite == sprite::ENEMY)
                .count(),
            1
        );
    }

    #[test]
    fn test_no_enemies_without_players() {
        let mut game = GameState::new(3);
        for _ in 0..10 {
            game.step(ENEMY_SPAWN_INTERVAL, true);
        }
        assert_eq!(game.enemy_count(), 0);
    }

    #[test]
    fn test_snapshot_skips_hidden_entities() {
        let mut game = GameState::new(1);
        let player = game.spawn_player(1);
        let enemy = game.spawn_enemy(900.0, 300.0);
        game.registry_mut().get_mut::<Drawable>(enemy).unwrap().visible = false;

        let ids: Vec<u32> = game.snapshot().unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![player.wire_id().unwrap()]);
    }

    #[test]
    fn test_event_packets() {
        let entity = Entity::new(5);
        assert_eq!(
            GameEvent::Damaged {
                entity,
                amount: 70_000
            }
            .to_packet(),
            Some(Packet::DamageEvent {
                id: 5,
                amount: u16::MAX
            })
        );
        assert_eq!(
            GameEvent::EntityDestroyed { entity }.to_packet(),
            Some(Packet::EntityDestroy { id: 5 })
        );
        assert_eq!(GameEvent::GameOver.to_packet(), Some(Packet::GameOver));
    }
}
