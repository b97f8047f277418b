//! Performance benchmarks for critical server paths

use server::buffer::RingBuffer;
use server::ecs::components::{Position, Velocity};
use server::ecs::Registry;
use server::game::GameState;
use shared::{snapshot_packets, Packet, SnapshotEntity, MAX_SNAPSHOT_ENTITIES};
use std::time::Instant;

/// Benchmarks a two-component view over a large, partially populated registry
#[test]
fn benchmark_registry_view() {
    let mut registry = Registry::new();
    for i in 0..10_000 {
        let entity = registry.create_entity();
        registry.emplace_component(entity, Position { x: i as f32, y: 0.0 });
        if i % 2 == 0 {
            registry.emplace_component(entity, Velocity { vx: 1.0, vy: 0.5 });
        }
    }

    let iterations = 100;
    let mut visited = 0usize;
    let start = Instant::now();

    for _ in 0..iterations {
        registry.view2::<Position, Velocity, _>(|_, pos, vel| {
            pos.x += vel.vx;
            pos.y += vel.vy;
            visited += 1;
        });
    }

    let duration = start.elapsed();
    println!(
        "Registry view: {} visits in {:?} ({:.2} ns/visit)",
        visited,
        duration,
        duration.as_nanos() as f64 / visited as f64
    );

    assert_eq!(visited, iterations * 5_000);
    // Should complete in under 2s even in debug builds
    assert!(duration.as_secs() < 2);
}

/// Benchmarks encoding and decoding full-size snapshot datagrams
#[test]
fn benchmark_snapshot_codec() {
    let entities: Vec<SnapshotEntity> = (0..MAX_SNAPSHOT_ENTITIES as u32)
        .map(|id| SnapshotEntity {
            id,
            x: id as f32 * 3.5,
            y: 100.0,
            vx: -120.0,
            vy: 0.0,
            sprite: 2,
        })
        .collect();
    let packet = Packet::Snapshot {
        tick: 1,
        entities,
    };

    let iterations = 5_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let bytes = packet.encode().unwrap();
        let decoded = Packet::decode(&bytes).unwrap();
        assert!(matches!(decoded, Packet::Snapshot { .. }));
    }

    let duration = start.elapsed();
    println!(
        "Snapshot codec: {} round trips in {:?} ({:.2} µs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_secs() < 5);
}

/// Stress test for chunking a world much larger than one datagram
#[test]
fn stress_test_snapshot_chunking() {
    let entities: Vec<SnapshotEntity> = (0..10_000u32)
        .map(|id| SnapshotEntity {
            id,
            x: 0.0,
            y: 0.0,
            vx: 0.0,
            vy: 0.0,
            sprite: 1,
        })
        .collect();

    let start = Instant::now();
    let packets = snapshot_packets(9, &entities);
    let bytes: usize = packets.iter().map(|p| p.encode().unwrap().len()).sum();
    let duration = start.elapsed();

    println!(
        "Chunked 10k entities into {} packets ({} bytes) in {:?}",
        packets.len(),
        bytes,
        duration
    );

    assert_eq!(
        packets.len(),
        (entities.len() + MAX_SNAPSHOT_ENTITIES - 1) / MAX_SNAPSHOT_ENTITIES
    );
    assert!(duration.as_millis() < 1_000);
}

/// Benchmarks the ring buffer under a push/pop churn
#[test]
fn benchmark_ring_buffer() {
    let mut buffer = RingBuffer::new(1024);
    let iterations = 1_000_000u64;
    let mut sum = 0u64;
    let start = Instant::now();

    for i in 0..iterations {
        if buffer.push(i).is_err() {
            while let Some(value) = buffer.pop() {
                sum += value;
            }
            buffer.push(i).unwrap();
        }
    }
    sum += buffer.by_ref().sum::<u64>();

    let duration = start.elapsed();
    println!("Ring buffer: {} items in {:?}", iterations, duration);

    assert_eq!(sum, iterations * (iterations - 1) / 2);
    assert!(duration.as_secs() < 2);
}

/// Benchmarks full simulation ticks with a crowded world
#[test]
fn benchmark_game_step() {
    let mut game = GameState::new(99);
    for id in 0..4 {
        game.spawn_player(id);
    }
    for i in 0..200 {
        game.spawn_enemy(1500.0 + (i % 10) as f32 * 30.0, 40.0 + (i / 10) as f32 * 50.0);
    }

    let ticks = 1_000;
    let start = Instant::now();
    for _ in 0..ticks {
        game.step(1.0 / 60.0, true);
        game.take_events();
    }
    let duration = start.elapsed();

    println!(
        "Game step: {} ticks in {:?} ({:.2} µs/tick)",
        ticks,
        duration,
        duration.as_micros() as f64 / ticks as f64
    );

    assert_eq!(game.tick, ticks);
    assert!(duration.as_secs() < 10);
}
