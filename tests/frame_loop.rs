use aquarium::bindings::Reallocation;
use aquarium::images::{AquariumOptions, Behavior, CreateError, Engine};
use aquarium::imp::SoftDevice;
use aquarium::staging::PoolConfig;
use std::sync::Arc;

const FRAME: f64 = 1.0 / 60.0;

fn engine(options: AquariumOptions) -> (Arc<SoftDevice>, Engine<SoftDevice>) {
    let device = Arc::new(SoftDevice::new());
    let engine = Engine::new(device.clone(), options).unwrap();
    (device, engine)
}

fn fish(count: usize) -> AquariumOptions {
    AquariumOptions {
        fish_count: count,
        ..Default::default()
    }
}

#[test]
fn first_frame_allocates_and_draws_every_fish() {
    let (_device, mut engine) = engine(fish(100));
    let report = engine.render_frame(FRAME).unwrap();
    assert_eq!(report.frame, 1);
    assert_eq!(report.fish_count, 100);
    assert_eq!(report.draws, 100);
    assert_eq!(report.reallocation, Reallocation::Grew { from: 0, to: 100 });
    assert!(!report.upload_dropped);
    assert_eq!(engine.species_counts(), &[76, 10, 10, 2, 2]);

    let report = engine.render_frame(FRAME).unwrap();
    assert_eq!(report.reallocation, Reallocation::Unchanged);
    assert_eq!(report.draws, 100);
}

#[test]
fn draws_follow_species_order() {
    let (_device, mut engine) = engine(fish(100));
    engine.render_frame(FRAME).unwrap();
    let draws: Vec<_> = engine.draws().collect();
    let instances: Vec<usize> = draws.iter().map(|d| d.instance).collect();
    assert_eq!(instances, (0..100).collect::<Vec<_>>());
    assert_eq!(draws[0].species.name, "SmallFishA");
    assert_eq!(draws[76].species.name, "MediumFishA");
    assert_eq!(draws[86].species.name, "MediumFishB");
    assert_eq!(draws[96].species.name, "BigFishA");
    assert_eq!(draws[99].species.name, "BigFishB");
    assert_eq!(draws[99].binding.dynamic_offset, Some(99 * 256));
}

#[test]
fn per_instance_mode_creates_a_group_per_fish() {
    let (device, mut engine) = engine(AquariumOptions {
        dynamic_buffer_offset: false,
        ..fish(40)
    });
    engine.render_frame(FRAME).unwrap();
    assert_eq!(device.bind_groups_created(), 40);
    assert!(engine.draws().all(|d| d.binding.dynamic_offset.is_none()));
}

#[test]
fn uniforms_reach_the_device() {
    let (device, mut engine) = engine(fish(20));
    engine.render_frame(0.5).unwrap();
    let contents = device.read_buffer(engine.instances().buffer().unwrap());
    for (index, per) in engine.instances().instance_data().iter().enumerate() {
        let start = index * engine.instances().stride();
        assert_eq!(&contents[start..start + 32], bytemuck::bytes_of(per));
    }
    assert_ne!(engine.instances().instance_data()[0].scale, 0.0);
}

#[test]
fn motion_is_deterministic() {
    let (_a_device, mut a) = engine(fish(30));
    let (_b_device, mut b) = engine(fish(30));
    for _ in 0..3 {
        a.render_frame(FRAME).unwrap();
        b.render_frame(FRAME).unwrap();
    }
    assert_eq!(a.instances().instance_data(), b.instances().instance_data());
    assert!((a.clock() - 3.0 * FRAME).abs() < 1e-12);
}

#[test]
fn fish_come_and_go() {
    let (_device, mut engine) = engine(AquariumOptions {
        simulate_fish_come_and_go: true,
        behaviors: vec![Behavior::add(0, 5), Behavior::remove(1, 12)],
        ..fish(10)
    });
    let report = engine.render_frame(FRAME).unwrap();
    assert_eq!(report.fish_count, 15);
    assert_eq!(report.reallocation, Reallocation::Grew { from: 0, to: 15 });

    let report = engine.render_frame(FRAME).unwrap();
    assert_eq!(report.fish_count, 15);
    assert_eq!(report.reallocation, Reallocation::Unchanged);

    let report = engine.render_frame(FRAME).unwrap();
    assert_eq!(report.fish_count, 3);
    assert_eq!(report.reallocation, Reallocation::Unchanged);
    assert_eq!(report.draws, 3);
    assert_eq!(engine.instances().capacity(), 15);
}

#[test]
fn behaviors_are_ignored_unless_enabled() {
    let (_device, mut engine) = engine(AquariumOptions {
        behaviors: vec![Behavior::add(0, 5)],
        ..fish(10)
    });
    assert_eq!(engine.render_frame(FRAME).unwrap().fish_count, 10);
    assert_eq!(engine.render_frame(FRAME).unwrap().fish_count, 10);
}

#[test]
fn refused_upload_skips_the_frame() {
    let (_device, mut engine) = engine(AquariumOptions {
        pool: PoolConfig {
            capacity_bytes: 1024,
            max_buffer_count: 1,
            ..Default::default()
        },
        ..fish(10)
    });
    let report = engine.render_frame(FRAME).unwrap();
    assert!(report.upload_dropped);
    assert_eq!(report.draws, 10);
    assert_eq!(engine.pool_stats().used_bytes, 0);
}

#[test]
fn sync_mapping_creates_buffers_every_frame() {
    let (device, mut engine) = engine(fish(50));
    for _ in 0..4 {
        engine.render_frame(FRAME).unwrap();
        assert_eq!(device.live_staging_buffers(), 0);
    }
    assert_eq!(device.staging_buffers_created(), 4);
}

#[test]
fn async_mapping_reuses_one_buffer() {
    let (device, mut engine) = engine(AquariumOptions {
        buffer_mapping_async: true,
        ..fish(50)
    });
    for _ in 0..4 {
        let report = engine.render_frame(FRAME).unwrap();
        assert!(!report.upload_dropped);
    }
    assert_eq!(device.staging_buffers_created(), 1);
    assert_eq!(engine.pool_stats().buffer_count, 1);
    assert_eq!(engine.pool_stats().remapping, 1);
}

#[test]
fn dispose_then_render_again() {
    let (device, mut engine) = engine(AquariumOptions {
        buffer_mapping_async: true,
        ..fish(25)
    });
    engine.render_frame(FRAME).unwrap();
    engine.dispose();
    assert_eq!(device.live_staging_buffers(), 0);
    assert_eq!(engine.instances().capacity(), 0);

    let report = engine.render_frame(FRAME).unwrap();
    assert_eq!(report.reallocation, Reallocation::Grew { from: 0, to: 25 });
    assert_eq!(report.draws, 25);
}

#[test]
fn empty_pool_configuration_is_rejected() {
    let device = Arc::new(SoftDevice::new());
    let options = AquariumOptions {
        pool: PoolConfig {
            max_buffer_count: 0,
            ..Default::default()
        },
        ..Default::default()
    };
    let err = Engine::new(device, options).unwrap_err();
    assert!(matches!(err, CreateError::Pool(_)));
}
