#![cfg(feature = "backend_wgpu")]

use aquarium::bindings::{InstanceResources, Reallocation};
use aquarium::images::{AquariumOptions, Engine};
use aquarium::imp::{Device, Error, WgpuDevice};
use aquarium::staging::{BufferManager, MapStrategy, PoolConfig};
use std::sync::Arc;
use test_executors::async_test;

/// `None` on machines without a usable adapter.
async fn device() -> Option<Arc<WgpuDevice>> {
    match WgpuDevice::new().await {
        Ok(device) => Some(Arc::new(device)),
        Err(Error::NoSuchAdapter) => {
            println!("no adapter; skipping");
            None
        }
        Err(e) => panic!("can't create device: {e}"),
    }
}

fn small_pool(strategy: MapStrategy) -> PoolConfig {
    PoolConfig {
        capacity_bytes: 4 * 1024 * 1024,
        max_buffer_count: 4,
        strategy,
        ..Default::default()
    }
}

#[async_test]
async fn uploads_submit_in_both_strategies() {
    let Some(device) = device().await else { return };
    for strategy in [MapStrategy::Sync, MapStrategy::Async] {
        let mut pool = BufferManager::new(device.clone(), small_pool(strategy));
        let dest = device.create_uniform_buffer(1024, "dest").unwrap();
        for _ in 0..3 {
            pool.upload(&dest, 0, &[1; 512]).unwrap();
            pool.upload(&dest, 512, &[2; 20]).unwrap();
            pool.flush();
            pool.poll();
        }
        assert!(pool.buffer_count() <= 4);
        pool.dispose();
    }
}

#[async_test]
async fn reallocation_builds_bind_groups() {
    let Some(device) = device().await else { return };
    let mut store = InstanceResources::new(device.clone());
    assert_eq!(store.stride() % device.uniform_offset_alignment(), 0);
    assert!(store.reallocate(0, 16, false).unwrap().grew());
    assert_eq!(store.bind_group_count(), 16);
    assert_eq!(store.reallocate(16, 16, true).unwrap(), Reallocation::Rebound { capacity: 16 });
    assert_eq!(store.bind_group_count(), 1);
    assert_eq!(store.binding(3).unwrap().dynamic_offset, Some(3 * store.stride() as u32));
}

#[async_test]
async fn engine_renders_frames() {
    let Some(device) = device().await else { return };
    let options = AquariumOptions {
        fish_count: 200,
        buffer_mapping_async: true,
        pool: small_pool(MapStrategy::Async),
        ..Default::default()
    };
    let mut engine = Engine::new(device, options).unwrap();
    for _ in 0..5 {
        let report = engine.render_frame(1.0 / 60.0).unwrap();
        assert!(!report.upload_dropped);
        assert_eq!(report.draws, 200);
    }
    engine.dispose();
}
