use aquarium::imp::{Device, SoftDevice};
use aquarium::staging::{AllocError, BufferManager, MapStrategy, PoolConfig, RingState};
use std::sync::Arc;
use std::time::Duration;

fn pool(capacity_bytes: usize, max_buffer_count: usize, strategy: MapStrategy) -> (Arc<SoftDevice>, BufferManager<SoftDevice>) {
    let device = Arc::new(SoftDevice::new());
    let config = PoolConfig {
        capacity_bytes,
        max_buffer_count,
        strategy,
        remap_wait_timeout: Duration::from_millis(50),
    };
    let pool = BufferManager::new(device.clone(), config);
    (device, pool)
}

#[test]
fn async_pool_stops_at_its_buffer_limit() {
    let (_device, mut pool) = pool(1000, 10, MapStrategy::Async);
    assert_eq!(pool.config().per_buffer_bytes(), 100);
    for request in 0..10 {
        let allocation = pool.allocate(80).unwrap();
        assert_eq!(allocation.offset, 0);
        assert_eq!(pool.buffer_count(), request + 1);
        assert!(pool.used_bytes() <= 1000);
    }
    assert_eq!(pool.used_bytes(), 1000);
    for _ in 10..12 {
        let err = pool.allocate(80).unwrap_err();
        assert!(matches!(err, AllocError::UpperLimit { .. }), "{err:?}");
        assert_eq!(pool.used_bytes(), 1000);
    }
    assert_eq!(pool.buffer_count(), 10);
}

#[test]
fn sync_request_larger_than_the_pool_is_refused() {
    let (device, mut pool) = pool(256, 10, MapStrategy::Sync);
    let err = pool.allocate(300).unwrap_err();
    assert!(matches!(err, AllocError::UpperLimit { .. }));
    assert!(err.to_string().starts_with("memory upper limit"));
    assert_eq!(pool.used_bytes(), 0);
    assert_eq!(device.staging_buffers_created(), 0);
}

#[test]
fn sync_pool_charges_until_the_ceiling() {
    let (device, mut pool) = pool(256, 10, MapStrategy::Sync);
    let a = pool.allocate(100).unwrap();
    let b = pool.allocate(100).unwrap();
    assert_eq!((a.offset, a.size), (0, 104));
    assert_eq!((b.offset, b.size), (0, 104));
    assert_ne!(a.buffer, b.buffer);
    assert_eq!(pool.used_bytes(), 208);
    assert!(pool.allocate(100).is_err());
    assert_eq!(pool.used_bytes(), 208);
    assert_eq!(pool.active_buffers(), &[a.buffer, b.buffer]);

    pool.flush();
    assert_eq!(pool.used_bytes(), 0);
    assert_eq!(pool.buffer_count(), 0);
    assert_eq!(device.live_staging_buffers(), 0);
    assert_eq!(device.submissions(), 1);
    assert!(pool.allocate(100).is_ok());
}

fn huge_requests_are_refused(strategy: MapStrategy) {
    let (device, mut pool) = pool(256, 10, strategy);
    pool.allocate(16).unwrap();
    for request in [usize::MAX, usize::MAX - 3, usize::MAX - 16] {
        let err = pool.allocate(request).unwrap_err();
        assert!(matches!(err, AllocError::UpperLimit { .. }), "{request}: {err:?}");
    }
    assert_eq!(pool.active_buffers().len(), 1);
    assert!(pool.used_bytes() <= 256);
    assert!(device.staging_buffers_created() <= 1);
}

#[test]
fn huge_requests_are_refused_sync() {
    huge_requests_are_refused(MapStrategy::Sync);
}

#[test]
fn huge_requests_are_refused_async() {
    huge_requests_are_refused(MapStrategy::Async);
}

#[test]
fn async_buffer_serves_several_allocations() {
    let (_device, mut pool) = pool(1000, 10, MapStrategy::Async);
    let a = pool.allocate(40).unwrap();
    let b = pool.allocate(40).unwrap();
    assert_eq!(a.buffer, b.buffer);
    assert_eq!((a.offset, b.offset), (0, 40));
    assert_eq!(pool.active_buffers().len(), 1);
}

#[test]
fn flushed_buffers_return_after_remap() {
    let (_device, mut pool) = pool(1000, 10, MapStrategy::Async);
    let first = pool.allocate(40).unwrap();
    pool.flush();
    let stats = pool.stats();
    assert_eq!(stats.remapping, 1);
    assert_eq!(stats.recyclable, 0);
    assert_eq!(stats.active, 0);
    assert_eq!(pool.ring(first.buffer).unwrap().state(), RingState::Remapping);

    assert_eq!(pool.poll(), 1);
    assert_eq!(pool.recyclable_buffers().collect::<Vec<_>>(), vec![first.buffer]);

    let again = pool.allocate(40).unwrap();
    assert_eq!(again.buffer, first.buffer);
    assert_eq!(again.offset, 0);
    assert_eq!(pool.buffer_count(), 1);
    assert_eq!(pool.used_bytes(), 100);
}

#[test]
fn recycled_buffers_without_room_are_skipped() {
    let (_device, mut pool) = pool(1000, 10, MapStrategy::Async);
    let a = pool.allocate(80).unwrap();
    let b = pool.allocate(80).unwrap();
    assert_ne!(a.buffer, b.buffer);
    pool.flush();
    pool.poll();
    assert_eq!(pool.recyclable_buffers().collect::<Vec<_>>(), vec![a.buffer, b.buffer]);

    let small = pool.allocate(60).unwrap();
    assert_eq!(small.buffer, a.buffer);
    //a has 40 bytes left, so it is dropped from the queue in favor of b
    let next = pool.allocate(60).unwrap();
    assert_eq!(next.buffer, b.buffer);
    assert_eq!(pool.recyclable_buffers().collect::<Vec<_>>(), vec![b.buffer]);
    for id in pool.active_buffers() {
        assert!(pool.ring(*id).unwrap().tail() <= pool.ring(*id).unwrap().size());
    }
}

#[test]
fn async_request_larger_than_one_buffer_is_refused() {
    let (_device, mut pool) = pool(1000, 10, MapStrategy::Async);
    let err = pool.allocate(101).unwrap_err();
    assert!(matches!(err, AllocError::UpperLimit { requested: 104, .. }));
    assert_eq!(pool.buffer_count(), 0);
}

#[test]
fn exhausted_pool_waits_for_a_remap() {
    let (device, mut pool) = pool(200, 2, MapStrategy::Async);
    pool.allocate(80).unwrap();
    pool.allocate(80).unwrap();
    assert_eq!(pool.buffer_count(), 2);
    pool.flush();
    assert_eq!(device.pending_maps(), 2);

    //no explicit poll: the allocation has to drive the device itself
    let allocation = pool.allocate(80).unwrap();
    assert_eq!(allocation.offset, 0);
    assert_eq!(pool.buffer_count(), 2);
    assert_eq!(device.pending_maps(), 0);
}

#[test]
fn wait_gives_up_when_remaps_never_finish() {
    let (device, mut pool) = pool(200, 2, MapStrategy::Async);
    pool.allocate(80).unwrap();
    pool.allocate(80).unwrap();
    pool.flush();

    device.hold_map_completions(true);
    let err = pool.allocate(80).unwrap_err();
    match err {
        AllocError::RemapTimeout { waited } => assert!(waited >= Duration::from_millis(50)),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(pool.stats().remapping, 2);

    device.hold_map_completions(false);
    assert!(pool.allocate(80).is_ok());
}

#[test]
fn failed_remap_retires_the_buffer() {
    let (device, mut pool) = pool(1000, 10, MapStrategy::Async);
    pool.allocate(80).unwrap();
    pool.flush();
    device.fail_map_completions(true);
    assert_eq!(pool.poll(), 1);
    assert_eq!(pool.buffer_count(), 0);
    assert_eq!(pool.used_bytes(), 0);
    assert_eq!(device.live_staging_buffers(), 0);

    device.fail_map_completions(false);
    pool.allocate(80).unwrap();
    assert_eq!(pool.buffer_count(), 1);
}

#[test]
fn wait_ends_when_every_remap_fails() {
    let (device, mut pool) = pool(200, 2, MapStrategy::Async);
    pool.allocate(80).unwrap();
    pool.allocate(80).unwrap();
    pool.flush();
    device.fail_map_completions(true);
    let err = pool.allocate(80).unwrap_err();
    assert!(matches!(err, AllocError::UpperLimit { requested: 80, .. }), "{err:?}");
    assert_eq!(pool.buffer_count(), 0);

    device.fail_map_completions(false);
    assert!(pool.allocate(80).is_ok());
}

#[test]
fn device_refusal_is_a_soft_failure() {
    let (device, mut pool) = pool(1000, 10, MapStrategy::Sync);
    device.set_max_buffer_size(Some(64));
    let err = pool.allocate(80).unwrap_err();
    assert!(matches!(err, AllocError::Device(_)));
    assert_eq!(pool.used_bytes(), 0);
    assert!(pool.allocate(64).is_ok());
}

fn upload_round_trip(strategy: MapStrategy) {
    let (device, mut pool) = pool(4096, 4, strategy);
    let dest = device.create_uniform_buffer(256, "dest").unwrap();
    let payload: Vec<u8> = (0..100u8).collect();
    pool.upload(&dest, 16, &payload).unwrap();
    pool.upload(&dest, 128, &[9; 8]).unwrap();
    pool.flush();

    let contents = device.read_buffer(&dest);
    assert_eq!(&contents[16..116], payload.as_slice());
    assert_eq!(&contents[128..136], &[9; 8]);
    assert_eq!(device.copies_submitted(), 2);
}

#[test]
fn upload_reaches_the_destination_sync() {
    upload_round_trip(MapStrategy::Sync);
}

#[test]
fn upload_reaches_the_destination_async() {
    upload_round_trip(MapStrategy::Async);
}

#[test]
fn reset_buffer_adjusts_charged_bytes() {
    let (_device, mut pool) = pool(1000, 10, MapStrategy::Sync);
    let a = pool.allocate(64).unwrap();
    assert!(pool.reset_buffer(a.buffer, 32));
    assert_eq!(pool.used_bytes(), 32);
    assert_eq!(pool.ring(a.buffer).unwrap().size(), 32);
    assert!(!pool.reset_buffer(a.buffer, 128));
    assert_eq!(pool.used_bytes(), 32);
    pool.flush();
    //no longer active
    assert!(!pool.reset_buffer(a.buffer, 16));
}

#[test]
fn copies_recorded_before_a_reset_still_land() {
    let (device, mut pool) = pool(1000, 10, MapStrategy::Sync);
    let dest = device.create_uniform_buffer(256, "dest").unwrap();
    let a = pool.upload(&dest, 0, &[7; 16]).unwrap();
    assert!(pool.reset_buffer(a.buffer, 16));
    pool.flush();
    assert_eq!(&device.read_buffer(&dest)[..16], &[7; 16]);
    assert_eq!(device.live_staging_buffers(), 0);
}

#[test]
fn destroy_buffer_releases_bytes() {
    let (device, mut pool) = pool(1000, 10, MapStrategy::Async);
    let dest = device.create_uniform_buffer(256, "dest").unwrap();
    let a = pool.upload(&dest, 0, &[3; 24]).unwrap();
    assert_eq!(pool.used_bytes(), 100);
    assert!(pool.destroy_buffer(a.buffer));
    assert!(!pool.destroy_buffer(a.buffer));
    assert_eq!(pool.used_bytes(), 0);
    assert!(pool.active_buffers().is_empty());
    assert_eq!(pool.recyclable_buffers().count(), 0);

    pool.flush();
    assert_eq!(&device.read_buffer(&dest)[..24], &[3; 24]);
    assert_eq!(device.live_staging_buffers(), 0);
}

#[test]
fn dispose_releases_everything() {
    let (device, mut pool) = pool(1000, 10, MapStrategy::Async);
    pool.allocate(80).unwrap();
    pool.allocate(80).unwrap();
    pool.flush();
    pool.allocate(80).unwrap();
    pool.dispose();
    assert_eq!(pool.buffer_count(), 0);
    assert_eq!(pool.used_bytes(), 0);
    assert_eq!(device.live_staging_buffers(), 0);

    //completions for disposed buffers are ignored
    device.poll();
    pool.allocate(80).unwrap();
    assert_eq!(pool.buffer_count(), 1);
}

#[test]
fn drop_releases_everything() {
    let (device, mut pool) = pool(1000, 10, MapStrategy::Async);
    pool.allocate(80).unwrap();
    drop(pool);
    assert_eq!(device.live_staging_buffers(), 0);
}
