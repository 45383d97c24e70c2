use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use redlilium_device::{
    BlendState, BufferShape, BufferType, CullMode, DeviceConfig, DummyBackend, GraphicsDevice,
    RasterizerState, StateBlockDesc, hash_state_block,
};

/// Ready device plus its backend, so loops can drop the backend's logs.
fn ready_device(config: DeviceConfig) -> (Arc<DummyBackend>, GraphicsDevice) {
    let backend = Arc::new(DummyBackend::new());
    let mut device = GraphicsDevice::new(backend.clone(), config);
    device.init().expect("device init");
    (backend, device)
}

// ---------------------------------------------------------------------------
// Volatile pools
// ---------------------------------------------------------------------------

fn bench_volatile_lock_unlock(c: &mut Criterion) {
    let (backend, mut device) =
        ready_device(DeviceConfig::default().with_max_dynamic_indices(4096));
    let indices = [0u16; 96];

    c.bench_function("volatile_lock_write_unlock_96_indices", |b| {
        b.iter(|| {
            let alloc = device
                .acquire_volatile(&BufferShape::Index, 96)
                .expect("lock");
            device
                .write_volatile(&BufferShape::Index, bytemuck::cast_slice(&indices))
                .expect("write");
            device.unlock_volatile(&BufferShape::Index).expect("unlock");
            black_box(alloc);
            backend.clear_log();
        });
    });
}

fn bench_volatile_frame(c: &mut Criterion) {
    let (backend, mut device) = ready_device(
        DeviceConfig::default()
            .with_max_dynamic_indices(4096)
            .with_buffered_frames(3),
    );

    c.bench_function("volatile_frame_64_locks_rotating", |b| {
        b.iter(|| {
            for _ in 0..64 {
                black_box(
                    device
                        .acquire_volatile(&BufferShape::Index, 48)
                        .expect("lock"),
                );
                device.unlock_volatile(&BufferShape::Index).expect("unlock");
            }
            device.end_frame();
            backend.clear_log();
        });
    });
}

// ---------------------------------------------------------------------------
// State block cache
// ---------------------------------------------------------------------------

fn state_variants() -> Vec<StateBlockDesc> {
    let culls = [CullMode::None, CullMode::Front, CullMode::Back];
    let blends = [
        BlendState::default(),
        BlendState::alpha_blending(),
        BlendState::additive(),
    ];
    culls
        .iter()
        .flat_map(|cull| {
            blends.iter().map(move |blend| {
                StateBlockDesc::new()
                    .with_rasterizer(RasterizerState {
                        cull_mode: *cull,
                        ..Default::default()
                    })
                    .with_blend(*blend)
            })
        })
        .collect()
}

fn bench_state_hash(c: &mut Criterion) {
    let desc = StateBlockDesc::new().with_blend(BlendState::alpha_blending());
    c.bench_function("state_block_fnv1a_hash", |b| {
        b.iter(|| black_box(hash_state_block(black_box(&desc))));
    });
}

fn bench_state_cache_hits(c: &mut Criterion) {
    let (_backend, mut device) = ready_device(DeviceConfig::default());
    let variants = state_variants();
    for desc in &variants {
        device.get_or_create_state_object(desc).expect("state object");
    }

    c.bench_function("state_cache_hit_9_variants", |b| {
        b.iter(|| {
            for desc in &variants {
                black_box(device.get_or_create_state_object(desc).expect("hit"));
            }
        });
    });
}

// ---------------------------------------------------------------------------
// Registry and reset
// ---------------------------------------------------------------------------

fn bench_create_release(c: &mut Criterion) {
    let (backend, mut device) = ready_device(DeviceConfig::default());

    c.bench_function("static_buffer_create_release", |b| {
        b.iter(|| {
            let handle = device
                .create_index_buffer(64, BufferType::Static, None)
                .expect("create");
            device.release(black_box(handle)).expect("release");
            backend.clear_log();
        });
    });
}

fn bench_reset_cycle(c: &mut Criterion) {
    let (backend, mut device) = ready_device(DeviceConfig::default());
    let mut handles = Vec::new();
    for _ in 0..256 {
        handles.push(
            device
                .create_index_buffer(64, BufferType::Static, None)
                .expect("create"),
        );
    }

    c.bench_function("reset_cycle_256_buffers", |b| {
        b.iter(|| {
            device.begin_reset().expect("begin_reset");
            device.end_reset().expect("end_reset");
            backend.clear_log();
        });
    });
    black_box(handles);
}

criterion_group!(
    benches,
    bench_volatile_lock_unlock,
    bench_volatile_frame,
    bench_state_hash,
    bench_state_cache_hits,
    bench_create_release,
    bench_reset_cycle,
);
criterion_main!(benches);
