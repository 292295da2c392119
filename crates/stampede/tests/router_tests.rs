//! End-to-end tests for the multi-texture router over the recording
//! backend.

use glam::Vec2;
use stampede::{
    BatchError, BeginDescriptor, BufferKind, MultiSpriteInstancer, SheetRegion, SpriteDescriptor,
    TextureHandle, Viewport,
};
use stampede_test_utils::{BackendCall, RecordingBackend};

fn viewport() -> Viewport {
    Viewport::new(800, 600).unwrap()
}

fn router_with_sheets(
    extents: &[(u32, u32)],
) -> (MultiSpriteInstancer<RecordingBackend>, Vec<TextureHandle>) {
    let mut backend = RecordingBackend::new();
    let textures: Vec<TextureHandle> = extents
        .iter()
        .map(|&(w, h)| backend.add_texture(w, h))
        .collect();
    let shader = backend.shader();
    let router = MultiSpriteInstancer::new(backend, viewport(), shader, &textures).unwrap();
    (router, textures)
}

#[test]
fn test_routing_two_sheets() {
    let (mut router, textures) = router_with_sheets(&[(64, 64), (32, 32)]);
    let (a, b) = (textures[0], textures[1]);

    router.begin(&BeginDescriptor::default()).unwrap();
    router.record_for(a, Vec2::new(1.0, 1.0));
    router.record_for(b, Vec2::new(2.0, 2.0));
    router.record_for(a, Vec2::new(3.0, 3.0));
    router.end().unwrap();

    let backend = router.backend();
    assert_eq!(backend.draw_count(), 2);

    // Slot A submits first (registration order) with both of its records in
    // their original relative order.
    let first = &backend.submissions()[0];
    assert_eq!(first.inputs.texture, a);
    assert_eq!(first.instance_count, 2);
    assert_eq!(first.records[0].position, [1.0, 1.0]);
    assert_eq!(first.records[1].position, [3.0, 3.0]);
    assert_eq!(first.records[0].depth, 0.0);
    assert_eq!(first.records[1].depth, 1.0);

    let second = &backend.submissions()[1];
    assert_eq!(second.inputs.texture, b);
    assert_eq!(second.instance_count, 1);
    assert_eq!(second.records[0].position, [2.0, 2.0]);
}

#[test]
fn test_registration_order_wins_over_record_order() {
    let (mut router, textures) = router_with_sheets(&[(16, 16), (8, 8)]);
    let (first_registered, second_registered) = (textures[0], textures[1]);

    router.begin(&BeginDescriptor::default()).unwrap();
    router.record_for(second_registered, Vec2::ZERO);
    router.record_for(first_registered, Vec2::ZERO);
    router.end().unwrap();

    let submissions = router.backend().submissions();
    assert_eq!(submissions[0].inputs.texture, first_registered);
    assert_eq!(submissions[1].inputs.texture, second_registered);
}

#[test]
fn test_unregistered_handle_is_silently_skipped() {
    let (mut router, _) = router_with_sheets(&[(64, 64)]);
    let stranger = TextureHandle::new(999);

    router.begin(&BeginDescriptor::default()).unwrap();
    router.record_for(stranger, Vec2::ZERO);
    router.record_for_with(stranger, Vec2::ZERO, &SpriteDescriptor::default());
    router.end().unwrap();

    assert_eq!(router.backend().draw_count(), 0);
    assert_eq!(router.instance_counts(), vec![0]);
}

#[test]
fn test_index_addressed_records() {
    let (mut router, _) = router_with_sheets(&[(64, 64), (10, 20)]);

    router.begin(&BeginDescriptor::default()).unwrap();
    router.record_at(1, Vec2::new(5.0, 5.0));
    router.record_at_top_left(1, Vec2::ZERO);
    router.end().unwrap();

    let submission = &router.backend().submissions()[0];
    assert_eq!(submission.instance_count, 2);
    assert_eq!(submission.records[0].position, [5.0, 5.0]);
    // Top-left anchoring recentred by half the 10x20 sheet.
    assert_eq!(submission.records[1].position, [5.0, 10.0]);
    assert_eq!(submission.records[1].region(), SheetRegion::new(0, 0, 10, 20));
}

#[test]
fn test_slot_mutation_locked_while_recording() {
    let (mut router, textures) = router_with_sheets(&[(64, 64)]);
    let extra = router.backend_mut().add_texture(16, 16);

    router.begin(&BeginDescriptor::default()).unwrap();
    assert!(matches!(
        router.register_texture(extra),
        Err(BatchError::RecordingInProgress { .. })
    ));
    assert!(matches!(
        router.remove_texture(textures[0]),
        Err(BatchError::RecordingInProgress { .. })
    ));
    assert!(matches!(
        router.set_textures(&[extra]),
        Err(BatchError::RecordingInProgress { .. })
    ));
    assert!(matches!(
        router.clear_textures(),
        Err(BatchError::RecordingInProgress { .. })
    ));
    router.end().unwrap();

    router.register_texture(extra).unwrap();
    assert_eq!(router.slot_count(), 2);
}

#[test]
fn test_remove_and_clear() {
    let (mut router, textures) = router_with_sheets(&[(64, 64), (32, 32)]);

    // Unregistered handles are ignored without error.
    router.remove_texture(TextureHandle::new(999)).unwrap();
    assert_eq!(router.slot_count(), 2);

    router.remove_texture(textures[0]).unwrap();
    assert_eq!(router.textures(), vec![textures[1]]);
    assert!(!router.contains_texture(textures[0]));

    router.remove_texture(textures[1]).unwrap();
    assert_eq!(router.slot_count(), 0);
}

#[test]
fn test_empty_router_runs_the_protocol() {
    let mut backend = RecordingBackend::new();
    let shader = backend.shader();
    let mut router = MultiSpriteInstancer::new(backend, viewport(), shader, &[]).unwrap();

    router.begin(&BeginDescriptor::default()).unwrap();
    router.record_for(TextureHandle::new(1), Vec2::ZERO);
    router.end().unwrap();
    assert_eq!(router.backend().draw_count(), 0);
}

#[test]
fn test_shared_buffer_grows_to_largest_slot() {
    let (mut router, textures) = router_with_sheets(&[(64, 64), (32, 32)]);

    router.begin(&BeginDescriptor::default()).unwrap();
    for i in 0..3 {
        router.record_for(textures[0], Vec2::new(i as f32, 0.0));
    }
    router.record_for(textures[1], Vec2::ZERO);
    router.end().unwrap();

    // One starter buffer plus a single growth to three records; the second
    // slot reuses the grown buffer.
    let creates: Vec<u64> = router
        .backend()
        .calls()
        .iter()
        .filter_map(|call| match call {
            BackendCall::CreateBuffer {
                kind: BufferKind::Instance,
                size,
                ..
            } => Some(*size),
            _ => None,
        })
        .collect();
    assert_eq!(creates, vec![36, 3 * 36]);

    let (first, second) = (
        &router.backend().submissions()[0],
        &router.backend().submissions()[1],
    );
    assert_eq!(first.bindings.instances, second.bindings.instances);
}

#[test]
fn test_begin_resets_every_slot() {
    let (mut router, textures) = router_with_sheets(&[(64, 64), (32, 32)]);

    router.begin(&BeginDescriptor::default()).unwrap();
    router.record_for(textures[0], Vec2::ZERO);
    router.record_for(textures[1], Vec2::ZERO);
    router.end().unwrap();
    assert_eq!(router.backend().draw_count(), 2);

    router.begin(&BeginDescriptor::default()).unwrap();
    assert_eq!(router.instance_counts(), vec![0, 0]);
    router.end().unwrap();
    assert_eq!(router.backend().draw_count(), 2);
}

#[test]
fn test_capacity_control_per_slot() {
    let (mut router, _) = router_with_sheets(&[(64, 64), (32, 32)]);

    router.reserve_slot(1, 9).unwrap();
    assert_eq!(router.batch_capacities(), vec![1, 16]);

    router.reserve(4).unwrap();
    assert_eq!(router.batch_capacities(), vec![4, 16]);

    router.set_slot_capacity(0, 10).unwrap();
    assert_eq!(router.batch_capacities(), vec![10, 16]);

    router.set_batch_capacities(2).unwrap();
    assert_eq!(router.batch_capacities(), vec![2, 2]);

    assert!(matches!(
        router.reserve_slot(5, 4),
        Err(BatchError::SlotOutOfRange { index: 5, slots: 2 })
    ));
    assert!(matches!(
        router.reserve_slot(0, 0),
        Err(BatchError::InvalidCapacity)
    ));
}

#[test]
fn test_dispose_is_idempotent() {
    let (mut router, _) = router_with_sheets(&[(64, 64)]);
    router.dispose();
    router.dispose();

    let destroyed = router.backend().destroyed_buffers().to_vec();
    assert_eq!(destroyed.len(), 3);
    for buffer in destroyed {
        assert_eq!(router.backend().destroy_count(buffer), 1);
    }
    assert_eq!(router.slot_count(), 0);
}

#[test]
fn test_unknown_texture_in_construction_fails() {
    let backend = RecordingBackend::new();
    let shader = backend.shader();
    assert!(matches!(
        MultiSpriteInstancer::new(
            backend,
            viewport(),
            shader,
            &[TextureHandle::new(42)]
        ),
        Err(BatchError::UnknownTexture { .. })
    ));
}
