//! Device command tests on the dummy backend.
//!
//! The dummy backend records every call a mesh makes, which lets these tests
//! check ordering: which copies happen before a map, which after an unmap,
//! and what a draw submits.

mod common;

use rstest::rstest;

use common::{create_quad, init_logging, quad_vertices, vertex_elements};
use redlilium_mesh::{
    BufferKind, DummyBackend, DummyCommand, ElementType, Format, GraphicsError, IndexFormat,
    MapMode, MapOutcome, MapState, Mesh, MeshDescriptor, PrimitiveTopology, SharedBackend,
    backend,
};

fn dummy() -> SharedBackend<DummyBackend> {
    init_logging();
    backend::shared(DummyBackend::new())
}

fn copies(commands: &[DummyCommand]) -> Vec<&DummyCommand> {
    commands
        .iter()
        .filter(|c| matches!(c, DummyCommand::CopyBuffer { .. }))
        .collect()
}

fn staging_handle(commands: &[DummyCommand]) -> redlilium_mesh::BufferHandle {
    commands
        .iter()
        .find_map(|c| match c {
            DummyCommand::Map { buffer, .. } => Some(*buffer),
            _ => None,
        })
        .expect("no map recorded")
}

// ============================================================================
// Copy ordering
// ============================================================================

#[test]
fn test_read_map_copies_before_map_and_not_on_unmap() {
    let device = dummy();
    let mut mesh = create_quad(&device, "quad");
    let vertex = mesh.vertex_buffer().unwrap();
    device.borrow_mut().take_commands();

    mesh.map_vertices(MapMode::Read, true).unwrap();
    let commands = device.borrow_mut().take_commands();
    let staging = staging_handle(&commands);

    let copy_at = commands
        .iter()
        .position(|c| *c == DummyCommand::CopyBuffer { dst: staging, src: vertex })
        .expect("GPU -> staging copy");
    let map_at = commands
        .iter()
        .position(|c| matches!(c, DummyCommand::Map { .. }))
        .unwrap();
    assert!(copy_at < map_at);

    mesh.unmap_vertices().unwrap();
    let commands = device.borrow_mut().take_commands();
    assert_eq!(commands, vec![DummyCommand::Unmap(staging)]);
}

#[test]
fn test_write_discard_copies_only_on_unmap() {
    let device = dummy();
    let mut mesh = create_quad(&device, "quad");
    let index = mesh.index_buffer().unwrap();
    device.borrow_mut().take_commands();

    mesh.map_indices(MapMode::WriteDiscard, true).unwrap();
    let commands = device.borrow_mut().take_commands();
    assert!(copies(&commands).is_empty());
    let staging = staging_handle(&commands);

    mesh.unmap_indices().unwrap();
    let commands = device.borrow_mut().take_commands();
    assert_eq!(
        commands,
        vec![
            DummyCommand::Unmap(staging),
            DummyCommand::CopyBuffer {
                dst: index,
                src: staging
            },
        ]
    );
}

#[rstest]
#[case::read_write(MapMode::ReadWrite, 1, 2)]
#[case::write(MapMode::Write, 0, 2)]
#[case::no_overwrite(MapMode::NoOverwrite, 0, 2)]
#[case::read(MapMode::Read, 1, 0)]
fn test_vertex_copies_per_mode(
    #[case] mode: MapMode,
    #[case] copies_on_map: usize,
    #[case] copies_on_unmap: usize,
) {
    let device = dummy();
    let mut mesh = create_quad(&device, "quad");
    device.borrow_mut().take_commands();

    mesh.map_vertices(mode, true).unwrap();
    assert_eq!(copies(&device.borrow_mut().take_commands()).len(), copies_on_map);

    // Write modes copy staging -> vertex buffer, then vertex buffer -> view buffer.
    mesh.unmap_vertices().unwrap();
    assert_eq!(
        copies(&device.borrow_mut().take_commands()).len(),
        copies_on_unmap
    );
}

#[test]
fn test_write_unmap_refreshes_view() {
    let device = dummy();
    let mut mesh = create_quad(&device, "quad");

    if let MapOutcome::Mapped(mut bytes) = mesh.map_vertices(MapMode::Write, true).unwrap() {
        bytes.fill(0x11);
    } else {
        panic!("blocking map must succeed");
    }
    mesh.unmap_vertices().unwrap();

    let backend = device.borrow();
    let view_buffer = mesh.view_buffer().unwrap();
    assert_eq!(backend.view_buffer(mesh.vertex_view().unwrap()), Some(view_buffer));
    assert!(backend.buffer_data(view_buffer).unwrap().iter().all(|b| *b == 0x11));
    assert!(
        backend
            .buffer_data(mesh.vertex_buffer().unwrap())
            .unwrap()
            .iter()
            .all(|b| *b == 0x11)
    );
}

#[test]
fn test_read_sees_gpu_written_data() {
    let device = dummy();
    let mut mesh = create_quad(&device, "quad");
    let vertex = mesh.vertex_buffer().unwrap();

    mesh.map_vertices(MapMode::Read, true).unwrap();
    mesh.unmap_vertices().unwrap();

    device.borrow_mut().write_from_gpu(vertex, 0, &[9, 9, 9, 9]);

    let bytes = mesh
        .map_vertices(MapMode::Read, true)
        .unwrap()
        .into_mapped()
        .unwrap();
    assert_eq!(&bytes[..4], &[9, 9, 9, 9]);
}

#[test]
fn test_remap_same_mode_does_no_device_work() {
    let device = dummy();
    let mut mesh = create_quad(&device, "quad");
    mesh.map_vertices(MapMode::Read, true).unwrap();
    device.borrow_mut().take_commands();

    assert!(mesh.map_vertices(MapMode::Read, true).unwrap().is_mapped());
    assert!(device.borrow().commands().is_empty());
}

// ============================================================================
// Non-blocking maps
// ============================================================================

#[test]
fn test_busy_non_blocking_map_reports_not_ready() {
    let device = dummy();
    let mut mesh = create_quad(&device, "quad");
    device.borrow_mut().set_busy_polls(2);

    for _ in 0..2 {
        let outcome = mesh.map_vertices(MapMode::Read, false).unwrap();
        assert!(!outcome.is_mapped());
        drop(outcome);
        assert_eq!(mesh.map_state(BufferKind::Vertex), MapState::Undefined);
    }
    // The staging buffer exists and is already bound to the mode.
    assert_eq!(mesh.staging_mode(BufferKind::Vertex), Some(MapMode::Read));

    assert!(mesh.map_vertices(MapMode::Read, false).unwrap().is_mapped());
    assert_eq!(
        mesh.map_state(BufferKind::Vertex),
        MapState::Mapped(MapMode::Read)
    );

    // One GPU -> staging copy across all attempts.
    assert_eq!(
        copies(device.borrow().commands())
            .into_iter()
            .filter(|c| matches!(c, DummyCommand::CopyBuffer { src, .. } if Some(*src) == mesh.vertex_buffer()))
            .count(),
        1
    );
}

#[test]
fn test_busy_blocking_map_waits() {
    let device = dummy();
    let mut mesh = create_quad(&device, "quad");
    device.borrow_mut().set_busy_polls(3);

    assert!(mesh.map_indices(MapMode::Read, true).unwrap().is_mapped());
}

#[test]
fn test_unmap_after_not_ready_fails() {
    let device = dummy();
    let mut mesh = create_quad(&device, "quad");
    device.borrow_mut().set_busy_polls(1);

    assert!(matches!(
        mesh.map_vertices(MapMode::Write, false).unwrap(),
        MapOutcome::NotReady
    ));
    assert_eq!(
        mesh.unmap_vertices(),
        Err(GraphicsError::NotMapped(BufferKind::Vertex))
    );
}

// ============================================================================
// Draw
// ============================================================================

#[test]
fn test_draw_indexed_submission() {
    let device = dummy();
    let mut mesh = create_quad(&device, "quad");
    mesh.set_topology(PrimitiveTopology::TriangleList);
    device.borrow_mut().take_commands();

    mesh.draw();
    assert_eq!(
        device.borrow_mut().take_commands(),
        vec![
            DummyCommand::SetTopology(PrimitiveTopology::TriangleList),
            DummyCommand::SetVertexBuffer {
                slot: 0,
                buffer: mesh.vertex_buffer().unwrap(),
                stride: 20,
                offset: 0,
            },
            DummyCommand::SetIndexBuffer {
                buffer: mesh.index_buffer().unwrap(),
                format: IndexFormat::Uint16,
                offset: 0,
            },
            DummyCommand::DrawIndexed {
                index_count: 6,
                first_index: 0,
                base_vertex: 0,
            },
        ]
    );
}

#[test]
fn test_empty_mesh_submits_nothing() {
    let device = dummy();
    let elements = vertex_elements();
    let mut mesh = Mesh::new(device.clone());
    mesh.create(&MeshDescriptor::new(&elements)).unwrap();

    mesh.draw();
    assert!(device.borrow().commands().iter().all(|c| !c.is_submission()));
    assert_eq!(device.borrow().live_buffer_count(), 0);
}

#[test]
fn test_index_only_mesh_draws_indexed() {
    let device = dummy();
    let elements = vertex_elements();
    let mut mesh = Mesh::new(device.clone());
    mesh.create(&MeshDescriptor::new(&elements).with_indices_u16(&[0, 0, 0]).unwrap())
        .unwrap();
    device.borrow_mut().take_commands();

    mesh.draw();
    let commands = device.borrow_mut().take_commands();
    assert!(
        !commands
            .iter()
            .any(|c| matches!(c, DummyCommand::SetVertexBuffer { .. }))
    );
    assert!(matches!(
        commands.last(),
        Some(DummyCommand::DrawIndexed { index_count: 3, .. })
    ));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_recreate_releases_previous_resources() {
    let device = dummy();
    let mut mesh = create_quad(&device, "quad");
    mesh.map_vertices(MapMode::Read, true).unwrap();
    mesh.unmap_vertices().unwrap();
    let old_vertex = mesh.vertex_buffer().unwrap();
    let old_view = mesh.vertex_view().unwrap();
    assert_eq!(device.borrow().live_buffer_count(), 4);
    device.borrow_mut().take_commands();

    let elements = vertex_elements();
    let vertices = quad_vertices();
    mesh.create(&MeshDescriptor::new(&elements).with_vertices(&vertices).unwrap())
        .unwrap();

    let commands = device.borrow_mut().take_commands();
    let first_create = commands
        .iter()
        .position(|c| matches!(c, DummyCommand::CreateBuffer { .. }))
        .unwrap();
    let last_destroy = commands
        .iter()
        .rposition(|c| matches!(c, DummyCommand::DestroyBuffer(_) | DummyCommand::DestroyView(_)))
        .unwrap();
    assert!(last_destroy < first_create);
    assert!(commands.contains(&DummyCommand::DestroyBuffer(old_vertex)));
    assert!(commands.contains(&DummyCommand::DestroyView(old_view)));

    // Vertex buffer, view buffer, no index buffer, no staging.
    assert_eq!(device.borrow().live_buffer_count(), 2);
    assert_eq!(device.borrow().live_view_count(), 1);
}

#[test]
fn test_release_while_mapped_unmaps() {
    let device = dummy();
    let mut mesh = create_quad(&device, "quad");
    mesh.map_vertices(MapMode::ReadWrite, true).unwrap();

    mesh.release();
    assert_eq!(mesh.map_state(BufferKind::Vertex), MapState::Undefined);
    assert_eq!(device.borrow().live_buffer_count(), 0);
    assert!(
        device
            .borrow()
            .commands()
            .iter()
            .any(|c| matches!(c, DummyCommand::Unmap(_)))
    );
}

#[test]
fn test_drop_releases_all() {
    let device = dummy();
    {
        let mut mesh = create_quad(&device, "quad");
        mesh.map_vertices(MapMode::Read, true).unwrap();
        mesh.map_indices(MapMode::Write, true).unwrap();
    }
    assert_eq!(device.borrow().live_buffer_count(), 0);
    assert_eq!(device.borrow().live_view_count(), 0);
}

#[test]
fn test_debug_names() {
    let device = dummy();
    let mut mesh = create_quad(&device, "crate");
    mesh.map_vertices(MapMode::Read, true).unwrap();

    let labels: Vec<String> = device
        .borrow()
        .commands()
        .iter()
        .filter_map(|c| match c {
            DummyCommand::CreateBuffer { label, .. } | DummyCommand::CreateView { label, .. } => {
                label.clone()
            }
            _ => None,
        })
        .collect();

    for expected in [
        "crate index buffer",
        "crate vertex buffer",
        "crate vertex buffer for view",
        "crate vertex view",
        "crate staging buffer",
    ] {
        assert!(labels.iter().any(|l| l == expected), "missing {expected}");
    }
}

#[test]
fn test_default_label() {
    let device = dummy();
    let elements = vertex_elements();
    let mut mesh = Mesh::new(device.clone());
    mesh.create(&MeshDescriptor::new(&elements).with_vertex_count(1))
        .unwrap();

    assert_eq!(mesh.label(), "mesh");
    let vertex = mesh.vertex_buffer().unwrap();
    assert_eq!(
        device.borrow().buffer_descriptor(vertex).unwrap().label.as_deref(),
        Some("mesh vertex buffer")
    );
}

#[test]
fn test_uninitialized_vertex_buffer() {
    let device = dummy();
    let elements = vertex_elements();
    let mut mesh = Mesh::new(device.clone());
    mesh.create(&MeshDescriptor::new(&elements).with_vertex_count(16))
        .unwrap();

    let commands = device.borrow().commands().to_vec();
    let vertex = mesh.vertex_buffer().unwrap();
    assert!(commands.contains(&DummyCommand::CreateBuffer {
        buffer: vertex,
        label: Some("mesh vertex buffer".to_string()),
        size: 320,
        usage: device.borrow().buffer_descriptor(vertex).unwrap().usage,
        initialized: false,
    }));
}

#[test]
fn test_allocation_failure_is_reported() {
    let device = dummy();
    device.borrow_mut().fail_allocations_after(0);
    let elements = vertex_elements();
    let vertices = quad_vertices();
    let mut mesh = Mesh::new(device.clone());

    let err = mesh
        .create(&MeshDescriptor::new(&elements).with_vertices(&vertices).unwrap())
        .unwrap_err();
    assert_eq!(err, GraphicsError::OutOfMemory);
    assert!(err.is_fatal());
}

// ============================================================================
// Format translation
// ============================================================================

#[test]
fn test_full_width_formats_are_distinct_and_stable() {
    let mut seen = Vec::new();
    for element_type in [ElementType::Float32, ElementType::Uint32] {
        for count in 1..=4 {
            let format = Format::from_element(element_type, count).unwrap();
            assert_eq!(Format::from_element(element_type, count), Ok(format));
            assert!(!seen.contains(&format));
            seen.push(format);
        }
    }
    assert_eq!(seen.len(), 8);
}

#[rstest]
#[case::uint16(ElementType::Uint16)]
#[case::uint8(ElementType::Uint8)]
fn test_packed_formats_reject_three_components(#[case] element_type: ElementType) {
    for count in [1, 2, 4] {
        assert!(Format::from_element(element_type, count).is_ok());
    }
    assert_eq!(
        Format::from_element(element_type, 3),
        Err(GraphicsError::InvalidComponentCount {
            element_type,
            count: 3
        })
    );
}
