use approx::assert_relative_eq;
use momentum_physics::*;

/// Flat `cells` x `cells` grid of unit quads on y = 0, corner at the origin.
fn grid(cells: u32) -> MeshBuilder {
    let mut vertices = Vec::new();
    for z in 0..=cells {
        for x in 0..=cells {
            vertices.push(Vec3::new(x as f32, 0.0, z as f32));
        }
    }
    let row = cells + 1;
    let mut quads = Vec::new();
    for z in 0..cells {
        for x in 0..cells {
            let i = z * row + x;
            quads.push([i, i + row, i + row + 1, i + 1]);
        }
    }
    Mesh::builder(vertices).quads(quads)
}

#[test]
fn weld_vertices_reduces_duplicates() {
    let mesh = Mesh::builder(vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(0.0, 0.0, 0.001),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
    ])
    .triangles(vec![[0, 2, 4], [1, 3, 4]])
    .weld_vertices(0.01)
    .build()
    .expect("valid mesh");

    assert_eq!(mesh.vertices().len(), 3);
    assert_eq!(mesh.face_count(), 2);
    let faces: Vec<Face> = mesh.faces().collect();
    assert_eq!(faces[0], faces[1]);
}

#[test]
fn invalid_buffers_are_rejected() {
    let empty = Mesh::builder(vec![Vec3::ZERO, Vec3::X, Vec3::Y]).build();
    assert!(matches!(empty, Err(GeometryError::Empty)));

    let out_of_range = Mesh::builder(vec![Vec3::ZERO, Vec3::X, Vec3::Y])
        .triangles(vec![[0, 1, 2], [0, 1, 7]])
        .build();
    assert!(matches!(
        out_of_range,
        Err(GeometryError::IndexOutOfRange { face: 1, index: 7, count: 3 })
    ));

    let non_finite = Mesh::builder(vec![Vec3::ZERO, Vec3::X, Vec3::splat(f32::NAN)])
        .triangles(vec![[0, 1, 2]])
        .build();
    assert!(matches!(non_finite, Err(GeometryError::NonFinite)));
}

#[test]
fn recenter_moves_centroid_to_origin() {
    let mesh = grid(4).recenter().build().expect("valid mesh");
    let centroid = mesh.vertices().iter().copied().sum::<Vec3>() / mesh.vertices().len() as f32;
    assert_relative_eq!(centroid.length(), 0.0, epsilon = 1e-5);
    assert_relative_eq!(mesh.bounds().min.x, -2.0, epsilon = 1e-5);
    assert_relative_eq!(mesh.bounds().max.z, 2.0, epsilon = 1e-5);
}

#[test]
fn large_meshes_get_a_face_octree() {
    let small = grid(2).build().expect("valid mesh");
    assert!(!small.has_octree());

    let large = grid(24).build().expect("valid mesh");
    assert!(large.has_octree());
    assert_eq!(large.face_count(), 24 * 24);

    let region = Aabb::new(Vec3::new(3.2, -0.5, 3.2), Vec3::new(4.8, 0.5, 4.8));
    let mut near = Vec::new();
    large.faces_near(&region, &mut near);
    assert!(!near.is_empty());
    assert!(near.len() < large.face_count());

    // Every face that actually overlaps the region must be reported.
    for id in 0..large.face_count() as u32 {
        let face = large.face(id).expect("face id in range");
        if face.bounds().overlaps(&region) {
            assert!(near.contains(&id), "face {id} missing from octree query");
        }
    }
}

#[test]
fn forced_octree_threshold_applies() {
    let mesh = grid(2).octree_threshold(1).build().expect("valid mesh");
    assert!(mesh.has_octree());
}

#[test]
fn mesh_mass_properties_are_positive() {
    let mesh = Mesh::builder(vec![
        Vec3::new(-1.0, -1.0, -1.0),
        Vec3::new(1.0, -1.0, -1.0),
        Vec3::new(1.0, 1.0, 1.0),
        Vec3::new(-1.0, 1.0, 1.0),
    ])
    .quads(vec![[0, 1, 2, 3]])
    .build()
    .expect("valid mesh");
    let props = mesh.mass_properties(2.0, Vec3::ONE);

    assert_eq!(props.mass, 2.0);
    assert!(props.inertia.determinant() > 0.0);
    assert_relative_eq!(mesh.volume(), 8.0, epsilon = 1e-5);
}

#[test]
fn mesh_body_bounds_follow_transform() {
    let mesh = grid(4).recenter().build().expect("valid mesh");
    let mut world = PhysicsWorld::new(SimulationConfig::default()).expect("valid config");
    let handle = world
        .register_body(
            BodyDescriptor::fixed(Shape::mesh(mesh))
                .with_position(Vec3::new(10.0, -1.0, 0.0))
                .with_scale(Vec3::splat(2.0)),
        )
        .expect("registered");

    let bounds = world.body(handle).expect("alive").bounds;
    assert_relative_eq!(bounds.min.x, 6.0, epsilon = 1e-4);
    assert_relative_eq!(bounds.max.x, 14.0, epsilon = 1e-4);
    assert_relative_eq!(bounds.min.y, -1.0, epsilon = 1e-4);
}

#[test]
fn ball_bounces_on_octree_terrain() {
    let terrain = grid(32).recenter().build().expect("valid mesh");
    assert!(terrain.has_octree());

    let mut world = PhysicsWorld::new(SimulationConfig::default()).expect("valid config");
    world
        .register_body(BodyDescriptor::fixed(Shape::mesh(terrain)))
        .expect("registered");
    let ball = world
        .register_body(
            BodyDescriptor::new(Shape::sphere(0.5))
                .with_position(Vec3::new(3.3, 0.7, -2.6))
                .with_velocity(Vec3::new(0.0, -2.0, 0.0)),
        )
        .expect("registered");

    let mut bounced = false;
    for _ in 0..30 {
        world.step(0.01);
        let state = world.body_state(ball).expect("alive");
        assert!(state.position.y > 0.2, "ball sank into the terrain");
        if state.linear_velocity.y > 0.0 {
            bounced = true;
            break;
        }
    }
    assert!(bounced);
}
