use approx::assert_relative_eq;
use momentum_physics::*;
use rand::{rngs::StdRng, SeedableRng};

fn body(index: u32, descriptor: BodyDescriptor) -> Body {
    Body::from_descriptor(
        EntityId::from_index(index),
        BodyHandle(index as u64),
        &descriptor,
        1.0,
    )
}

fn sphere_at(index: u32, x: f32, radius: f32) -> Body {
    body(
        index,
        BodyDescriptor::new(Shape::sphere(radius)).with_position(Vec3::new(x, 0.0, 0.0)),
    )
}

#[test]
fn separated_spheres_do_not_collide() {
    let mut narrow = NarrowPhase::new();
    let mut rng = StdRng::seed_from_u64(1);
    for distance in [2.01, 2.5, 10.0] {
        let a = sphere_at(0, 0.0, 1.0);
        let b = sphere_at(1, distance, 1.0);
        assert!(narrow.collide(&a, &b, &mut rng).is_none(), "distance {distance}");
    }
}

#[test]
fn overlapping_spheres_report_unit_normal_and_depth() {
    let mut narrow = NarrowPhase::new();
    let mut rng = StdRng::seed_from_u64(1);
    for distance in [0.5, 1.0, 1.5, 1.99] {
        let a = sphere_at(0, 0.0, 1.0);
        let b = sphere_at(1, distance, 1.0);
        let record = narrow.collide(&a, &b, &mut rng).expect("overlap");
        assert_relative_eq!(record.normal().length(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(record.normal().x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(record.depth(), 2.0 - distance, epsilon = 1e-5);
        assert_eq!(record.body_a, a.id);
        assert!(!record.resolved);
    }
}

#[test]
fn swapped_arguments_flip_the_normal() {
    let mut narrow = NarrowPhase::new();
    let mut rng = StdRng::seed_from_u64(1);
    let ball = body(
        0,
        BodyDescriptor::new(Shape::sphere(0.5)).with_position(Vec3::new(0.0, 1.3, 0.0)),
    );
    let block = body(1, BodyDescriptor::fixed(Shape::cube(Vec3::ONE)));

    let forward = narrow.collide(&block, &ball, &mut rng).expect("hit");
    let reverse = narrow.collide(&ball, &block, &mut rng).expect("hit");
    assert_relative_eq!(forward.normal().y, 1.0, epsilon = 1e-5);
    assert_relative_eq!(reverse.normal().y, -1.0, epsilon = 1e-5);
    assert_relative_eq!(forward.depth(), reverse.depth(), epsilon = 1e-6);
}

#[test]
fn cube_resting_on_plane_has_four_contacts() {
    let mut narrow = NarrowPhase::new();
    let mut rng = StdRng::seed_from_u64(1);
    let floor = body(0, BodyDescriptor::fixed(Shape::plane(Vec3::Y)));
    let crate_box = body(
        1,
        BodyDescriptor::new(Shape::cube(Vec3::splat(0.5))).with_position(Vec3::new(3.0, 0.48, -2.0)),
    );
    let record = narrow.collide(&floor, &crate_box, &mut rng).expect("contact");
    assert_eq!(record.contact_points.len(), 4);
    assert_relative_eq!(record.depth(), 0.02, epsilon = 1e-5);
    assert_relative_eq!(record.normal().y, 1.0, epsilon = 1e-5);
}

#[test]
fn sphere_against_triangle_and_quad_shapes() {
    let mut narrow = NarrowPhase::new();
    let mut rng = StdRng::seed_from_u64(1);
    let corners = [
        Vec3::new(-1.0, 0.0, -1.0),
        Vec3::new(-1.0, 0.0, 1.0),
        Vec3::new(1.0, 0.0, 1.0),
        Vec3::new(1.0, 0.0, -1.0),
    ];
    let quad = body(0, BodyDescriptor::fixed(Shape::quad(corners)));
    let triangle = body(
        1,
        BodyDescriptor::fixed(Shape::triangle(corners[0], corners[1], corners[2])),
    );

    let above = body(
        2,
        BodyDescriptor::new(Shape::sphere(0.5)).with_position(Vec3::new(-0.5, 0.3, 0.2)),
    );
    assert!(narrow.collide(&quad, &above, &mut rng).is_some());
    assert!(narrow.collide(&triangle, &above, &mut rng).is_some());

    // Past the quad's edge: only the triangle's corner fallback reports it.
    let past_corner = body(
        3,
        BodyDescriptor::new(Shape::sphere(0.5)).with_position(Vec3::new(1.2, 0.0, 1.2)),
    );
    assert!(narrow.collide(&quad, &past_corner, &mut rng).is_none());
    assert!(narrow.collide(&triangle, &past_corner, &mut rng).is_some());
}

#[test]
fn mesh_sphere_uses_deepest_face() {
    let mut narrow = NarrowPhase::new();
    let mut rng = StdRng::seed_from_u64(1);
    let mesh = Mesh::builder(vec![
        Vec3::new(-2.0, 0.0, -2.0),
        Vec3::new(-2.0, 0.0, 2.0),
        Vec3::new(2.0, 0.0, 2.0),
        Vec3::new(2.0, 0.0, -2.0),
        Vec3::new(-2.0, 1.0, -2.0),
        Vec3::new(2.0, 1.0, -2.0),
    ])
    .quads(vec![[0, 1, 2, 3]])
    .triangles(vec![[0, 3, 5], [0, 5, 4]])
    .build()
    .expect("valid mesh");
    let terrain = body(0, BodyDescriptor::fixed(Shape::mesh(mesh)));
    let ball = body(
        1,
        BodyDescriptor::new(Shape::sphere(0.5)).with_position(Vec3::new(0.0, 0.3, 0.0)),
    );
    let record = narrow.collide(&terrain, &ball, &mut rng).expect("hit");
    assert_relative_eq!(record.depth(), 0.2, epsilon = 1e-4);
    assert_relative_eq!(record.normal().y.abs(), 1.0, epsilon = 1e-4);

    let far = body(
        2,
        BodyDescriptor::new(Shape::sphere(0.5)).with_position(Vec3::new(0.0, 5.0, 0.0)),
    );
    assert!(narrow.collide(&terrain, &far, &mut rng).is_none());
}

#[test]
fn boxes_collide_through_separating_axis_test() {
    let mut narrow = NarrowPhase::new();
    let mut rng = StdRng::seed_from_u64(1);
    let a = body(0, BodyDescriptor::new(Shape::cube(Vec3::ONE)));
    let b = body(
        1,
        BodyDescriptor::new(Shape::aabb(Vec3::ONE)).with_position(Vec3::new(1.8, 0.0, 0.0)),
    );
    let record = narrow.collide(&a, &b, &mut rng).expect("overlap");
    assert_relative_eq!(record.depth(), 0.2, epsilon = 1e-4);
    assert_relative_eq!(record.normal().x, 1.0, epsilon = 1e-4);

    let apart = body(
        2,
        BodyDescriptor::new(Shape::cube(Vec3::ONE)).with_position(Vec3::new(0.0, 2.5, 0.0)),
    );
    assert!(narrow.collide(&a, &apart, &mut rng).is_none());
}

#[test]
fn closing_spheres_are_detected_after_one_substep() {
    let config = SimulationConfig::default()
        .with_gravity(Vec3::ZERO)
        .with_damping(0.0, 0.0);
    let mut world = PhysicsWorld::new(config).expect("valid config");
    world
        .register_body(
            BodyDescriptor::new(Shape::sphere(1.0))
                .with_mass(1.0)
                .with_velocity(Vec3::new(2.5, 0.0, 0.0)),
        )
        .expect("registered");
    world
        .register_body(
            BodyDescriptor::new(Shape::sphere(1.0))
                .with_mass(1.0)
                .with_position(Vec3::new(1.9, 0.0, 0.0))
                .with_velocity(Vec3::new(-2.5, 0.0, 0.0)),
        )
        .expect("registered");

    let stats = world.step(0.01);
    assert_eq!(stats.substeps, 1);
    assert_eq!(stats.collisions, 1);

    let record = world.last_collision().expect("collision recorded");
    assert_relative_eq!(record.normal().x.abs(), 1.0, epsilon = 1e-5);
    // Depth 0.1 at rest, plus the 0.05 closed during the sub-step.
    assert!(record.depth() >= 0.1 - 1e-4 && record.depth() <= 0.15 + 1e-4);
    assert!(record.resolved);
}
