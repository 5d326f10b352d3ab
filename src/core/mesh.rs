use std::collections::HashMap;

use glam::{Mat3, Vec3};

use super::{
    aabb::Aabb,
    types::{InertiaTensorExt, MassProperties},
};
use crate::{
    collision::octree::{Octree, OctreeConfig},
    config::MESH_OCTREE_FACE_THRESHOLD,
    error::GeometryError,
};

/// A single mesh face in body space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Face {
    Triangle([Vec3; 3]),
    Quad([Vec3; 4]),
}

impl Face {
    pub fn vertices(&self) -> &[Vec3] {
        match self {
            Face::Triangle(v) => v,
            Face::Quad(v) => v,
        }
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.vertices())
    }
}

/// Immutable triangle/quad mesh. Face ids index triangles first, then quads.
///
/// Meshes above [`MESH_OCTREE_FACE_THRESHOLD`] faces carry an octree over
/// face bounds, built once here and never mutated, so an `Arc<Mesh>` can be
/// read from any thread.
#[derive(Debug, Clone)]
pub struct Mesh {
    vertices: Vec<Vec3>,
    triangles: Vec<[u32; 3]>,
    quads: Vec<[u32; 4]>,
    bounds: Aabb,
    octree: Option<Octree<u32>>,
}

impl Mesh {
    pub fn builder(vertices: Vec<Vec3>) -> MeshBuilder {
        MeshBuilder::new(vertices)
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn face_count(&self) -> usize {
        self.triangles.len() + self.quads.len()
    }

    pub fn has_octree(&self) -> bool {
        self.octree.is_some()
    }

    pub fn face(&self, id: u32) -> Option<Face> {
        let id = id as usize;
        let vertex = |i: u32| self.vertices[i as usize];
        if let Some(tri) = self.triangles.get(id) {
            return Some(Face::Triangle(tri.map(vertex)));
        }
        self.quads
            .get(id - self.triangles.len())
            .map(|quad| Face::Quad(quad.map(vertex)))
    }

    pub fn faces(&self) -> impl Iterator<Item = Face> + '_ {
        (0..self.face_count() as u32).filter_map(|id| self.face(id))
    }

    /// Face ids whose bounds may touch `region` (body space). Without an
    /// octree every face is returned.
    pub fn faces_near(&self, region: &Aabb, out: &mut Vec<u32>) {
        match &self.octree {
            Some(tree) => tree.query(region, out),
            None => out.extend(0..self.face_count() as u32),
        }
    }

    pub fn bounding_radius(&self) -> f32 {
        self.vertices
            .iter()
            .map(|v| v.length())
            .fold(0.0, f32::max)
    }

    /// Volume of the bounding box; meshes are treated as solid boxes for mass.
    pub fn volume(&self) -> f32 {
        let size = self.bounds.half_extents() * 2.0;
        size.x * size.y * size.z
    }

    pub fn mass_properties(&self, mass: f32, scale: Vec3) -> MassProperties {
        MassProperties {
            mass,
            inertia: Mat3::for_solid_box(self.bounds.half_extents() * scale.abs(), mass),
        }
    }
}

/// Cooks meshes from raw vertex/index buffers.
#[derive(Debug, Clone)]
pub struct MeshBuilder {
    vertices: Vec<Vec3>,
    triangles: Vec<[u32; 3]>,
    quads: Vec<[u32; 4]>,
    octree_threshold: usize,
}

impl MeshBuilder {
    pub fn new(vertices: Vec<Vec3>) -> Self {
        Self {
            vertices,
            triangles: Vec::new(),
            quads: Vec::new(),
            octree_threshold: MESH_OCTREE_FACE_THRESHOLD,
        }
    }

    pub fn triangles(mut self, triangles: Vec<[u32; 3]>) -> Self {
        self.triangles = triangles;
        self
    }

    pub fn quads(mut self, quads: Vec<[u32; 4]>) -> Self {
        self.quads = quads;
        self
    }

    /// Overrides the face count above which an octree is built.
    pub fn octree_threshold(mut self, faces: usize) -> Self {
        self.octree_threshold = faces;
        self
    }

    /// Merges vertices that fall in the same `epsilon` grid cell.
    pub fn weld_vertices(mut self, epsilon: f32) -> Self {
        if epsilon <= 0.0 || self.vertices.is_empty() {
            return self;
        }

        let inv = 1.0 / epsilon;
        let mut cells: HashMap<[i32; 3], u32> = HashMap::new();
        let mut welded: Vec<Vec3> = Vec::new();
        let remap: Vec<u32> = self
            .vertices
            .iter()
            .map(|v| {
                let key = (*v * inv).round().as_ivec3().to_array();
                *cells.entry(key).or_insert_with(|| {
                    welded.push(*v);
                    (welded.len() - 1) as u32
                })
            })
            .collect();

        let lookup = |i: u32| remap.get(i as usize).copied().unwrap_or(i);
        for tri in &mut self.triangles {
            *tri = tri.map(lookup);
        }
        for quad in &mut self.quads {
            *quad = quad.map(lookup);
        }
        self.vertices = welded;
        self
    }

    /// Moves the vertex centroid to the body origin.
    pub fn recenter(mut self) -> Self {
        if self.vertices.is_empty() {
            return self;
        }
        let centroid = self.vertices.iter().copied().sum::<Vec3>() / self.vertices.len() as f32;
        for vertex in &mut self.vertices {
            *vertex -= centroid;
        }
        self
    }

    pub fn build(self) -> Result<Mesh, GeometryError> {
        let face_count = self.triangles.len() + self.quads.len();
        if face_count == 0 {
            return Err(GeometryError::Empty);
        }
        if self.vertices.iter().any(|v| !v.is_finite()) {
            return Err(GeometryError::NonFinite);
        }
        let count = self.vertices.len();
        let indices = self
            .triangles
            .iter()
            .map(|t| t.as_slice())
            .chain(self.quads.iter().map(|q| q.as_slice()));
        for (face, corners) in indices.enumerate() {
            if let Some(&index) = corners.iter().find(|&&i| i as usize >= count) {
                return Err(GeometryError::IndexOutOfRange { face, index, count });
            }
        }

        let bounds = Aabb::from_points(&self.vertices);
        let mut mesh = Mesh {
            vertices: self.vertices,
            triangles: self.triangles,
            quads: self.quads,
            bounds,
            octree: None,
        };

        if face_count > self.octree_threshold {
            // Cubic root offset from the mesh centre so split planes rarely
            // coincide with grid-aligned faces.
            let side = (bounds.max - bounds.min).max_element() * 1.01 + 2e-3;
            let origin = bounds.min - Vec3::splat(1e-3);
            let root = Aabb::new(origin, origin + Vec3::splat(side));
            let mut tree = Octree::new(root, OctreeConfig::default());
            for id in 0..face_count as u32 {
                if let Some(face) = mesh.face(id) {
                    tree.insert(id, face.bounds());
                }
            }
            log::debug!(
                "built mesh octree: {} faces in {} nodes",
                tree.len(),
                tree.node_count()
            );
            mesh.octree = Some(tree);
        }
        Ok(mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
                quads.push([i, i + 1, i + row + 1, i + row]);
            }
        }
        Mesh::builder(vertices).quads(quads)
    }

    #[test]
    fn welding_merges_duplicate_corners() {
        let mesh = Mesh::builder(vec![
            Vec3::ZERO,
            Vec3::X,
            Vec3::Y,
            Vec3::X + Vec3::splat(1e-5),
            Vec3::ONE,
            Vec3::Y,
        ])
        .triangles(vec![[0, 1, 2], [3, 4, 5]])
        .weld_vertices(1e-3)
        .build()
        .expect("valid mesh");
        assert_eq!(mesh.vertices().len(), 4);
    }

    #[test]
    fn small_mesh_has_no_octree() {
        let mesh = grid(2).build().expect("valid mesh");
        assert_eq!(mesh.face_count(), 4);
        assert!(!mesh.has_octree());
    }

    #[test]
    fn large_mesh_prunes_faces_with_octree() {
        let mesh = grid(16).recenter().build().expect("valid mesh");
        assert!(mesh.has_octree());
        let mut near = Vec::new();
        mesh.faces_near(
            &Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(0.4)),
            &mut near,
        );
        assert!(!near.is_empty());
        assert!(near.len() < mesh.face_count() / 4);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let result = Mesh::builder(vec![Vec3::ZERO, Vec3::X, Vec3::Y])
            .triangles(vec![[0, 1, 7]])
            .build();
        assert!(matches!(
            result,
            Err(GeometryError::IndexOutOfRange { index: 7, .. })
        ));
    }
}
