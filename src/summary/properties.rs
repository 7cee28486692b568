//! Geometry property names, roles, and expected dimensions.

/// Which part of a geometry a property belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Vertex,
    Triangle,
    Line,
}

impl Role {
    /// Length of the property-name prefix for this role
    /// (`vertex_` / `triangle_` / `line_`).
    pub(crate) const fn prefix_len(&self) -> usize {
        match self {
            Role::Vertex => 7,
            Role::Triangle => 9,
            Role::Line => 5,
        }
    }
}

/// Geometry kind inferred from the properties present in a batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GeometryKind {
    #[default]
    PointCloud,
    TriangleMesh,
    LineSet,
}

impl GeometryKind {
    /// Stable wire tag for the framed encoder.
    #[inline]
    pub const fn tag(&self) -> u8 {
        match self {
            GeometryKind::PointCloud => 0,
            GeometryKind::TriangleMesh => 1,
            GeometryKind::LineSet => 2,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            GeometryKind::PointCloud => "PointCloud",
            GeometryKind::TriangleMesh => "TriangleMesh",
            GeometryKind::LineSet => "LineSet",
        }
    }
}

/// Predefined geometry properties and their fixed innermost dimension.
pub const GEOMETRY_PROPERTY_DIMS: &[(&str, usize)] = &[
    ("vertex_positions", 3),
    ("vertex_normals", 3),
    ("vertex_colors", 3),
    ("vertex_texture_uvs", 2),
    ("triangle_indices", 3),
    ("triangle_normals", 3),
    ("triangle_colors", 3),
    ("triangle_texture_uvs", 2),
    ("line_indices", 2),
    ("line_colors", 3),
];

/// Whether step references are allowed for this property.
pub fn is_predefined(prop: &str) -> bool {
    GEOMETRY_PROPERTY_DIMS.iter().any(|(name, _)| *name == prop)
}

/// Fixed innermost dimension of a predefined property; `None` for
/// arbitrary vertex features (any width, consistent across the batch).
pub fn predefined_dim(prop: &str) -> Option<usize> {
    GEOMETRY_PROPERTY_DIMS
        .iter()
        .find(|(name, _)| *name == prop)
        .map(|(_, dim)| *dim)
}

/// Role dispatch by property name prefix.
///
/// Arbitrary `vertex_*` features are accepted; triangle and line
/// properties must be predefined. Anything else is unknown.
pub fn role_of(prop: &str) -> Option<Role> {
    if prop.starts_with("vertex_") {
        Some(Role::Vertex)
    } else if prop.starts_with("triangle_") && is_predefined(prop) {
        Some(Role::Triangle)
    } else if prop.starts_with("line_") && is_predefined(prop) {
        Some(Role::Line)
    } else {
        None
    }
}
