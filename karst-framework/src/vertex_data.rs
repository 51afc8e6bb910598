use serde::{Deserialize, Serialize};

/// The vertex layouts a mesh-draw shader can be compiled against. Together with the
/// render-pass format this keys a shader's variant table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexType {
    /// Position only vertices (vec2)
    Simple2,
    /// UI/overlay vertices
    UI,
    /// Position only vertices (vec3)
    Simple3,
    /// Position and color (vec4)
    Simple3DColor,
    /// Position and texture coordinates
    BasicMesh,
    StaticMesh,
    InstancedSimple3DColor,
    NoVertex,
}

impl Default for VertexType {
    fn default() -> Self {
        VertexType::NoVertex
    }
}

impl VertexType {
    pub fn name(self) -> &'static str {
        match self {
            VertexType::Simple2 => "Simple2",
            VertexType::UI => "UI",
            VertexType::Simple3 => "Simple3",
            VertexType::Simple3DColor => "Simple3DColor",
            VertexType::BasicMesh => "BasicMesh",
            VertexType::StaticMesh => "StaticMesh",
            VertexType::InstancedSimple3DColor => "InstancedSimple3DColor",
            VertexType::NoVertex => "NoVertex",
        }
    }
}
