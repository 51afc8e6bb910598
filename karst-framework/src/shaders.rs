//! The shader-resource collaborator surface. This layer consumes names, static
//! configuration and reflection-derived set usage; it never parses shader bytecode.

use crate::framebuffer::RenderPassFormat;
use crate::registry::{RenderResource, ResourceTypeId};
use crate::vertex_data::VertexType;
use karst_api::{NativeHandle, ShaderStageFlags};
use serde::{Deserialize, Serialize};

/// Descriptor set indices by role. Mesh-draw shaders split their parameters across these
/// sets; utility and compute shaders pack everything into set 0.
pub const BINDLESS_SET: u32 = 0;
pub const VIEW_UNIQ_SET: u32 = 1;
pub const INSTANCE_UNIQ_SET: u32 = 2;
pub const SHADER_UNIQ_SET: u32 = 3;
pub const SHADER_VARIANT_UNIQ_SET: u32 = 4;

/// Static configuration of one logical shader. The kind decides which pipeline factory
/// registry serves it; that classification is never a runtime flag on the resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderConfig {
    pub name: String,
    pub kind: ShaderConfigKind,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShaderConfigKind {
    /// Compiled per (vertex type, render pass format); drawn with the scene's meshes
    DrawMesh {
        vertex_usage: VertexType,
        renderpass_usage: RenderPassFormat,
    },
    /// One compiled permutation, pipelines vary per render target setup
    UniqueUtility { vertex_usage: VertexType },
    Compute,
}

impl ShaderConfig {
    pub fn is_graphics(&self) -> bool {
        !matches!(self.kind, ShaderConfigKind::Compute)
    }
}

/// Per-descriptor-set usage extracted from shader reflection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectDescriptorSet {
    pub set: u32,
    /// Bit per binding that any stage of the shader actually reads
    pub combined_set_usage: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderReflection {
    pub descriptor_sets: Vec<ReflectDescriptorSet>,
}

/// A compiled shader as seen by this layer. Created by the graphics backend through
/// [`crate::GraphicsHelper::create_shader_resource`]; participates in the live-instance
/// registry like any other resource.
pub trait ShaderResource: RenderResource {
    fn config(&self) -> &ShaderConfig;
    fn reflection(&self) -> &ShaderReflection;
}

/// A descriptor-set layout stand-in: which set of which shader it was built for, plus the
/// backend object. These are cached by the rendering context (externally owned, not
/// reference counted by this layer).
pub struct ShaderParametersLayout {
    resource_type: ResourceTypeId,
    name: String,
    set_index: u32,
    /// Stages that can see this set
    stages: ShaderStageFlags,
    native: NativeHandle,
}

impl ShaderParametersLayout {
    pub fn new(
        resource_type: ResourceTypeId,
        name: impl Into<String>,
        set_index: u32,
        stages: ShaderStageFlags,
        native: NativeHandle,
    ) -> Self {
        ShaderParametersLayout {
            resource_type,
            name: name.into(),
            set_index,
            stages,
            native,
        }
    }

    pub fn set_index(&self) -> u32 {
        self.set_index
    }

    pub fn stages(&self) -> ShaderStageFlags {
        self.stages
    }

    pub fn native(&self) -> NativeHandle {
        self.native
    }
}

impl RenderResource for ShaderParametersLayout {
    fn resource_type(&self) -> ResourceTypeId {
        self.resource_type
    }

    fn resource_name(&self) -> String {
        self.name.clone()
    }
}
