//! Per-material aggregation of compiled shader variants and the pipelines created for
//! them. Three flavors exist so the rendering context can treat every material uniformly:
//! mesh-draw shaders vary per (vertex type, render pass format), utility shaders vary per
//! render target setup, compute shaders have exactly one pipeline.

use crate::framebuffer::{FramebufferFormat, RenderPassProperties};
use crate::pipelines::{ComputePipeline, GraphicsPipeline, PipelineCache};
use crate::shaders::{ShaderConfigKind, ShaderParametersLayout, ShaderResource};
use crate::vertex_data::VertexType;
use fnv::FnvHashMap;
use std::collections::BTreeSet;
use std::sync::Arc;

/// One compiled variant of a mesh-draw shader and what was built for it.
pub struct ShaderVariantEntry {
    pub shader: Arc<dyn ShaderResource>,
    pub pipeline: Option<Arc<GraphicsPipeline>>,
    /// Layout of the variant-unique parameter set, when the shader has one
    pub variant_params_layout: Option<Arc<ShaderParametersLayout>>,
}

/// Aggregates every (vertex type, render pass format) variant of one logical mesh-draw
/// shader name. Lookup intersects the candidate sets of the two auxiliary indexes.
pub struct DrawMeshShaderObject {
    shader_name: String,
    shader_resources: Vec<ShaderVariantEntry>,
    shaders_for_vertex_type: FnvHashMap<VertexType, BTreeSet<usize>>,
    shaders_for_render_pass: FnvHashMap<FramebufferFormat, BTreeSet<usize>>,
}

impl DrawMeshShaderObject {
    pub fn new(shader_name: impl Into<String>) -> Self {
        DrawMeshShaderObject {
            shader_name: shader_name.into(),
            shader_resources: Vec::new(),
            shaders_for_vertex_type: FnvHashMap::default(),
            shaders_for_render_pass: FnvHashMap::default(),
        }
    }

    pub fn shader_name(&self) -> &str {
        &self.shader_name
    }

    fn entry_index_of(
        &self,
        shader: &Arc<dyn ShaderResource>,
    ) -> Option<usize> {
        self.shader_resources
            .iter()
            .position(|entry| Arc::ptr_eq(&entry.shader, shader))
    }

    /// Record a compiled variant under both of its keys. Adding the same shader resource
    /// twice is a no-op; entries are deduplicated by pointer identity.
    pub fn add_shader(
        &mut self,
        shader: Arc<dyn ShaderResource>,
    ) {
        if self.entry_index_of(&shader).is_some() {
            return;
        }

        let (vertex_usage, renderpass_usage) = match shader.config().kind {
            ShaderConfigKind::DrawMesh {
                vertex_usage,
                renderpass_usage,
            } => (vertex_usage, renderpass_usage),
            _ => {
                debug_assert!(false, "only mesh-draw shaders belong in this object");
                return;
            }
        };

        let index = self.shader_resources.len();
        self.shader_resources.push(ShaderVariantEntry {
            shader,
            pipeline: None,
            variant_params_layout: None,
        });
        self.shaders_for_vertex_type
            .entry(vertex_usage)
            .or_default()
            .insert(index);
        self.shaders_for_render_pass
            .entry(FramebufferFormat::from_format(renderpass_usage))
            .or_default()
            .insert(index);
    }

    pub fn set_pipeline(
        &mut self,
        shader: &Arc<dyn ShaderResource>,
        pipeline: Arc<GraphicsPipeline>,
    ) {
        if let Some(index) = self.entry_index_of(shader) {
            self.shader_resources[index].pipeline = Some(pipeline);
        } else {
            debug_assert!(false, "setting a pipeline for a shader that was never added");
        }
    }

    pub fn set_variant_params_layout(
        &mut self,
        shader: &Arc<dyn ShaderResource>,
        layout: Option<Arc<ShaderParametersLayout>>,
    ) {
        if let Some(index) = self.entry_index_of(shader) {
            self.shader_resources[index].variant_params_layout = layout;
        } else {
            debug_assert!(false, "setting a layout for a shader that was never added");
        }
    }

    /// The variant compiled for this vertex type and render pass format, or None when the
    /// material has no such variant. A miss is a normal outcome, not an error.
    pub fn shader(
        &self,
        vertex_type: VertexType,
        format: &FramebufferFormat,
    ) -> Option<&ShaderVariantEntry> {
        let by_vertex = self.shaders_for_vertex_type.get(&vertex_type)?;
        let by_render_pass = self.shaders_for_render_pass.get(format)?;

        // Both sets are sorted; the first common index wins
        let index = by_vertex
            .iter()
            .find(|index| by_render_pass.contains(index))?;
        Some(&self.shader_resources[*index])
    }

    pub fn variant_params_layout(
        &self,
        vertex_type: VertexType,
        format: &FramebufferFormat,
    ) -> Option<&Arc<ShaderParametersLayout>> {
        self.shader(vertex_type, format)?
            .variant_params_layout
            .as_ref()
    }

    pub fn all_shaders(&self) -> &[ShaderVariantEntry] {
        &self.shader_resources
    }

    pub fn prepare_pipeline_cache(
        &self,
        pipeline_cache: &mut PipelineCache,
    ) {
        for entry in &self.shader_resources {
            if let Some(pipeline) = &entry.pipeline {
                pipeline_cache.add_pipeline(pipeline);
            }
        }
    }
}

/// One compiled utility shader and a pipeline per render target configuration it has been
/// used with. The first pipeline set becomes the default that later variants derive from.
pub struct UniqueUtilityShaderObject {
    shader_name: String,
    utility_shader: Arc<dyn ShaderResource>,
    default_pipeline_props: Option<RenderPassProperties>,
    graphics_pipelines: FnvHashMap<RenderPassProperties, Arc<GraphicsPipeline>>,
}

impl UniqueUtilityShaderObject {
    pub fn new(
        shader_name: impl Into<String>,
        shader: Arc<dyn ShaderResource>,
    ) -> Self {
        UniqueUtilityShaderObject {
            shader_name: shader_name.into(),
            utility_shader: shader,
            default_pipeline_props: None,
            graphics_pipelines: FnvHashMap::default(),
        }
    }

    pub fn shader_name(&self) -> &str {
        &self.shader_name
    }

    pub fn shader(&self) -> &Arc<dyn ShaderResource> {
        &self.utility_shader
    }

    pub fn pipeline(
        &self,
        renderpass_props: &RenderPassProperties,
    ) -> Option<Arc<GraphicsPipeline>> {
        self.graphics_pipelines.get(renderpass_props).cloned()
    }

    pub fn default_pipeline(&self) -> Arc<GraphicsPipeline> {
        let props = self
            .default_pipeline_props
            .as_ref()
            .expect("utility shader object used before its default pipeline was set");
        self.graphics_pipelines[props].clone()
    }

    pub fn all_pipelines(&self) -> Vec<&Arc<GraphicsPipeline>> {
        self.graphics_pipelines.values().collect()
    }

    /// The first call establishes the default variant; later calls must be for new
    /// render-pass properties.
    pub fn set_pipeline(
        &mut self,
        renderpass_props: RenderPassProperties,
        pipeline: Arc<GraphicsPipeline>,
    ) {
        if self.default_pipeline_props.is_none() {
            self.default_pipeline_props = Some(renderpass_props.clone());
        } else {
            debug_assert!(
                !self.graphics_pipelines.contains_key(&renderpass_props),
                "utility pipeline variant for these render-pass properties already exists"
            );
        }
        self.graphics_pipelines.insert(renderpass_props, pipeline);
    }

    pub fn prepare_pipeline_cache(
        &self,
        pipeline_cache: &mut PipelineCache,
    ) {
        for pipeline in self.graphics_pipelines.values() {
            pipeline_cache.add_pipeline(pipeline);
        }
    }
}

/// One compute shader, one pipeline. Exists so the rendering context can treat all three
/// shader object flavors through the same surface.
pub struct ComputeShaderObject {
    shader_name: String,
    compute_shader: Arc<dyn ShaderResource>,
    compute_pipeline: Option<Arc<ComputePipeline>>,
}

impl ComputeShaderObject {
    pub fn new(
        shader_name: impl Into<String>,
        shader: Arc<dyn ShaderResource>,
    ) -> Self {
        ComputeShaderObject {
            shader_name: shader_name.into(),
            compute_shader: shader,
            compute_pipeline: None,
        }
    }

    pub fn shader_name(&self) -> &str {
        &self.shader_name
    }

    pub fn shader(&self) -> &Arc<dyn ShaderResource> {
        &self.compute_shader
    }

    pub fn pipeline(&self) -> Option<Arc<ComputePipeline>> {
        self.compute_pipeline.clone()
    }

    pub fn set_pipeline(
        &mut self,
        pipeline: Arc<ComputePipeline>,
    ) {
        self.compute_pipeline = Some(pipeline);
    }

    pub fn prepare_pipeline_cache(
        &self,
        pipeline_cache: &mut PipelineCache,
    ) {
        if let Some(pipeline) = &self.compute_pipeline {
            pipeline_cache.add_compute_pipeline(pipeline);
        }
    }
}

/// Uniform wrapper over the three shader object flavors.
pub enum ShaderObject {
    DrawMesh(DrawMeshShaderObject),
    Utility(UniqueUtilityShaderObject),
    Compute(ComputeShaderObject),
}

impl ShaderObject {
    pub fn shader_name(&self) -> &str {
        match self {
            ShaderObject::DrawMesh(object) => object.shader_name(),
            ShaderObject::Utility(object) => object.shader_name(),
            ShaderObject::Compute(object) => object.shader_name(),
        }
    }

    pub fn prepare_pipeline_cache(
        &self,
        pipeline_cache: &mut PipelineCache,
    ) {
        match self {
            ShaderObject::DrawMesh(object) => object.prepare_pipeline_cache(pipeline_cache),
            ShaderObject::Utility(object) => object.prepare_pipeline_cache(pipeline_cache),
            ShaderObject::Compute(object) => object.prepare_pipeline_cache(pipeline_cache),
        }
    }

    pub fn as_draw_mesh(&self) -> Option<&DrawMeshShaderObject> {
        match self {
            ShaderObject::DrawMesh(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_draw_mesh_mut(&mut self) -> Option<&mut DrawMeshShaderObject> {
        match self {
            ShaderObject::DrawMesh(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_utility(&self) -> Option<&UniqueUtilityShaderObject> {
        match self {
            ShaderObject::Utility(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_utility_mut(&mut self) -> Option<&mut UniqueUtilityShaderObject> {
        match self {
            ShaderObject::Utility(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_compute(&self) -> Option<&ComputeShaderObject> {
        match self {
            ShaderObject::Compute(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_compute_mut(&mut self) -> Option<&mut ComputeShaderObject> {
        match self {
            ShaderObject::Compute(object) => Some(object),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::RenderPassFormat;
    use crate::test_utils::{TestRegistry, TestShaderResource};
    use crate::{ShaderConfig, ShaderConfigKind};

    fn draw_mesh_shader(
        test_registry: &TestRegistry,
        vertex_usage: VertexType,
        renderpass_usage: RenderPassFormat,
    ) -> Arc<dyn ShaderResource> {
        TestShaderResource::new(
            test_registry.shader_resource_type,
            ShaderConfig {
                name: "surface".to_string(),
                kind: ShaderConfigKind::DrawMesh {
                    vertex_usage,
                    renderpass_usage,
                },
            },
        )
    }

    #[test]
    fn test_add_shader_dedups_by_pointer() {
        let test_registry = TestRegistry::new();
        let shader =
            draw_mesh_shader(&test_registry, VertexType::Simple3, RenderPassFormat::Depth);

        let mut object = DrawMeshShaderObject::new("surface");
        object.add_shader(shader.clone());
        object.add_shader(shader.clone());

        assert_eq!(object.all_shaders().len(), 1);
    }

    #[test]
    fn test_variant_lookup_and_misses() {
        let test_registry = TestRegistry::new();
        let shader =
            draw_mesh_shader(&test_registry, VertexType::Simple3, RenderPassFormat::Depth);

        let mut object = DrawMeshShaderObject::new("surface");
        object.add_shader(shader.clone());

        let hit = object.shader(
            VertexType::Simple3,
            &FramebufferFormat::from_format(RenderPassFormat::Depth),
        );
        assert!(hit.is_some());
        assert!(Arc::ptr_eq(&hit.unwrap().shader, &shader));

        // Wrong vertex type, right format
        assert!(object
            .shader(
                VertexType::UI,
                &FramebufferFormat::from_format(RenderPassFormat::Depth)
            )
            .is_none());
        // Right vertex type, wrong format
        assert!(object
            .shader(
                VertexType::Simple3,
                &FramebufferFormat::from_format(RenderPassFormat::Multibuffer)
            )
            .is_none());
    }

    #[test]
    fn test_multiple_variants_pick_the_matching_one() {
        let test_registry = TestRegistry::new();
        let depth_shader =
            draw_mesh_shader(&test_registry, VertexType::StaticMesh, RenderPassFormat::Depth);
        let multibuffer_shader = draw_mesh_shader(
            &test_registry,
            VertexType::StaticMesh,
            RenderPassFormat::Multibuffer,
        );

        let mut object = DrawMeshShaderObject::new("surface");
        object.add_shader(depth_shader.clone());
        object.add_shader(multibuffer_shader.clone());

        let hit = object
            .shader(
                VertexType::StaticMesh,
                &FramebufferFormat::from_format(RenderPassFormat::Multibuffer),
            )
            .unwrap();
        assert!(Arc::ptr_eq(&hit.shader, &multibuffer_shader));
    }

    #[test]
    fn test_utility_first_pipeline_is_default() {
        let test_registry = TestRegistry::new();
        let shader: Arc<dyn ShaderResource> = TestShaderResource::new(
            test_registry.shader_resource_type,
            ShaderConfig {
                name: "blit".to_string(),
                kind: ShaderConfigKind::UniqueUtility {
                    vertex_usage: VertexType::Simple2,
                },
            },
        );

        let mut object = UniqueUtilityShaderObject::new("blit", shader.clone());

        let mut props = RenderPassProperties::default();
        props.attachment_format.attachments = vec![karst_api::PixelFormat::Bgra8Unorm];
        let pipeline = Arc::new(GraphicsPipeline::new(
            "blit",
            shader.clone(),
            Default::default(),
        ));
        object.set_pipeline(props.clone(), pipeline.clone());

        assert!(Arc::ptr_eq(&object.default_pipeline(), &pipeline));
        assert!(object.pipeline(&props).is_some());
        assert!(object
            .pipeline(&RenderPassProperties::default())
            .is_none());
        assert_eq!(object.all_pipelines().len(), 1);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "already exists")]
    fn test_utility_pipeline_key_collision_asserts() {
        let test_registry = TestRegistry::new();
        let shader: Arc<dyn ShaderResource> = TestShaderResource::new(
            test_registry.shader_resource_type,
            ShaderConfig {
                name: "blit".to_string(),
                kind: ShaderConfigKind::UniqueUtility {
                    vertex_usage: VertexType::Simple2,
                },
            },
        );

        let mut object = UniqueUtilityShaderObject::new("blit", shader.clone());
        let props = RenderPassProperties::default();
        let make_pipeline = || {
            Arc::new(GraphicsPipeline::new(
                "blit",
                shader.clone(),
                Default::default(),
            ))
        };
        object.set_pipeline(props.clone(), make_pipeline());

        let mut other_props = RenderPassProperties::default();
        other_props.attachment_format.attachments = vec![karst_api::PixelFormat::Bgra8Unorm];
        object.set_pipeline(other_props, make_pipeline());

        // Same key as the second insert
        let mut colliding = RenderPassProperties::default();
        colliding.attachment_format.attachments = vec![karst_api::PixelFormat::Bgra8Unorm];
        object.set_pipeline(colliding, make_pipeline());
    }
}
