use crate::framebuffer::RenderPassProperties;
use crate::shaders::{ShaderParametersLayout, ShaderResource};
use karst_api::{
    AttachmentBlendState, CullingMode, DepthState, NativeHandle, PolygonDrawMode,
    PrimitiveTopology, StencilState,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One point in a graphics pipeline's permutation space.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphicsPipelineQueryParams {
    pub draw_mode: PolygonDrawMode,
    pub culling_mode: CullingMode,
}

/// Fixed-function state plus the two permuted dimensions. One pipeline object is created
/// per element of `allowed_draw_modes` × `supported_culling_modes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphicsPipelineConfig {
    /// For mesh-draw shaders only the render pass format of this is meaningful
    pub renderpass_props: RenderPassProperties,

    pub primitive_topology: PrimitiveTopology,
    /// Tessellation control points per patch, ignored when zero
    pub control_points: u32,

    pub enable_depth_bias: bool,
    pub enable_depth_clamp: bool,

    pub depth_state: DepthState,
    pub stencil_state_front: StencilState,
    pub stencil_state_back: StencilState,

    pub attachment_blend_states: Vec<AttachmentBlendState>,

    /// Dynamic params: every combination of the two lists below gets its own pipeline
    pub allowed_draw_modes: Vec<PolygonDrawMode>,
    pub supported_culling_modes: Vec<CullingMode>,
}

impl Default for GraphicsPipelineConfig {
    fn default() -> Self {
        GraphicsPipelineConfig {
            renderpass_props: RenderPassProperties::default(),
            primitive_topology: PrimitiveTopology::Triangle,
            control_points: 0,
            enable_depth_bias: false,
            enable_depth_clamp: false,
            depth_state: DepthState::default(),
            stencil_state_front: StencilState::default(),
            stencil_state_back: StencilState::default(),
            attachment_blend_states: Vec::new(),
            allowed_draw_modes: vec![PolygonDrawMode::Fill],
            supported_culling_modes: vec![CullingMode::BackFace],
        }
    }
}

/// A graphics pipeline and its permutations. Constructed by the [`super::PipelineFactory`]
/// and realized by the backend, which fills in one native object per permutation index.
pub struct GraphicsPipeline {
    name: String,
    shader: Arc<dyn ShaderResource>,
    /// Parameter layout per descriptor set index
    param_layouts: Vec<Option<Arc<ShaderParametersLayout>>>,
    /// If this pipeline will be used as parent to any other pipelines
    can_be_parent: bool,
    config: GraphicsPipelineConfig,
    /// Permutation index to native pipeline object
    natives: Vec<NativeHandle>,
}

impl GraphicsPipeline {
    pub fn new(
        name: impl Into<String>,
        shader: Arc<dyn ShaderResource>,
        config: GraphicsPipelineConfig,
    ) -> Self {
        GraphicsPipeline {
            name: name.into(),
            shader,
            param_layouts: Vec::new(),
            can_be_parent: false,
            config,
            natives: Vec::new(),
        }
    }

    /// Derive a child pipeline: the parent's shader, parameter layouts and configuration
    /// are shared at construction time and only what the caller sets afterwards differs.
    pub fn with_parent(parent: &GraphicsPipeline) -> Self {
        GraphicsPipeline {
            name: parent.name.clone(),
            shader: parent.shader.clone(),
            param_layouts: parent.param_layouts.clone(),
            can_be_parent: false,
            config: parent.config.clone(),
            natives: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(
        &mut self,
        name: impl Into<String>,
    ) {
        self.name = name.into();
    }

    pub fn shader(&self) -> &Arc<dyn ShaderResource> {
        &self.shader
    }

    pub fn can_be_parent(&self) -> bool {
        self.can_be_parent
    }

    pub fn set_can_be_parent(
        &mut self,
        can_be_parent: bool,
    ) {
        self.can_be_parent = can_be_parent;
    }

    pub fn config(&self) -> &GraphicsPipelineConfig {
        &self.config
    }

    pub fn set_pipeline_config(
        &mut self,
        config: GraphicsPipelineConfig,
    ) {
        self.config = config;
    }

    pub fn renderpass_properties(&self) -> &RenderPassProperties {
        &self.config.renderpass_props
    }

    pub fn set_renderpass_properties(
        &mut self,
        props: RenderPassProperties,
    ) {
        self.config.renderpass_props = props;
    }

    /// Sets the parameter layout used at a descriptor set index, growing the list as
    /// needed.
    pub fn set_param_layout_at_set(
        &mut self,
        layout: Arc<ShaderParametersLayout>,
        set_idx: u32,
    ) {
        let set_idx = set_idx as usize;
        if self.param_layouts.len() <= set_idx {
            self.param_layouts.resize(set_idx + 1, None);
        }
        self.param_layouts[set_idx] = Some(layout);
    }

    /// Replaces all layouts with a single one at set 0, for shaders that pack everything
    /// into one set.
    pub fn set_single_param_layout(
        &mut self,
        layout: Arc<ShaderParametersLayout>,
    ) {
        self.param_layouts.clear();
        self.param_layouts.push(Some(layout));
    }

    pub fn param_layout_at_set(
        &self,
        set_idx: u32,
    ) -> Option<&Arc<ShaderParametersLayout>> {
        self.param_layouts
            .get(set_idx as usize)
            .and_then(|layout| layout.as_ref())
    }

    pub fn param_layouts(&self) -> &[Option<Arc<ShaderParametersLayout>>] {
        &self.param_layouts
    }

    /// Number of pipeline state objects this configuration expands to.
    pub fn pipelines_count(&self) -> usize {
        self.config.allowed_draw_modes.len() * self.config.supported_culling_modes.len()
    }

    /// Decode a flat permutation index, most significant dimension first: draw mode
    /// outermost, culling mode innermost. Exact inverse of [`Self::idx_from_param`] over
    /// `[0, pipelines_count())`.
    pub fn param_for_idx(
        &self,
        idx: usize,
    ) -> GraphicsPipelineQueryParams {
        debug_assert!(idx < self.pipelines_count());

        let mut denominator = self.pipelines_count();
        let mut numerator = idx;

        // For each dimension, dividing the remaining element count by this dimension's
        // option count gives the stride; numerator / stride is the ordinal and the
        // remainder encodes the rest

        let draw_modes = &self.config.allowed_draw_modes;
        denominator /= draw_modes.len();
        let draw_mode = draw_modes[numerator / denominator];
        numerator %= denominator;

        let cullings = &self.config.supported_culling_modes;
        denominator /= cullings.len();
        let culling_mode = cullings[numerator / denominator];

        GraphicsPipelineQueryParams {
            draw_mode,
            culling_mode,
        }
    }

    /// Encode query params into a flat permutation index. A value absent from its allowed
    /// list has no valid ordinal; a warning is logged and ordinal 0 is substituted so the
    /// draw proceeds with a wrong-looking but valid pipeline instead of crashing
    /// mid-frame.
    pub fn idx_from_param(
        &self,
        query_param: GraphicsPipelineQueryParams,
    ) -> usize {
        let mut idx = 0;
        let mut stride = self.pipelines_count();

        let draw_modes = &self.config.allowed_draw_modes;
        stride /= draw_modes.len();
        let ordinal = draw_modes
            .iter()
            .position(|&mode| mode == query_param.draw_mode)
            .unwrap_or_else(|| {
                log::warn!(
                    "Not supported draw mode {:?} for pipeline of shader {}",
                    query_param.draw_mode,
                    self.shader.resource_name()
                );
                draw_modes.len()
            });
        idx += (ordinal % draw_modes.len()) * stride;

        let cullings = &self.config.supported_culling_modes;
        stride /= cullings.len();
        let ordinal = cullings
            .iter()
            .position(|&mode| mode == query_param.culling_mode)
            .unwrap_or_else(|| {
                log::warn!(
                    "Not supported culling mode {:?} for pipeline of shader {}",
                    query_param.culling_mode,
                    self.shader.resource_name()
                );
                cullings.len()
            });
        idx += (ordinal % cullings.len()) * stride;

        idx
    }

    /// Filled by the backend once the permutations are realized.
    pub fn set_native_pipelines(
        &mut self,
        natives: Vec<NativeHandle>,
    ) {
        debug_assert_eq!(natives.len(), self.pipelines_count());
        self.natives = natives;
    }

    pub fn native_pipelines(&self) -> &[NativeHandle] {
        &self.natives
    }

    pub fn native_pipeline(
        &self,
        query_param: GraphicsPipelineQueryParams,
    ) -> Option<NativeHandle> {
        self.natives.get(self.idx_from_param(query_param)).copied()
    }
}

/// A compute pipeline: one shader, one native object, no permutation.
pub struct ComputePipeline {
    name: String,
    shader: Arc<dyn ShaderResource>,
    param_layouts: Vec<Option<Arc<ShaderParametersLayout>>>,
    native: Option<NativeHandle>,
}

impl ComputePipeline {
    pub fn new(
        name: impl Into<String>,
        shader: Arc<dyn ShaderResource>,
    ) -> Self {
        ComputePipeline {
            name: name.into(),
            shader,
            param_layouts: Vec::new(),
            native: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shader(&self) -> &Arc<dyn ShaderResource> {
        &self.shader
    }

    pub fn set_single_param_layout(
        &mut self,
        layout: Arc<ShaderParametersLayout>,
    ) {
        self.param_layouts.clear();
        self.param_layouts.push(Some(layout));
    }

    pub fn param_layout_at_set(
        &self,
        set_idx: u32,
    ) -> Option<&Arc<ShaderParametersLayout>> {
        self.param_layouts
            .get(set_idx as usize)
            .and_then(|layout| layout.as_ref())
    }

    pub fn set_native_pipeline(
        &mut self,
        native: NativeHandle,
    ) {
        self.native = Some(native);
    }

    pub fn native_pipeline(&self) -> Option<NativeHandle> {
        self.native
    }
}

/// What the [`super::PipelineFactory`] hands back; the caller knows which variant to
/// expect from the shader's configuration kind.
pub enum Pipeline {
    Graphics(GraphicsPipeline),
    Compute(ComputePipeline),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TestRegistry, TestShaderResource};
    use crate::{ShaderConfig, ShaderConfigKind};
    use crate::{RenderPassFormat, VertexType};

    fn test_pipeline(
        draw_modes: Vec<PolygonDrawMode>,
        cullings: Vec<CullingMode>,
    ) -> GraphicsPipeline {
        let test_registry = TestRegistry::new();
        let shader = TestShaderResource::new(
            test_registry.shader_resource_type,
            ShaderConfig {
                name: "test".to_string(),
                kind: ShaderConfigKind::DrawMesh {
                    vertex_usage: VertexType::StaticMesh,
                    renderpass_usage: RenderPassFormat::Multibuffer,
                },
            },
        );

        let config = GraphicsPipelineConfig {
            allowed_draw_modes: draw_modes,
            supported_culling_modes: cullings,
            ..Default::default()
        };
        GraphicsPipeline::new("test", shader, config)
    }

    #[test]
    fn test_permutation_bijection() {
        let pipeline = test_pipeline(
            vec![PolygonDrawMode::Fill, PolygonDrawMode::Line],
            vec![CullingMode::BackFace, CullingMode::None],
        );

        assert_eq!(pipeline.pipelines_count(), 4);
        assert_eq!(
            pipeline.param_for_idx(0),
            GraphicsPipelineQueryParams {
                draw_mode: PolygonDrawMode::Fill,
                culling_mode: CullingMode::BackFace,
            }
        );
        assert_eq!(
            pipeline.param_for_idx(3),
            GraphicsPipelineQueryParams {
                draw_mode: PolygonDrawMode::Line,
                culling_mode: CullingMode::None,
            }
        );

        for idx in 0..pipeline.pipelines_count() {
            assert_eq!(pipeline.idx_from_param(pipeline.param_for_idx(idx)), idx);
        }
    }

    #[test]
    fn test_unsupported_param_falls_back_to_ordinal_zero() {
        let pipeline = test_pipeline(
            vec![PolygonDrawMode::Fill, PolygonDrawMode::Line],
            vec![CullingMode::BackFace, CullingMode::None],
        );

        // Point isn't in the allowed list; the draw-mode contribution degrades to 0
        let idx = pipeline.idx_from_param(GraphicsPipelineQueryParams {
            draw_mode: PolygonDrawMode::Point,
            culling_mode: CullingMode::None,
        });
        assert_eq!(idx, 1);
    }

    #[test]
    fn test_child_pipeline_shares_parent_state() {
        let mut parent = test_pipeline(
            vec![PolygonDrawMode::Fill],
            vec![CullingMode::BackFace, CullingMode::None],
        );
        parent.set_can_be_parent(true);

        let child = GraphicsPipeline::with_parent(&parent);
        assert!(!child.can_be_parent());
        assert_eq!(child.name(), parent.name());
        assert_eq!(child.pipelines_count(), parent.pipelines_count());
        assert!(Arc::ptr_eq(child.shader(), parent.shader()));
    }

    #[test]
    fn test_native_pipeline_lookup() {
        let mut pipeline = test_pipeline(
            vec![PolygonDrawMode::Fill, PolygonDrawMode::Line],
            vec![CullingMode::BackFace, CullingMode::None],
        );
        pipeline.set_native_pipelines(
            (0..4).map(|handle| NativeHandle(handle + 100)).collect(),
        );

        assert_eq!(
            pipeline.native_pipeline(GraphicsPipelineQueryParams {
                draw_mode: PolygonDrawMode::Line,
                culling_mode: CullingMode::None,
            }),
            Some(NativeHandle(103))
        );
    }
}
