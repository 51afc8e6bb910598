//! The seam between this bookkeeping layer and a concrete GPU backend. Everything that
//! actually allocates a native object goes through [`GraphicsHelper`]; nothing in this
//! crate issues a native graphics API call.

use crate::framebuffer::{FrameAttachment, Framebuffer, RenderPassProperties};
use crate::pipelines::{ComputePipeline, GraphicsPipeline, PipelineCache};
use crate::shaders::{ShaderConfig, ShaderParametersLayout, ShaderResource};
use karst_api::{ImageViewId, KarstResult, NativeHandle, PixelFormat};
use std::sync::Arc;

/// Abstract factory a backend implements to realize the objects this layer books.
pub trait GraphicsHelper: Send + Sync {
    /// Compile/load the shader described by `config` and hand back its resource.
    fn create_shader_resource(
        &self,
        config: &ShaderConfig,
    ) -> KarstResult<Arc<dyn ShaderResource>>;

    /// Build the descriptor-set layout for one set of a shader, as derived from its
    /// reflection.
    fn create_shader_parameters_layout(
        &self,
        shader: &dyn ShaderResource,
        set_index: u32,
    ) -> KarstResult<Arc<ShaderParametersLayout>>;

    /// Realize every permutation of `pipeline`; implementations fill in the native
    /// handles via [`GraphicsPipeline::set_native_pipelines`].
    fn initialize_graphics_pipeline(
        &self,
        pipeline: &mut GraphicsPipeline,
        cache: Option<&PipelineCache>,
    ) -> KarstResult<()>;

    fn initialize_compute_pipeline(
        &self,
        pipeline: &mut ComputePipeline,
        cache: Option<&PipelineCache>,
    ) -> KarstResult<()>;

    fn create_framebuffer(
        &self,
        props: &RenderPassProperties,
        attachments: &[FrameAttachment],
    ) -> KarstResult<Framebuffer>;

    fn create_swapchain_framebuffer(
        &self,
        canvas: &dyn WindowCanvas,
        image_idx: u32,
    ) -> KarstResult<Framebuffer>;

    /// The backend's opaque cache blob (e.g. a driver pipeline cache) covering the given
    /// native pipelines.
    fn pipeline_cache_data(
        &self,
        pipelines: &[NativeHandle],
    ) -> KarstResult<Vec<u8>>;
}

/// The window/swapchain collaborator, consumed through this narrow surface only.
pub trait WindowCanvas: Send + Sync {
    /// Stable identity used to key the per-canvas framebuffer cache
    fn canvas_id(&self) -> u64;

    fn images_count(&self) -> u32;

    fn canvas_format(&self) -> PixelFormat;

    fn image_view(
        &self,
        image_idx: u32,
    ) -> ImageViewId;
}
