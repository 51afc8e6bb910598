//! Backend-agnostic bookkeeping layer beneath the render interface: resource type/lifetime
//! registry, deferred GPU object reclamation, and the shader-pipeline permutation and
//! caching subsystem. A concrete backend plugs in through the [`GraphicsHelper`] seam and
//! is never called directly by anything here.

pub mod registry;

mod deferred_deleter;
pub use deferred_deleter::DeferredDeleteStrategy;
pub use deferred_deleter::DeferredDeleter;
pub use deferred_deleter::DeferredResource;
pub use deferred_deleter::DeferringData;

mod vertex_data;
pub use vertex_data::VertexType;

mod framebuffer;
pub use framebuffer::FrameAttachment;
pub use framebuffer::Framebuffer;
pub use framebuffer::FramebufferFormat;
pub use framebuffer::RenderPassFormat;
pub use framebuffer::RenderPassProperties;

mod shaders;
pub use shaders::ReflectDescriptorSet;
pub use shaders::ShaderConfig;
pub use shaders::ShaderConfigKind;
pub use shaders::ShaderParametersLayout;
pub use shaders::ShaderReflection;
pub use shaders::ShaderResource;
pub use shaders::BINDLESS_SET;
pub use shaders::INSTANCE_UNIQ_SET;
pub use shaders::SHADER_UNIQ_SET;
pub use shaders::SHADER_VARIANT_UNIQ_SET;
pub use shaders::VIEW_UNIQ_SET;

pub mod pipelines;
pub use pipelines::ComputePipeline;
pub use pipelines::GraphicsPipeline;
pub use pipelines::GraphicsPipelineConfig;
pub use pipelines::GraphicsPipelineQueryParams;
pub use pipelines::Pipeline;
pub use pipelines::PipelineCache;
pub use pipelines::PipelineFactory;
pub use pipelines::PipelineFactoryArgs;

mod shader_object;
pub use shader_object::ComputeShaderObject;
pub use shader_object::DrawMeshShaderObject;
pub use shader_object::ShaderObject;
pub use shader_object::ShaderVariantEntry;
pub use shader_object::UniqueUtilityShaderObject;

mod graphics_helper;
pub use graphics_helper::GraphicsHelper;
pub use graphics_helper::WindowCanvas;

mod render_context;
pub use render_context::BoundPipeline;
pub use render_context::GlobalRenderingContext;
pub use render_context::LocalPipelineContext;
pub use render_context::ShaderDataCollection;

pub use karst_api::KarstError;
pub use karst_api::KarstResult;

#[cfg(test)]
pub(crate) mod test_utils;
