//! Pipeline state objects, the draw-mode × culling-mode permutation space, the name-keyed
//! pipeline factory, and the persisted pipeline cache.

mod pipeline;
pub use pipeline::ComputePipeline;
pub use pipeline::GraphicsPipeline;
pub use pipeline::GraphicsPipelineConfig;
pub use pipeline::GraphicsPipelineQueryParams;
pub use pipeline::Pipeline;

mod factory;
pub use factory::ComputePipelineFactoryRegistrant;
pub use factory::GraphicsPipelineConfigGetter;
pub use factory::GraphicsPipelineFactoryRegistrant;
pub use factory::PipelineFactory;
pub use factory::PipelineFactoryArgs;

mod pipeline_cache;
pub use pipeline_cache::PipelineCache;
