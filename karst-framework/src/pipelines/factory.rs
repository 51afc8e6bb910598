use super::pipeline::{ComputePipeline, GraphicsPipeline, GraphicsPipelineConfig, Pipeline};
use crate::shaders::{ShaderConfigKind, ShaderResource};
use fnv::FnvHashMap;
use std::sync::Arc;

/// Supplies a fresh pipeline configuration for a shader. Registered per shader name so
/// content can tune fixed-function state and the permutation lists per material.
pub type GraphicsPipelineConfigGetter =
    Box<dyn Fn(&dyn ShaderResource) -> GraphicsPipelineConfig + Send + Sync>;

pub struct GraphicsPipelineFactoryRegistrant {
    pub config_getter: GraphicsPipelineConfigGetter,
}

/// Compute pipelines have no configuration beyond the shader; registering the name is the
/// whole contract.
pub struct ComputePipelineFactoryRegistrant;

pub struct PipelineFactoryArgs<'a> {
    pub pipeline_shader: &'a Arc<dyn ShaderResource>,
    pub parent_pipeline: Option<&'a GraphicsPipeline>,
}

/// Name-keyed registry translating "I need a pipeline for shader X" into a constructed
/// pipeline object. Built once during startup and threaded through to consumers; there is
/// no global registry.
#[derive(Default)]
pub struct PipelineFactory {
    graphics_pipeline_factories: FnvHashMap<String, GraphicsPipelineFactoryRegistrant>,
    compute_pipeline_factories: FnvHashMap<String, ComputePipelineFactoryRegistrant>,
}

impl PipelineFactory {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn register_graphics_pipeline(
        &mut self,
        shader_name: impl Into<String>,
        config_getter: GraphicsPipelineConfigGetter,
    ) {
        self.graphics_pipeline_factories.insert(
            shader_name.into(),
            GraphicsPipelineFactoryRegistrant { config_getter },
        );
    }

    pub fn register_compute_pipeline(
        &mut self,
        shader_name: impl Into<String>,
    ) {
        self.compute_pipeline_factories
            .insert(shader_name.into(), ComputePipelineFactoryRegistrant);
    }

    /// Construct a pipeline for the shader in `args`. With a parent pipeline set this is
    /// the cheap specialization path: the child inherits the parent's full configuration
    /// and the registry is not consulted. Otherwise the shader's configuration kind picks
    /// the graphics or compute registry; a missing registration is a content-build or
    /// linkage error the renderer cannot recover from, so it is fatal.
    pub fn create(
        &self,
        args: PipelineFactoryArgs,
    ) -> Pipeline {
        if let Some(parent) = args.parent_pipeline {
            return Pipeline::Graphics(GraphicsPipeline::with_parent(parent));
        }

        let shader = args.pipeline_shader;
        let shader_name = &shader.config().name;
        match shader.config().kind {
            ShaderConfigKind::DrawMesh { .. } | ShaderConfigKind::UniqueUtility { .. } => {
                let registrant = self
                    .graphics_pipeline_factories
                    .get(shader_name)
                    .unwrap_or_else(|| {
                        log::error!(
                            "No graphics pipeline factory registered for shader {}",
                            shader_name
                        );
                        panic!(
                            "no graphics pipeline factory registered for shader {}",
                            shader_name
                        );
                    });
                let config = (registrant.config_getter)(shader.as_ref());
                Pipeline::Graphics(GraphicsPipeline::new(
                    shader_name.clone(),
                    shader.clone(),
                    config,
                ))
            }
            ShaderConfigKind::Compute => {
                if !self.compute_pipeline_factories.contains_key(shader_name) {
                    log::error!(
                        "No compute pipeline factory registered for shader {}",
                        shader_name
                    );
                    panic!(
                        "no compute pipeline factory registered for shader {}",
                        shader_name
                    );
                }
                Pipeline::Compute(ComputePipeline::new(shader_name.clone(), shader.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TestRegistry, TestShaderResource};
    use crate::{RenderPassFormat, ShaderConfig, ShaderConfigKind, VertexType};
    use karst_api::PolygonDrawMode;

    fn graphics_shader(test_registry: &TestRegistry) -> Arc<dyn ShaderResource> {
        TestShaderResource::new(
            test_registry.shader_resource_type,
            ShaderConfig {
                name: "wireframe".to_string(),
                kind: ShaderConfigKind::UniqueUtility {
                    vertex_usage: VertexType::Simple3,
                },
            },
        )
    }

    #[test]
    fn test_create_uses_registered_config() {
        let test_registry = TestRegistry::new();
        let shader = graphics_shader(&test_registry);

        let mut factory = PipelineFactory::new();
        factory.register_graphics_pipeline(
            "wireframe",
            Box::new(|_shader| GraphicsPipelineConfig {
                allowed_draw_modes: vec![PolygonDrawMode::Line],
                ..Default::default()
            }),
        );

        let pipeline = factory.create(PipelineFactoryArgs {
            pipeline_shader: &shader,
            parent_pipeline: None,
        });
        match pipeline {
            Pipeline::Graphics(pipeline) => {
                assert_eq!(pipeline.name(), "wireframe");
                assert_eq!(
                    pipeline.config().allowed_draw_modes,
                    vec![PolygonDrawMode::Line]
                );
            }
            Pipeline::Compute(_) => panic!("expected a graphics pipeline"),
        }
    }

    #[test]
    fn test_parent_pipeline_bypasses_registry() {
        let test_registry = TestRegistry::new();
        let shader = graphics_shader(&test_registry);

        // Note the factory has no registration for this shader at all
        let factory = PipelineFactory::new();
        let parent =
            GraphicsPipeline::new("wireframe", shader.clone(), Default::default());

        let child = factory.create(PipelineFactoryArgs {
            pipeline_shader: &shader,
            parent_pipeline: Some(&parent),
        });
        assert!(matches!(child, Pipeline::Graphics(_)));
    }

    #[test]
    #[should_panic(expected = "no graphics pipeline factory registered for shader")]
    fn test_missing_registration_is_fatal() {
        let test_registry = TestRegistry::new();
        let shader = graphics_shader(&test_registry);

        let factory = PipelineFactory::new();
        factory.create(PipelineFactoryArgs {
            pipeline_shader: &shader,
            parent_pipeline: None,
        });
    }

    #[test]
    fn test_compute_classification() {
        let test_registry = TestRegistry::new();
        let shader: Arc<dyn ShaderResource> = TestShaderResource::new(
            test_registry.shader_resource_type,
            ShaderConfig {
                name: "histogram".to_string(),
                kind: ShaderConfigKind::Compute,
            },
        );

        let mut factory = PipelineFactory::new();
        factory.register_compute_pipeline("histogram");

        let pipeline = factory.create(PipelineFactoryArgs {
            pipeline_shader: &shader,
            parent_pipeline: None,
        });
        assert!(matches!(pipeline, Pipeline::Compute(_)));
    }

    #[test]
    fn test_draw_mesh_uses_renderpass_usage() {
        let test_registry = TestRegistry::new();
        let shader: Arc<dyn ShaderResource> = TestShaderResource::new(
            test_registry.shader_resource_type,
            ShaderConfig {
                name: "opaque".to_string(),
                kind: ShaderConfigKind::DrawMesh {
                    vertex_usage: VertexType::StaticMesh,
                    renderpass_usage: RenderPassFormat::Multibuffer,
                },
            },
        );

        let mut factory = PipelineFactory::new();
        factory.register_graphics_pipeline(
            "opaque",
            Box::new(|_shader| Default::default()),
        );

        let pipeline = factory.create(PipelineFactoryArgs {
            pipeline_shader: &shader,
            parent_pipeline: None,
        });
        assert!(matches!(pipeline, Pipeline::Graphics(_)));
    }
}
