//! Shared fixtures for unit tests: a registry preloaded with the common type roots, a
//! trivially fake backend, and observable test resources.

use crate::framebuffer::{FrameAttachment, Framebuffer, RenderPassProperties};
use crate::graphics_helper::{GraphicsHelper, WindowCanvas};
use crate::pipelines::{ComputePipeline, GraphicsPipeline, PipelineCache};
use crate::registry::{RenderResource, ResourceTypeId, ResourceTypeRegistry};
use crate::shaders::{
    ReflectDescriptorSet, ShaderConfig, ShaderConfigKind, ShaderParametersLayout,
    ShaderReflection, ShaderResource, BINDLESS_SET, INSTANCE_UNIQ_SET, SHADER_UNIQ_SET,
    SHADER_VARIANT_UNIQ_SET, VIEW_UNIQ_SET,
};
use karst_api::{ImageViewId, KarstResult, NativeHandle, PixelFormat, ShaderStageFlags};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub struct TestRegistry {
    pub registry: Arc<ResourceTypeRegistry>,
    pub memory_resource_type: ResourceTypeId,
    pub buffer_type: ResourceTypeId,
    pub shader_parameters_type: ResourceTypeId,
    pub shader_resource_type: ResourceTypeId,
    pub param_layout_type: ResourceTypeId,
}

impl TestRegistry {
    pub fn new() -> Self {
        let registry = Arc::new(ResourceTypeRegistry::new());
        let root = registry.root_type();
        let memory_resource_type = registry.register_type("memory_resource", root);
        let buffer_type = registry.register_type("buffer", memory_resource_type);
        let shader_parameters_type = registry.register_type("shader_parameters", root);
        let shader_resource_type = registry.register_type("shader_resource", root);
        let param_layout_type = registry.register_type("shader_parameters_layout", root);

        TestRegistry {
            registry,
            memory_resource_type,
            buffer_type,
            shader_parameters_type,
            shader_resource_type,
            param_layout_type,
        }
    }
}

pub struct TestResource {
    resource_type: ResourceTypeId,
    released: Arc<AtomicBool>,
}

impl TestResource {
    pub fn new(resource_type: ResourceTypeId) -> Arc<TestResource> {
        Arc::new(TestResource {
            resource_type,
            released: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn released_flag(&self) -> Arc<AtomicBool> {
        self.released.clone()
    }
}

impl RenderResource for TestResource {
    fn resource_type(&self) -> ResourceTypeId {
        self.resource_type
    }

    fn resource_name(&self) -> String {
        "test_resource".to_string()
    }

    fn release(&self) {
        self.released.store(true, Ordering::Relaxed);
    }
}

pub struct TestShaderResource {
    resource_type: ResourceTypeId,
    config: ShaderConfig,
    reflection: ShaderReflection,
    released: Arc<AtomicBool>,
}

impl TestShaderResource {
    pub fn new(
        resource_type: ResourceTypeId,
        config: ShaderConfig,
    ) -> Arc<TestShaderResource> {
        let reflection = match config.kind {
            ShaderConfigKind::DrawMesh { .. } => ShaderReflection {
                descriptor_sets: vec![
                    ReflectDescriptorSet {
                        set: BINDLESS_SET,
                        combined_set_usage: 0b1,
                    },
                    ReflectDescriptorSet {
                        set: VIEW_UNIQ_SET,
                        combined_set_usage: 0b11,
                    },
                    ReflectDescriptorSet {
                        set: INSTANCE_UNIQ_SET,
                        combined_set_usage: 0b1,
                    },
                    ReflectDescriptorSet {
                        set: SHADER_UNIQ_SET,
                        combined_set_usage: 0b111,
                    },
                    ReflectDescriptorSet {
                        set: SHADER_VARIANT_UNIQ_SET,
                        combined_set_usage: 0b1,
                    },
                ],
            },
            ShaderConfigKind::UniqueUtility { .. } | ShaderConfigKind::Compute => {
                ShaderReflection {
                    descriptor_sets: vec![ReflectDescriptorSet {
                        set: 0,
                        combined_set_usage: 0b1111,
                    }],
                }
            }
        };

        Arc::new(TestShaderResource {
            resource_type,
            config,
            reflection,
            released: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn released_flag(&self) -> Arc<AtomicBool> {
        self.released.clone()
    }
}

impl RenderResource for TestShaderResource {
    fn resource_type(&self) -> ResourceTypeId {
        self.resource_type
    }

    fn resource_name(&self) -> String {
        self.config.name.clone()
    }

    fn release(&self) {
        self.released.store(true, Ordering::Relaxed);
    }
}

impl ShaderResource for TestShaderResource {
    fn config(&self) -> &ShaderConfig {
        &self.config
    }

    fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }
}

/// Fake backend: hands out sequential native handles and remembers the shaders it
/// compiled so tests can observe their release.
pub struct TestGraphicsHelper {
    shader_resource_type: ResourceTypeId,
    param_layout_type: ResourceTypeId,
    next_handle: AtomicU64,
    created_shaders: Mutex<Vec<Arc<TestShaderResource>>>,
}

impl TestGraphicsHelper {
    pub fn new(test_registry: &TestRegistry) -> Self {
        TestGraphicsHelper {
            shader_resource_type: test_registry.shader_resource_type,
            param_layout_type: test_registry.param_layout_type,
            next_handle: AtomicU64::new(1),
            created_shaders: Mutex::new(Vec::new()),
        }
    }

    fn next_handle(&self) -> NativeHandle {
        NativeHandle(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    pub fn created_shaders(&self) -> Vec<Arc<TestShaderResource>> {
        self.created_shaders.lock().unwrap().clone()
    }
}

impl Default for TestGraphicsHelper {
    fn default() -> Self {
        Self::new(&TestRegistry::new())
    }
}

impl GraphicsHelper for TestGraphicsHelper {
    fn create_shader_resource(
        &self,
        config: &ShaderConfig,
    ) -> KarstResult<Arc<dyn ShaderResource>> {
        let shader = TestShaderResource::new(self.shader_resource_type, config.clone());
        self.created_shaders.lock().unwrap().push(shader.clone());
        Ok(shader)
    }

    fn create_shader_parameters_layout(
        &self,
        shader: &dyn ShaderResource,
        set_index: u32,
    ) -> KarstResult<Arc<ShaderParametersLayout>> {
        let stages = match shader.config().kind {
            ShaderConfigKind::Compute => ShaderStageFlags::COMPUTE,
            _ => ShaderStageFlags::ALL_GRAPHICS,
        };
        Ok(Arc::new(ShaderParametersLayout::new(
            self.param_layout_type,
            format!("{}_set{}", shader.resource_name(), set_index),
            set_index,
            stages,
            self.next_handle(),
        )))
    }

    fn initialize_graphics_pipeline(
        &self,
        pipeline: &mut GraphicsPipeline,
        _cache: Option<&PipelineCache>,
    ) -> KarstResult<()> {
        let natives = (0..pipeline.pipelines_count())
            .map(|_| self.next_handle())
            .collect();
        pipeline.set_native_pipelines(natives);
        Ok(())
    }

    fn initialize_compute_pipeline(
        &self,
        pipeline: &mut ComputePipeline,
        _cache: Option<&PipelineCache>,
    ) -> KarstResult<()> {
        pipeline.set_native_pipeline(self.next_handle());
        Ok(())
    }

    fn create_framebuffer(
        &self,
        props: &RenderPassProperties,
        attachments: &[FrameAttachment],
    ) -> KarstResult<Framebuffer> {
        Ok(Framebuffer {
            attachments: attachments.to_vec(),
            has_resolves: !props.one_rt_per_format,
            sample_count: props.multisample_count,
            native: self.next_handle(),
        })
    }

    fn create_swapchain_framebuffer(
        &self,
        canvas: &dyn WindowCanvas,
        image_idx: u32,
    ) -> KarstResult<Framebuffer> {
        Ok(Framebuffer {
            attachments: vec![FrameAttachment {
                image: canvas.image_view(image_idx),
                format: canvas.canvas_format(),
            }],
            has_resolves: false,
            sample_count: Default::default(),
            native: self.next_handle(),
        })
    }

    fn pipeline_cache_data(
        &self,
        pipelines: &[NativeHandle],
    ) -> KarstResult<Vec<u8>> {
        let mut data = Vec::with_capacity(pipelines.len() * 8);
        for pipeline in pipelines {
            data.extend_from_slice(&pipeline.0.to_le_bytes());
        }
        Ok(data)
    }
}

pub struct TestWindowCanvas {
    pub id: u64,
    pub images: u32,
    pub format: PixelFormat,
}

impl WindowCanvas for TestWindowCanvas {
    fn canvas_id(&self) -> u64 {
        self.id
    }

    fn images_count(&self) -> u32 {
        self.images
    }

    fn canvas_format(&self) -> PixelFormat {
        self.format
    }

    fn image_view(
        &self,
        image_idx: u32,
    ) -> ImageViewId {
        ImageViewId(self.id * 1000 + image_idx as u64)
    }
}

static TEMP_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A fresh directory under the system temp dir, unique per test invocation.
pub fn unique_temp_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "{}_{}_{}",
        prefix,
        std::process::id(),
        TEMP_DIR_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
