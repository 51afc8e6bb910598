//! The one-time-initialized global rendering context: owns the shader objects, the
//! per-vertex-type and scene-common parameter layouts, the framebuffer caches and the
//! persisted pipeline cache. After the single-threaded init pass the lookup tables are
//! read-only; the steady-state per-frame entry point is
//! [`GlobalRenderingContext::prepare_pipeline_context`].

use crate::framebuffer::{
    FrameAttachment, Framebuffer, FramebufferFormat, RenderPassFormat, RenderPassProperties,
};
use crate::graphics_helper::{GraphicsHelper, WindowCanvas};
use crate::pipelines::{
    ComputePipeline, GraphicsPipeline, Pipeline, PipelineCache, PipelineFactory,
    PipelineFactoryArgs,
};
use crate::registry::{RenderResource, ResourceTypeId, ResourceTypeRegistry};
use crate::shader_object::{
    ComputeShaderObject, DrawMeshShaderObject, ShaderObject, UniqueUtilityShaderObject,
};
use crate::shaders::{
    ShaderConfig, ShaderConfigKind, ShaderParametersLayout, ShaderResource, BINDLESS_SET,
    INSTANCE_UNIQ_SET, SHADER_UNIQ_SET, SHADER_VARIANT_UNIQ_SET, VIEW_UNIQ_SET,
};
use crate::vertex_data::VertexType;
use fnv::FnvHashMap;
use karst_api::{KarstResult, SampleCount};
use std::path::Path;
use std::sync::Arc;

/// Everything kept per unique material name. All compiled variants of one name share the
/// shader-unique parameter layout.
pub struct ShaderDataCollection {
    pub shader_object: ShaderObject,
    pub shaders_param_layout: Arc<ShaderParametersLayout>,
}

#[derive(Clone)]
pub enum BoundPipeline {
    Graphics(Arc<GraphicsPipeline>),
    Compute(Arc<ComputePipeline>),
}

impl BoundPipeline {
    pub fn as_graphics(&self) -> Option<&Arc<GraphicsPipeline>> {
        match self {
            BoundPipeline::Graphics(pipeline) => Some(pipeline),
            BoundPipeline::Compute(_) => None,
        }
    }

    pub fn as_compute(&self) -> Option<&Arc<ComputePipeline>> {
        match self {
            BoundPipeline::Graphics(_) => None,
            BoundPipeline::Compute(pipeline) => Some(pipeline),
        }
    }
}

/// Caller-filled request plus context-filled result for one draw/dispatch site.
#[derive(Default)]
pub struct LocalPipelineContext {
    framebuffer: Option<Arc<Framebuffer>>,
    pipeline_used: Option<BoundPipeline>,

    pub swapchain_idx: u32,
    pub frame_attachments: Vec<FrameAttachment>,
    pub renderpass_format: RenderPassFormat,
    pub window_canvas: Option<Arc<dyn WindowCanvas>>,
    pub for_vertex_type: VertexType,
    pub material_name: String,
}

impl LocalPipelineContext {
    pub fn framebuffer(&self) -> Option<&Arc<Framebuffer>> {
        self.framebuffer.as_ref()
    }

    pub fn pipeline(&self) -> Option<&BoundPipeline> {
        self.pipeline_used.as_ref()
    }
}

enum MaterialKind {
    DrawMesh,
    Utility,
    Compute,
}

struct SetUsageMax {
    bits: u32,
    shader: Arc<dyn ShaderResource>,
}

fn track_max(
    slot: &mut Option<SetUsageMax>,
    bits: u32,
    shader: &Arc<dyn ShaderResource>,
) {
    match slot {
        Some(current) if current.bits >= bits => {}
        _ => {
            *slot = Some(SetUsageMax {
                bits,
                shader: shader.clone(),
            })
        }
    }
}

/// Orchestrates the pipeline subsystem: one-time population at startup, on-demand
/// framebuffer/pipeline-variant creation afterward, cache write-out at shutdown.
pub struct GlobalRenderingContext {
    registry: Arc<ResourceTypeRegistry>,
    graphics_helper: Arc<dyn GraphicsHelper>,
    pipeline_factory: PipelineFactory,

    /// Root type every compiled shader resource registers under, used to enumerate the
    /// survivors at shutdown
    shader_resource_root: ResourceTypeId,

    /// Shader (material) name to its variants and layouts
    raw_shader_objects: FnvHashMap<String, ShaderDataCollection>,

    /// One parameter layout per vertex type
    per_vertex_type_layouts: FnvHashMap<VertexType, Arc<ShaderParametersLayout>>,
    /// Scene's common per-view layout
    scene_view_param_layout: Option<Arc<ShaderParametersLayout>>,
    bindless_param_layout: Option<Arc<ShaderParametersLayout>>,

    rt_framebuffers: FnvHashMap<RenderPassProperties, Vec<Arc<Framebuffer>>>,
    window_canvas_framebuffers: FnvHashMap<u64, Vec<Arc<Framebuffer>>>,

    pipelines_cache: Option<PipelineCache>,

    gpu_is_compute_only: bool,
}

impl GlobalRenderingContext {
    pub fn new(
        registry: Arc<ResourceTypeRegistry>,
        graphics_helper: Arc<dyn GraphicsHelper>,
        pipeline_factory: PipelineFactory,
        shader_resource_root: ResourceTypeId,
        cache_root: Option<&Path>,
    ) -> Self {
        GlobalRenderingContext {
            registry,
            graphics_helper,
            pipeline_factory,
            shader_resource_root,
            raw_shader_objects: FnvHashMap::default(),
            per_vertex_type_layouts: FnvHashMap::default(),
            scene_view_param_layout: None,
            bindless_param_layout: None,
            rt_framebuffers: FnvHashMap::default(),
            window_canvas_framebuffers: FnvHashMap::default(),
            pipelines_cache: cache_root.map(|root| PipelineCache::new(root, "shaders")),
            gpu_is_compute_only: false,
        }
    }

    /// Skip every graphics shader during init; only compute materials get built.
    pub fn set_compute_only(
        &mut self,
        compute_only: bool,
    ) {
        self.gpu_is_compute_only = compute_only;
    }

    /// One-time population: compiles every shader, builds the common parameter layouts,
    /// then builds each material's pipelines and variant tables. Runs single-threaded;
    /// the tables are read-only afterwards.
    pub fn init_context(
        &mut self,
        shader_configs: &[ShaderConfig],
    ) -> KarstResult<()> {
        self.init_shader_resources(shader_configs)
    }

    pub fn shader_data(
        &self,
        material_name: &str,
    ) -> Option<&ShaderDataCollection> {
        self.raw_shader_objects.get(material_name)
    }

    pub fn shader_object(
        &self,
        material_name: &str,
    ) -> Option<&ShaderObject> {
        self.raw_shader_objects
            .get(material_name)
            .map(|collection| &collection.shader_object)
    }

    pub fn per_vertex_type_layout(
        &self,
        vertex_type: VertexType,
    ) -> Option<&Arc<ShaderParametersLayout>> {
        self.per_vertex_type_layouts.get(&vertex_type)
    }

    pub fn scene_view_param_layout(&self) -> Option<&Arc<ShaderParametersLayout>> {
        self.scene_view_param_layout.as_ref()
    }

    pub fn bindless_param_layout(&self) -> Option<&Arc<ShaderParametersLayout>> {
        self.bindless_param_layout.as_ref()
    }

    pub fn pipeline_cache(&self) -> Option<&PipelineCache> {
        self.pipelines_cache.as_ref()
    }

    fn create_and_register_layout(
        &self,
        shader: &dyn ShaderResource,
        set_index: u32,
    ) -> KarstResult<Arc<ShaderParametersLayout>> {
        let layout = self
            .graphics_helper
            .create_shader_parameters_layout(shader, set_index)?;
        self.registry.register_resource(layout.clone());
        Ok(layout)
    }

    fn init_shader_resources(
        &mut self,
        shader_configs: &[ShaderConfig],
    ) -> KarstResult<()> {
        let mut all_shaders: Vec<Arc<dyn ShaderResource>> = Vec::new();

        // Widest observed usage decides which shader's reflection each shared layout is
        // built from
        let mut shader_uniq_param_usage: FnvHashMap<String, SetUsageMax> = FnvHashMap::default();
        let mut vertex_param_usage: FnvHashMap<VertexType, SetUsageMax> = FnvHashMap::default();
        let mut view_param_usage: Option<SetUsageMax> = None;
        let mut bindless_param_usage: Option<SetUsageMax> = None;

        for config in shader_configs {
            if self.gpu_is_compute_only && config.is_graphics() {
                continue;
            }

            let shader = self.graphics_helper.create_shader_resource(config)?;
            self.registry.register_resource(shader.clone());
            all_shaders.push(shader.clone());

            if let ShaderConfigKind::DrawMesh { vertex_usage, .. } = config.kind {
                for set_meta in &shader.reflection().descriptor_sets {
                    let bits = set_meta.combined_set_usage.count_ones();
                    match set_meta.set {
                        INSTANCE_UNIQ_SET => {
                            let slot = vertex_param_usage.entry(vertex_usage).or_insert_with(|| {
                                SetUsageMax {
                                    bits: 0,
                                    shader: shader.clone(),
                                }
                            });
                            if slot.bits < bits {
                                slot.bits = bits;
                                slot.shader = shader.clone();
                            }
                        }
                        SHADER_UNIQ_SET => {
                            let slot = shader_uniq_param_usage
                                .entry(config.name.clone())
                                .or_insert_with(|| SetUsageMax {
                                    bits: 0,
                                    shader: shader.clone(),
                                });
                            if slot.bits < bits {
                                slot.bits = bits;
                                slot.shader = shader.clone();
                            }
                        }
                        VIEW_UNIQ_SET => track_max(&mut view_param_usage, bits, &shader),
                        BINDLESS_SET => track_max(&mut bindless_param_usage, bits, &shader),
                        _ => {}
                    }
                }
            }
        }

        if let Some(usage) = &view_param_usage {
            debug_assert!(self.scene_view_param_layout.is_none());
            self.scene_view_param_layout =
                Some(self.create_and_register_layout(usage.shader.as_ref(), VIEW_UNIQ_SET)?);
        }
        if let Some(usage) = &bindless_param_usage {
            debug_assert!(self.bindless_param_layout.is_none());
            self.bindless_param_layout =
                Some(self.create_and_register_layout(usage.shader.as_ref(), BINDLESS_SET)?);
        }
        for (vertex_type, usage) in &vertex_param_usage {
            debug_assert!(!self.per_vertex_type_layouts.contains_key(vertex_type));
            let layout =
                self.create_and_register_layout(usage.shader.as_ref(), INSTANCE_UNIQ_SET)?;
            self.per_vertex_type_layouts.insert(*vertex_type, layout);
        }

        self.init_shader_pipelines(all_shaders, shader_uniq_param_usage)
    }

    fn init_shader_pipelines(
        &mut self,
        all_shaders: Vec<Arc<dyn ShaderResource>>,
        shader_uniq_param_usage: FnvHashMap<String, SetUsageMax>,
    ) -> KarstResult<()> {
        for shader in all_shaders {
            let config = shader.config().clone();
            match config.kind {
                ShaderConfigKind::DrawMesh {
                    vertex_usage,
                    renderpass_usage,
                } => {
                    debug_assert!(!self.gpu_is_compute_only);

                    if !self.raw_shader_objects.contains_key(&config.name) {
                        // The widest user of the shader-unique set builds the layout every
                        // variant of this material shares
                        let layout_source = shader_uniq_param_usage
                            .get(&config.name)
                            .map(|usage| usage.shader.clone())
                            .unwrap_or_else(|| shader.clone());
                        let shaders_param_layout = self
                            .create_and_register_layout(layout_source.as_ref(), SHADER_UNIQ_SET)?;
                        self.raw_shader_objects.insert(
                            config.name.clone(),
                            ShaderDataCollection {
                                shader_object: ShaderObject::DrawMesh(DrawMeshShaderObject::new(
                                    config.name.clone(),
                                )),
                                shaders_param_layout,
                            },
                        );
                    }
                    let shaders_param_layout = self.raw_shader_objects[&config.name]
                        .shaders_param_layout
                        .clone();

                    let mut pipeline = match self.pipeline_factory.create(PipelineFactoryArgs {
                        pipeline_shader: &shader,
                        parent_pipeline: None,
                    }) {
                        Pipeline::Graphics(pipeline) => pipeline,
                        Pipeline::Compute(_) => {
                            unreachable!("mesh-draw shader classified as compute")
                        }
                    };

                    // Wire the per-variant parameter set when reflection says there is one
                    let mut variant_params_layout = None;
                    let has_variant_set = shader
                        .reflection()
                        .descriptor_sets
                        .iter()
                        .any(|set_meta| set_meta.set == SHADER_VARIANT_UNIQ_SET);
                    if has_variant_set {
                        let layout = self
                            .create_and_register_layout(shader.as_ref(), SHADER_VARIANT_UNIQ_SET)?;
                        pipeline.set_param_layout_at_set(layout.clone(), SHADER_VARIANT_UNIQ_SET);
                        variant_params_layout = Some(layout);
                    }

                    pipeline.set_param_layout_at_set(shaders_param_layout, SHADER_UNIQ_SET);
                    if let Some(layout) = self.per_vertex_type_layouts.get(&vertex_usage) {
                        pipeline.set_param_layout_at_set(layout.clone(), INSTANCE_UNIQ_SET);
                    } else {
                        debug_assert!(false, "no vertex parameters layout for {}", vertex_usage.name());
                    }
                    if let Some(layout) = &self.scene_view_param_layout {
                        pipeline.set_param_layout_at_set(layout.clone(), VIEW_UNIQ_SET);
                    }
                    if let Some(layout) = &self.bindless_param_layout {
                        pipeline.set_param_layout_at_set(layout.clone(), BINDLESS_SET);
                    }

                    let mut renderpass_props = RenderPassProperties::default();
                    renderpass_props.attachment_format.rp_format = renderpass_usage;
                    pipeline.set_renderpass_properties(renderpass_props);

                    self.graphics_helper
                        .initialize_graphics_pipeline(&mut pipeline, self.pipelines_cache.as_ref())?;
                    let pipeline = Arc::new(pipeline);

                    let object = self
                        .raw_shader_objects
                        .get_mut(&config.name)
                        .and_then(|collection| collection.shader_object.as_draw_mesh_mut())
                        .expect("mesh-draw collection just inserted");
                    object.add_shader(shader.clone());
                    object.set_pipeline(&shader, pipeline);
                    object.set_variant_params_layout(&shader, variant_params_layout);
                }
                ShaderConfigKind::UniqueUtility { .. } => {
                    debug_assert!(!self.gpu_is_compute_only);
                    debug_assert!(!self.raw_shader_objects.contains_key(&config.name));

                    let shaders_param_layout =
                        self.create_and_register_layout(shader.as_ref(), 0)?;

                    let mut pipeline = match self.pipeline_factory.create(PipelineFactoryArgs {
                        pipeline_shader: &shader,
                        parent_pipeline: None,
                    }) {
                        Pipeline::Graphics(pipeline) => pipeline,
                        Pipeline::Compute(_) => {
                            unreachable!("utility shader classified as compute")
                        }
                    };
                    pipeline.set_single_param_layout(shaders_param_layout.clone());
                    // Later render-target variants derive from this initial default
                    pipeline.set_can_be_parent(true);
                    self.graphics_helper
                        .initialize_graphics_pipeline(&mut pipeline, self.pipelines_cache.as_ref())?;

                    let default_props = pipeline.renderpass_properties().clone();
                    let mut object =
                        UniqueUtilityShaderObject::new(config.name.clone(), shader.clone());
                    object.set_pipeline(default_props, Arc::new(pipeline));

                    self.raw_shader_objects.insert(
                        config.name.clone(),
                        ShaderDataCollection {
                            shader_object: ShaderObject::Utility(object),
                            shaders_param_layout,
                        },
                    );
                }
                ShaderConfigKind::Compute => {
                    debug_assert!(!self.raw_shader_objects.contains_key(&config.name));

                    let shaders_param_layout =
                        self.create_and_register_layout(shader.as_ref(), 0)?;

                    let mut pipeline = match self.pipeline_factory.create(PipelineFactoryArgs {
                        pipeline_shader: &shader,
                        parent_pipeline: None,
                    }) {
                        Pipeline::Compute(pipeline) => pipeline,
                        Pipeline::Graphics(_) => {
                            unreachable!("compute shader classified as graphics")
                        }
                    };
                    pipeline.set_single_param_layout(shaders_param_layout.clone());
                    self.graphics_helper
                        .initialize_compute_pipeline(&mut pipeline, self.pipelines_cache.as_ref())?;

                    let mut object =
                        ComputeShaderObject::new(config.name.clone(), shader.clone());
                    object.set_pipeline(Arc::new(pipeline));

                    self.raw_shader_objects.insert(
                        config.name.clone(),
                        ShaderDataCollection {
                            shader_object: ShaderObject::Compute(object),
                            shaders_param_layout,
                        },
                    );
                }
            }
        }

        Ok(())
    }

    /// Find a cached framebuffer compatible with `renderpass_props` whose attachments
    /// match exactly. A render pass without attachments can only have one framebuffer.
    pub fn framebuffer(
        &self,
        renderpass_props: &RenderPassProperties,
        frame_attachments: &[FrameAttachment],
    ) -> Option<&Arc<Framebuffer>> {
        let framebuffers = self.rt_framebuffers.get(renderpass_props)?;
        if renderpass_props.attachment_format.attachments.is_empty() {
            return framebuffers.first();
        }

        framebuffers.iter().find(|fb| {
            fb.attachments.len() == frame_attachments.len()
                && fb
                    .attachments
                    .iter()
                    .zip(frame_attachments)
                    .all(|(a, b)| a.image == b.image)
        })
    }

    pub fn get_or_create_framebuffer(
        &mut self,
        renderpass_props: RenderPassProperties,
        frame_attachments: &[FrameAttachment],
    ) -> KarstResult<Arc<Framebuffer>> {
        if let Some(fb) = self.framebuffer(&renderpass_props, frame_attachments) {
            return Ok(fb.clone());
        }

        let fb = Arc::new(
            self.graphics_helper
                .create_framebuffer(&renderpass_props, frame_attachments)?,
        );
        self.rt_framebuffers
            .entry(renderpass_props)
            .or_default()
            .push(fb.clone());
        Ok(fb)
    }

    /// Evict the cached framebuffer created for these externally-initialized render
    /// targets, if any.
    pub fn clear_extern_init_rts_framebuffer(
        &mut self,
        renderpass_props: &RenderPassProperties,
        frame_attachments: &[FrameAttachment],
    ) {
        let Some(framebuffers) = self.rt_framebuffers.get_mut(renderpass_props) else {
            return;
        };

        if renderpass_props.attachment_format.attachments.is_empty() {
            framebuffers.clear();
            return;
        }

        framebuffers.retain(|fb| {
            !(fb.attachments.len() == frame_attachments.len()
                && fb
                    .attachments
                    .iter()
                    .zip(frame_attachments)
                    .all(|(a, b)| a.image == b.image))
        });
    }

    pub fn clear_window_canvas_framebuffer(
        &mut self,
        canvas_id: u64,
    ) {
        self.window_canvas_framebuffers.remove(&canvas_id);
    }

    /// Steady-state per-frame entry point: resolve (lazily creating and memoizing) the
    /// framebuffer and pipeline to bind for the context's material and render target
    /// configuration.
    #[profiling::function]
    pub fn prepare_pipeline_context(
        &mut self,
        pipeline_context: &mut LocalPipelineContext,
        mut renderpass_props: RenderPassProperties,
    ) -> KarstResult<()> {
        let material_kind = match self.raw_shader_objects.get(&pipeline_context.material_name) {
            Some(collection) => match &collection.shader_object {
                ShaderObject::DrawMesh(_) => MaterialKind::DrawMesh,
                ShaderObject::Utility(_) => MaterialKind::Utility,
                ShaderObject::Compute(_) => MaterialKind::Compute,
            },
            None => {
                log::error!(
                    "Requested material {} is not found",
                    pipeline_context.material_name
                );
                return Err(format!(
                    "material {} is not registered",
                    pipeline_context.material_name
                )
                .into());
            }
        };

        match material_kind {
            MaterialKind::DrawMesh => {
                if pipeline_context.frame_attachments.is_empty() {
                    log::error!(
                        "Frame attachments cannot be empty for mesh-draw material {}",
                        pipeline_context.material_name
                    );
                    return Err("frame attachments cannot be empty".into());
                }

                // A missing variant is a legitimate outcome; the pipeline stays unset
                let pipeline = self.raw_shader_objects[&pipeline_context.material_name]
                    .shader_object
                    .as_draw_mesh()
                    .expect("material kind just matched")
                    .shader(
                        pipeline_context.for_vertex_type,
                        &FramebufferFormat::from_format(pipeline_context.renderpass_format),
                    )
                    .and_then(|entry| entry.pipeline.clone());

                renderpass_props.attachment_format.rp_format =
                    pipeline_context.renderpass_format;
                let fb = self.get_or_create_framebuffer(
                    renderpass_props,
                    &pipeline_context.frame_attachments,
                )?;

                pipeline_context.framebuffer = Some(fb);
                pipeline_context.pipeline_used = pipeline.map(BoundPipeline::Graphics);
            }
            MaterialKind::Utility => {
                let fb = if let Some(canvas) = pipeline_context.window_canvas.clone() {
                    let canvas_id = canvas.canvas_id();
                    if !self.window_canvas_framebuffers.contains_key(&canvas_id) {
                        let mut framebuffers = Vec::with_capacity(canvas.images_count() as usize);
                        for image_idx in 0..canvas.images_count() {
                            framebuffers.push(Arc::new(
                                self.graphics_helper
                                    .create_swapchain_framebuffer(canvas.as_ref(), image_idx)?,
                            ));
                        }
                        self.window_canvas_framebuffers.insert(canvas_id, framebuffers);
                    }

                    renderpass_props = RenderPassProperties {
                        attachment_format: FramebufferFormat::new(
                            vec![canvas.canvas_format()],
                            RenderPassFormat::Generic,
                        ),
                        multisample_count: SampleCount::SampleCount1,
                        one_rt_per_format: true,
                    };

                    self.window_canvas_framebuffers[&canvas_id]
                        .get(pipeline_context.swapchain_idx as usize)
                        .cloned()
                        .ok_or_else(|| {
                            format!(
                                "swapchain index {} out of range",
                                pipeline_context.swapchain_idx
                            )
                        })?
                } else {
                    if pipeline_context.frame_attachments.is_empty() {
                        log::error!(
                            "Frame attachments cannot be empty for utility material {}",
                            pipeline_context.material_name
                        );
                        return Err("frame attachments cannot be empty".into());
                    }
                    self.get_or_create_framebuffer(
                        renderpass_props.clone(),
                        &pipeline_context.frame_attachments,
                    )?
                };

                let existing = self.raw_shader_objects[&pipeline_context.material_name]
                    .shader_object
                    .as_utility()
                    .expect("material kind just matched")
                    .pipeline(&renderpass_props);

                let pipeline = match existing {
                    Some(pipeline) => pipeline,
                    None => self.create_utility_pipeline_variant(
                        &pipeline_context.material_name,
                        renderpass_props,
                    )?,
                };

                pipeline_context.framebuffer = Some(fb);
                pipeline_context.pipeline_used = Some(BoundPipeline::Graphics(pipeline));
            }
            MaterialKind::Compute => {
                let pipeline = self.raw_shader_objects[&pipeline_context.material_name]
                    .shader_object
                    .as_compute()
                    .expect("material kind just matched")
                    .pipeline();
                pipeline_context.pipeline_used = pipeline.map(BoundPipeline::Compute);
            }
        }

        Ok(())
    }

    /// Derive a new pipeline for `renderpass_props` from the utility shader's default
    /// pipeline and memoize it in the shader object.
    fn create_utility_pipeline_variant(
        &mut self,
        material_name: &str,
        renderpass_props: RenderPassProperties,
    ) -> KarstResult<Arc<GraphicsPipeline>> {
        let (parent, shader) = {
            let object = self.raw_shader_objects[material_name]
                .shader_object
                .as_utility()
                .expect("caller verified the material kind");
            (object.default_pipeline(), object.shader().clone())
        };

        let parent_attachments = &parent
            .renderpass_properties()
            .attachment_format
            .attachments;
        if renderpass_props.attachment_format.attachments.len() != parent_attachments.len() {
            log::error!(
                "Attachment count must be same for utility shader pipeline variants ({})",
                material_name
            );
            return Err(format!(
                "incompatible render targets for utility shader {}",
                material_name
            )
            .into());
        }

        let mut pipeline = match self.pipeline_factory.create(PipelineFactoryArgs {
            pipeline_shader: &shader,
            parent_pipeline: Some(&parent),
        }) {
            Pipeline::Graphics(pipeline) => pipeline,
            Pipeline::Compute(_) => unreachable!("utility parent produced a compute child"),
        };
        pipeline.set_renderpass_properties(renderpass_props.clone());
        self.graphics_helper
            .initialize_graphics_pipeline(&mut pipeline, self.pipelines_cache.as_ref())?;

        let pipeline = Arc::new(pipeline);
        self.raw_shader_objects
            .get_mut(material_name)
            .and_then(|collection| collection.shader_object.as_utility_mut())
            .expect("caller verified the material kind")
            .set_pipeline(renderpass_props, pipeline.clone());
        Ok(pipeline)
    }

    /// Every shader object contributes its pipelines, the backend blob is persisted, and
    /// the cache object is torn down.
    pub fn write_and_destroy_pipeline_cache(&mut self) {
        if let Some(mut pipeline_cache) = self.pipelines_cache.take() {
            for collection in self.raw_shader_objects.values() {
                collection
                    .shader_object
                    .prepare_pipeline_cache(&mut pipeline_cache);
            }
            if let Err(e) = pipeline_cache.write_cache(self.graphics_helper.as_ref()) {
                log::error!(
                    "Failed to write pipeline cache {}: {}",
                    pipeline_cache.cache_name(),
                    e
                );
            }
        }
    }

    /// Release every shader resource still alive (enumerated through the type registry),
    /// the cached parameter layouts, and the shader objects with their pipelines.
    pub fn destroy_shader_resources(&mut self) {
        for shader in self
            .registry
            .all_live_instances_of(self.shader_resource_root, true, false)
        {
            shader.release();
            self.registry.unregister_resource(&*shader);
        }

        if let Some(layout) = self.scene_view_param_layout.take() {
            layout.release();
            self.registry.unregister_resource(&*layout);
        }
        if let Some(layout) = self.bindless_param_layout.take() {
            layout.release();
            self.registry.unregister_resource(&*layout);
        }
        for (_, layout) in self.per_vertex_type_layouts.drain() {
            layout.release();
            self.registry.unregister_resource(&*layout);
        }

        for (_, collection) in self.raw_shader_objects.drain() {
            if let Some(object) = collection.shader_object.as_draw_mesh() {
                for entry in object.all_shaders() {
                    if let Some(layout) = &entry.variant_params_layout {
                        layout.release();
                        self.registry.unregister_resource(&**layout);
                    }
                }
            }
            collection.shaders_param_layout.release();
            self.registry
                .unregister_resource(&*collection.shaders_param_layout);
        }
    }

    /// Full shutdown: persist the pipeline cache, destroy shader state, drop every cached
    /// framebuffer.
    pub fn clear_context(&mut self) {
        self.write_and_destroy_pipeline_cache();
        self.destroy_shader_resources();
        self.rt_framebuffers.clear();
        self.window_canvas_framebuffers.clear();
    }
}
