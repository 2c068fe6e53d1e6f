// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use std::fs;
use std::path::{Path, PathBuf};
use strata_math::Position;
use tracing::{debug, info, warn};

use crate::error::{CallExt, Result};
use crate::gpu::Gpu;
use crate::handles::take;
use crate::shader::{load_shader, ShaderSource, ShaderStage};

/// Layout, cache and the compiled pipeline. The cache outlives rebuilds.
#[derive(Debug, Default)]
pub struct GraphicsPipeline {
    layout: vk::PipelineLayout,
    cache: vk::PipelineCache,
    pipeline: vk::Pipeline,
    cache_path: Option<PathBuf>,
}

fn create_or_load_pipeline_cache<G: Gpu>(gpu: &G, path: Option<&Path>) -> Result<vk::PipelineCache> {
    let data = path.and_then(|p| fs::read(p).ok());
    let (p_initial_data, initial_data_size): (*const std::ffi::c_void, usize) = match &data {
        Some(bytes) => (bytes.as_ptr().cast(), bytes.len()),
        None => (std::ptr::null(), 0),
    };
    if let (Some(p), Some(bytes)) = (path, &data) {
        debug!(path = %p.display(), bytes = bytes.len(), "seeding pipeline cache");
    }
    let ci = vk::PipelineCacheCreateInfo {
        s_type: vk::StructureType::PIPELINE_CACHE_CREATE_INFO,
        initial_data_size,
        p_initial_data,
        ..Default::default()
    };
    gpu.create_pipeline_cache(&ci).call("vkCreatePipelineCache")
}

impl GraphicsPipeline {
    pub fn create<G: Gpu>(
        gpu: &G,
        extent: vk::Extent2D,
        render_pass: vk::RenderPass,
        shaders: &dyn ShaderSource,
        cache_path: Option<&Path>,
    ) -> Result<Self> {
        let mut out = Self {
            cache: create_or_load_pipeline_cache(gpu, cache_path)?,
            cache_path: cache_path.map(Path::to_path_buf),
            ..Default::default()
        };
        if let Err(e) = out.build(gpu, extent, render_pass, shaders) {
            out.release(gpu);
            return Err(e);
        }
        Ok(out)
    }

    /// New layout and pipeline for a changed render pass or extent, same cache.
    /// On failure nothing is kept, the cache included.
    pub fn rebuild<G: Gpu>(
        &mut self,
        gpu: &G,
        extent: vk::Extent2D,
        render_pass: vk::RenderPass,
        shaders: &dyn ShaderSource,
    ) -> Result<()> {
        if let Some(p) = take(&mut self.pipeline) {
            gpu.destroy_pipeline(p);
        }
        if let Some(l) = take(&mut self.layout) {
            gpu.destroy_pipeline_layout(l);
        }
        if self.cache == vk::PipelineCache::null() {
            self.cache = create_or_load_pipeline_cache(gpu, self.cache_path.as_deref())?;
        }
        let res = self.build(gpu, extent, render_pass, shaders);
        if res.is_err() {
            self.release(gpu);
        }
        res
    }

    fn build<G: Gpu>(
        &mut self,
        gpu: &G,
        extent: vk::Extent2D,
        render_pass: vk::RenderPass,
        shaders: &dyn ShaderSource,
    ) -> Result<()> {
        let layout_info = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            ..Default::default()
        };
        self.layout = gpu
            .create_pipeline_layout(&layout_info)
            .call("vkCreatePipelineLayout")?;

        // Modules only live for the duration of the pipeline build.
        let vs = load_shader(gpu, shaders, ShaderStage::Vertex)?;
        let fs = match load_shader(gpu, shaders, ShaderStage::Fragment) {
            Ok(fs) => fs,
            Err(e) => {
                gpu.destroy_shader_module(vs);
                return Err(e);
            }
        };
        let res = self.compile(gpu, extent, render_pass, vs, fs);
        gpu.destroy_shader_module(vs);
        gpu.destroy_shader_module(fs);
        self.pipeline = res?;
        info!(width = extent.width, height = extent.height, "graphics pipeline built");
        Ok(())
    }

    fn compile<G: Gpu>(
        &self,
        gpu: &G,
        extent: vk::Extent2D,
        render_pass: vk::RenderPass,
        vs: vk::ShaderModule,
        fs: vk::ShaderModule,
    ) -> Result<vk::Pipeline> {
        let entry = c"main";
        let stages = [
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: ShaderStage::Vertex.vk_stage(),
                module: vs,
                p_name: entry.as_ptr(),
                ..Default::default()
            },
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: ShaderStage::Fragment.vk_stage(),
                module: fs,
                p_name: entry.as_ptr(),
                ..Default::default()
            },
        ];

        let vb = vk::VertexInputBindingDescription {
            binding: 0,
            stride: Position::STRIDE,
            input_rate: vk::VertexInputRate::VERTEX,
        };
        let va = vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: 0,
        };
        let vertex_input = vk::PipelineVertexInputStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
            vertex_binding_description_count: 1,
            p_vertex_binding_descriptions: &vb,
            vertex_attribute_description_count: 1,
            p_vertex_attribute_descriptions: &va,
            ..Default::default()
        };
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
            topology: vk::PrimitiveTopology::TRIANGLE_STRIP,
            primitive_restart_enable: vk::TRUE,
            ..Default::default()
        };

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let viewport_state = vk::PipelineViewportStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
            viewport_count: 1,
            p_viewports: &viewport,
            scissor_count: 1,
            p_scissors: &scissor,
            ..Default::default()
        };
        let raster = vk::PipelineRasterizationStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            line_width: 1.0,
            ..Default::default()
        };
        let sample_mask = [u32::MAX];
        let multisample = vk::PipelineMultisampleStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            p_sample_mask: sample_mask.as_ptr(),
            ..Default::default()
        };
        let color_blend_att = vk::PipelineColorBlendAttachmentState {
            color_write_mask: vk::ColorComponentFlags::RGBA,
            blend_enable: vk::FALSE,
            ..Default::default()
        };
        let color_blend = vk::PipelineColorBlendStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
            logic_op_enable: vk::FALSE,
            logic_op: vk::LogicOp::COPY,
            attachment_count: 1,
            p_attachments: &color_blend_att,
            ..Default::default()
        };

        let pipeline_info = vk::GraphicsPipelineCreateInfo {
            s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
            stage_count: stages.len() as u32,
            p_stages: stages.as_ptr(),
            p_vertex_input_state: &vertex_input,
            p_input_assembly_state: &input_assembly,
            p_viewport_state: &viewport_state,
            p_rasterization_state: &raster,
            p_multisample_state: &multisample,
            p_color_blend_state: &color_blend,
            layout: self.layout,
            render_pass,
            subpass: 0,
            ..Default::default()
        };
        gpu.create_graphics_pipeline(self.cache, &pipeline_info)
            .call("vkCreateGraphicsPipelines")
    }

    pub fn cache_data<G: Gpu>(&self, gpu: &G) -> Result<Vec<u8>> {
        gpu.pipeline_cache_data(self.cache)
            .call("vkGetPipelineCacheData")
    }

    /// Writes the cache blob to the configured path, if any. Failures only warn.
    pub fn save_cache<G: Gpu>(&self, gpu: &G) {
        let Some(path) = &self.cache_path else { return };
        if self.cache == vk::PipelineCache::null() {
            return;
        }
        let bytes = match self.cache_data(gpu) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "pipeline cache not saved");
                return;
            }
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = fs::create_dir_all(parent) {
                debug!(path = %parent.display(), error = %e, "cache directory not created");
            }
        }
        match fs::write(path, &bytes) {
            Ok(()) => debug!(path = %path.display(), bytes = bytes.len(), "pipeline cache saved"),
            Err(e) => warn!(path = %path.display(), error = %e, "pipeline cache not saved"),
        }
    }

    fn release<G: Gpu>(&mut self, gpu: &G) {
        if let Some(p) = take(&mut self.pipeline) {
            gpu.destroy_pipeline(p);
        }
        if let Some(c) = take(&mut self.cache) {
            gpu.destroy_pipeline_cache(c);
        }
        if let Some(l) = take(&mut self.layout) {
            gpu.destroy_pipeline_layout(l);
        }
    }

    /// Saves the cache when a path is configured, then destroys pipeline, cache
    /// and layout. Later calls do nothing.
    pub fn destroy<G: Gpu>(&mut self, gpu: &G) {
        self.save_cache(gpu);
        self.release(gpu);
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    pub fn cache(&self) -> vk::PipelineCache {
        self.cache
    }
}
