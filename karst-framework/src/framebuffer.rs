//! Backend-agnostic descriptions of render targets: attachment format lists, render-pass
//! compatibility properties, and the framebuffer bookkeeping object those key.

use karst_api::{ImageViewId, NativeHandle, PixelFormat, SampleCount};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Well-known render pass layouts. `Generic` is the escape hatch whose compatibility is
/// decided by the concrete attachment format list instead of the tag.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderPassFormat {
    Generic,
    Multibuffer,
    Depth,
    PointLightDepth,
    DirectionalLightDepth,
}

impl Default for RenderPassFormat {
    fn default() -> Self {
        RenderPassFormat::Generic
    }
}

impl RenderPassFormat {
    pub fn name(self) -> &'static str {
        match self {
            RenderPassFormat::Generic => "Generic",
            RenderPassFormat::Multibuffer => "Multibuffer",
            RenderPassFormat::Depth => "Depth",
            RenderPassFormat::PointLightDepth => "PointLightDepth",
            RenderPassFormat::DirectionalLightDepth => "DirectionalLightDepth",
        }
    }
}

/// One format per render target and resolve pair.
///
/// Equality and hashing follow the render-pass format tag except for `Generic`, where the
/// attachment format list is the identity. A named format therefore matches any
/// attachment list compiled for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramebufferFormat {
    pub attachments: Vec<PixelFormat>,
    pub rp_format: RenderPassFormat,
}

impl FramebufferFormat {
    pub fn new(
        attachments: Vec<PixelFormat>,
        rp_format: RenderPassFormat,
    ) -> Self {
        FramebufferFormat {
            attachments,
            rp_format,
        }
    }

    pub fn from_format(rp_format: RenderPassFormat) -> Self {
        FramebufferFormat {
            attachments: Vec::new(),
            rp_format,
        }
    }
}

impl PartialEq for FramebufferFormat {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        if self.rp_format == RenderPassFormat::Generic
            && other.rp_format == RenderPassFormat::Generic
        {
            self.attachments == other.attachments
        } else {
            self.rp_format == other.rp_format
        }
    }
}

impl Eq for FramebufferFormat {}

impl Hash for FramebufferFormat {
    fn hash<H: Hasher>(
        &self,
        state: &mut H,
    ) {
        if self.rp_format == RenderPassFormat::Generic {
            self.attachments.len().hash(state);
            for format in &self.attachments {
                format.hash(state);
            }
        } else {
            self.rp_format.hash(state);
        }
    }
}

/// The backend-agnostic render-pass compatibility key: what a framebuffer or pipeline was
/// created against, and therefore what it can be reused with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderPassProperties {
    pub attachment_format: FramebufferFormat,
    pub multisample_count: SampleCount,
    /// True when every render target reads and writes the same texture (no resolves)
    pub one_rt_per_format: bool,
}

impl Default for RenderPassProperties {
    fn default() -> Self {
        RenderPassProperties {
            attachment_format: FramebufferFormat::from_format(RenderPassFormat::Generic),
            multisample_count: SampleCount::SampleCount1,
            one_rt_per_format: true,
        }
    }
}

/// A single render target attachment as handed in by the caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameAttachment {
    pub image: ImageViewId,
    pub format: PixelFormat,
}

/// Framebuffer bookkeeping object. The native object lives behind `native`; this layer
/// only tracks the attachments for cache matching.
#[derive(Debug, Clone)]
pub struct Framebuffer {
    pub attachments: Vec<FrameAttachment>,
    /// If true then every color attachment definitely has a resolve next to it
    pub has_resolves: bool,
    pub sample_count: SampleCount,
    pub native: NativeHandle,
}

impl RenderPassProperties {
    /// Derive the compatibility properties a framebuffer was created with. Resolve
    /// attachments sit next to the color attachment they resolve and contribute no format
    /// of their own.
    pub fn from_framebuffer(fb: &Framebuffer) -> Self {
        let mut props = RenderPassProperties {
            attachment_format: FramebufferFormat::from_format(RenderPassFormat::Generic),
            multisample_count: SampleCount::SampleCount1,
            one_rt_per_format: true,
        };

        if !fb.attachments.is_empty() {
            props.one_rt_per_format = !fb.has_resolves;
            props.multisample_count = fb.sample_count;

            let mut idx = 0;
            while idx < fb.attachments.len() {
                let format = fb.attachments[idx].format;
                props.attachment_format.attachments.push(format);
                idx += 1;
                if fb.has_resolves && !format.is_depth_format() {
                    idx += 1;
                }
            }
        }

        props
    }
}
