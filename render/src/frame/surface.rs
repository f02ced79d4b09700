use kestrel_gal::ash::vk;
use kestrel_gal::wsi::SurfaceDetails;

use crate::RenderError;
use crate::frame::SchedulerConfig;

/// Everything needed to create a swapchain, resolved against the current surface capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceDescription {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub image_usage: vk::ImageUsageFlags,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
}

/// Preferred format and color space if offered, otherwise whatever comes first
pub fn choose_format(
    formats: &[vk::SurfaceFormatKHR],
    preferred_format: vk::Format,
    preferred_color_space: vk::ColorSpaceKHR,
) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|format| {
            format.format == preferred_format && format.color_space == preferred_color_space
        })
        .or_else(|| formats.first())
        .copied()
}

pub fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    // FIFO is the only mode every implementation has to support
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX]
        .into_iter()
        .find(|mode| modes.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// The surface's own extent, unless it lets the swapchain decide (`u32::MAX`)
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    requested: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: requested.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: requested.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count.max(1) + 1;
    if capabilities.max_image_count == 0 {
        count
    } else {
        count.min(capabilities.max_image_count)
    }
}

fn choose_composite_alpha(capabilities: &vk::SurfaceCapabilitiesKHR) -> vk::CompositeAlphaFlagsKHR {
    let supported = capabilities.supported_composite_alpha;
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::INHERIT,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|alpha| supported.contains(*alpha))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

/// Resolves a swapchain description from freshly queried surface details.
///
/// A zero extent means the window is minimized and nothing can be created right now.
pub fn describe(
    details: &SurfaceDetails,
    config: &SchedulerConfig,
    window_extent: Option<vk::Extent2D>,
) -> Result<SurfaceDescription, RenderError> {
    let format = choose_format(
        &details.formats,
        config.preferred_format,
        config.preferred_color_space,
    )
    .ok_or(RenderError::UnsupportedSurface)?;
    if details.present_modes.is_empty() {
        return Err(RenderError::UnsupportedSurface);
    }
    let capabilities = &details.capabilities;
    let extent = choose_extent(capabilities, window_extent.unwrap_or(config.fallback_extent));
    if extent.width == 0 || extent.height == 0 {
        return Err(RenderError::SurfaceMinimized);
    }

    Ok(SurfaceDescription {
        format,
        present_mode: choose_present_mode(&details.present_modes, config.vsync),
        extent,
        image_count: choose_image_count(capabilities),
        image_usage: config.image_usage & capabilities.supported_usage_flags,
        pre_transform: capabilities.current_transform,
        composite_alpha: choose_composite_alpha(capabilities),
    })
}
