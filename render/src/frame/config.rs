use kestrel_gal::ash::vk;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Number of frame slots, at least one
    pub frames_in_flight: usize,
    /// Lock presentation to the display refresh
    pub vsync: bool,
    pub preferred_format: vk::Format,
    pub preferred_color_space: vk::ColorSpaceKHR,
    /// Requested swapchain image usage, intersected with what the surface supports
    pub image_usage: vk::ImageUsageFlags,
    /// Used when the surface leaves the extent up to us and no window extent is known
    pub fallback_extent: vk::Extent2D,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            vsync: true,
            preferred_format: vk::Format::B8G8R8A8_UNORM,
            preferred_color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::STORAGE
                | vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST,
            fallback_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
        }
    }
}

impl SchedulerConfig {
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight.max(1)
    }
}
