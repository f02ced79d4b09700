use std::ptr;

use ash::vk;

use crate::command::CommandBufferRecording;

/// Full color subresource range of an image
pub fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: vk::REMAINING_MIP_LEVELS,
        base_array_layer: 0,
        layer_count: vk::REMAINING_ARRAY_LAYERS,
    }
}

fn aspect_for(layout: vk::ImageLayout) -> vk::ImageAspectFlags {
    match layout {
        vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
        | vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL => vk::ImageAspectFlags::DEPTH,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Transitions every mip and layer of `image` from `current_layout` to `new_layout`.
///
/// Uses a full `ALL_COMMANDS` barrier, which is simple but coarse.
pub fn transition(
    cmd: &CommandBufferRecording,
    image: vk::Image,
    current_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let image_barrier = vk::ImageMemoryBarrier2 {
        s_type: vk::StructureType::IMAGE_MEMORY_BARRIER_2,
        p_next: ptr::null(),
        src_stage_mask: vk::PipelineStageFlags2::ALL_COMMANDS,
        src_access_mask: vk::AccessFlags2::MEMORY_WRITE,
        dst_stage_mask: vk::PipelineStageFlags2::ALL_COMMANDS,
        dst_access_mask: vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ,
        old_layout: current_layout,
        new_layout,
        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        image,
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask: aspect_for(new_layout),
            ..color_subresource_range()
        },
        _marker: Default::default(),
    };
    let dependency_info = vk::DependencyInfo {
        s_type: vk::StructureType::DEPENDENCY_INFO,
        p_next: ptr::null(),
        dependency_flags: vk::DependencyFlags::empty(),
        memory_barrier_count: 0,
        p_memory_barriers: ptr::null(),
        buffer_memory_barrier_count: 0,
        p_buffer_memory_barriers: ptr::null(),
        image_memory_barrier_count: 1,
        p_image_memory_barriers: &image_barrier,
        _marker: Default::default(),
    };
    unsafe {
        cmd.get_device()
            .get_handle()
            .cmd_pipeline_barrier2(cmd.handle(), &dependency_info);
    }
}

/// Clears a color image that is in `TRANSFER_DST_OPTIMAL`
pub fn clear_color(cmd: &CommandBufferRecording, image: vk::Image, color: [f32; 4]) {
    unsafe {
        cmd.get_device().get_handle().cmd_clear_color_image(
            cmd.handle(),
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &vk::ClearColorValue { float32: color },
            &[color_subresource_range()],
        );
    }
}

/// Blits the whole of `src` onto the whole of `dst`, scaling linearly.
///
/// `src` must be in `TRANSFER_SRC_OPTIMAL` and `dst` in `TRANSFER_DST_OPTIMAL`.
pub fn blit(
    cmd: &CommandBufferRecording,
    src: vk::Image,
    src_extent: vk::Extent2D,
    dst: vk::Image,
    dst_extent: vk::Extent2D,
) {
    let subresource = vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
    };
    let blit_region = vk::ImageBlit2 {
        s_type: vk::StructureType::IMAGE_BLIT_2,
        p_next: ptr::null(),
        src_subresource: subresource,
        src_offsets: [
            vk::Offset3D { x: 0, y: 0, z: 0 },
            vk::Offset3D {
                x: src_extent.width as i32,
                y: src_extent.height as i32,
                z: 1,
            },
        ],
        dst_subresource: subresource,
        dst_offsets: [
            vk::Offset3D { x: 0, y: 0, z: 0 },
            vk::Offset3D {
                x: dst_extent.width as i32,
                y: dst_extent.height as i32,
                z: 1,
            },
        ],
        _marker: Default::default(),
    };
    let blit_info = vk::BlitImageInfo2 {
        s_type: vk::StructureType::BLIT_IMAGE_INFO_2,
        p_next: ptr::null(),
        src_image: src,
        src_image_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        dst_image: dst,
        dst_image_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        region_count: 1,
        p_regions: &blit_region,
        filter: vk::Filter::LINEAR,
        _marker: Default::default(),
    };
    unsafe {
        cmd.get_device()
            .get_handle()
            .cmd_blit_image2(cmd.handle(), &blit_info);
    }
}
