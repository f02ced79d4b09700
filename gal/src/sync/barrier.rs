use std::ptr;

use ash::vk;

use crate::command::CommandBufferRecording;

/// Records a global memory barrier using synchronization2
pub fn memory_barrier(
    cmd: &CommandBufferRecording,
    src_stage_mask: vk::PipelineStageFlags2,
    src_access_mask: vk::AccessFlags2,
    dst_stage_mask: vk::PipelineStageFlags2,
    dst_access_mask: vk::AccessFlags2,
) {
    let barrier = vk::MemoryBarrier2 {
        s_type: vk::StructureType::MEMORY_BARRIER_2,
        p_next: ptr::null(),
        src_stage_mask,
        src_access_mask,
        dst_stage_mask,
        dst_access_mask,
        _marker: Default::default(),
    };
    let dependency_info = vk::DependencyInfo {
        s_type: vk::StructureType::DEPENDENCY_INFO,
        p_next: ptr::null(),
        dependency_flags: vk::DependencyFlags::empty(),
        memory_barrier_count: 1,
        p_memory_barriers: &barrier,
        buffer_memory_barrier_count: 0,
        p_buffer_memory_barriers: ptr::null(),
        image_memory_barrier_count: 0,
        p_image_memory_barriers: ptr::null(),
        _marker: Default::default(),
    };
    unsafe {
        cmd.get_device()
            .get_handle()
            .cmd_pipeline_barrier2(cmd.handle(), &dependency_info);
    }
}

/// Makes the output of one acceleration structure build visible to the next one.
///
/// Builds sharing a scratch buffer must be separated by this.
pub fn acceleration_structure_barrier(cmd: &CommandBufferRecording) {
    memory_barrier(
        cmd,
        vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR,
        vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR,
        vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR,
        vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR
            | vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR,
    );
}

/// Orders earlier transfers and host writes before acceleration structure builds read them
pub fn build_input_barrier(cmd: &CommandBufferRecording) {
    memory_barrier(
        cmd,
        vk::PipelineStageFlags2::ALL_COMMANDS | vk::PipelineStageFlags2::HOST,
        vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::HOST_WRITE,
        vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR,
        vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR | vk::AccessFlags2::SHADER_READ,
    );
}
