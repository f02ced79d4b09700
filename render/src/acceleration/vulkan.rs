use std::marker::PhantomData;
use std::ptr;
use std::sync::Arc;

use anyhow::Result;
use derivative::Derivative;
use kestrel_gal::allocators::MemoryLocation;
use kestrel_gal::ash::{khr, vk};
use kestrel_gal::device::DeviceContext;
use kestrel_gal::resource::{
    AccelerationStructure, AccelerationStructureCreateInfo, Buffer, BufferCreateInfo,
    DedicatedBuffer,
};
use kestrel_gal::sync::barrier;
use kestrel_gal::traits::Destructible;
use kestrel_gal::util::align;
use kestrel_gal::GalError;

use crate::RenderError;
use crate::acceleration::{
    AccelerationBackend, BufferUsage, BuildMode, BuildSizes, BuildStep, GeometryDescription,
    StructureLevel,
};

const BOTTOM_LEVEL_FLAGS: vk::BuildAccelerationStructureFlagsKHR =
    vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE;
const TOP_LEVEL_FLAGS: vk::BuildAccelerationStructureFlagsKHR =
    vk::BuildAccelerationStructureFlagsKHR::from_raw(
        vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE.as_raw()
            | vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE.as_raw(),
    );

/// Buffers handed out by [`VulkanAccelerationBackend`]
#[derive(Debug)]
pub enum AccelerationBuffer {
    /// Structure storage, each in its own device memory block
    Dedicated(DedicatedBuffer),
    /// Scratch and instance buffers from the shared allocator. `address` is already aligned for
    /// use as scratch.
    Allocated {
        buffer: Buffer,
        address: vk::DeviceAddress,
    },
}

impl AccelerationBuffer {
    pub fn handle(&self) -> vk::Buffer {
        match self {
            Self::Dedicated(buffer) => buffer.handle(),
            Self::Allocated { buffer, .. } => buffer.handle(),
        }
    }

    pub fn address(&self) -> vk::DeviceAddress {
        match self {
            Self::Dedicated(buffer) => buffer.address(),
            Self::Allocated { address, .. } => *address,
        }
    }

    pub fn size(&self) -> vk::DeviceSize {
        match self {
            Self::Dedicated(buffer) => buffer.size(),
            Self::Allocated { buffer, .. } => buffer.size(),
        }
    }
}

impl Destructible for AccelerationBuffer {
    fn destroy(&mut self) {
        match self {
            Self::Dedicated(buffer) => buffer.destroy(),
            Self::Allocated { buffer, .. } => buffer.destroy(),
        }
    }
}

/// Builds acceleration structures on the context's queue through `VK_KHR_acceleration_structure`
#[derive(Derivative)]
#[derivative(Debug)]
pub struct VulkanAccelerationBackend {
    #[derivative(Debug = "ignore")]
    context: Arc<DeviceContext>,
    scratch_alignment: u64,
}

impl VulkanAccelerationBackend {
    pub fn new(context: Arc<DeviceContext>) -> Self {
        let scratch_alignment = if context.supports_ray_tracing() {
            let mut acceleration_properties =
                vk::PhysicalDeviceAccelerationStructurePropertiesKHR::default();
            {
                let mut properties =
                    vk::PhysicalDeviceProperties2::default().push_next(&mut acceleration_properties);
                unsafe {
                    context
                        .instance()
                        .get_handle()
                        .get_physical_device_properties2(
                            context.physical_device().handle(),
                            &mut properties,
                        );
                }
            }
            acceleration_properties.min_acceleration_structure_scratch_offset_alignment as u64
        } else {
            1
        };
        Self {
            context,
            scratch_alignment: scratch_alignment.max(1),
        }
    }

    pub fn context(&self) -> &Arc<DeviceContext> {
        &self.context
    }

    pub fn scratch_alignment(&self) -> u64 {
        self.scratch_alignment
    }

    fn loader(&self) -> Result<&khr::acceleration_structure::Device, RenderError> {
        self.context
            .device()
            .get_acceleration_structure()
            .ok_or(RenderError::RayTracingUnsupported)
    }

    fn query_sizes(
        &self,
        info: &vk::AccelerationStructureBuildGeometryInfoKHR,
        max_primitive_count: u32,
    ) -> Result<BuildSizes> {
        let ext = self.loader()?;
        let mut sizes = vk::AccelerationStructureBuildSizesInfoKHR::default();
        unsafe {
            ext.get_acceleration_structure_build_sizes(
                vk::AccelerationStructureBuildTypeKHR::DEVICE,
                info,
                &[max_primitive_count],
                &mut sizes,
            );
        }
        Ok(BuildSizes {
            structure_size: sizes.acceleration_structure_size,
            build_scratch_size: sizes.build_scratch_size,
            update_scratch_size: sizes.update_scratch_size,
        })
    }
}

fn triangles(geometry: &GeometryDescription) -> vk::AccelerationStructureGeometryKHR<'static> {
    vk::AccelerationStructureGeometryKHR {
        s_type: vk::StructureType::ACCELERATION_STRUCTURE_GEOMETRY_KHR,
        p_next: ptr::null(),
        geometry_type: vk::GeometryTypeKHR::TRIANGLES,
        geometry: vk::AccelerationStructureGeometryDataKHR {
            triangles: vk::AccelerationStructureGeometryTrianglesDataKHR {
                s_type: vk::StructureType::ACCELERATION_STRUCTURE_GEOMETRY_TRIANGLES_DATA_KHR,
                p_next: ptr::null(),
                vertex_format: vk::Format::R32G32B32_SFLOAT,
                vertex_data: vk::DeviceOrHostAddressConstKHR {
                    device_address: geometry.vertex_address,
                },
                vertex_stride: geometry.vertex_stride,
                max_vertex: geometry.max_vertex(),
                index_type: vk::IndexType::UINT32,
                index_data: vk::DeviceOrHostAddressConstKHR {
                    device_address: geometry.index_address,
                },
                transform_data: vk::DeviceOrHostAddressConstKHR { device_address: 0 },
                _marker: PhantomData,
            },
        },
        flags: if geometry.opaque {
            vk::GeometryFlagsKHR::OPAQUE
        } else {
            vk::GeometryFlagsKHR::empty()
        },
        _marker: PhantomData,
    }
}

fn instances(address: vk::DeviceAddress) -> vk::AccelerationStructureGeometryKHR<'static> {
    vk::AccelerationStructureGeometryKHR {
        s_type: vk::StructureType::ACCELERATION_STRUCTURE_GEOMETRY_KHR,
        p_next: ptr::null(),
        geometry_type: vk::GeometryTypeKHR::INSTANCES,
        geometry: vk::AccelerationStructureGeometryDataKHR {
            instances: vk::AccelerationStructureGeometryInstancesDataKHR {
                s_type: vk::StructureType::ACCELERATION_STRUCTURE_GEOMETRY_INSTANCES_DATA_KHR,
                p_next: ptr::null(),
                array_of_pointers: vk::FALSE,
                data: vk::DeviceOrHostAddressConstKHR {
                    device_address: address,
                },
                _marker: PhantomData,
            },
        },
        flags: vk::GeometryFlagsKHR::OPAQUE,
        _marker: PhantomData,
    }
}

fn build_info<'a>(
    ty: vk::AccelerationStructureTypeKHR,
    flags: vk::BuildAccelerationStructureFlagsKHR,
    mode: vk::BuildAccelerationStructureModeKHR,
    src: vk::AccelerationStructureKHR,
    dst: vk::AccelerationStructureKHR,
    geometries: &'a [vk::AccelerationStructureGeometryKHR<'a>],
    scratch: vk::DeviceAddress,
) -> vk::AccelerationStructureBuildGeometryInfoKHR<'a> {
    vk::AccelerationStructureBuildGeometryInfoKHR {
        s_type: vk::StructureType::ACCELERATION_STRUCTURE_BUILD_GEOMETRY_INFO_KHR,
        p_next: ptr::null(),
        ty,
        flags,
        mode,
        src_acceleration_structure: src,
        dst_acceleration_structure: dst,
        geometry_count: geometries.len() as u32,
        p_geometries: geometries.as_ptr(),
        pp_geometries: ptr::null(),
        scratch_data: vk::DeviceOrHostAddressKHR {
            device_address: scratch,
        },
        _marker: PhantomData,
    }
}

fn build_range(primitive_count: u32) -> vk::AccelerationStructureBuildRangeInfoKHR {
    vk::AccelerationStructureBuildRangeInfoKHR {
        primitive_count,
        primitive_offset: 0,
        first_vertex: 0,
        transform_offset: 0,
    }
}

impl AccelerationBackend for VulkanAccelerationBackend {
    type Buffer = AccelerationBuffer;
    type Structure = AccelerationStructure;

    fn supports_ray_tracing(&self) -> bool {
        self.context.supports_ray_tracing()
    }

    fn bottom_level_sizes(&self, geometry: &GeometryDescription) -> Result<BuildSizes> {
        let geometries = [triangles(geometry)];
        let info = build_info(
            vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
            BOTTOM_LEVEL_FLAGS,
            vk::BuildAccelerationStructureModeKHR::BUILD,
            vk::AccelerationStructureKHR::null(),
            vk::AccelerationStructureKHR::null(),
            &geometries,
            0,
        );
        self.query_sizes(&info, geometry.primitive_count())
    }

    fn top_level_sizes(&self, instance_count: u32) -> Result<BuildSizes> {
        let geometries = [instances(0)];
        let info = build_info(
            vk::AccelerationStructureTypeKHR::TOP_LEVEL,
            TOP_LEVEL_FLAGS,
            vk::BuildAccelerationStructureModeKHR::BUILD,
            vk::AccelerationStructureKHR::null(),
            vk::AccelerationStructureKHR::null(),
            &geometries,
            0,
        );
        self.query_sizes(&info, instance_count)
    }

    fn create_buffer(&mut self, size: u64, usage: BufferUsage) -> Result<AccelerationBuffer> {
        let device = self.context.device().clone();
        match usage {
            BufferUsage::Storage => Ok(AccelerationBuffer::Dedicated(DedicatedBuffer::new(
                device,
                self.context.memory_properties(),
                size,
                vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR,
            )?)),
            BufferUsage::Scratch => {
                // over-allocate so the start can be moved up to the required alignment
                let buffer = Buffer::new(BufferCreateInfo::NewEmptyBuffer {
                    device,
                    allocator: self.context.allocator(),
                    size: size + self.scratch_alignment,
                    location: MemoryLocation::GpuOnly,
                    usage_flags: vk::BufferUsageFlags::STORAGE_BUFFER
                        | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
                    name: Some("acceleration structure scratch"),
                })?;
                let address = align(buffer.address(), self.scratch_alignment);
                Ok(AccelerationBuffer::Allocated { buffer, address })
            }
            BufferUsage::Instances => {
                let buffer = Buffer::new(BufferCreateInfo::NewEmptyBuffer {
                    device,
                    allocator: self.context.allocator(),
                    size,
                    location: MemoryLocation::CpuToGpu,
                    usage_flags:
                        vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR
                            | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
                            | vk::BufferUsageFlags::TRANSFER_DST,
                    name: Some("acceleration structure instances"),
                })?;
                let address = buffer.address();
                Ok(AccelerationBuffer::Allocated { buffer, address })
            }
        }
    }

    fn destroy_buffer(&mut self, mut buffer: AccelerationBuffer) {
        buffer.destroy();
    }

    fn write_buffer(&mut self, buffer: &mut AccelerationBuffer, bytes: &[u8]) -> Result<()> {
        match buffer {
            AccelerationBuffer::Allocated { buffer, .. } => buffer.upload(&self.context, bytes),
            AccelerationBuffer::Dedicated(_) => Err(GalError::NoMappedPointer.into()),
        }
    }

    fn create_structure(
        &mut self,
        level: StructureLevel,
        buffer: &AccelerationBuffer,
        size: u64,
    ) -> Result<AccelerationStructure> {
        let ty = match level {
            StructureLevel::Bottom => vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
            StructureLevel::Top => vk::AccelerationStructureTypeKHR::TOP_LEVEL,
        };
        AccelerationStructure::new(AccelerationStructureCreateInfo::FromBuffer {
            device: self.context.device().clone(),
            buffer: buffer.handle(),
            size,
            ty,
        })
    }

    fn destroy_structure(&mut self, mut structure: AccelerationStructure) {
        structure.destroy();
    }

    fn structure_address(&self, structure: &AccelerationStructure) -> u64 {
        structure.address()
    }

    fn execute(&self, steps: &[BuildStep<'_, Self>]) -> Result<()> {
        let ext = self.loader()?;
        self.context.immediate_submit(|ctx| {
            barrier::build_input_barrier(ctx.cmd);
            for step in steps {
                match step {
                    BuildStep::Bottom {
                        structure,
                        geometry,
                        scratch,
                    } => {
                        let geometries = [triangles(geometry)];
                        let info = build_info(
                            vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
                            BOTTOM_LEVEL_FLAGS,
                            vk::BuildAccelerationStructureModeKHR::BUILD,
                            vk::AccelerationStructureKHR::null(),
                            structure.handle(),
                            &geometries,
                            scratch.address(),
                        );
                        let ranges = [build_range(geometry.primitive_count())];
                        unsafe {
                            ext.cmd_build_acceleration_structures(
                                ctx.cmd.handle(),
                                &[info],
                                &[&ranges],
                            );
                        }
                    }
                    BuildStep::Top {
                        mode,
                        structure,
                        instances: instance_buffer,
                        instance_count,
                        scratch,
                    } => {
                        let (mode, src) = match mode {
                            BuildMode::Build => (
                                vk::BuildAccelerationStructureModeKHR::BUILD,
                                vk::AccelerationStructureKHR::null(),
                            ),
                            BuildMode::Update => (
                                vk::BuildAccelerationStructureModeKHR::UPDATE,
                                structure.handle(),
                            ),
                        };
                        let geometries = [instances(instance_buffer.address())];
                        let info = build_info(
                            vk::AccelerationStructureTypeKHR::TOP_LEVEL,
                            TOP_LEVEL_FLAGS,
                            mode,
                            src,
                            structure.handle(),
                            &geometries,
                            scratch.address(),
                        );
                        let ranges = [build_range(*instance_count)];
                        unsafe {
                            ext.cmd_build_acceleration_structures(
                                ctx.cmd.handle(),
                                &[info],
                                &[&ranges],
                            );
                        }
                    }
                    BuildStep::Barrier => barrier::acceleration_structure_barrier(ctx.cmd),
                }
            }
            // make the results visible to whatever traces against them next
            barrier::acceleration_structure_barrier(ctx.cmd);
        })
    }

    fn wait_idle(&self) -> Result<()> {
        self.context.wait_idle()
    }
}
