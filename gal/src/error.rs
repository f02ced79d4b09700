use std::sync::PoisonError;

use ash::vk;
/// Possible errors
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq, Hash)]
pub enum GalError {
    #[error("No suitable physical device has been found")]
    NoPhysicalDevice,

    #[error("No queue family supports both graphics and presentation")]
    NoSuitableQueue,

    #[error("No memory type satisfies the requested properties")]
    NoSuitableMemoryType,

    #[error("Extension is not supported or enabled")]
    NoExtensionSupported,

    #[error("Vulkan resource does not have a mapped pointer. You're most likely using GPU only")]
    NoMappedPointer,

    #[error("Insufficient space to upload the data")]
    InsufficientSpace,

    #[error("Poisoned mutex")]
    PoisonError,

    #[error("String contains null byte")]
    StringContainsNull,

    #[error("Allocation error: {0}")]
    AllocationError(String),

    #[error(transparent)]
    VkError(#[from] vk::Result),
}

impl<T> From<PoisonError<T>> for GalError {
    fn from(_: PoisonError<T>) -> Self {
        GalError::PoisonError
    }
}

impl From<gpu_allocator::AllocationError> for GalError {
    fn from(value: gpu_allocator::AllocationError) -> Self {
        GalError::AllocationError(value.to_string())
    }
}
