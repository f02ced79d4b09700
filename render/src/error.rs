use kestrel_containers::ContainerErrors;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Surface is still out of date after being rebuilt")]
    SurfaceOutOfDate,

    #[error("Surface has a zero extent, the window is most likely minimized")]
    SurfaceMinimized,

    #[error("Surface offers no formats or present modes")]
    UnsupportedSurface,

    #[error("No frame has been acquired for the current slot")]
    FrameNotAcquired,

    #[error("A frame was already acquired and has not been presented yet")]
    FrameAlreadyAcquired,

    #[error("Scene has no drawable objects, no acceleration structure will be built")]
    EmptyScene,

    #[error("Device does not support acceleration structures")]
    RayTracingUnsupported,

    #[error("Device reported unusable build sizes for the {what} acceleration structure")]
    InvalidBuildSizes { what: &'static str },

    #[error("Scene has {count} objects, at most {max} instances fit in a top-level structure")]
    TooManyInstances { count: usize, max: usize },

    #[error("Instance {index} does not exist, there are {count} instances")]
    InstanceOutOfRange { index: usize, count: usize },

    #[error(transparent)]
    MissingResource(#[from] ContainerErrors),
}

impl RenderError {
    /// Whether retrying on a later frame can succeed without intervention
    pub fn is_transient(&self) -> bool {
        matches!(self, RenderError::SurfaceMinimized)
    }
}
