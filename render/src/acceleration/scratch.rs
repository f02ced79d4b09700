use anyhow::Result;

use crate::acceleration::{AccelerationBackend, BufferUsage};

/// The one scratch buffer shared by every build, only ever grown
#[derive(Debug)]
pub struct ScratchBuffer<T> {
    buffer: Option<T>,
    capacity: u64,
}

impl<T> Default for ScratchBuffer<T> {
    fn default() -> Self {
        Self {
            buffer: None,
            capacity: 0,
        }
    }
}

impl<T> ScratchBuffer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes sure at least `size` bytes are available.
    ///
    /// A smaller existing buffer is freed once the device is idle, before the bigger one is
    /// allocated.
    pub fn ensure<B: AccelerationBackend<Buffer = T>>(
        &mut self,
        backend: &mut B,
        size: u64,
    ) -> Result<&T> {
        if self.buffer.is_none() || size > self.capacity {
            if let Some(old) = self.buffer.take() {
                backend.wait_idle()?;
                backend.destroy_buffer(old);
                tracing::debug!("Growing scratch buffer from {} to {} bytes", self.capacity, size);
            }
            self.capacity = 0;
            let buffer = backend.create_buffer(size, BufferUsage::Scratch)?;
            self.capacity = size;
            self.buffer = Some(buffer);
        }
        self.buffer
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Scratch buffer missing right after allocation"))
    }

    /// Frees the buffer, the next [`ScratchBuffer::ensure`] allocates at whatever size it asks
    pub fn release<B: AccelerationBackend<Buffer = T>>(&mut self, backend: &mut B) {
        if let Some(buffer) = self.buffer.take() {
            backend.destroy_buffer(buffer);
        }
        self.capacity = 0;
    }

    pub fn buffer(&self) -> Option<&T> {
        self.buffer.as_ref()
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BuildEvent, FakeAccelerationBackend};

    fn scratch_allocations(backend: &FakeAccelerationBackend) -> Vec<u64> {
        backend
            .events()
            .into_iter()
            .filter_map(|event| match event {
                BuildEvent::CreateBuffer {
                    usage: BufferUsage::Scratch,
                    size,
                    ..
                } => Some(size),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_grows_but_never_shrinks() {
        let mut backend = FakeAccelerationBackend::new();
        let mut scratch = ScratchBuffer::new();
        scratch.ensure(&mut backend, 100).unwrap();
        scratch.ensure(&mut backend, 50).unwrap();
        assert_eq!(scratch.capacity(), 100);
        scratch.ensure(&mut backend, 300).unwrap();
        assert_eq!(scratch.capacity(), 300);
        scratch.ensure(&mut backend, 300).unwrap();
        assert_eq!(scratch_allocations(&backend), vec![100, 300]);
        assert_eq!(backend.state().live_buffers.len(), 1);
    }

    #[test]
    fn test_old_buffer_freed_after_idle_before_new_one() {
        let mut backend = FakeAccelerationBackend::new();
        let mut scratch = ScratchBuffer::new();
        scratch.ensure(&mut backend, 10).unwrap();
        backend.clear_events();
        scratch.ensure(&mut backend, 20).unwrap();
        let events = backend.events();
        assert!(matches!(events[0], BuildEvent::WaitIdle));
        assert!(matches!(events[1], BuildEvent::DestroyBuffer(_)));
        assert!(matches!(
            events[2],
            BuildEvent::CreateBuffer {
                usage: BufferUsage::Scratch,
                size: 20,
                ..
            }
        ));
    }

    #[test]
    fn test_release_allows_smaller_buffer() {
        let mut backend = FakeAccelerationBackend::new();
        let mut scratch = ScratchBuffer::new();
        scratch.ensure(&mut backend, 500).unwrap();
        scratch.release(&mut backend);
        assert_eq!(scratch.capacity(), 0);
        assert!(scratch.buffer().is_none());
        scratch.ensure(&mut backend, 20).unwrap();
        assert_eq!(scratch.capacity(), 20);
        assert_eq!(scratch_allocations(&backend), vec![500, 20]);
        assert_eq!(backend.state().live_buffers.len(), 1);
    }
}
