/// Describes Vulkan resources which can be destroyed
///
/// Calling [`Destructible::destroy`] more than once is a no-op, so explicit teardown and the
/// `raii` drop glue can coexist.
pub trait Destructible {
    /// Destroy the resource
    fn destroy(&mut self);
}
