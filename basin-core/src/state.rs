/// Blanket trait alias for types usable as `axum` shared state.
pub trait BasinState: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> BasinState for T {}
