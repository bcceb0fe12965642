use std::future::Future;

/// Server-derived data that must be re-fetched after a login.
///
/// Invalidation cannot fail from the caller's point of view; a cache that
/// fails to clear should log and carry on.
pub trait ProfileCache: Send + Sync + 'static {
    /// Drop cached profile and credits so the next read goes to the backend.
    fn invalidate(&self) -> impl Future<Output = ()> + Send;
}

/// No cache to clear.
impl ProfileCache for () {
    async fn invalidate(&self) {}
}

/// The host router.
///
/// # Example
///
/// ```rust,ignore
/// impl Navigator for BrowserRouter {
///     fn clear_fragment(&self) {
///         let _ = self.history.replace_state_with_url(&JsValue::NULL, "", Some(&self.path()));
///     }
///
///     fn navigate(&self, path: &str) {
///         self.push(path);
///     }
/// }
/// ```
pub trait Navigator: Send + Sync + 'static {
    /// Remove the fragment from the visible URL without adding a history entry.
    fn clear_fragment(&self);

    /// Move to an in-app path.
    fn navigate(&self, path: &str);
}
