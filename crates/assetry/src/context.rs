//! everything a load needs, owned in one place
//!
//! An [AssetContext] is cheap to clone and can be handed to as many [Loader](crate::loader::Loader)s
//! as needed. Independent contexts never share state.
use crate::blocking::Blocking;
use crate::document;
use crate::inherit::InheritanceOptions;
use crate::populate::TypeRegistry;
use crate::vfs::rpc::{Messenger, Progress};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};

/// Tunables of a context
#[derive(Debug, Clone)]
pub struct Options {
    /// Longest `Base` chain that is followed
    pub max_inheritance_depth: usize,
    /// Extension of documents, without the dot
    pub document_extension: String,
    /// How long blocking calls wait for async work
    pub blocking_timeout: Duration,
    /// Sleep between checks of blocking calls
    pub poll_interval: Duration,
    /// Blocking network access is unavailable (browser-class targets)
    pub sandboxed: bool,
    /// Peer asked for `netcode` locations without an explicit destination
    pub destination: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_inheritance_depth: 10,
            document_extension: document::EXTENSION.to_string(),
            blocking_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(10),
            sandboxed: cfg!(target_family = "wasm"),
            destination: "host".to_string(),
        }
    }
}

impl Options {
    pub fn inheritance(&self) -> InheritanceOptions {
        InheritanceOptions::new(self.max_inheritance_depth, self.document_extension.clone())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("Unable to start the async runtime")]
    Runtime(#[source] std::io::Error),
    #[error("Unable to build the http client")]
    Http(#[source] reqwest::Error),
}

#[derive(Clone)]
pub struct AssetContext {
    inner: Arc<Inner>,
}

struct Inner {
    options: Options,
    registry: TypeRegistry,
    messenger: Option<Arc<dyn Messenger>>,
    client: reqwest::Client,
    handle: Handle,
    on_progress: Option<Progress>,
    _runtime: Option<OwnedRuntime>,
}

/// Runtime started by the context itself
///
/// Shut down in the background, the last clone of a context may well be dropped on one of the
/// runtime's own workers.
struct OwnedRuntime(Option<Runtime>);

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for AssetContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetContext")
            .field("options", &self.inner.options)
            .field("registry", &self.inner.registry)
            .field("messenger", &self.inner.messenger.is_some())
            .finish_non_exhaustive()
    }
}

impl AssetContext {
    pub fn builder() -> AssetContextBuilder {
        AssetContextBuilder::default()
    }

    /// Context with default options and the primitive type loaders
    pub fn new() -> Result<Self, ContextError> {
        Self::builder().build()
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.inner.registry
    }

    pub fn messenger(&self) -> Option<&Arc<dyn Messenger>> {
        self.inner.messenger.as_ref()
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.inner.client
    }

    pub fn handle(&self) -> &Handle {
        &self.inner.handle
    }

    pub fn on_progress(&self) -> Option<Progress> {
        self.inner.on_progress.clone()
    }

    /// Waiter for blocking calls, configured from [Options]
    pub fn blocking(&self) -> Blocking {
        Blocking::new(
            self.inner.handle.clone(),
            self.inner.options.poll_interval,
            self.inner.options.blocking_timeout,
        )
    }
}

#[derive(Default)]
pub struct AssetContextBuilder {
    options: Options,
    registry: Option<TypeRegistry>,
    messenger: Option<Arc<dyn Messenger>>,
    client: Option<reqwest::Client>,
    handle: Option<Handle>,
    on_progress: Option<Progress>,
}

impl AssetContextBuilder {
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Channel used for `netcode` locations
    pub fn messenger(mut self, messenger: Arc<dyn Messenger>) -> Self {
        self.messenger = Some(messenger);
        self
    }

    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Runtime that runs async work for blocking calls
    ///
    /// Defaults to the current runtime, or a new one if there is none.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Observer of rpc download progress
    pub fn on_progress(mut self, on_progress: impl Fn(f32) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(on_progress));
        self
    }

    pub fn build(self) -> Result<AssetContext, ContextError> {
        let (handle, runtime) = match self.handle.or_else(|| Handle::try_current().ok()) {
            Some(handle) => (handle, None),
            None => {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .thread_name("assetry")
                    .enable_all()
                    .build()
                    .map_err(ContextError::Runtime)?;
                tracing::debug!("started own runtime");
                (runtime.handle().clone(), Some(OwnedRuntime(Some(runtime))))
            }
        };
        let client = match self.client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .build()
                .map_err(ContextError::Http)?,
        };

        Ok(AssetContext {
            inner: Arc::new(Inner {
                options: self.options,
                registry: self.registry.unwrap_or_default(),
                messenger: self.messenger,
                client,
                handle,
                on_progress: self.on_progress,
                _runtime: runtime,
            }),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn own_runtime_outside_async() {
        let cx = AssetContext::new().unwrap();
        assert_eq!(cx.options().max_inheritance_depth, 10);
        assert_eq!(cx.blocking().wait(async { 1 + 1 }), Some(2));
        assert_eq!(cx.registry().type_name::<String>(), Some("String"));
    }

    #[tokio::test]
    async fn current_runtime_inside_async() {
        let cx = AssetContext::builder()
            .options(Options {
                destination: "server".into(),
                ..Default::default()
            })
            .build()
            .unwrap();
        assert_eq!(cx.options().inheritance().max_depth, 10);
        assert_eq!(cx.options().destination, "server");
    }
}
