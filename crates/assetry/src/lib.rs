//! # assetry - asset resolution
//!
//! Loads configuration documents and other assets from wherever they live (a directory, an http
//! server, a peer on the network or a packed archive) behind one folder tree, resolves document
//! inheritance and populates typed objects from the result.
//!
//! ## Introduction for developers
//!
//! Read this to understand how the pieces fit together.
//!
//! ### Virtual folders
//!
//! Every backend implements the traits in [vfs]: [vfs::Folder] lists children, [vfs::File] hands
//! out content. Remote backends ([vfs::http], [vfs::rpc]) share the lazy node logic in
//! [vfs::remote]: a listing or content is fetched on first access and kept. Write access is a
//! capability queried with `as_modifiable()`.
//!
//! | backend          | listing          | content          | writable |
//! |------------------|------------------|------------------|----------|
//! | [vfs::local]     | every call       | every call       | yes      |
//! | [vfs::http]      | first access     | first access     | yes      |
//! | [vfs::rpc]       | first access     | first access     | no       |
//! | [vfs::packed]    | unpacked at once | unpacked at once | no       |
//!
//! ### Loading
//!
//! An [AssetContext](context::AssetContext) owns everything a load needs: options, the type
//! registry, the optional messenger for peers, an http client and a runtime handle. A
//! [Loader](loader::Loader) binds a context to one location string and picks the backend from
//! it (see [loader] for the dispatch order).
//!
//! ### Documents
//!
//! Documents are HCL bodies ([document]), turned into a [Value](value::Value) tree. The reserved
//! key `Base` names a prototype document, [inherit] merges the chain:
//!
//! ```hcl
//! # unit-base.hcl
//! hp = 100
//! speed = 5
//!
//! # unit.hcl
//! Base = "unit-base"
//! hp = 80
//! ```
//!
//! resolves `unit.hcl` to `{ hp = 80, speed = 5 }`.
//!
//! ### Population
//!
//! Types implementing [Asset](populate::Asset) declare a [Schema](populate::Schema) of their
//! members. [populate] walks it, converting each value with the loader registered for the
//! member's type in the [TypeRegistry](populate::TypeRegistry).
//!
//! ### Failure model
//!
//! Structural problems (unknown location, nothing loaded yet, a document that does not parse) are
//! returned as errors. Data problems (a missing base, a value of the wrong type, a dangling
//! reference) are logged, collected as issues next to the result and otherwise skipped.
//!
//! ### Serving
//!
//! [host::AssetHost] serves any folder tree to other loaders, over rpc request keys or http.
#[macro_use]
pub mod document;

pub mod blocking;
pub mod context;
pub mod host;
pub mod inherit;
pub mod loader;
pub mod populate;
pub mod value;
pub mod vfs;

pub use context::{AssetContext, Options};
pub use loader::{BlockingLoader, LoadError, Loader};
