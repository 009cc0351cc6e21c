/**
 * Access control.
 *  - Pluggable access policies mapping a principal
 *    to the set of entries it may see
 *  - The gate that filters entries per request
 */
pub mod access;
/**
 * Authentication and session lifetime.
 *  - Signed access and refresh tokens with key rotation
 *  - In-memory session store
 *  - Anonymous access and the single-user API key
 */
pub mod auth;
/**
 * Byte-bounded LRU object cache shared by every
 *  mounted tree, with singleflight computation.
 */
pub mod cache;
/**
 * Service configuration document: schema, file and
 *  directory loading, and merging of several files.
 */
pub mod config;
/**
 * Exporters and the media type registry that
 *  maps structure families and file extensions
 *  to them.
 */
pub mod media_types;
/**
 * URL subpath -> tree routing.
 */
pub mod mounts;
/**
 * Resolution of component identifiers
 *  (`module.path:object`) into live trees,
 *  authenticators, access policies and exporters.
 */
pub mod resolver;
/**
 * Startup composition of all components and the
 *  request-level operations served on top of them.
 */
pub mod service;
/**
 * The tree collaborator interface and the built-in
 *  directory-backed tree.
 */
pub mod tree;
/**
 * Helper for reporting build version information.
 */
pub mod version;

pub mod prelude {
    pub use crate::access::{AccessGate, AccessPolicy, Allowed};
    pub use crate::auth::{AuthError, AuthManager, Credentials, Identity, Principal, TokenPair};
    pub use crate::cache::{CacheKey, ObjectCache};
    pub use crate::config::{parse_configs, ConfigError, ServiceConfig};
    pub use crate::media_types::{
        InvalidMediaTypeError, MediaTypeRegistry, UnsupportedFormatError,
    };
    pub use crate::mounts::{MountTable, NotFoundError};
    pub use crate::resolver::{ComponentRegistry, ResolutionError};
    pub use crate::service::{RequestError, Service, ServiceBuilder};
    pub use crate::tree::{Entry, StructureFamily, Tree};
    pub use crate::version::build_info;
}
