#![cfg_attr(test, allow(unused_crate_dependencies))]
//! Server-side component composition engine.
//!
//! # Purpose
//!
//! Given a request for a component view, run the view's factories, fetch and
//! embed its children, render it with the declared renderer and hand back
//! composed markup plus a public-data payload for client-side hydration.
//!
//! # Mental model
//!
//! - The [`ManifestRegistry`](mosaic_manifest::ManifestRegistry) is sealed
//!   before the engine is built; [`EngineBuilder::build`] validates every
//!   view against the registered renderers, factories and helpers, so
//!   configuration mistakes surface at startup instead of per request.
//! - Every render owns a fresh [`ComponentContext`]. Factories mutate it in
//!   priority order, then the composition resolver fills in child output,
//!   then a renderer reads it. After that it is consumed by the assembler.
//! - Children are rendered through the same path at `level + 1`. The level is
//!   passed by value; past `max_depth` a child is replaced by an empty buffer.
//! - The render cache sits in front of all of this: a hit skips factories,
//!   composition and rendering. Cache failures behave like misses.
//!
//! # Key types
//!
//! | Type | Role |
//! |---|---|
//! | [`Engine`] | Entry point: render, describe, cache invalidation |
//! | [`ComponentContext`] | Per-request mutable state |
//! | [`Factory`] | Async pre-render step |
//! | [`Renderer`] | Adapter turning a context into bytes |
//! | [`ChildFetcher`] | Transport for child content and manifests |
//! | [`EngineError`] | Request-time failure with HTTP mapping |

mod assemble;
pub mod compose;
pub mod config;
mod context;
pub mod device;
mod engine;
mod error;
pub mod factory;
pub mod params;
pub mod render;

pub use assemble::{HYDRATION_SCRIPT_ID, RenderedResponse, hydration_json, normalize_assets, rewrite_asset_src};
pub use compose::{ChildContent, ChildFetcher, ChildOutcome, ChildRequest, ChildStatus};
pub use config::{CacheConfig, CompositionConfig, ConfigError, EngineConfig, LogLevel};
pub use context::{CREDENTIAL_HEADERS, ComponentContext, ContextBuilder, FORWARDED_HEADERS, Helper, REQUEST_ID_HEADER, RequestScope};
pub use device::DeviceType;
pub use engine::{Engine, EngineBuilder, RenderMode};
pub use error::{
	BoxError, ChildFetchError, ConfigurationError, ContextError, EngineError, ErrorBody, FactoryError, FactoryFailure, HttpFailure, RenderError,
	ValidationError, ValidationIssue,
};
pub use factory::{Factory, FactoryPlan, FactoryRegistry, factory_fn};
pub use params::{Bucket, Params, RawRequest};
pub use render::{JsonRenderer, Renderer, RendererRegistry, Template, TemplateError, TemplateRenderer, TemplateSet};

pub use mosaic_cache as cache;
pub use mosaic_manifest as manifest;
