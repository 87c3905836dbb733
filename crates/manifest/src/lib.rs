#![cfg_attr(test, allow(unused_crate_dependencies))]
//! Component manifest model.
//!
//! A manifest declares components, each a group of views sharing defaults
//! (helpers, child addresses, factories, assets). This crate parses the
//! manifest file ([`ManifestFile`]), resolves each view against its
//! component's shared block ([`View`]), and freezes the result into a
//! [`ManifestRegistry`] that the engine reads for every request.
//!
//! Anything wrong with a manifest is a [`ManifestError`] at startup. The
//! process must refuse to serve rather than fail requests one by one.

mod error;
pub mod file;
mod registry;
pub mod view;

pub use error::{ManifestError, Result};
pub use file::{AddressDecl, ComponentDecl, FactoryRef, ManifestFile, SharedDecl, ViewDecl};
pub use registry::{ManifestRegistry, ManifestRegistryBuilder};
pub use view::{
	Address, AssetKind, AssetRef, ParamField, ParamKind, ParamLocation, ParamSchema, Placement, RendererKind, TemplateSource, View, ViewManifest,
};
