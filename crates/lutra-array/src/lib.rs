//! # Lutra Array
//!
//! Reference-counted arrays with copy-on-write mutation, plus a framework for
//! bespoke array layouts that keep a vanilla-compatible kind while choosing
//! their own storage.
//!
//! The one layout shipped here is the logging layout: a wrapper around a
//! vanilla array that ties it to the profile of the call site that created
//! it, so later passes can learn how arrays from that site are used.
//!
//! ## Layers
//!
//! - **array**: handles, headers and operation dispatch
//! - **vanilla**: the fixed representations (varray, darray, vec, dict, keyset)
//! - **bespoke**: layout registry, logging layout, call site profiles
//! - **layout**: layout descriptors with checked operations

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod array;
pub mod bespoke;
pub mod config;
pub mod error;
pub mod kind;
pub mod layout;
pub mod value;
mod vanilla;

pub use array::{ArrayData, ArrayRef, Header, RefCountMode};
pub use bespoke::profile::{
    LoggingProfile, ProfileRegistry, ResumeMode, SrcKey, configure, logging_enabled,
    maybe_enable_logging, registry, set_logging_enabled,
};
pub use bespoke::{BespokeTop, ConcreteLayout, Layout, LayoutIndex, LoggingArray, LoggingLayout};
pub use config::BespokeConfig;
pub use error::{ArrayError, Result};
pub use kind::{ArrayKind, DataType, bespoke_kind};
pub use layout::BespokeLayout;
pub use value::{ArrayKey, Value};
