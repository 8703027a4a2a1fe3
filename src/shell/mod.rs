//! Shell helpers: wildcard expansion over devices and files.

pub mod glob_helpers;
pub mod wildcard;

pub use wildcard::{DeviceWildcard, WildcardTranslator};
