//! Foundation types for Lineage.
//!
//! Lineage attaches attribute values to class-like entities and resolves
//! them across single-parent inheritance chains. This crate provides the
//! identifiers and policies every other Lineage crate depends on.
//!
//! # Key Types
//!
//! - [`AttributeKey`] -- `namespace:name[:subkey]` identifier of an attribute
//! - [`EntityId`] -- arena index of a class-like node
//! - [`Member`] -- optional secondary scope (property or method name)
//! - [`MergeStrategy`] -- how multiple chain-level values combine
//! - [`KeyRegistry`] -- constructible registry of known attribute keys
//! - [`AttrValue`] -- attribute payload (a JSON value)

pub mod entity;
pub mod error;
pub mod key;
pub mod registry;
pub mod strategy;

pub use entity::{EntityId, Member};
pub use error::{TypeError, TypeResult};
pub use key::{AttributeKey, KEY_DELIMITER};
pub use registry::KeyRegistry;
pub use strategy::MergeStrategy;

/// Attribute payload. Maps are JSON objects, sequences are JSON arrays.
pub type AttrValue = serde_json::Value;
