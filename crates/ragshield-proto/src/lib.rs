//! ragshield protocol types.
//!
//! This crate defines the backend-agnostic data exchanged between the
//! question-answering layer and the enforcement core.
//!
//! # Modules
//!
//! - [`context`] - Identity and semantic constraints carried by a request
//! - [`filter`] - Boolean filter trees and rendered native filters
//! - [`document`] - Documents returned by a similarity search
//! - [`error`] - Payload error types

pub mod context;
pub mod document;
pub mod error;
pub mod filter;

pub use context::{AuthContext, Identity, RetrievalRequest, SemanticContext};
pub use document::Document;
pub use error::Error;
pub use filter::{ConstraintExpr, FilterExpr, MetadataField, NativeExpr, NativeFilter};
