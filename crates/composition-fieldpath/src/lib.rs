//! This library parses the field paths used by Composition patches, readiness
//! checks and connection details into an ordered list of typed segments.
//!
//! A field path addresses a value inside a Kubernetes object. Fields are
//! separated by dots, array elements are addressed by a bracketed index and
//! keys containing dots (like most label keys) can be put into brackets,
//! optionally quoted.
//!
//! ```
//! use composition_fieldpath::{Segment, Segments};
//!
//! let segments: Segments = "metadata.labels[app.kubernetes.io/name]"
//!     .parse()
//!     .expect("valid field path");
//!
//! assert_eq!(segments.first(), Some(&Segment::field("metadata")));
//! assert_eq!(segments.len(), 3);
//! ```
//!
//! The wildcard `[*]` is parsed into a field segment named `*`. Expanding it is
//! left to the consumer.
mod segment;

pub use segment::*;
