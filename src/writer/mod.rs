//! PDF writing.
//!
//! The signing revision is assembled from objects serialized by
//! [`ObjectSerializer`] and appended to the original bytes.

mod object_serializer;

pub use object_serializer::ObjectSerializer;
