//! Structured field errors anchored at a location inside the validated
//! Composition document.
//!
//! These mirror the `field.Error` types used by the Kubernetes API machinery:
//! every error carries a type, the path of the offending field, an optional bad
//! value and a human readable detail. Errors are rendered the same way the API
//! server renders them, e.g. `spec.resources[0].patches[1].toFieldPath: Invalid
//! value: "spec.foo": ...`.
use std::{fmt::Display, ops::Deref};

/// A single element of a [`FieldPath`].
#[derive(Clone, Debug, PartialEq, Eq)]
enum PathElement {
    Child(String),
    Index(usize),
    Key(String),
}

/// The path of a field inside the validated document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldPath(Vec<PathElement>);

impl FieldPath {
    /// Creates a new path with `name` as the root element.
    pub fn new(name: impl Into<String>) -> Self {
        Self(vec![PathElement::Child(name.into())])
    }

    /// Returns a path to the child field `name` of `self`.
    pub fn child(&self, name: impl Into<String>) -> Self {
        self.with(PathElement::Child(name.into()))
    }

    /// Returns a path to the array element at `index` of `self`.
    pub fn index(&self, index: usize) -> Self {
        self.with(PathElement::Index(index))
    }

    /// Returns a path to the map entry `key` of `self`.
    pub fn key(&self, key: impl Into<String>) -> Self {
        self.with(PathElement::Key(key.into()))
    }

    /// Appends all elements of `other` to `self`.
    pub fn join(&self, other: &Self) -> Self {
        let mut elements = self.0.clone();
        elements.extend(other.0.iter().cloned());
        Self(elements)
    }

    /// The position of the field in a document whose fields are written in
    /// `field_order`, considering the first `depth` elements only. Fields not
    /// in `field_order` come last.
    fn position(&self, field_order: &[&str], depth: usize) -> Vec<usize> {
        self.0
            .iter()
            .take(depth)
            .map(|element| match element {
                PathElement::Child(name) => field_order
                    .iter()
                    .position(|field| field == name)
                    .unwrap_or(field_order.len()),
                PathElement::Index(index) => *index,
                PathElement::Key(_) => field_order.len(),
            })
            .collect()
    }

    fn with(&self, element: PathElement) -> Self {
        let mut elements = self.0.clone();
        elements.push(element);
        Self(elements)
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, element) in self.0.iter().enumerate() {
            match element {
                PathElement::Child(name) if i == 0 => write!(f, "{name}")?,
                PathElement::Child(name) => write!(f, ".{name}")?,
                PathElement::Index(index) => write!(f, "[{index}]")?,
                PathElement::Key(key) => write!(f, "[{key}]")?,
            }
        }

        Ok(())
    }
}

/// The kind of a [`FieldError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum FieldErrorType {
    /// The value is present but fails a schema or type constraint.
    #[strum(serialize = "Invalid value")]
    Invalid,

    /// A required value or correlate is missing.
    #[strum(serialize = "Required value")]
    Required,

    /// The validator could not attempt the check at all.
    #[strum(serialize = "Internal error")]
    Internal,
}

impl FieldErrorType {
    /// The `reason` used for causes of a `meta/v1 Status`.
    pub fn reason(self) -> &'static str {
        match self {
            Self::Invalid => "FieldValueInvalid",
            Self::Required => "FieldValueRequired",
            Self::Internal => "InternalError",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldError {
    pub type_: FieldErrorType,
    pub field: FieldPath,
    pub bad_value: Option<String>,
    pub detail: String,
}

impl FieldError {
    pub fn invalid(field: FieldPath, bad_value: impl Into<String>, detail: impl Display) -> Self {
        Self {
            type_: FieldErrorType::Invalid,
            field,
            bad_value: Some(bad_value.into()),
            detail: detail.to_string(),
        }
    }

    pub fn required(field: FieldPath, detail: impl Display) -> Self {
        Self {
            type_: FieldErrorType::Required,
            field,
            bad_value: None,
            detail: detail.to_string(),
        }
    }

    pub fn internal(field: FieldPath, detail: impl Display) -> Self {
        Self {
            type_: FieldErrorType::Internal,
            field,
            bad_value: None,
            detail: detail.to_string(),
        }
    }

    /// Anchors a relative error below `prefix`.
    pub fn with_prefix(mut self, prefix: &FieldPath) -> Self {
        self.field = prefix.join(&self.field);
        self
    }

    /// The error without the field path, like `Invalid value: "foo": detail`.
    pub fn body(&self) -> String {
        let mut body = self.type_.to_string();

        if let Some(bad_value) = &self.bad_value {
            body.push_str(&format!(": {bad_value:?}"));
        }

        if !self.detail.is_empty() {
            body.push_str(": ");
            body.push_str(&self.detail);
        }

        body
    }
}

impl Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{field}: {body}", field = self.field, body = self.body())
    }
}

impl std::error::Error for FieldError {}

/// An ordered collection of [`FieldError`]s.
///
/// Errors keep the order in which they were discovered, which follows the
/// order of the validated document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldErrorList(Vec<FieldError>);

impl FieldErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    /// Sorts the errors by the position of their fields, see
    /// [`FieldPath::position`]. Errors at the same position keep their order.
    pub(crate) fn sort_by_position(&mut self, field_order: &[&str], depth: usize) {
        self.0
            .sort_by_cached_key(|error| error.field.position(field_order, depth));
    }

    /// Anchors all errors below `prefix`.
    pub fn with_prefix(self, prefix: &FieldPath) -> Self {
        self.0
            .into_iter()
            .map(|error| error.with_prefix(prefix))
            .collect()
    }
}

impl Deref for FieldErrorList {
    type Target = [FieldError];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Extend<FieldError> for FieldErrorList {
    fn extend<T: IntoIterator<Item = FieldError>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

impl FromIterator<FieldError> for FieldErrorList {
    fn from_iter<T: IntoIterator<Item = FieldError>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for FieldErrorList {
    type IntoIter = std::vec::IntoIter<FieldError>;
    type Item = FieldError;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<FieldError> for FieldErrorList {
    fn from(value: FieldError) -> Self {
        Self(vec![value])
    }
}

impl Display for FieldErrorList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.as_slice() {
            [] => Ok(()),
            [error] => write!(f, "{error}"),
            errors => {
                write!(f, "[")?;
                for (i, error) in errors.iter().enumerate() {
                    let prefix = match i {
                        0 => "",
                        _ => ", ",
                    };
                    write!(f, "{prefix}{error}")?;
                }
                write!(f, "]")
            }
        }
    }
}
