//! typed references between objects of one document
//!
//! Encoded as `relativePath:TypeName`. The path walks the document tree starting at the object
//! being populated: `/` separates segments, `..` steps to the parent and `.` stays. A leading `/`
//! starts at the document root. Stepping above the root is an error, it is never clamped.
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceError {
    #[error("reference {0:?} has no type, expected `path:TypeName`")]
    MissingType(String),
    #[error("reference {0:?} leaves the document root")]
    AboveRoot(String),
    #[error("reference {0:?} points at nothing")]
    NotFound(String),
    #[error("reference {reference:?} names unknown type {type_name:?}")]
    UnknownType { reference: String, type_name: String },
}

/// A resolved reference: absolute segments from the document root plus the target type
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct NodeRef {
    pub path: Vec<String>,
    pub type_name: String,
}

impl NodeRef {
    /// Parses `encoded` relative to the object at `current`
    pub fn parse(encoded: &str, current: &[String]) -> Result<Self, ReferenceError> {
        let (relative, type_name) = encoded
            .split_once(':')
            .filter(|(_, type_name)| !type_name.trim().is_empty())
            .ok_or_else(|| ReferenceError::MissingType(encoded.to_string()))?;

        let mut path = if relative.starts_with('/') {
            vec![]
        } else {
            current.to_vec()
        };
        for segment in relative.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if path.pop().is_none() {
                        return Err(ReferenceError::AboveRoot(encoded.to_string()));
                    }
                }
                segment => path.push(segment.to_string()),
            }
        }
        Ok(Self::new(path, type_name.trim().to_string()))
    }

    /// The referenced value within `root`
    pub fn target<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        root.get_path(&self.path)
    }

    /// Encodes the reference relative to the object at `current`
    pub fn encode(&self, current: &[String]) -> String {
        let common = current
            .iter()
            .zip(&self.path)
            .take_while(|(a, b)| a == b)
            .count();
        let mut segments: Vec<&str> =
            std::iter::repeat("..").take(current.len() - common).collect();
        segments.extend(self.path[common..].iter().map(String::as_str));
        let relative = if segments.is_empty() {
            ".".to_string()
        } else {
            segments.join("/")
        };
        format!("{relative}:{}", self.type_name)
    }
}

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}:{}", self.path.join("/"), self.type_name)
    }
}
