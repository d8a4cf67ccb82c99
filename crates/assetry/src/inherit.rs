//! prototype inheritance between documents
//!
//! A document names its prototype with the reserved key `Base`:
//!
//! ```hcl
//! # unit.hcl
//! Base = "unit-base"
//! hp = 80
//! ```
//!
//! Resolution merges the document into a copy of its base (the document wins, nested objects are
//! combined) and repeats with the base's own `Base` until no `Base` is left.
//!
//! Broken chains never fail: the problem is recorded as an [InheritanceIssue] and the document is
//! returned as far as it could be resolved. A direct self reference is detected, longer cycles
//! only stop at the depth limit.
use crate::document::{self, BASE_KEY};
use crate::value::Value;
use crate::vfs::File;
use async_trait::async_trait;
use std::sync::Arc;

/// Finds documents named by `Base`
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// The file `name` (extension included) as seen from the document `next_to`
    async fn find_document(&self, name: &str, next_to: &dyn File) -> Option<Arc<dyn File>>;
}

#[derive(Debug, Clone, derive_new::new)]
pub struct InheritanceOptions {
    /// Maximum number of merges
    pub max_depth: usize,
    /// Appended to `Base` names (without the dot)
    pub extension: String,
}

impl Default for InheritanceOptions {
    fn default() -> Self {
        Self::new(10, document::EXTENSION.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InheritanceIssue {
    #[error("{document}: `Base` must be a non-blank string")]
    BlankBase { document: String },
    #[error("{document}: base {base:?} not found")]
    MissingBase { document: String, base: String },
    #[error("{document}: inherits from itself")]
    SelfReference { document: String },
    #[error("{document}: base could not be read")]
    Unreadable { document: String },
    #[error("{document}: base is not a valid document: {reason}")]
    Unparsable { document: String, reason: String },
    #[error("{document}: inheritance deeper than {max_depth}, stopped")]
    DepthExceeded { document: String, max_depth: usize },
}

/// A resolved document and everything that went wrong on the way
#[derive(Debug, Clone)]
pub struct Inherited {
    pub document: Value,
    pub issues: Vec<InheritanceIssue>,
}

impl Inherited {
    fn log(&mut self, issue: InheritanceIssue) {
        tracing::warn!(%issue, "inheritance stopped");
        self.issues.push(issue);
    }
}

/// `Base` name with the document extension, unless it already ends with it
pub fn base_file_name(base: &str, extension: &str) -> String {
    let suffix = format!(".{extension}");
    if base.ends_with(&suffix) {
        base.to_string()
    } else {
        format!("{base}{suffix}")
    }
}

/// Resolves the `Base` chain of `document`, which was read from `source`
pub async fn resolve_inheritance(
    document: Value,
    source: Arc<dyn File>,
    lookup: &dyn DocumentSource,
    options: &InheritanceOptions,
) -> Inherited {
    let mut resolved = Inherited {
        document,
        issues: vec![],
    };
    let mut source = source;

    for depth in 0.. {
        let Some(base) = resolved.document.get(BASE_KEY) else {
            break;
        };
        if depth >= options.max_depth {
            resolved.log(InheritanceIssue::DepthExceeded {
                document: source.full_name().to_string(),
                max_depth: options.max_depth,
            });
            break;
        }

        let base_name = match base.as_literal().map(|literal| literal.to_string()) {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => {
                resolved.log(InheritanceIssue::BlankBase {
                    document: source.full_name().to_string(),
                });
                break;
            }
        };

        let file_name = base_file_name(&base_name, &options.extension);
        let Some(base_file) = lookup.find_document(&file_name, source.as_ref()).await else {
            resolved.log(InheritanceIssue::MissingBase {
                document: source.full_name().to_string(),
                base: file_name,
            });
            break;
        };
        if base_file.full_name() == source.full_name() {
            resolved.log(InheritanceIssue::SelfReference {
                document: source.full_name().to_string(),
            });
            break;
        }

        let Some(text) = base_file.text().await else {
            resolved.log(InheritanceIssue::Unreadable {
                document: base_file.full_name().to_string(),
            });
            break;
        };
        let mut merged = match document::parse_with_source(&text, Some(base_file.full_name())) {
            Ok(parsed) => parsed,
            Err(err) => {
                resolved.log(InheritanceIssue::Unparsable {
                    document: base_file.full_name().to_string(),
                    reason: err.to_string(),
                });
                break;
            }
        };

        tracing::debug!(
            document = source.full_name(),
            base = base_file.full_name(),
            depth,
            "merging base"
        );
        resolved.document.remove(BASE_KEY);
        merged.combine(std::mem::replace(
            &mut resolved.document,
            Value::empty_object(),
        ));
        resolved.document = merged;
        source = base_file;
    }

    resolved
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::document;
    use crate::vfs::packed::MemoryFile;
    use crate::vfs::FileOrFolder;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    /// Flat set of documents, found by name
    struct Documents(Vec<Arc<MemoryFile>>);

    impl Documents {
        fn new(files: &[(&str, &str)]) -> Self {
            Self(
                files
                    .iter()
                    .map(|(name, text)| {
                        Arc::new(MemoryFile::new(
                            name.to_string(),
                            Bytes::copy_from_slice(text.as_bytes()),
                        ))
                    })
                    .collect(),
            )
        }

        fn file(&self, name: &str) -> Arc<dyn File> {
            self.0
                .iter()
                .find(|file| file.name() == name)
                .cloned()
                .unwrap()
        }

        async fn resolve(&self, name: &str, max_depth: usize) -> Inherited {
            let file = self.file(name);
            let text = file.text().await.unwrap();
            let options = InheritanceOptions {
                max_depth,
                ..Default::default()
            };
            resolve_inheritance(document!(&text), file, self, &options).await
        }
    }

    #[async_trait]
    impl DocumentSource for Documents {
        async fn find_document(&self, name: &str, _next_to: &dyn File) -> Option<Arc<dyn File>> {
            self.0
                .iter()
                .find(|file| file.name() == name)
                .map(|file| file.clone() as Arc<dyn File>)
        }
    }

    #[tokio::test]
    async fn child_wins() {
        let docs = Documents::new(&[
            (
                "base.hcl",
                "a = 1\nb = 2\nengine {\n  power = 10\n  fuel = \"diesel\"\n}\n",
            ),
            (
                "child.hcl",
                "Base = \"base\"\nb = 3\nc = 4\nengine {\n  power = 12\n}\n",
            ),
        ]);
        let resolved = docs.resolve("child.hcl", 10).await;

        assert!(resolved.issues.is_empty());
        assert_eq!(
            resolved.document,
            document! {r#"
            a = 1
            b = 3
            engine {
              power = 12
              fuel = "diesel"
            }
            c = 4
            "#}
        );
    }

    #[tokio::test]
    async fn chain_within_depth_has_no_base_left() {
        let docs = Documents::new(&[
            ("a.hcl", "Base = \"b\"\na = 1"),
            ("b.hcl", "Base = \"c.hcl\"\nb = 1"),
            ("c.hcl", "c = 1"),
        ]);
        let resolved = docs.resolve("a.hcl", 2).await;

        assert!(resolved.issues.is_empty());
        assert!(!resolved.document.contains_key(BASE_KEY));
        assert_eq!(resolved.document, document!("c = 1\nb = 1\na = 1"));
    }

    #[tokio::test]
    async fn chain_beyond_depth_stops() {
        let docs = Documents::new(&[
            ("a.hcl", "Base = \"b\"\na = 1"),
            ("b.hcl", "Base = \"c\"\nb = 1"),
            ("c.hcl", "c = 1"),
        ]);
        let resolved = docs.resolve("a.hcl", 1).await;

        assert_eq!(
            resolved.issues,
            [InheritanceIssue::DepthExceeded {
                document: "b.hcl".into(),
                max_depth: 1
            }]
        );
        assert_eq!(resolved.document, document!("Base = \"c\"\nb = 1\na = 1"));
    }

    #[tokio::test]
    async fn self_reference_is_left_unchanged() {
        let docs = Documents::new(&[("unit.hcl", "Base = \"unit\"\nhp = 1")]);
        let resolved = docs.resolve("unit.hcl", 10).await;

        assert_eq!(
            resolved.issues,
            [InheritanceIssue::SelfReference {
                document: "unit.hcl".into()
            }]
        );
        assert_eq!(resolved.document, document!("Base = \"unit\"\nhp = 1"));
    }

    #[tokio::test]
    async fn cycle_stops_at_depth() {
        let docs = Documents::new(&[
            ("a.hcl", "Base = \"b\"\na = 1"),
            ("b.hcl", "Base = \"a\"\nb = 1"),
        ]);
        let resolved = docs.resolve("a.hcl", 5).await;

        assert_eq!(resolved.issues.len(), 1);
        assert!(matches!(
            resolved.issues[0],
            InheritanceIssue::DepthExceeded { max_depth: 5, .. }
        ));
        assert_eq!(resolved.document.get("a"), Some(&Value::from(1i64)));
        assert_eq!(resolved.document.get("b"), Some(&Value::from(1i64)));
    }

    #[tokio::test]
    async fn broken_bases() {
        let docs = Documents::new(&[
            ("blank.hcl", "Base = \"  \"\nx = 1"),
            ("object.hcl", "Base { a = 1 }"),
            ("missing.hcl", "Base = \"nowhere\""),
            ("bad-base.hcl", "Base = \"broken\""),
            ("broken.hcl", "= nope ="),
        ]);

        let blank = docs.resolve("blank.hcl", 10).await;
        assert!(matches!(blank.issues[..], [InheritanceIssue::BlankBase { .. }]));
        assert!(blank.document.contains_key("x"));

        let object = docs.resolve("object.hcl", 10).await;
        assert!(matches!(object.issues[..], [InheritanceIssue::BlankBase { .. }]));

        let missing = docs.resolve("missing.hcl", 10).await;
        assert_eq!(
            missing.issues,
            [InheritanceIssue::MissingBase {
                document: "missing.hcl".into(),
                base: "nowhere.hcl".into()
            }]
        );

        let bad = docs.resolve("bad-base.hcl", 10).await;
        assert!(matches!(bad.issues[..], [InheritanceIssue::Unparsable { .. }]));
    }

    #[test]
    fn extension_is_not_doubled() {
        assert_eq!(base_file_name("unit-base", "hcl"), "unit-base.hcl");
        assert_eq!(base_file_name("unit-base.hcl", "hcl"), "unit-base.hcl");
        assert_eq!(base_file_name("v1.2", "hcl"), "v1.2.hcl");
    }
}
