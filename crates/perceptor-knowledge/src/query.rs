//! Object-perception assertion queries.
//!
//! A detection is asserted into the knowledge base as
//!
//! ```text
//! create_object_perception('<namespace>#<Type>', [m00,m01,...,m33], ['<tag>', ...], <OutVar>)
//! ```
//!
//! where `m00..m33` are the 16 elements of the detection's pose matrix in
//! row-major order. Numbers use Rust's shortest round-trip float formatting,
//! so `1` prints as `1.0` and non-finite values as `NaN` / `inf`.
//!
//! # Example
//!
//! ```rust
//! use perceptor_knowledge::query::{ObjectPerceptionQuery, QueryTemplate};
//! use perceptor_types::{ObjectType, Transform};
//!
//! let q = ObjectPerceptionQuery::new(&QueryTemplate::default(), ObjectType::Cup, Transform::identity());
//! assert!(q.to_prolog().starts_with(
//!     "create_object_perception('http://ias.cs.tum.edu/kb/knowrob.owl#Cup', [1.0,0.0,0.0,0.0,"
//! ));
//! ```

use std::fmt;

use perceptor_geometry::to_transform;
use perceptor_types::{Detection, ObjectType, PerceptError, Transform};
use serde::{Deserialize, Serialize};

/// Ontology the object classes live in.
pub const DEFAULT_KB_NAMESPACE: &str = "http://ias.cs.tum.edu/kb/knowrob.owl";

/// Tag attached to every dummy perception.
pub const DEFAULT_TAG: &str = "DummyObjectDetection";

/// Variable the created instance is bound to.
pub const DEFAULT_OUTPUT_VAR: &str = "ObjInst";

/// Parts of the query that do not depend on the detection.
///
/// Deserialising goes through [`QueryTemplate::new`], so the same checks
/// apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TemplateFields")]
pub struct QueryTemplate {
    namespace: String,
    tags: Vec<String>,
    output_var: String,
}

impl QueryTemplate {
    /// Build a template.
    ///
    /// A trailing `#` on `namespace` is dropped.
    ///
    /// # Errors
    ///
    /// [`PerceptError::Config`] if `namespace` is empty or `output_var` is
    /// not a valid variable name (leading uppercase letter or `_`, then
    /// alphanumerics or `_`).
    pub fn new(
        namespace: impl Into<String>,
        tags: Vec<String>,
        output_var: impl Into<String>,
    ) -> Result<Self, PerceptError> {
        let namespace = namespace.into().trim_end_matches('#').to_string();
        if namespace.is_empty() {
            return Err(PerceptError::Config("knowledge-base namespace is empty".into()));
        }
        let output_var = output_var.into();
        if !is_variable_name(&output_var) {
            return Err(PerceptError::Config(format!(
                "'{output_var}' is not a valid output variable"
            )));
        }
        Ok(Self {
            namespace,
            tags,
            output_var,
        })
    }

    /// Default template with a different namespace.
    pub fn with_namespace(namespace: impl Into<String>) -> Result<Self, PerceptError> {
        Self::new(namespace, vec![DEFAULT_TAG.to_string()], DEFAULT_OUTPUT_VAR)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn output_var(&self) -> &str {
        &self.output_var
    }

    /// `<namespace>#<Type>`
    pub fn class_iri(&self, object_type: ObjectType) -> String {
        format!("{}#{}", self.namespace, object_type)
    }
}

impl Default for QueryTemplate {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_KB_NAMESPACE.to_string(),
            tags: vec![DEFAULT_TAG.to_string()],
            output_var: DEFAULT_OUTPUT_VAR.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct TemplateFields {
    namespace: String,
    #[serde(default = "default_tags")]
    tags: Vec<String>,
    #[serde(default = "default_output_var")]
    output_var: String,
}

fn default_tags() -> Vec<String> {
    vec![DEFAULT_TAG.to_string()]
}

fn default_output_var() -> String {
    DEFAULT_OUTPUT_VAR.to_string()
}

impl TryFrom<TemplateFields> for QueryTemplate {
    type Error = PerceptError;

    fn try_from(fields: TemplateFields) -> Result<Self, Self::Error> {
        Self::new(fields.namespace, fields.tags, fields.output_var)
    }
}

fn is_variable_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_uppercase() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// One `create_object_perception` assertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectPerceptionQuery {
    pub object_type: ObjectType,
    pub class_iri: String,
    pub pose: Transform,
    pub tags: Vec<String>,
    pub output_var: String,
}

impl ObjectPerceptionQuery {
    pub fn new(template: &QueryTemplate, object_type: ObjectType, pose: Transform) -> Self {
        Self {
            object_type,
            class_iri: template.class_iri(object_type),
            pose,
            tags: template.tags.clone(),
            output_var: template.output_var.clone(),
        }
    }

    /// Convert the detection's pose and build the assertion for it.
    pub fn from_detection(template: &QueryTemplate, detection: &Detection) -> Self {
        Self::new(
            template,
            detection.object_type,
            to_transform(&detection.pose.pose),
        )
    }

    /// Render the query text.
    pub fn to_prolog(&self) -> String {
        let matrix = self
            .pose
            .elements()
            .iter()
            .map(|v| format!("{v:?}"))
            .collect::<Vec<_>>()
            .join(",");
        let tags = self
            .tags
            .iter()
            .map(|t| quote_atom(t))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "create_object_perception({}, [{}], [{}], {})",
            quote_atom(&self.class_iri),
            matrix,
            tags,
            self.output_var
        )
    }
}

impl fmt::Display for ObjectPerceptionQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_prolog())
    }
}

/// Single-quote `s`, escaping backslashes and quotes.
fn quote_atom(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}
