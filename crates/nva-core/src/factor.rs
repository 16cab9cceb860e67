//! Factor domain model

use crate::{Error, Labeled, Relation, Result};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A relation attached to an ordered list of variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Factor {
    label: String,
    variables: Vec<String>,
    relation: Relation,
    tags: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
}

impl Factor {
    pub fn new(label: impl Into<String>, variables: Vec<String>, relation: Relation) -> Result<Self> {
        let label = label.into();
        if label.is_empty() {
            return Err(Error::Validation("factor label cannot be empty".to_string()));
        }
        let arity = relation.kind().arity();
        if variables.len() != arity {
            return Err(Error::Validation(format!(
                "{} factor {:?} connects {} variables, got {}",
                relation.kind(),
                label,
                arity,
                variables.len()
            )));
        }
        if variables.iter().any(String::is_empty) {
            return Err(Error::Validation(format!(
                "factor {:?} references an empty variable label",
                label
            )));
        }

        Ok(Self {
            label,
            variables,
            relation,
            tags: vec!["FACTOR".to_string()],
            timestamp: OffsetDateTime::now_utc(),
        })
    }

    /// Binary factor labelled `{from}{to}f1`.
    pub fn between(from: &str, to: &str, relation: Relation) -> Result<Self> {
        Self::new(
            format!("{}{}f1", from, to),
            vec![from.to_string(), to.to_string()],
            relation,
        )
    }

    /// Unary factor labelled `{variable}f1`.
    pub fn prior(variable: &str, relation: Relation) -> Result<Self> {
        Self::new(format!("{}f1", variable), vec![variable.to_string()], relation)
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn relation(&self) -> &Relation {
        &self.relation
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }
}

impl Labeled for Factor {
    fn label(&self) -> &str {
        &self.label
    }
}
