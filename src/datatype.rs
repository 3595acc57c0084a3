// used for persistence
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

// used to print out readable forms of a data type
use std::fmt;
// used to expose the wrapped list
use std::ops;

use crate::model::Origin;

// ------------- Origin -------------
impl ToSql for Origin {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}
impl FromSql for Origin {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            // rows written before provenance existed carry no origin
            ValueRef::Null => Ok(Origin::Natural),
            other => other
                .as_str()?
                .parse::<Origin>()
                .map_err(|e| FromSqlError::Other(Box::new(e))),
        }
    }
}

// ------------- TextList -------------
/// A list of strings kept in a single TEXT column as a JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextList(pub Vec<String>);

impl TextList {
    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}
impl From<&[String]> for TextList {
    fn from(items: &[String]) -> Self {
        TextList(items.to_vec())
    }
}
impl ToSql for TextList {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let json = serde_json::to_string(&self.0)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        Ok(ToSqlOutput::from(json))
    }
}
impl FromSql for TextList {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(TextList::default()),
            other => {
                let text = other.as_str()?;
                if text.trim().is_empty() {
                    return Ok(TextList::default());
                }
                serde_json::from_str::<Vec<String>>(text)
                    .map(TextList)
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    }
}
impl fmt::Display for TextList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.join(", "))
    }
}
impl ops::Deref for TextList {
    type Target = Vec<String>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Nullable variant for per-expression overrides, where an absent list
/// must stay distinguishable from an empty one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionalTextList(pub Option<Vec<String>>);

impl ToSql for OptionalTextList {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match &self.0 {
            Some(items) => {
                let json = serde_json::to_string(items)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                Ok(ToSqlOutput::from(json))
            }
            None => Ok(ToSqlOutput::from(rusqlite::types::Null)),
        }
    }
}
impl FromSql for OptionalTextList {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(OptionalTextList(None)),
            other => TextList::column_result(other).map(|list| OptionalTextList(Some(list.0))),
        }
    }
}
