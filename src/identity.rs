//! Resource identity types.
//!
//! Monitored resources are addressed by numeric composite keys: an element is
//! `agent/element`, a parameter adds a parameter id, and a table cell adds the
//! column id and the row's primary key. Only these identity fields are needed
//! during matching; the engine never reads resource attributes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ContractError;

/// Identity of a monitored element.
///
/// `-1/-1` is the universal selector meaning "every element".
///
/// # Examples
///
/// ```
/// use monitorkit::ElementId;
///
/// let id: ElementId = "7/12".parse().unwrap();
/// assert_eq!(id, ElementId::new(7, 12));
/// assert!(!id.is_wildcard());
/// assert!(ElementId::WILDCARD.is_wildcard());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId {
    /// Id of the agent hosting the element.
    pub agent_id: i32,
    /// Element id, unique within the agent.
    pub element_id: i32,
}

impl ElementId {
    /// The universal selector.
    pub const WILDCARD: Self = Self {
        agent_id: -1,
        element_id: -1,
    };

    /// Creates an element id.
    #[must_use]
    pub const fn new(agent_id: i32, element_id: i32) -> Self {
        Self { agent_id, element_id }
    }

    /// Returns true for the universal selector.
    #[must_use]
    pub const fn is_wildcard(&self) -> bool {
        self.agent_id == -1 && self.element_id == -1
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.agent_id, self.element_id)
    }
}

impl FromStr for ElementId {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = parse_ids(s, 2)?;
        Ok(Self::new(parts[0], parts[1]))
    }
}

/// Identity of a parameter on an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParamId {
    /// Owning element.
    pub element: ElementId,
    /// Parameter id.
    pub parameter_id: i32,
}

impl ParamId {
    /// Creates a parameter id.
    #[must_use]
    pub const fn new(agent_id: i32, element_id: i32, parameter_id: i32) -> Self {
        Self {
            element: ElementId::new(agent_id, element_id),
            parameter_id,
        }
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.element, self.parameter_id)
    }
}

impl FromStr for ParamId {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = parse_ids(s, 3)?;
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

/// Identity of a single table cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellId {
    /// The table parameter.
    pub table: ParamId,
    /// Column parameter id.
    pub column_id: i32,
    /// Primary key of the row.
    pub row_key: String,
}

impl CellId {
    /// Creates a cell id. The row key must not be empty.
    pub fn new(table: ParamId, column_id: i32, row_key: impl Into<String>) -> Result<Self, ContractError> {
        let row_key = row_key.into();
        if row_key.is_empty() {
            return Err(ContractError::InvalidSelection {
                reason: "cell row key cannot be empty".to_string(),
            });
        }
        Ok(Self {
            table,
            column_id,
            row_key,
        })
    }

    /// The element owning the table.
    #[must_use]
    pub const fn element(&self) -> ElementId {
        self.table.element
    }

    /// The column as a standalone parameter id.
    #[must_use]
    pub const fn column(&self) -> ParamId {
        ParamId {
            element: self.table.element,
            parameter_id: self.column_id,
        }
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.table, self.column_id, self.row_key)
    }
}

/// The resource a change event refers to.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ResourceRef {
    Element(ElementId),
    Parameter(ParamId),
    Cell(CellId),
}

impl ResourceRef {
    /// The element the resource lives on.
    #[must_use]
    pub const fn element(&self) -> ElementId {
        match self {
            Self::Element(e) => *e,
            Self::Parameter(p) => p.element,
            Self::Cell(c) => c.table.element,
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Element(e) => e.fmt(f),
            Self::Parameter(p) => p.fmt(f),
            Self::Cell(c) => c.fmt(f),
        }
    }
}

fn parse_ids(s: &str, expected: usize) -> Result<Vec<i32>, ContractError> {
    let parts: Vec<&str> = s.trim().split('/').collect();
    if parts.len() != expected {
        return Err(ContractError::InvalidSelection {
            reason: format!("expected {expected} '/'-separated ids, got '{s}'"),
        });
    }
    parts
        .iter()
        .map(|p| {
            p.trim().parse::<i32>().map_err(|e| ContractError::InvalidSelection {
                reason: format!("invalid id '{p}' in '{s}': {e}"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_id_display_and_parse() {
        let id = ElementId::new(7, 12);
        assert_eq!(id.to_string(), "7/12");
        assert_eq!("7/12".parse::<ElementId>().unwrap(), id);
        assert_eq!(" -1/-1 ".parse::<ElementId>().unwrap(), ElementId::WILDCARD);
    }

    #[test]
    fn test_param_id_parse_rejects_bad_input() {
        assert!("7/12".parse::<ParamId>().is_err());
        assert!("7/x/500".parse::<ParamId>().is_err());
        assert_eq!("7/12/500".parse::<ParamId>().unwrap(), ParamId::new(7, 12, 500));
    }

    #[test]
    fn test_cell_id_requires_row_key() {
        let table = ParamId::new(7, 12, 1000);
        assert!(CellId::new(table, 1002, "").is_err());

        let cell = CellId::new(table, 1002, "row1").unwrap();
        assert_eq!(cell.to_string(), "7/12/1000/1002/row1");
        assert_eq!(cell.column(), ParamId::new(7, 12, 1002));
        assert_eq!(ResourceRef::Cell(cell).element(), ElementId::new(7, 12));
    }
}
