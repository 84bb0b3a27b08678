//! Quota plans and the allocation rules they must satisfy before they are sent.
//!
//! Every quota group owns at least one cell, every cell is allocated by exactly one of
//! percentage or count, and all cells of a group use the same kind of allocation.

use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::Result;
use crate::error::Error;

/// A targeting attribute together with the options it selects.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetingAttribute {
    pub attribute_id: String,
    #[serde(default)]
    pub options: Vec<String>,
}

impl TargetingAttribute {
    #[must_use]
    pub fn new(attribute_id: &str, options: Vec<String>) -> Self {
        Self {
            attribute_id: attribute_id.to_owned(),
            options,
        }
    }
}

/// How a quota cell's share of completes is expressed.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Allocation {
    Percentage,
    Count,
}

#[non_exhaustive]
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaCell {
    #[serde(default)]
    pub quota_nodes: Vec<TargetingAttribute>,
    pub perc: Option<f64>,
    pub count: Option<u32>,
}

impl QuotaCell {
    #[must_use]
    pub fn percentage(quota_nodes: Vec<TargetingAttribute>, perc: f64) -> Self {
        Self {
            quota_nodes,
            perc: Some(perc),
            count: None,
        }
    }

    #[must_use]
    pub fn count(quota_nodes: Vec<TargetingAttribute>, count: u32) -> Self {
        Self {
            quota_nodes,
            perc: None,
            count: Some(count),
        }
    }

    /// The allocation kind, when exactly one of `perc` and `count` is set.
    #[must_use]
    pub fn allocation(&self) -> Option<Allocation> {
        match (self.perc, self.count) {
            (Some(_), None) => Some(Allocation::Percentage),
            (None, Some(_)) => Some(Allocation::Count),
            _ => None,
        }
    }
}

#[non_exhaustive]
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaGroup {
    pub name: Option<String>,
    #[serde(default)]
    pub quota_cells: Vec<QuotaCell>,
}

impl QuotaGroup {
    #[must_use]
    pub fn new(name: Option<String>, quota_cells: Vec<QuotaCell>) -> Self {
        Self { name, quota_cells }
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaPlan {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<TargetingAttribute>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quota_groups: Vec<QuotaGroup>,
}

impl QuotaPlan {
    #[must_use]
    pub fn new(filters: Vec<TargetingAttribute>, quota_groups: Vec<QuotaGroup>) -> Self {
        Self {
            filters,
            quota_groups,
        }
    }

    /// Checks every group in order and reports the first violation found.
    ///
    /// A plan without groups is valid. Nothing is sent; this only inspects the plan.
    pub fn validate(&self) -> std::result::Result<(), QuotaPlanError> {
        for (group, quota_group) in self.quota_groups.iter().enumerate() {
            let mut expected = None;

            if quota_group.quota_cells.is_empty() {
                return Err(QuotaPlanError::MissingQuotaCells { group });
            }

            for (cell, quota_cell) in quota_group.quota_cells.iter().enumerate() {
                let allocation = match (quota_cell.perc, quota_cell.count) {
                    (None, None) => {
                        return Err(QuotaPlanError::AllocationNotProvided { group, cell });
                    }
                    (Some(_), Some(_)) => {
                        return Err(QuotaPlanError::AmbiguousAllocation { group, cell });
                    }
                    (Some(_), None) => Allocation::Percentage,
                    (None, Some(_)) => Allocation::Count,
                };

                match expected {
                    None => expected = Some(allocation),
                    Some(expected) if expected != allocation => {
                        return Err(QuotaPlanError::InconsistentAllocationType {
                            group,
                            cell,
                            expected,
                            found: allocation,
                        });
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(())
    }
}

/// Why a [`QuotaPlan`] was rejected. Group and cell positions are zero-based.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaPlanError {
    MissingQuotaCells {
        group: usize,
    },
    AllocationNotProvided {
        group: usize,
        cell: usize,
    },
    AmbiguousAllocation {
        group: usize,
        cell: usize,
    },
    InconsistentAllocationType {
        group: usize,
        cell: usize,
        expected: Allocation,
        found: Allocation,
    },
}

impl fmt::Display for QuotaPlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingQuotaCells { group } => {
                write!(f, "quota group {group}: at least one quota cell should be provided")
            }
            Self::AllocationNotProvided { group, cell } => write!(
                f,
                "quota group {group}, cell {cell}: allocation is not specified for the cell"
            ),
            Self::AmbiguousAllocation { group, cell } => write!(
                f,
                "quota group {group}, cell {cell}: either percentage or count must be present in the quota cell"
            ),
            Self::InconsistentAllocationType {
                group,
                cell,
                expected,
                found,
            } => write!(
                f,
                "quota group {group}, cell {cell}: allocation type within the quota group should be consistent (expected {expected}, found {found})"
            ),
        }
    }
}

impl StdError for QuotaPlanError {}

/// Payload for creating or updating a quota plan template.
#[non_exhaustive]
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateCriteria {
    #[serde(rename = "countryISOCode")]
    pub country_iso_code: String,
    pub description: String,
    #[serde(rename = "languageISOCode")]
    pub language_iso_code: String,
    pub name: String,
    #[serde(rename = "quotaPlan")]
    pub quota_plan: Option<QuotaPlan>,
    pub tags: Option<String>,
}

impl TemplateCriteria {
    #[must_use]
    pub fn new(
        name: &str,
        description: &str,
        country_iso_code: &str,
        language_iso_code: &str,
    ) -> Self {
        Self {
            country_iso_code: country_iso_code.to_owned(),
            description: description.to_owned(),
            language_iso_code: language_iso_code.to_owned(),
            name: name.to_owned(),
            quota_plan: None,
            tags: None,
        }
    }

    #[must_use]
    pub fn with_quota_plan(mut self, quota_plan: QuotaPlan) -> Self {
        self.quota_plan = Some(quota_plan);
        self
    }

    #[must_use]
    pub fn with_tags(mut self, tags: &str) -> Self {
        self.tags = Some(tags.to_owned());
        self
    }

    /// Rejects a blank name and any quota plan violation.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("required field is empty: name"));
        }

        if let Some(plan) = &self.quota_plan {
            plan.validate()?;
        }

        Ok(())
    }
}
