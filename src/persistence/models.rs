//! Domain types for the project store.
//!
//! Field names serialize in camelCase and enums as their variant names, which
//! is also the JSON exchange format. The owner is never serialized.

use crate::error::{DigiflowError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque identifier of the user owning a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Generates the string mapping shared by every stored enum.
macro_rules! text_enum {
    ($name:ident, $label:literal { $($variant:ident => $display:literal),+ $(,)? }) => {
        impl $name {
            /// All variants in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Variant name, as stored and exchanged.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),+
                }
            }

            /// Human-readable label.
            pub fn display_name(&self) -> &'static str {
                match self {
                    $($name::$variant => $display),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = DigiflowError;

            /// Accepts the variant name in any letter case.
            fn from_str(s: &str) -> Result<Self> {
                let s = s.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s))
                    .ok_or_else(|| {
                        DigiflowError::validation(format!("Unknown {}: '{s}'", $label))
                    })
            }
        }
    };
}

/// Lifecycle state of a project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectStatus {
    #[default]
    Planned,
    InProgress,
    InReview,
    Completed,
    Paused,
}

text_enum!(ProjectStatus, "project status" {
    Planned => "Planned",
    InProgress => "In Progress",
    InReview => "In Review",
    Completed => "Completed",
    Paused => "Paused",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

text_enum!(Priority, "priority" {
    Low => "Low",
    Medium => "Medium",
    High => "High",
    Critical => "Critical",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequirementStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
    Rejected,
}

text_enum!(RequirementStatus, "requirement status" {
    Open => "Open",
    InProgress => "In Progress",
    Resolved => "Resolved",
    Rejected => "Rejected",
});

/// How a digitalization proposal would be realised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProposalKind {
    #[default]
    InHouse,
    ThirdParty,
    Hybrid,
}

text_enum!(ProposalKind, "proposal kind" {
    InHouse => "In-house development",
    ThirdParty => "Third-party software",
    Hybrid => "Hybrid solution",
});

/// A digitalization project with its requirements and proposals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub status: ProjectStatus,
    pub technology: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub responsible: String,
    #[serde(skip)]
    pub owner_id: OwnerId,
    pub requirements: Vec<Requirement>,
    pub proposals: Vec<Proposal>,
}

impl Default for Project {
    fn default() -> Self {
        Self {
            id: 0,
            title: String::new(),
            description: String::new(),
            status: ProjectStatus::default(),
            technology: String::new(),
            created_at: Utc::now(),
            completed_at: None,
            responsible: String::new(),
            owner_id: OwnerId::default(),
            requirements: Vec::new(),
            proposals: Vec::new(),
        }
    }
}

/// A user requirement attached to a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Requirement {
    pub id: i64,
    pub project_id: i64,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: RequirementStatus,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

impl Default for Requirement {
    fn default() -> Self {
        Self {
            id: 0,
            project_id: 0,
            title: String::new(),
            description: String::new(),
            priority: Priority::default(),
            status: RequirementStatus::default(),
            author: String::new(),
            created_at: Utc::now(),
        }
    }
}

/// A digitalization proposal attached to a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Proposal {
    pub id: i64,
    pub project_id: i64,
    pub title: String,
    pub description: String,
    pub kind: ProposalKind,
    pub rationale: String,
    pub created_at: DateTime<Utc>,
    pub accepted: bool,
}

impl Default for Proposal {
    fn default() -> Self {
        Self {
            id: 0,
            project_id: 0,
            title: String::new(),
            description: String::new(),
            kind: ProposalKind::default(),
            rationale: String::new(),
            created_at: Utc::now(),
            accepted: false,
        }
    }
}

/// Input for creating or updating a project.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewProject {
    pub title: String,
    pub description: String,
    pub status: ProjectStatus,
    pub technology: String,
    pub responsible: String,
    pub completed_at: Option<DateTime<Utc>>,
    /// Only used on create.
    pub requirements: Vec<NewRequirement>,
    /// Only used on create.
    pub proposals: Vec<NewProposal>,
}

impl NewProject {
    pub fn new(title: impl Into<String>, responsible: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            responsible: responsible.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_status(mut self, status: ProjectStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_technology(mut self, technology: impl Into<String>) -> Self {
        self.technology = technology.into();
        self
    }

    /// Checks field constraints, including those of nested children.
    pub fn validate(&self) -> Result<()> {
        check_title(&self.title)?;
        check_max("description", &self.description, 2000)?;
        check_max("technology", &self.technology, 100)?;
        check_required("responsible", &self.responsible)?;
        check_range("responsible", &self.responsible, 2, 100)?;
        self.requirements.iter().try_for_each(NewRequirement::validate)?;
        self.proposals.iter().try_for_each(NewProposal::validate)
    }
}

impl From<&Project> for NewProject {
    fn from(project: &Project) -> Self {
        Self {
            title: project.title.clone(),
            description: project.description.clone(),
            status: project.status,
            technology: project.technology.clone(),
            responsible: project.responsible.clone(),
            completed_at: project.completed_at,
            requirements: project.requirements.iter().map(Into::into).collect(),
            proposals: project.proposals.iter().map(Into::into).collect(),
        }
    }
}

/// Input for a new requirement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewRequirement {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: RequirementStatus,
    pub author: String,
}

impl NewRequirement {
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_title(&self.title)?;
        check_max("description", &self.description, 2000)?;
        check_required("author", &self.author)?;
        check_range("author", &self.author, 2, 100)
    }
}

impl From<&Requirement> for NewRequirement {
    fn from(requirement: &Requirement) -> Self {
        Self {
            title: requirement.title.clone(),
            description: requirement.description.clone(),
            priority: requirement.priority,
            status: requirement.status,
            author: requirement.author.clone(),
        }
    }
}

/// Input for a new proposal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewProposal {
    pub title: String,
    pub description: String,
    pub kind: ProposalKind,
    pub rationale: String,
    pub accepted: bool,
}

impl NewProposal {
    pub fn new(title: impl Into<String>, kind: ProposalKind) -> Self {
        Self {
            title: title.into(),
            kind,
            ..Self::default()
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_title(&self.title)?;
        check_max("description", &self.description, 2000)?;
        check_max("rationale", &self.rationale, 2000)
    }
}

impl From<&Proposal> for NewProposal {
    fn from(proposal: &Proposal) -> Self {
        Self {
            title: proposal.title.clone(),
            description: proposal.description.clone(),
            kind: proposal.kind,
            rationale: proposal.rationale.clone(),
            accepted: proposal.accepted,
        }
    }
}

/// Filter and paging options for [`crate::persistence::ProjectStore::list_projects_paginated`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectQuery {
    /// 1-based page number; values below 1 are treated as 1.
    pub page: u32,
    /// Items per page; values below 1 are treated as 1.
    pub page_size: u32,
    pub status: Option<ProjectStatus>,
    pub search: Option<String>,
}

impl Default for ProjectQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 10,
            status: None,
            search: None,
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total_count.div_ceil(u64::from(self.page_size))
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.page) < self.total_pages()
    }
}

fn check_required(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DigiflowError::validation(format!("{field} is required")));
    }
    Ok(())
}

fn check_range(field: &str, value: &str, min: usize, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(DigiflowError::validation(format!(
            "{field} must be between {min} and {max} characters"
        )));
    }
    Ok(())
}

fn check_max(field: &str, value: &str, max: usize) -> Result<()> {
    if value.chars().count() > max {
        return Err(DigiflowError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

fn check_title(title: &str) -> Result<()> {
    check_required("title", title)?;
    check_range("title", title, 3, 200)
}
