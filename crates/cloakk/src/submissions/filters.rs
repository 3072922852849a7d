use serde::Deserialize;

use super::domain::Submission;

/// Flag filter with a sentinel for "don't care".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlagFilter {
    #[default]
    All,
    Only(bool),
}

/// Filters applied to the active (non-deleted) listing; all present filters must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilters {
    pub viewed: Option<bool>,
    pub flagged: FlagFilter,
    pub search: Option<String>,
}

impl ListFilters {
    pub fn viewed(mut self, viewed: bool) -> Self {
        self.viewed = Some(viewed);
        self
    }

    pub fn flagged(mut self, flagged: bool) -> Self {
        self.flagged = FlagFilter::Only(flagged);
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    /// Lowercased search needle, or `None` when absent or blank.
    pub fn search_needle(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(str::to_lowercase)
    }

    /// Whether a submission belongs in the active listing under these filters.
    pub fn matches(&self, submission: &Submission) -> bool {
        if submission.is_deleted() {
            return false;
        }
        if let Some(viewed) = self.viewed {
            if submission.is_viewed != viewed {
                return false;
            }
        }
        if let FlagFilter::Only(flagged) = self.flagged {
            if submission.is_flagged != flagged {
                return false;
            }
        }
        match self.search_needle() {
            Some(needle) => submission.text_message.to_lowercase().contains(&needle),
            None => true,
        }
    }
}

/// Query string shape of the admin listing endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub viewed: Option<String>,
    pub flagged: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("'{value}' is not a valid value for {field}; expected true or false")]
    InvalidBoolean { field: &'static str, value: String },
}

fn parse_boolean(field: &'static str, raw: &str) -> Result<bool, FilterError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(FilterError::InvalidBoolean {
            field,
            value: raw.to_string(),
        }),
    }
}

impl TryFrom<ListQuery> for ListFilters {
    type Error = FilterError;

    fn try_from(query: ListQuery) -> Result<Self, Self::Error> {
        let viewed = match query.viewed.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(parse_boolean("viewed", raw)?),
        };

        let flagged = match query.flagged.as_deref().map(str::trim) {
            None | Some("") => FlagFilter::All,
            Some(raw) if raw.eq_ignore_ascii_case("all") => FlagFilter::All,
            Some(raw) => FlagFilter::Only(parse_boolean("flagged", raw)?),
        };

        Ok(Self {
            viewed,
            flagged,
            search: query.search.filter(|term| !term.trim().is_empty()),
        })
    }
}
