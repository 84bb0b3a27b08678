//! Filtering, sorting and pagination options for list endpoints, and their query-string
//! rendering.
//!
//! Rendering is deterministic: components always appear in the order `scope`, filters (in input
//! order), `sort`, `offset`, `limit`, `extProjectId`, `extLineItemId`, `eventType`.
//!
//! # Example
//!
//! ```
//! use samplify_client_sdk::query::{Filter, QueryField, QueryOptions, QuerySeparator};
//!
//! let options = QueryOptions::builder()
//!     .filters(vec![Filter::new(QueryField::Title, "Samplify Client Test")])
//!     .limit(5000)
//!     .build();
//!
//! assert_eq!(
//!     options.query_params(QuerySeparator::Ampersand),
//!     "?title=Samplify+Client+Test&limit=1000"
//! );
//! ```

use std::fmt;

use bon::Builder;
use chrono::NaiveDate;
use url::form_urlencoded::byte_serialize;

/// Largest page size the API accepts. Larger limits are rendered as this value.
pub const MAX_LIMIT: u32 = 1000;

const DATE_FORMAT: &str = "%Y/%m/%d";

/// Top-level fields that list endpoints can filter and sort by. Nested fields are not supported.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "camelCase")]
pub enum QueryField {
    Id,
    ExtProjectId,
    ExtLineItemId,
    CreatedAt,
    UpdatedAt,
    Title,
    JobNumber,
    Name,
    Text,
    Type,
    State,
    StateReason,
    StateLastUpdatedAt,
    IsoCode,
    CountryName,
    #[strum(serialize = "countryISOCode")]
    CountryIsoCode,
    #[strum(serialize = "languageISOCode")]
    LanguageIsoCode,
    LaunchedAt,
    SurveyTopic,
    StartDate,
    EndDate,
    BillingDate,
    IsAllowedInSurveyAppends,
}

#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Text placed between two rendered `key=value` pairs.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum_macros::Display)]
pub enum QuerySeparator {
    /// A plain `&`.
    #[default]
    #[strum(serialize = "&")]
    Ampersand,
    /// The literal text `&amp;`, for servers that still expect the legacy wire format.
    #[strum(serialize = "&amp;")]
    EscapedAmpersand,
}

/// The value side of a [`Filter`].
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    /// A single value, form-url-encoded as one token.
    Scalar(String),
    /// Several values, each encoded and then comma-joined.
    List(Vec<String>),
    /// An inclusive date range rendered as `from,to`; a missing bound renders empty.
    DateRange {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
}

impl FilterValue {
    #[must_use]
    pub fn date_range(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self::DateRange { from, to }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_owned())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(values: Vec<String>) -> Self {
        Self::List(values)
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(value) => f.write_str(&escape(value)),
            Self::List(values) => {
                let values: Vec<String> = values.iter().map(|value| escape(value)).collect();
                f.write_str(&values.join(","))
            }
            Self::DateRange { from, to } => {
                let bound = |date: Option<NaiveDate>| {
                    date.map(|date| date.format(DATE_FORMAT).to_string())
                        .unwrap_or_default()
                };
                write!(f, "{},{}", bound(*from), bound(*to))
            }
        }
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: QueryField,
    pub value: FilterValue,
}

impl Filter {
    #[must_use]
    pub fn new<V: Into<FilterValue>>(field: QueryField, value: V) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub field: QueryField,
    pub direction: SortDirection,
}

impl Sort {
    #[must_use]
    pub fn new(field: QueryField, direction: SortDirection) -> Self {
        Self { field, direction }
    }
}

/// Filtering, sorting and pagination for endpoints that return a list.
///
/// An `offset` or `limit` of `0` means unset. Rendering never modifies the options; a `limit`
/// above [`MAX_LIMIT`] is only clamped in the rendered text.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Eq, Builder)]
pub struct QueryOptions {
    #[builder(default)]
    pub filters: Vec<Filter>,
    #[builder(default)]
    pub sort: Vec<Sort>,
    #[builder(default)]
    pub offset: u32,
    #[builder(default)]
    pub limit: u32,
    #[builder(into)]
    pub scope: Option<String>,
    #[builder(into)]
    pub ext_project_id: Option<String>,
    #[builder(into)]
    pub ext_line_item_id: Option<String>,
    #[builder(into)]
    pub event_type: Option<String>,
}

impl QueryOptions {
    /// Renders the options as a query string.
    ///
    /// Returns an empty string when nothing is set, otherwise a string starting with `?` whose
    /// `key=value` pairs are joined with `separator`.
    #[must_use]
    pub fn query_params(&self, separator: QuerySeparator) -> String {
        let mut pairs = Vec::new();

        if let Some(scope) = present(self.scope.as_deref()) {
            pairs.push(format!("scope={}", escape(scope)));
        }

        pairs.extend(
            self.filters
                .iter()
                .map(|filter| format!("{}={}", filter.field, filter.value)),
        );

        if !self.sort.is_empty() {
            let keys: Vec<String> = self
                .sort
                .iter()
                .map(|sort| format!("{}:{}", sort.field, sort.direction))
                .collect();
            pairs.push(format!("sort={}", keys.join(",")));
        }

        if self.offset > 0 {
            pairs.push(format!("offset={}", self.offset));
        }

        if self.limit > 0 {
            pairs.push(format!("limit={}", self.limit.min(MAX_LIMIT)));
        }

        let singular = [
            ("extProjectId", &self.ext_project_id),
            ("extLineItemId", &self.ext_line_item_id),
            ("eventType", &self.event_type),
        ];
        for (key, value) in singular {
            if let Some(value) = present(value.as_deref()) {
                pairs.push(format!("{key}={}", escape(value)));
            }
        }

        if pairs.is_empty() {
            String::new()
        } else {
            format!("?{}", pairs.join(&separator.to_string()))
        }
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Form-encodes `value`, keeping `~` literal and escaping `*` as the API's other clients do.
fn escape(value: &str) -> String {
    byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace("%7E", "~")
        .replace('*', "%2A")
}
