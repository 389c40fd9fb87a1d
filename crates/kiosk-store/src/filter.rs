//! Typed list filters and their translation into bound SQL predicates
//!
//! Listings take three parallel arrays (`filter_by`, `filter_value`,
//! `filter_comparator`). Each triple becomes a [`Filter`] over a closed field
//! enum; the filters are then ANDed into a [`Predicate`] whose values are
//! always bound as parameters, never spliced into the SQL text.

use kiosk_api::ListQuery;
use rusqlite::types::Value;
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// Field names that mean "no filter"
const SENTINELS: [&str; 4] = ["all", "none", "any", "null"];

/// Filter construction and paging errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error(
        "Filter arrays differ in length: {by} filter_by, {values} filter_value, {comparators} filter_comparator"
    )]
    LengthMismatch {
        by: usize,
        values: usize,
        comparators: usize,
    },

    #[error("Unknown filter field '{0}'")]
    UnknownField(String),

    #[error("Unknown comparator '{0}'")]
    UnknownComparator(String),

    #[error("Comparator {comparator} is not allowed on text field '{field}'")]
    UnsupportedComparator {
        field: String,
        comparator: Comparator,
    },

    #[error("Invalid value '{value}' for integer field '{field}'")]
    InvalidValue { field: String, value: String },

    #[error("{name} must be a non-negative integer, got '{value}'")]
    InvalidPage { name: &'static str, value: String },
}

/// Value type of a filterable column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Text,
}

/// A closed set of filterable columns for one entity
pub trait FilterField: Copy + fmt::Debug {
    /// Resolve a client-supplied field token (case-insensitive, aliases included)
    fn parse(token: &str) -> Option<Self>;

    /// Column name in the backing table
    fn column(self) -> &'static str;

    fn kind(self) -> FieldKind;
}

/// Audit record columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordField {
    Num,
    Id,
    PrevStatus,
    NewStatus,
    Date,
    KioskName,
}

impl FilterField for RecordField {
    fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "num" | "number" => Some(Self::Num),
            "id" => Some(Self::Id),
            "prev_status" => Some(Self::PrevStatus),
            "new_status" => Some(Self::NewStatus),
            "date" | "time" => Some(Self::Date),
            "kiosk_name" | "kiosk" => Some(Self::KioskName),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::Num => "num",
            Self::Id => "id",
            Self::PrevStatus => "prev_status",
            Self::NewStatus => "new_status",
            Self::Date => "date",
            Self::KioskName => "kiosk_name",
        }
    }

    fn kind(self) -> FieldKind {
        match self {
            Self::Date | Self::KioskName => FieldKind::Text,
            _ => FieldKind::Integer,
        }
    }
}

/// Student columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudentField {
    Id,
    Name,
    PrivilegeType,
    Status,
}

impl FilterField for StudentField {
    fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "id" => Some(Self::Id),
            "name" => Some(Self::Name),
            "privilege_type" | "privilege" => Some(Self::PrivilegeType),
            "status" => Some(Self::Status),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::PrivilegeType => "privilege_type",
            Self::Status => "status",
        }
    }

    fn kind(self) -> FieldKind {
        match self {
            Self::Name => FieldKind::Text,
            _ => FieldKind::Integer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Equals,
    NotEquals,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,
}

impl Comparator {
    /// Parse a comparator token, case-insensitively
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "equals" => Some(Self::Equals),
            "not_equals" => Some(Self::NotEquals),
            "less_than" => Some(Self::LessThan),
            "greater_than" => Some(Self::GreaterThan),
            "less_equal" | "less_than_or_equal_to" => Some(Self::LessEqual),
            "greater_equal" | "greater_than_or_equal_to" => Some(Self::GreaterEqual),
            _ => None,
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::NotEquals => "<>",
            Self::LessThan => "<",
            Self::GreaterThan => ">",
            Self::LessEqual => "<=",
            Self::GreaterEqual => ">=",
        }
    }

    /// Text columns only support equality tests
    pub fn allowed_for(self, kind: FieldKind) -> bool {
        match kind {
            FieldKind::Integer => true,
            FieldKind::Text => matches!(self, Self::Equals | Self::NotEquals),
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Equals => "EQUALS",
            Self::NotEquals => "NOT_EQUALS",
            Self::LessThan => "LESS_THAN",
            Self::GreaterThan => "GREATER_THAN",
            Self::LessEqual => "LESS_EQUAL",
            Self::GreaterEqual => "GREATER_EQUAL",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Integer(i64),
    Text(String),
}

impl From<&FilterValue> for Value {
    fn from(value: &FilterValue) -> Self {
        match value {
            FilterValue::Integer(i) => Value::Integer(*i),
            FilterValue::Text(s) => Value::Text(s.clone()),
        }
    }
}

/// One validated column test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter<F> {
    pub field: F,
    pub comparator: Comparator,
    pub value: FilterValue,
}

impl<F: FilterField> Filter<F> {
    fn build(field_token: &str, value: &str, comparator: &str) -> Result<Self, FilterError> {
        let field =
            F::parse(field_token).ok_or_else(|| FilterError::UnknownField(field_token.into()))?;
        let comparator = Comparator::parse(comparator)
            .ok_or_else(|| FilterError::UnknownComparator(comparator.into()))?;

        if !comparator.allowed_for(field.kind()) {
            return Err(FilterError::UnsupportedComparator {
                field: field_token.into(),
                comparator,
            });
        }

        let value = match field.kind() {
            FieldKind::Integer => value.trim().parse().map(FilterValue::Integer).map_err(|_| {
                FilterError::InvalidValue {
                    field: field_token.into(),
                    value: value.into(),
                }
            })?,
            FieldKind::Text => FilterValue::Text(value.into()),
        };

        Ok(Self {
            field,
            comparator,
            value,
        })
    }
}

fn is_sentinel(token: &str) -> bool {
    SENTINELS.iter().any(|s| s.eq_ignore_ascii_case(token))
}

/// Build filters from parallel arrays of equal length.
///
/// Entries whose field is a sentinel ("all", "none", "any", "null") are
/// dropped without further checks.
pub fn parse_filters<F: FilterField>(
    fields: &[String],
    values: &[String],
    comparators: &[String],
) -> Result<Vec<Filter<F>>, FilterError> {
    if fields.len() != values.len() || fields.len() != comparators.len() {
        return Err(FilterError::LengthMismatch {
            by: fields.len(),
            values: values.len(),
            comparators: comparators.len(),
        });
    }

    fields
        .iter()
        .zip(values)
        .zip(comparators)
        .filter(|((field, _), _)| !is_sentinel(field))
        .map(|((field, value), comparator)| Filter::<F>::build(field, value, comparator))
        .collect()
}

/// Extend a short comparator list with EQUALS so it matches `len`.
///
/// A longer list is left alone and fails the length check later.
pub fn pad_comparators(len: usize, comparators: &[String]) -> Vec<String> {
    let mut padded = comparators.to_vec();
    if padded.len() < len {
        warn!(
            given = padded.len(),
            expected = len,
            "Filter comparators missing, defaulting the rest to equals"
        );
        padded.resize(len, "equals".to_string());
    }
    padded
}

/// A parameter-bound WHERE clause
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predicate {
    /// Conditions joined with AND, without the WHERE keyword; empty means all rows
    pub clause: String,
    pub params: Vec<FilterValue>,
}

impl Predicate {
    /// The clause ready to append to a SELECT, with a leading space
    pub fn where_sql(&self) -> String {
        if self.clause.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clause)
        }
    }

    pub fn sql_values(&self) -> Vec<Value> {
        self.params.iter().map(Value::from).collect()
    }
}

/// AND all filters into one predicate, numbering parameters from ?1
pub fn to_predicate<F: FilterField>(filters: &[Filter<F>]) -> Predicate {
    let clause = filters
        .iter()
        .enumerate()
        .map(|(i, f)| format!("{} {} ?{}", f.field.column(), f.comparator.sql(), i + 1))
        .collect::<Vec<_>>()
        .join(" AND ");

    Predicate {
        clause,
        params: filters.iter().map(|f| f.value.clone()).collect(),
    }
}

/// A result window of `page_size` rows starting at row `page * page_size`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub page_size: u32,
}

impl Page {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    /// Parse textual paging parameters; a missing page is 0
    pub fn parse(
        page: Option<&str>,
        page_size: Option<&str>,
        default_page_size: u32,
    ) -> Result<Self, FilterError> {
        let parse = |name: &'static str, value: Option<&str>, default: u32| match value {
            None => Ok(default),
            Some(text) => text.trim().parse::<u32>().map_err(|_| FilterError::InvalidPage {
                name,
                value: text.into(),
            }),
        };

        Ok(Self {
            page: parse("page", page, 0)?,
            page_size: parse("page_size", page_size, default_page_size)?,
        })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.page_size)
    }
}

/// Filters plus paging for one list request
#[derive(Debug, Clone)]
pub struct ParsedQuery<F> {
    pub filters: Vec<Filter<F>>,
    pub page: Page,
}

/// Validate a protocol list query: paging first, then comparator padding and filters
pub fn parse_list_query<F: FilterField>(
    query: &ListQuery,
    default_page_size: u32,
) -> Result<ParsedQuery<F>, FilterError> {
    let page = Page::parse(
        query.page.as_deref(),
        query.page_size.as_deref(),
        default_page_size,
    )?;
    let filters = parse_query_filters(query)?;
    Ok(ParsedQuery { filters, page })
}

/// Validate only the filters of a protocol query (for counts)
pub fn parse_query_filters<F: FilterField>(query: &ListQuery) -> Result<Vec<Filter<F>>, FilterError> {
    if query.filter_by.len() != query.filter_value.len() {
        return Err(FilterError::LengthMismatch {
            by: query.filter_by.len(),
            values: query.filter_value.len(),
            comparators: query.filter_comparator.len(),
        });
    }
    let comparators = pad_comparators(query.filter_by.len(), &query.filter_comparator);
    parse_filters(&query.filter_by, &query.filter_value, &comparators)
}
