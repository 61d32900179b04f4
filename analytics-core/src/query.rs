//! List query arguments
//!
//! `ListParams` is the raw query-string form accepted by the HTTP layer.
//! `ListQuery` is its normalized form consumed by the repositories. Conversion
//! between the two never fails: arguments that cannot be honored are dropped.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fields a listing may be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Name,
    Id,
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    pub fn as_str(self) -> &'static str {
        match self {
            SortField::Name => "name",
            SortField::Id => "id",
            SortField::CreatedAt => "createdAt",
            SortField::UpdatedAt => "updatedAt",
        }
    }
}

impl FromStr for SortField {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(SortField::Name),
            "id" => Ok(SortField::Id),
            "createdAt" => Ok(SortField::CreatedAt),
            "updatedAt" => Ok(SortField::UpdatedAt),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// `field:direction` ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Order {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    /// Parses `field:direction`
    ///
    /// Returns `None` when the separator is missing or the field is not
    /// sortable. Any direction other than `desc` sorts ascending.
    pub fn parse(raw: &str) -> Option<Self> {
        let (field, direction) = raw.split_once(':')?;
        let field = field.parse().ok()?;
        let direction = if direction == "desc" {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        };
        Some(Self { field, direction })
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.field.as_str(), self.direction.as_str())
    }
}

/// Raw list arguments as they appear in a query string
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListParams {
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub order: Option<String>,
    pub search: Option<String>,
}

/// Normalized list arguments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Maximum number of rows returned, `None` for no limit
    pub limit: Option<u64>,
    /// Number of rows skipped
    pub offset: Option<u64>,
    pub order: Option<Order>,
    /// Case-insensitive regular expression matched against the pipeline name
    pub search: Option<String>,
}

impl ListQuery {
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = (limit > 0).then_some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Compiles the search pattern, if any
    pub fn search_regex(&self) -> Result<Option<Regex>, regex::Error> {
        self.search
            .as_deref()
            .map(|pattern| RegexBuilder::new(pattern).case_insensitive(true).build())
            .transpose()
    }

    /// Renders the query back into query-string pairs
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(offset) = self.offset {
            params.push(("offset", offset.to_string()));
        }
        if let Some(order) = self.order {
            params.push(("order", order.to_string()));
        }
        if let Some(search) = &self.search {
            params.push(("search", search.clone()));
        }
        params
    }
}

impl From<ListParams> for ListQuery {
    fn from(params: ListParams) -> Self {
        // a zero limit means "unlimited" to document stores
        let limit = params
            .limit
            .and_then(|l| l.trim().parse::<u64>().ok())
            .filter(|l| *l > 0);
        let offset = params.offset.and_then(|o| o.trim().parse::<u64>().ok());
        let order = params.order.as_deref().and_then(Order::parse);
        let search = params.search.filter(|s| !s.is_empty());

        Self {
            limit,
            offset,
            order,
            search,
        }
    }
}
