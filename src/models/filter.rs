//! Query parameter types shared by the list endpoints.

use std::str::FromStr;

/// Which records an `id=` query parameter selects.
///
/// `all` selects everything; otherwise a comma separated list of ids.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IdSelector {
    #[default]
    All,
    Ids(Vec<i64>),
}

impl IdSelector {
    /// The explicit id list, or `None` for `All`.
    pub fn ids(&self) -> Option<&[i64]> {
        match self {
            IdSelector::All => None,
            IdSelector::Ids(ids) => Some(ids.as_slice()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid ID format: {0:?}")]
pub struct InvalidIdList(pub String);

impl FromStr for IdSelector {
    type Err = InvalidIdList;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(IdSelector::All);
        }
        s.split(',')
            .map(|part| part.trim().parse::<i64>())
            .collect::<Result<Vec<_>, _>>()
            .map(IdSelector::Ids)
            .map_err(|_| InvalidIdList(s.to_string()))
    }
}

/// Parse a comma separated id list where `all` is not accepted.
pub fn parse_id_list(s: &str) -> Result<Vec<i64>, InvalidIdList> {
    match s.parse::<IdSelector>()? {
        IdSelector::Ids(ids) => Ok(ids),
        IdSelector::All => Err(InvalidIdList(s.to_string())),
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    /// Split a `-field` / `field` sort parameter into field and direction.
    pub fn split(param: &str) -> (&str, Self) {
        match param.strip_prefix('-') {
            Some(field) => (field, SortDirection::Desc),
            None => (param, SortDirection::Asc),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_all() {
        assert_eq!("all".parse::<IdSelector>().unwrap(), IdSelector::All);
        assert_eq!("ALL".parse::<IdSelector>().unwrap(), IdSelector::All);
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            "1, 2,3".parse::<IdSelector>().unwrap(),
            IdSelector::Ids(vec![1, 2, 3])
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<IdSelector>().is_err());
        assert!("1,x".parse::<IdSelector>().is_err());
        assert!("1,,2".parse::<IdSelector>().is_err());
        assert!(parse_id_list("all").is_err());
    }

    #[test]
    fn test_sort_direction_split() {
        assert_eq!(SortDirection::split("-title"), ("title", SortDirection::Desc));
        assert_eq!(SortDirection::split("id"), ("id", SortDirection::Asc));
    }

    proptest! {
        #[test]
        fn id_lists_parse_back(ids in prop::collection::vec(0i64..1_000_000, 1..20)) {
            let joined = ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",");
            prop_assert_eq!(parse_id_list(&joined).unwrap(), ids);
        }
    }
}
