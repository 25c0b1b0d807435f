use mongodb::options::{ReadPreference as Driver, SelectionCriteria};
use strata_core::{Error, Result};

/// Which replica set members a read may be served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPreference {
    Primary,
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    Nearest,
}

impl ReadPreference {
    /// Parses a caller-supplied preference, ignoring case and underscores
    /// (`PRIMARY_PREFERRED`, `primaryPreferred`). Absent or empty means the
    /// client default.
    pub fn parse(value: Option<&str>) -> Result<Option<ReadPreference>> {
        let Some(value) = value.filter(|value| !value.is_empty()) else {
            return Ok(None);
        };

        let normalized: String = value
            .chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        Ok(Some(match normalized.as_str() {
            "PRIMARY" => ReadPreference::Primary,
            "PRIMARYPREFERRED" => ReadPreference::PrimaryPreferred,
            "SECONDARY" => ReadPreference::Secondary,
            "SECONDARYPREFERRED" => ReadPreference::SecondaryPreferred,
            "NEAREST" => ReadPreference::Nearest,
            _ => {
                return Err(Error::invalid_query(format!(
                    "Not supported read preference: {value}"
                )))
            }
        }))
    }

    pub fn selection_criteria(self) -> SelectionCriteria {
        let preference = match self {
            ReadPreference::Primary => Driver::Primary,
            ReadPreference::PrimaryPreferred => Driver::PrimaryPreferred {
                options: Default::default(),
            },
            ReadPreference::Secondary => Driver::Secondary {
                options: Default::default(),
            },
            ReadPreference::SecondaryPreferred => Driver::SecondaryPreferred {
                options: Default::default(),
            },
            ReadPreference::Nearest => Driver::Nearest {
                options: Default::default(),
            },
        };
        SelectionCriteria::ReadPreference(preference)
    }
}

/// The selection criteria for an optional preference string.
pub(crate) fn selection_criteria(value: Option<&str>) -> Result<Option<SelectionCriteria>> {
    Ok(ReadPreference::parse(value)?.map(ReadPreference::selection_criteria))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive() {
        assert_eq!(
            ReadPreference::parse(Some("secondary")).unwrap(),
            Some(ReadPreference::Secondary)
        );
        assert_eq!(
            ReadPreference::parse(Some("PRIMARY_PREFERRED")).unwrap(),
            Some(ReadPreference::PrimaryPreferred)
        );
        assert_eq!(
            ReadPreference::parse(Some("secondaryPreferred")).unwrap(),
            Some(ReadPreference::SecondaryPreferred)
        );
        assert_eq!(
            ReadPreference::parse(Some("Nearest")).unwrap(),
            Some(ReadPreference::Nearest)
        );
    }

    #[test]
    fn absent_or_empty() {
        assert_eq!(ReadPreference::parse(None).unwrap(), None);
        assert_eq!(ReadPreference::parse(Some("")).unwrap(), None);
    }

    #[test]
    fn unknown() {
        let err = ReadPreference::parse(Some("fastest")).unwrap_err();
        assert!(err.is_invalid_query());
    }
}
