use crate::error::BoqSheetError;
use glob::Pattern;

/// Which sheets to read and how to bound them.
#[derive(Clone, Debug)]
pub(crate) struct Criteria {
    /// Sheet name patterns; `None` accepts every sheet.
    pub(crate) sheet_name_patterns: Option<Vec<Pattern>>,

    /// Restrict each sheet to its declared print area when one is present.
    pub(crate) use_print_area: bool,
}

impl Default for Criteria {
    fn default() -> Self {
        Criteria {
            sheet_name_patterns: None,
            use_print_area: true,
        }
    }
}

impl Criteria {
    pub(crate) fn new(patterns: &[String], use_print_area: bool) -> Result<Criteria, BoqSheetError> {
        let sheet_name_patterns = if patterns.is_empty() {
            None
        } else {
            Some(patterns.iter().map(|pattern| Pattern::new(pattern)).collect::<Result<Vec<_>, _>>()?)
        };
        Ok(Criteria {
            sheet_name_patterns,
            use_print_area,
        })
    }

    /// True if no patterns are set or `sheet_name` matches any of them.
    pub(crate) fn accept(&self, sheet_name: &str) -> bool {
        match &self.sheet_name_patterns {
            Some(patterns) => patterns.iter().any(|pattern| pattern.matches(sheet_name)),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_matching_sheets() {
        let criteria = Criteria::new(&["BOQ*".to_owned(), "Offer".to_owned()], true).unwrap();
        assert!(criteria.accept("BOQ - Lighting"));
        assert!(criteria.accept("Offer"));
        assert!(!criteria.accept("Summary"));
        assert!(Criteria::default().accept("anything"));
    }

    #[test]
    fn rejects_bad_patterns() {
        assert!(Criteria::new(&["[".to_owned()], true).is_err());
    }
}
