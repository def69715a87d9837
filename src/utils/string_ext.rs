//! Cleaning for user-supplied names and questions.
//!
//! Place names arrive from chat text with stray spacing ("United   States",
//! " munich "), so cleaning here means whitespace normalisation, not just
//! trimming. `fold_key` is the canonical lookup form used on both sides of
//! the resolver's alias tables, so "New  York   City" and "new york city"
//! land on the same key.

pub trait StringExt {
    /// Trimmed, whitespace-collapsed copy; `None` when nothing is left.
    fn clean(&self) -> Option<String>;

    /// Case-folded, whitespace-collapsed key for alias-table lookups.
    fn fold_key(&self) -> String;
}

impl StringExt for str {
    fn clean(&self) -> Option<String> {
        let mut out = String::with_capacity(self.len());
        for word in self.split_whitespace() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(word);
        }
        if out.is_empty() { None } else { Some(out) }
    }

    fn fold_key(&self) -> String {
        self.clean().unwrap_or_default().to_lowercase()
    }
}

impl StringExt for String {
    fn clean(&self) -> Option<String> {
        self.as_str().clean()
    }

    fn fold_key(&self) -> String {
        self.as_str().fold_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_collapses_internal_whitespace() {
        assert_eq!("  Germany ".clean(), Some("Germany".to_string()));
        assert_eq!("United   States  of\tAmerica".clean(), Some("United States of America".to_string()));
        assert_eq!("   ".clean(), None);
        assert_eq!("".clean(), None);
    }

    #[test]
    fn fold_key_is_stable_across_spacing_and_case() {
        assert_eq!("New  York   City".fold_key(), "new york city");
        assert_eq!("new york city".fold_key(), "new york city");
        assert_eq!(" USA ".fold_key(), "usa");
        assert_eq!("  ".fold_key(), "");
    }
}
