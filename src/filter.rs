//! Include/exclude filtering of correlated records.
//!
//! Patterns are plain, case-sensitive substrings matched against the method
//! name concatenated with the rendered payload, so a pattern may refer to
//! response content as well as to the method.

/// Predicate deciding whether a record is worth emitting.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Filter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl Filter {
    /// Create a filter from include and exclude pattern lists.
    #[must_use]
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self { Self { include, exclude } }

    /// Include patterns in the order they were supplied.
    #[must_use]
    pub fn include(&self) -> &[String] { &self.include }

    /// Exclude patterns in the order they were supplied.
    #[must_use]
    pub fn exclude(&self) -> &[String] { &self.exclude }

    /// Decide whether a record with `method` and `body` passes.
    ///
    /// Exclusion wins over inclusion. An empty include list admits every
    /// record that is not excluded.
    ///
    /// ```
    /// use devtools_proxy::filter::Filter;
    ///
    /// let filter = Filter::new(vec!["Page".into()], vec![]);
    /// assert!(filter.accept("Page.loadEventFired", "{}"));
    /// assert!(!filter.accept("Network.foo", "{}"));
    /// ```
    #[must_use]
    pub fn accept(&self, method: &str, body: &str) -> bool {
        let value = [method, body].concat();
        if self.exclude.iter().any(|pattern| value.contains(pattern.as_str())) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|pattern| value.contains(pattern.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::Filter;

    fn patterns(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[rstest]
    #[case::excluded(&[], &["Network"], "Network.requestWillBeSent", false)]
    #[case::included(&["Page"], &[], "Page.loadEventFired", true)]
    #[case::not_included(&["Page"], &[], "Network.foo", false)]
    #[case::exclude_wins(&["Page"], &["load"], "Page.loadEventFired", false)]
    #[case::empty_lists(&[], &[], "Anything.goes", true)]
    #[case::case_sensitive(&["page"], &[], "Page.enable", false)]
    fn accepts_by_method(
        #[case] include: &[&str],
        #[case] exclude: &[&str],
        #[case] method: &str,
        #[case] expected: bool,
    ) {
        let filter = Filter::new(patterns(include), patterns(exclude));
        assert_eq!(filter.accept(method, "{}"), expected);
    }

    #[test]
    fn patterns_match_payload_content() {
        let filter = Filter::new(patterns(&["frameId"]), patterns(&[]));
        assert!(filter.accept("Page.navigate", r#"{"frameId":"f1"}"#));
        assert!(!filter.accept("Page.navigate", r#"{"url":"https://x"}"#));
    }

    #[test]
    fn patterns_may_span_method_and_body() {
        let filter = Filter::new(patterns(&["enable{"]), patterns(&[]));
        assert!(filter.accept("Page.enable", "{}"));
    }

    proptest! {
        #[test]
        fn excluded_pattern_is_never_accepted(
            prefix in "[A-Za-z.]{0,8}",
            pattern in "[A-Za-z]{1,4}",
            body in "[ -~]{0,32}",
        ) {
            let method = format!("{prefix}{pattern}");
            let filter = Filter::new(vec![pattern.clone()], vec![pattern]);
            prop_assert!(!filter.accept(&method, &body));
        }

        #[test]
        fn include_only_accepts_matches(
            method in "[A-Za-z.]{0,16}",
            body in "[ -~]{0,32}",
            pattern in "[A-Za-z]{1,3}",
        ) {
            let filter = Filter::new(vec![pattern.clone()], Vec::new());
            let value = format!("{method}{body}");
            prop_assert_eq!(filter.accept(&method, &body), value.contains(&pattern));
        }

        #[test]
        fn empty_filter_accepts_everything(method in "[A-Za-z.]{0,16}", body in "[ -~]{0,32}") {
            prop_assert!(Filter::default().accept(&method, &body));
        }
    }
}
