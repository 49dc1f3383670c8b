// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Variable expansion for configuration values.
//!
//! Deployments inject settings as `${VARIABLE}` placeholders that are
//! substituted at build or serve time. This module performs the same
//! substitution for file-based configuration.

/// Expand `${VAR}` references using the process environment.
///
/// Unknown variables are left unchanged, so an unexpanded value can still
/// be recognized as a placeholder and treated as unset.
///
/// # Examples
///
/// ```
/// use mtls_enroll::config::expand_variables;
///
/// assert_eq!(expand_variables("plain"), "plain");
/// assert_eq!(
///     expand_variables("${DEFINITELY_NOT_SET_XYZ123}"),
///     "${DEFINITELY_NOT_SET_XYZ123}"
/// );
/// ```
pub fn expand_variables(input: &str) -> String {
    expand_with(input, |name| std::env::var(name).ok())
}

/// Expand `${VAR}` references using a custom lookup.
pub fn expand_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = input.to_string();
    let mut start = 0;

    while let Some(var_start) = result[start..].find("${") {
        let absolute_start = start + var_start;

        let Some(var_end) = result[absolute_start..].find('}') else {
            // Unclosed
            break;
        };
        let absolute_end = absolute_start + var_end;
        let name = &result[absolute_start + 2..absolute_end];

        match lookup(name) {
            Some(value) => {
                result.replace_range(absolute_start..=absolute_end, &value);
                start = absolute_start + value.len();
            }
            None => start = absolute_end + 1,
        }
    }

    result
}
