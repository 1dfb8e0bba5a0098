/// Expand Unix-style environment variables (`$VAR` and `${VAR}`) in a value.
///
/// Unset `${VAR}` references expand to an empty string; unset `$VAR`
/// references are left untouched so literal dollar signs in secrets survive.
pub fn expand_env_vars(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(pos) = rest.find('$') {
        result.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => {
                    let name = &braced[..end];
                    result.push_str(&std::env::var(name).unwrap_or_default());
                    rest = &braced[end + 1..];
                }
                None => {
                    // Unterminated brace, keep the remainder verbatim
                    result.push_str(&rest[pos..]);
                    return result;
                }
            }
            continue;
        }

        let name_len = after
            .bytes()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == b'_')
            .count();

        if name_len == 0 {
            result.push('$');
            rest = after;
            continue;
        }

        let name = &after[..name_len];
        match std::env::var(name) {
            Ok(v) => result.push_str(&v),
            Err(_) => {
                result.push('$');
                result.push_str(name);
            }
        }
        rest = &after[name_len..];
    }

    result.push_str(rest);
    result
}

/// Read the first set, non-empty variable from a list of names.
pub fn first_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_expand_braced_and_bare() {
        env::set_var("CC_TEST_KEY", "AKIAEXAMPLE");
        env::set_var("CC_TEST_REGION", "eu-west-1");

        assert_eq!(expand_env_vars("${CC_TEST_KEY}"), "AKIAEXAMPLE");
        assert_eq!(expand_env_vars("$CC_TEST_REGION"), "eu-west-1");
        assert_eq!(
            expand_env_vars("key=${CC_TEST_KEY}/$CC_TEST_REGION!"),
            "key=AKIAEXAMPLE/eu-west-1!"
        );

        env::remove_var("CC_TEST_KEY");
        env::remove_var("CC_TEST_REGION");
    }

    #[test]
    fn test_expand_unset_and_malformed() {
        assert_eq!(expand_env_vars("${CC_TEST_DOES_NOT_EXIST}"), "");
        assert_eq!(expand_env_vars("$CC_TEST_DOES_NOT_EXIST/x"), "$CC_TEST_DOES_NOT_EXIST/x");
        assert_eq!(expand_env_vars("abc${UNTERMINATED"), "abc${UNTERMINATED");
        assert_eq!(expand_env_vars("price $ 5"), "price $ 5");
        assert_eq!(expand_env_vars("trailing$"), "trailing$");
        assert_eq!(expand_env_vars("plain"), "plain");
    }

    #[test]
    fn test_first_env() {
        env::set_var("CC_TEST_SECOND", "value");
        assert_eq!(
            first_env(&["CC_TEST_FIRST_UNSET", "CC_TEST_SECOND"]),
            Some("value".to_string())
        );
        assert_eq!(first_env(&["CC_TEST_FIRST_UNSET"]), None);
        env::remove_var("CC_TEST_SECOND");
    }
}
