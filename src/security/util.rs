/// Split an `Authorization` value into `(scheme, param)`
///
/// `"Bearer abc"` gives `("Bearer", "abc")`; a value without a space gives
/// `(value, "")` and a missing value gives `("", "")`.
pub fn get_authorization_scheme_param(authorization: Option<&str>) -> (&str, &str) {
    let Some(value) = authorization else {
        return ("", "");
    };
    let value = value.trim();
    match value.split_once(' ') {
        Some((scheme, param)) => (scheme, param.trim()),
        None => (value, ""),
    }
}
