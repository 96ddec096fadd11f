use url::Url;

/// Resolve `target` against the document address `base`.
///
/// Falls back to `target` unchanged when `base` is not an absolute URL.
pub(crate) fn resolve(base: &str, target: &str) -> String {
    match Url::parse(base).and_then(|base| base.join(target)) {
        Ok(resolved) => resolved.into(),
        Err(_) => target.to_string(),
    }
}

/// Compare two addresses after URL normalization.
pub(crate) fn same(left: &str, right: &str) -> bool {
    normalize(left) == normalize(right)
}

fn normalize(address: &str) -> String {
    Url::parse(address).map_or_else(|_| address.to_string(), String::from)
}
