use crate::policy::DestinationPolicy;

/// Key the processed object is written to.
///
/// Under `RewritePrefix` the first `/`-delimited segment of the source is
/// replaced; a key without any `/` gets the segment prepended instead.
pub fn destination_key(policy: &DestinationPolicy, source_key: &str) -> String {
    match policy {
        DestinationPolicy::Identity => source_key.to_string(),
        DestinationPolicy::RewritePrefix(segment) => match source_key.split_once('/') {
            Some((_, rest)) => format!("{segment}/{rest}"),
            None => format!("{segment}/{source_key}"),
        },
    }
}

/// Whether the source must be deleted once the destination write succeeds.
pub fn removes_source(policy: &DestinationPolicy, source_key: &str, destination_key: &str) -> bool {
    matches!(policy, DestinationPolicy::RewritePrefix(_)) && source_key != destination_key
}
