use std::time::{SystemTime, UNIX_EPOCH};

const GENERATED_ID_LEN: usize = 29;

#[inline]
pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

/// 29 random alphanumerics. Only used to keep ids distinct within a response.
#[must_use]
pub(crate) fn generate_id() -> String {
    let mut out = String::with_capacity(GENERATED_ID_LEN);
    for _ in 0..GENERATED_ID_LEN {
        out.push(fastrand::alphanumeric());
    }
    out
}

#[inline]
pub(crate) fn next_completion_id() -> String {
    let mut out = String::with_capacity(9 + GENERATED_ID_LEN);
    out.push_str("chatcmpl-");
    out.push_str(&generate_id());
    out
}

#[inline]
pub(crate) fn next_call_id() -> String {
    let mut out = String::with_capacity(5 + GENERATED_ID_LEN);
    out.push_str("call_");
    out.push_str(&generate_id());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_id_is_29_alphanumerics() {
        let id = generate_id();
        assert_eq!(id.len(), 29);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn prefixed_ids() {
        let call = next_call_id();
        assert!(call.starts_with("call_"));
        assert_eq!(call.len(), 34);

        let completion = next_completion_id();
        assert!(completion.starts_with("chatcmpl-"));
        assert_eq!(completion.len(), 38);
    }
}
