//! Escaping of values embedded in search filters and distinguished names.

/// Escape special characters in LDAP filter values (RFC 4515).
pub fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

/// Escape special characters in DN attribute values per RFC 4514.
///
/// Leading and trailing spaces and a leading `#` are hex-escaped; the
/// characters `, + " \ < > ; =` are backslash-prefixed.
pub fn escape_dn_value(value: &str) -> String {
    let char_count = value.chars().count();
    let mut result = String::with_capacity(value.len() * 2);

    for (i, ch) in value.chars().enumerate() {
        let is_first = i == 0;
        let is_last = i + 1 == char_count;

        match ch {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                result.push('\\');
                result.push(ch);
            }
            '\0' => result.push_str("\\00"),
            ' ' if is_first || is_last => result.push_str("\\20"),
            '#' if is_first => result.push_str("\\23"),
            _ => result.push(ch),
        }
    }

    result
}

/// Conjunction of `objectClass` equality terms, without the enclosing `(&...)`.
///
/// `["top", "person"]` becomes `(objectClass=top)(objectClass=person)`.
pub fn object_class_filter(classes: &[String]) -> String {
    classes
        .iter()
        .map(|class| format!("(objectClass={})", escape_filter_value(class)))
        .collect()
}
