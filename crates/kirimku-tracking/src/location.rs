// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Location string assembly.

/// Join non-empty parts with `, `, skipping parts equal to one already used.
pub fn join_distinct<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut seen: Vec<&str> = Vec::new();
    for part in parts {
        let part = part.trim();
        if part.is_empty() || seen.iter().any(|s| s.eq_ignore_ascii_case(part)) {
            continue;
        }
        seen.push(part);
    }
    seen.join(", ")
}

/// Append `(office)` to a location when the office adds information.
pub fn with_office(location: &str, office: &str) -> String {
    let office = office.trim();
    if office.is_empty() {
        return location.to_string();
    }
    if location.is_empty() {
        return office.to_string();
    }
    let already_named = location
        .split(", ")
        .any(|part| part.eq_ignore_ascii_case(office));
    if already_named {
        location.to_string()
    } else {
        format!("{} ({})", location, office)
    }
}

/// Join a position and a note with ` - `, dropping duplicates.
pub fn position_with_note(position: &str, note: &str) -> String {
    let (position, note) = (position.trim(), note.trim());
    match (position.is_empty(), note.is_empty()) {
        (true, true) => String::new(),
        (false, true) => position.to_string(),
        (true, false) => note.to_string(),
        (false, false) if position.eq_ignore_ascii_case(note) => position.to_string(),
        (false, false) => format!("{} - {}", position, note),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_distinct() {
        assert_eq!(join_distinct(["Jakarta Hub", "Jakarta"]), "Jakarta Hub, Jakarta");
        assert_eq!(join_distinct(["Jakarta", " jakarta ", ""]), "Jakarta");
        assert_eq!(join_distinct(["", "  "]), "");
    }

    #[test]
    fn test_with_office() {
        assert_eq!(with_office("Jakarta", "JNE Kebon Jeruk"), "Jakarta (JNE Kebon Jeruk)");
        assert_eq!(with_office("Jakarta", "jakarta"), "Jakarta");
        assert_eq!(with_office("", "JNE Kebon Jeruk"), "JNE Kebon Jeruk");
        assert_eq!(with_office("Jakarta", ""), "Jakarta");
    }

    #[test]
    fn test_position_with_note() {
        assert_eq!(
            position_with_note("Bandung Gateway", "Paket diterima"),
            "Bandung Gateway - Paket diterima"
        );
        assert_eq!(position_with_note("Bandung", ""), "Bandung");
        assert_eq!(position_with_note("", "note"), "note");
        assert_eq!(position_with_note("Same", "same"), "Same");
    }
}
