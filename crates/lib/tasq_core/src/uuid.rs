// Identifiers for accounts and task records.
//
// Ids are UUIDv7 rendered as text: timestamp-sortable, so listing by id is
// listing by creation order, and generated app-side so the in-memory and
// PostgreSQL stores agree on the format.

use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}

/// Generate a new record id.
pub fn new_id() -> String {
    uuidv7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_id_is_a_v7_uuid() {
        let id = new_id();
        let parsed = Uuid::parse_str(&id).unwrap();
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn ids_sort_by_creation() {
        let a = new_id();
        let b = new_id();
        assert!(b >= a);
    }
}
