//! Typed ID definitions.

use crate::define_id;

define_id!(
    /// A tracked physical container.
    ContainerId,
    "ctr"
);

define_id!(
    /// A bounded-capacity storage zone.
    ZoneId,
    "zone"
);

define_id!(
    /// Correlates log lines and error bodies with a single HTTP request.
    RequestId,
    "req"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_id_roundtrip() {
        let id = ContainerId::new();
        let s = id.to_string();
        assert!(s.starts_with("ctr_"));
        let parsed: ContainerId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_zone_id_rejects_container_prefix() {
        let container = ContainerId::new().to_string();
        let err = container.parse::<ZoneId>().unwrap_err();
        assert!(matches!(
            err,
            crate::IdError::InvalidPrefix {
                expected: "zone",
                ..
            }
        ));
    }

    #[test]
    fn test_missing_separator() {
        let result: Result<ZoneId, _> = "zone01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        assert!(matches!(
            result.unwrap_err(),
            crate::IdError::MissingSeparator
        ));
    }

    #[test]
    fn test_empty() {
        let result: Result<ContainerId, _> = "".parse();
        assert!(matches!(result.unwrap_err(), crate::IdError::Empty));
    }

    #[test]
    fn test_invalid_ulid() {
        let result: Result<ContainerId, _> = "ctr_not-a-ulid".parse();
        assert!(matches!(result.unwrap_err(), crate::IdError::InvalidUlid(_)));
    }

    #[test]
    fn test_json_is_plain_string() {
        let id = ZoneId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let parsed: ZoneId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_ids_sort_by_creation() {
        let first = ContainerId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = ContainerId::new();
        assert!(first < second);
    }

    #[test]
    fn test_prefixes_unique() {
        let prefixes = [ContainerId::PREFIX, ZoneId::PREFIX, RequestId::PREFIX];
        let unique: std::collections::HashSet<_> = prefixes.iter().collect();
        assert_eq!(prefixes.len(), unique.len());
    }
}
