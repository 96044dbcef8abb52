use rand::Rng;

/// Reference ids look like `P2H-123456-0007`. The id is the idempotency key
/// for the whole booking/payment flow, so both client-minted and
/// server-minted ids go through `is_valid` before touching the database.
pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "P2H-{:06}-{:04}",
        rng.gen_range(0..1_000_000u32),
        rng.gen_range(0..10_000u32)
    )
}

pub fn is_valid(s: &str) -> bool {
    let mut parts = s.split('-');
    let (Some(prefix), Some(mid), Some(tail), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    prefix == "P2H"
        && mid.len() == 6
        && tail.len() == 4
        && mid.chars().all(|c| c.is_ascii_digit())
        && tail.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_valid() {
        for _ in 0..50 {
            let id = generate();
            assert!(is_valid(&id), "generated invalid id: {id}");
        }
    }

    #[test]
    fn test_known_good_id() {
        assert!(is_valid("P2H-123456-0007"));
    }

    #[test]
    fn test_rejects_malformed_ids() {
        for bad in [
            "",
            "P2H-123456",
            "P2H-12345-0007",
            "P2H-123456-007",
            "XYZ-123456-0007",
            "P2H-12a456-0007",
            "P2H-123456-0007-9",
        ] {
            assert!(!is_valid(bad), "accepted malformed id: {bad}");
        }
    }
}
